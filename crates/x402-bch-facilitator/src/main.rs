use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_bch::{BchFacilitator, CoalescingChainClient, SqliteLedgerStore};
use x402_bch_facilitator::config::Config;
use x402_bch_facilitator::node::BchNodeClient;
use x402_bch_facilitator::routes;
use x402_bch_facilitator::state::AppState;

fn parse_cors_origins() -> Vec<String> {
    match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) => origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => vec![],
    }
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let store = match SqliteLedgerStore::open(&config.ledger_db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                "Failed to open ledger database at {}: {e}",
                config.ledger_db_path
            );
            tracing::error!("Refusing to start without a durable ledger");
            std::process::exit(1);
        }
    };

    let node = BchNodeClient::new(&config);
    let chain = Arc::new(CoalescingChainClient::new(node.clone()));
    let facilitator = BchFacilitator::new(store, chain, node.clone(), node);

    // The address index is reconstructible drift; rebuild it from the
    // ledger before serving.
    match facilitator.engine().rebuild_address_index() {
        Ok(indexed) => tracing::info!(indexed, "address index rebuilt from ledger"),
        Err(e) => tracing::warn!(error = %e, "address index rebuild failed"),
    }
    facilitator.engine().start_lock_cleanup();

    let state = web::Data::new(AppState { facilitator });

    let port = config.port;
    let cors_origins = parse_cors_origins();

    tracing::info!("x402 BCH facilitator listening on port {port}");
    tracing::info!("Server address: {}", config.server_bch_address);
    tracing::info!("BCH node: {} ({:?})", config.bch_server_url, config.api_type);
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/verify");
    tracing::info!("  POST http://localhost:{port}/settle");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::supported)
            .service(routes::verify)
            .service(routes::settle)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
