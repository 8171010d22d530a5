use x402_bch::{FacilitatorError, DEFAULT_PORT};

/// Which flavor of node service `BCH_SERVER_URL` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiType {
    ConsumerApi,
    RestApi,
}

impl ApiType {
    fn parse(raw: &str) -> Result<Self, FacilitatorError> {
        match raw {
            "consumer-api" => Ok(ApiType::ConsumerApi),
            "rest-api" => Ok(ApiType::RestApi),
            other => Err(FacilitatorError::Config(format!(
                "API_TYPE must be 'consumer-api' or 'rest-api', got {other:?}"
            ))),
        }
    }
}

/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub node_env: String,
    pub log_level: String,
    /// The facilitator's receiving address; funded UTXOs must pay it.
    pub server_bch_address: String,
    pub api_type: ApiType,
    pub bch_server_url: String,
    pub bearer_token: Option<String>,
    pub ledger_db_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, FacilitatorError> {
        let node_env = std::env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| FacilitatorError::Config(format!("invalid PORT {raw:?}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let server_bch_address = match std::env::var("SERVER_BCH_ADDRESS") {
            Ok(addr) if !addr.is_empty() => addr,
            _ if node_env == "production" => {
                return Err(FacilitatorError::Config(
                    "SERVER_BCH_ADDRESS is required in production".to_string(),
                ));
            }
            _ => {
                tracing::warn!(
                    "SERVER_BCH_ADDRESS not set — every UTXO will fail receiver validation"
                );
                String::new()
            }
        };

        let api_type = match std::env::var("API_TYPE") {
            Ok(raw) => ApiType::parse(&raw)?,
            Err(_) => ApiType::ConsumerApi,
        };

        Ok(Self {
            port,
            node_env,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            server_bch_address,
            api_type,
            bch_server_url: std::env::var("BCH_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:5005".to_string()),
            bearer_token: std::env::var("BEARER_TOKEN").ok().filter(|t| !t.is_empty()),
            ledger_db_path: std::env::var("LEDGER_DB_PATH")
                .unwrap_or_else(|_| "./x402-bch-ledger.db".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_type_parse() {
        assert_eq!(ApiType::parse("consumer-api").unwrap(), ApiType::ConsumerApi);
        assert_eq!(ApiType::parse("rest-api").unwrap(), ApiType::RestApi);
        assert!(ApiType::parse("graphql").is_err());
    }
}
