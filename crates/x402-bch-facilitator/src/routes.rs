use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use x402_bch::{
    supported_kinds, InvalidReason, PaymentPayload, PaymentRequirements, SettleResponse,
    VerifyResponse, CANONICAL_NET,
};

use crate::metrics;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "x402-bch-facilitator",
        "network": CANONICAL_NET,
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[get("/supported")]
pub async fn supported() -> HttpResponse {
    HttpResponse::Ok().json(supported_kinds())
}

#[post("/verify")]
pub async fn verify(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let parsed: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting malformed verify body");
            return HttpResponse::BadRequest().json(VerifyResponse::rejected(
                InvalidReason::InvalidPayload,
                "",
            ));
        }
    };

    let start = std::time::Instant::now();
    let result = state
        .facilitator
        .verify_payment(&parsed.payment_payload, &parsed.payment_requirements)
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    let label = if result.is_valid { "valid" } else { "invalid" };
    metrics::VERIFY_REQUESTS.with_label_values(&[label]).inc();
    metrics::VERIFY_LATENCY
        .with_label_values(&[label])
        .observe(elapsed);
    if !result.is_valid {
        tracing::info!(
            payer = %result.payer,
            reason = result.invalid_reason.map(|r| r.as_str()).unwrap_or("unknown"),
            "payment verification rejected"
        );
    }

    HttpResponse::Ok().json(result)
}

#[post("/settle")]
pub async fn settle(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let parsed: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting malformed settle body");
            return HttpResponse::BadRequest().json(SettleResponse::rejected(
                InvalidReason::InvalidPayload,
                "",
            ));
        }
    };

    let start = std::time::Instant::now();
    let result = state
        .facilitator
        .settle_payment(&parsed.payment_payload, &parsed.payment_requirements)
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    let label = if result.success { "success" } else { "rejected" };
    metrics::SETTLE_REQUESTS.with_label_values(&[label]).inc();
    metrics::SETTLE_LATENCY
        .with_label_values(&[label])
        .observe(elapsed);
    if result.success {
        tracing::info!(payer = %result.payer, tx = %result.transaction, "settlement completed");
    } else {
        tracing::warn!(
            payer = %result.payer,
            reason = result.error_reason.map(|r| r.as_str()).unwrap_or("unknown"),
            "settlement rejected"
        );
    }

    HttpResponse::Ok().json(result)
}
