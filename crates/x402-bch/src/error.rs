use thiserror::Error;

/// Errors returned by facilitator operations.
#[derive(Debug, Error)]
pub enum FacilitatorError {
    #[error("ledger store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
