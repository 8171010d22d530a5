//! HTTP adapters for the BCH node service.
//!
//! One client implements all three core seams against the service at
//! `BCH_SERVER_URL`:
//!
//! - chain reads: `getTxOut`-shaped lookups, under `/bch` (consumer-api) or
//!   `/v5/blockchain` (rest-api)
//! - signed-message verification: `verifyMessage`
//! - the facilitator's wallet service: `/wallet/info`, `/wallet/balance`,
//!   `/wallet/send`
//!
//! The adapter's only logic is shape translation plus the receiver check the
//! chain-client contract demands; everything else stays in the core crate.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::OnceCell;

use x402_bch::{
    ChainClient, FacilitatorError, FacilitatorWallet, InvalidReason, SignatureVerifier,
    UtxoCheck, WalletOutput,
};

use crate::config::{ApiType, Config};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SATS_PER_BCH: f64 = 100_000_000.0;

/// A `getTxOut` response. `value` is in BCH; it is converted to base units
/// at this boundary and never travels further as a float.
#[derive(Debug, Deserialize)]
struct TxOut {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyMessageResponse {
    valid: bool,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    satoshis: u64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    txid: String,
}

fn bch_to_sats(value: f64) -> u64 {
    (value * SATS_PER_BCH).round() as u64
}

/// Reqwest-backed node client implementing [`ChainClient`],
/// [`SignatureVerifier`], and [`FacilitatorWallet`].
#[derive(Clone)]
pub struct BchNodeClient {
    http: reqwest::Client,
    base_url: String,
    api_type: ApiType,
    bearer_token: Option<String>,
    server_address: String,
    wallet_init: Arc<OnceCell<()>>,
}

impl BchNodeClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.bch_server_url.trim_end_matches('/').to_string(),
            api_type: config.api_type,
            bearer_token: config.bearer_token.clone(),
            server_address: config.server_bch_address.clone(),
            wallet_init: Arc::new(OnceCell::new()),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.post(format!("{}{path}", self.base_url)))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<TxOut>, FacilitatorError> {
        let request = match self.api_type {
            ApiType::RestApi => {
                self.get(&format!("/v5/blockchain/getTxOut/{txid}/{vout}?mempool=true"))
            }
            ApiType::ConsumerApi => self
                .post("/bch/getTxOut")
                .json(&serde_json::json!({ "txid": txid, "vout": vout })),
        };
        let response = request
            .send()
            .await
            .map_err(|e| FacilitatorError::Chain(format!("getTxOut request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FacilitatorError::Chain(format!("getTxOut failed: {e}")))?;
        // A spent or unknown output comes back as JSON null.
        response
            .json::<Option<TxOut>>()
            .await
            .map_err(|e| FacilitatorError::Chain(format!("getTxOut decode failed: {e}")))
    }
}

impl ChainClient for BchNodeClient {
    async fn validate_utxo(&self, txid: &str, vout: u32) -> Result<UtxoCheck, FacilitatorError> {
        let Some(out) = self.get_tx_out(txid, vout).await? else {
            return Ok(UtxoCheck::invalid(InvalidReason::UtxoNotFound));
        };
        let receiver = out.script_pub_key.addresses.first().cloned().unwrap_or_default();
        if receiver != self.server_address {
            tracing::debug!(%txid, vout, %receiver, "UTXO pays a foreign address");
            return Ok(UtxoCheck::invalid(InvalidReason::InvalidReceiverAddress));
        }
        Ok(UtxoCheck::valid(bch_to_sats(out.value), receiver))
    }

    async fn send_outputs(&self, outputs: &[WalletOutput]) -> Result<String, FacilitatorError> {
        let response: SendResponse = self
            .post("/wallet/send")
            .json(&serde_json::json!({ "outputs": outputs }))
            .send()
            .await
            .map_err(|e| FacilitatorError::Chain(format!("broadcast request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FacilitatorError::Chain(format!("broadcast failed: {e}")))?
            .json()
            .await
            .map_err(|e| FacilitatorError::Chain(format!("broadcast decode failed: {e}")))?;
        Ok(response.txid)
    }

    async fn balance(&self, address: &str) -> Result<u64, FacilitatorError> {
        let response: BalanceResponse = self
            .post("/wallet/balance")
            .json(&serde_json::json!({ "address": address }))
            .send()
            .await
            .map_err(|e| FacilitatorError::Chain(format!("balance request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FacilitatorError::Chain(format!("balance failed: {e}")))?
            .json()
            .await
            .map_err(|e| FacilitatorError::Chain(format!("balance decode failed: {e}")))?;
        Ok(response.satoshis)
    }
}

impl SignatureVerifier for BchNodeClient {
    async fn verify(
        &self,
        address: &str,
        signature: &str,
        message: &str,
    ) -> Result<bool, FacilitatorError> {
        let path = match self.api_type {
            ApiType::RestApi => "/v5/util/verifyMessage",
            ApiType::ConsumerApi => "/bch/verifyMessage",
        };
        let response: VerifyMessageResponse = self
            .post(path)
            .json(&serde_json::json!({
                "address": address,
                "signature": signature,
                "message": message,
            }))
            .send()
            .await
            .map_err(|e| FacilitatorError::Signature(format!("verifyMessage request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FacilitatorError::Signature(format!("verifyMessage failed: {e}")))?
            .json()
            .await
            .map_err(|e| FacilitatorError::Signature(format!("verifyMessage decode failed: {e}")))?;
        Ok(response.valid)
    }
}

impl FacilitatorWallet for BchNodeClient {
    async fn ensure_initialized(&self) -> Result<(), FacilitatorError> {
        self.wallet_init
            .get_or_try_init(|| async {
                self.get("/wallet/info")
                    .send()
                    .await
                    .map_err(|e| {
                        FacilitatorError::Wallet(format!("wallet initialization failed: {e}"))
                    })?
                    .error_for_status()
                    .map_err(|e| {
                        FacilitatorError::Wallet(format!("wallet initialization failed: {e}"))
                    })?;
                tracing::info!("facilitator wallet initialized");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn balance(&self) -> Result<u64, FacilitatorError> {
        let response: BalanceResponse = self
            .get("/wallet/balance")
            .send()
            .await
            .map_err(|e| FacilitatorError::Wallet(format!("wallet balance request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FacilitatorError::Wallet(format!("wallet balance failed: {e}")))?
            .json()
            .await
            .map_err(|e| FacilitatorError::Wallet(format!("wallet balance decode failed: {e}")))?;
        Ok(response.satoshis)
    }

    async fn send(&self, outputs: &[WalletOutput]) -> Result<String, FacilitatorError> {
        ChainClient::send_outputs(self, outputs).await
    }
}
