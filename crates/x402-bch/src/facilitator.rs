//! The verification and settlement pipelines.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chain::ChainClient;
use crate::constants::{CANONICAL_NET, PROTOCOL_VERSION, SCHEME_NAME, SIGNER_NAMESPACE};
use crate::engine::{DebitOutcome, LedgerEngine};
use crate::error::FacilitatorError;
use crate::ledger::LedgerStore;
use crate::network::same_network;
use crate::payment::{AuthorizationRef, PaymentPayload, PaymentRequirements};
use crate::response::{
    InvalidReason, LedgerEntrySummary, SettleResponse, SupportedKind, SupportedKindsResponse,
    VerifyResponse,
};
use crate::selector::select_utxo;
use crate::signature::SignatureVerifier;
use crate::wallet::{FacilitatorWallet, WalletOutput};

/// Static capability advertisement: one scheme, one network.
pub fn supported_kinds() -> SupportedKindsResponse {
    SupportedKindsResponse {
        kinds: vec![SupportedKind {
            protocol_version: PROTOCOL_VERSION,
            scheme: SCHEME_NAME.to_string(),
            network: CANONICAL_NET.to_string(),
        }],
        extensions: vec![],
        signers: BTreeMap::from([(SIGNER_NAMESPACE.to_string(), vec![])]),
    }
}

/// Facilitator-side payment processor: verifies authorizations against the
/// debit ledger and settles on-chain from its own wallet.
///
/// Errors never escape the two public pipelines; anything unexpected maps to
/// `unexpected_verify_error` / `unexpected_settle_error` in the response.
pub struct BchFacilitator<S, C, V, W> {
    engine: LedgerEngine<S, C>,
    store: Arc<S>,
    verifier: V,
    wallet: W,
}

impl<S, C, V, W> BchFacilitator<S, C, V, W>
where
    S: LedgerStore,
    C: ChainClient,
    V: SignatureVerifier,
    W: FacilitatorWallet,
{
    pub fn new(store: Arc<S>, chain: Arc<C>, verifier: V, wallet: W) -> Self {
        Self {
            engine: LedgerEngine::new(Arc::clone(&store), chain),
            store,
            verifier,
            wallet,
        }
    }

    pub fn engine(&self) -> &LedgerEngine<S, C> {
        &self.engine
    }

    /// Verify a payment payload against the requirements and debit the cost.
    pub async fn verify_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        match self.verify_inner(payload, requirements).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "unexpected verification failure");
                VerifyResponse::rejected(
                    InvalidReason::UnexpectedVerifyError,
                    payload.best_effort_payer(),
                )
            }
        }
    }

    async fn verify_inner(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError> {
        if !same_network(&requirements.network, payload.network()) {
            return Ok(VerifyResponse::rejected(InvalidReason::InvalidNetwork, ""));
        }

        if requirements.scheme != SCHEME_NAME || payload.scheme() != SCHEME_NAME {
            return Ok(VerifyResponse::rejected(InvalidReason::InvalidScheme, ""));
        }

        let signed = payload.signed();
        let (Some(auth), Some(signature)) =
            (signed.authorization.as_ref(), signed.signature.as_deref())
        else {
            return Ok(VerifyResponse::rejected(InvalidReason::InvalidPayload, ""));
        };

        let message = auth.signing_message()?;
        match self.verifier.verify(&auth.from, signature, &message).await {
            Ok(true) => {}
            Ok(false) => {
                return Ok(VerifyResponse::rejected(
                    InvalidReason::InvalidExactBchPayloadSignature,
                    auth.from.clone(),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, payer = %auth.from, "signature verification errored");
                return Ok(VerifyResponse::rejected(
                    InvalidReason::InvalidExactBchPayloadSignature,
                    auth.from.clone(),
                ));
            }
        }

        let Some(cost) = requirements.cost() else {
            return Ok(VerifyResponse::rejected(
                InvalidReason::InvalidPayment,
                auth.from.clone(),
            ));
        };

        let selected = match auth.reference() {
            Ok(AuthorizationRef::AnyForAddress) => {
                match select_utxo(self.store.as_ref(), &auth.from, &requirements.pay_to, cost) {
                    Some(entry) => Some(entry),
                    None => {
                        return Ok(VerifyResponse::rejected(
                            InvalidReason::NoUtxoFoundForAddress,
                            auth.from.clone(),
                        ));
                    }
                }
            }
            // A concrete reference needs no selection; shape errors are the
            // engine's to report.
            _ => None,
        };

        match self.engine.debit(Some(auth), cost, selected.as_ref()).await? {
            DebitOutcome::Accepted { entry } => Ok(VerifyResponse {
                is_valid: true,
                invalid_reason: None,
                payer: auth.from.clone(),
                remaining_balance_sat: Some(entry.remaining_balance_sat),
                ledger_entry: Some(LedgerEntrySummary {
                    utxo_id: entry.utxo_id,
                    transaction_value_sat: entry.transaction_value_sat,
                    total_debited_sat: entry.total_debited_sat,
                    last_updated: entry.last_updated,
                }),
            }),
            DebitOutcome::Rejected { reason, .. } => {
                Ok(VerifyResponse::rejected(reason, auth.from.clone()))
            }
        }
    }

    /// Settle a payment: re-verify, then broadcast the authorized amount to
    /// the recipient from the facilitator's wallet.
    pub async fn settle_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        match self.settle_inner(payload, requirements).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "unexpected settlement failure");
                SettleResponse::rejected(
                    InvalidReason::UnexpectedSettleError,
                    payload.best_effort_payer(),
                )
            }
        }
    }

    async fn settle_inner(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorError> {
        let verification = self.verify_payment(payload, requirements).await;
        if !verification.is_valid {
            let reason = verification
                .invalid_reason
                .unwrap_or(InvalidReason::InvalidPayment);
            tracing::warn!(
                payer = %verification.payer,
                %reason,
                "settlement rejected after re-verification"
            );
            return Ok(SettleResponse::rejected(reason, verification.payer));
        }

        // Verification proved the payload shape; a missing authorization
        // here is a bug, not a client error.
        let auth = payload.signed().authorization.as_ref().ok_or_else(|| {
            FacilitatorError::InvalidPayment("authorization vanished after verification".into())
        })?;

        self.wallet.ensure_initialized().await?;

        let amount = auth.value;
        if let Some(cost) = requirements.cost() {
            if cost != amount {
                tracing::warn!(
                    debited_sat = cost,
                    broadcast_sat = amount,
                    payer = %auth.from,
                    "authorized value differs from debited cost"
                );
            }
        }

        let funds = self.wallet.balance().await?;
        if funds < amount {
            tracing::warn!(
                payer = %auth.from,
                funds_sat = funds,
                amount_sat = amount,
                "facilitator wallet cannot cover settlement"
            );
            return Ok(SettleResponse::rejected(
                InvalidReason::InsufficientFunds,
                verification.payer,
            ));
        }

        let outputs = [WalletOutput {
            address: requirements.pay_to.clone(),
            amount,
        }];
        let txid = match self.wallet.send(&outputs).await {
            Ok(txid) => txid,
            Err(e) => {
                tracing::error!(error = %e, payer = %auth.from, "settlement broadcast failed");
                return Ok(SettleResponse::rejected(
                    InvalidReason::InvalidTransactionState,
                    verification.payer,
                ));
            }
        };
        if txid.is_empty() {
            return Ok(SettleResponse::rejected(
                InvalidReason::InvalidTransactionState,
                verification.payer,
            ));
        }

        tracing::info!(payer = %auth.from, %txid, amount_sat = amount, "payment settled");
        Ok(SettleResponse {
            success: true,
            error_reason: None,
            transaction: txid,
            network: CANONICAL_NET.to_string(),
            payer: verification.payer,
            remaining_balance_sat: verification.remaining_balance_sat,
        })
    }
}
