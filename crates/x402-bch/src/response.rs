use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::CANONICAL_NET;
use crate::payment::sats;

/// The closed set of rejection reasons surfaced by verify and settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    MissingAuthorization,
    InvalidNetwork,
    InvalidScheme,
    InvalidPayload,
    InvalidExactBchPayloadSignature,
    NoUtxoFoundForAddress,
    UtxoNotFound,
    InvalidReceiverAddress,
    InsufficientUtxoBalance,
    InsufficientFunds,
    InvalidTransactionState,
    InvalidPayment,
    InvalidUtxo,
    UnexpectedUtxoValidationError,
    UnexpectedVerifyError,
    UnexpectedSettleError,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::MissingAuthorization => "missing_authorization",
            InvalidReason::InvalidNetwork => "invalid_network",
            InvalidReason::InvalidScheme => "invalid_scheme",
            InvalidReason::InvalidPayload => "invalid_payload",
            InvalidReason::InvalidExactBchPayloadSignature => {
                "invalid_exact_bch_payload_signature"
            }
            InvalidReason::NoUtxoFoundForAddress => "no_utxo_found_for_address",
            InvalidReason::UtxoNotFound => "utxo_not_found",
            InvalidReason::InvalidReceiverAddress => "invalid_receiver_address",
            InvalidReason::InsufficientUtxoBalance => "insufficient_utxo_balance",
            InvalidReason::InsufficientFunds => "insufficient_funds",
            InvalidReason::InvalidTransactionState => "invalid_transaction_state",
            InvalidReason::InvalidPayment => "invalid_payment",
            InvalidReason::InvalidUtxo => "invalid_utxo",
            InvalidReason::UnexpectedUtxoValidationError => "unexpected_utxo_validation_error",
            InvalidReason::UnexpectedVerifyError => "unexpected_verify_error",
            InvalidReason::UnexpectedSettleError => "unexpected_settle_error",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of the ledger entry touched by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntrySummary {
    pub utxo_id: String,
    #[serde(with = "sats")]
    pub transaction_value_sat: u64,
    #[serde(with = "sats")]
    pub total_debited_sat: u64,
    pub last_updated: String,
}

/// Result of `verifyPayment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<InvalidReason>,
    pub payer: String,
    #[serde(
        default,
        with = "sats::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining_balance_sat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_entry: Option<LedgerEntrySummary>,
}

impl VerifyResponse {
    pub fn rejected(reason: InvalidReason, payer: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer: payer.into(),
            remaining_balance_sat: None,
            ledger_entry: None,
        }
    }
}

/// Result of `settlePayment`.
///
/// `network` is always [`CANONICAL_NET`]: this facilitator is single-network
/// and never echoes the tag back from input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<InvalidReason>,
    pub transaction: String,
    pub network: String,
    pub payer: String,
    #[serde(
        default,
        with = "sats::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining_balance_sat: Option<u64>,
}

impl SettleResponse {
    pub fn rejected(reason: InvalidReason, payer: impl Into<String>) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            transaction: String::new(),
            network: CANONICAL_NET.to_string(),
            payer: payer.into(),
            remaining_balance_sat: None,
        }
    }
}

/// One supported payment kind, as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub protocol_version: u32,
    pub scheme: String,
    pub network: String,
}

/// Static capability advertisement returned by `listSupportedKinds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKindsResponse {
    pub kinds: Vec<SupportedKind>,
    pub extensions: Vec<String>,
    pub signers: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&InvalidReason::InvalidExactBchPayloadSignature).unwrap(),
            "\"invalid_exact_bch_payload_signature\""
        );
        assert_eq!(
            serde_json::to_string(&InvalidReason::NoUtxoFoundForAddress).unwrap(),
            "\"no_utxo_found_for_address\""
        );
        let parsed: InvalidReason = serde_json::from_str("\"insufficient_utxo_balance\"").unwrap();
        assert_eq!(parsed, InvalidReason::InsufficientUtxoBalance);
    }

    #[test]
    fn test_display_matches_serde() {
        for reason in [
            InvalidReason::MissingAuthorization,
            InvalidReason::UnexpectedSettleError,
            InvalidReason::InvalidUtxo,
        ] {
            let wire = serde_json::to_string(&reason).unwrap();
            assert_eq!(wire, format!("\"{reason}\""));
        }
    }

    #[test]
    fn test_verify_response_serialization() {
        let resp = VerifyResponse {
            is_valid: true,
            invalid_reason: None,
            payer: "A".to_string(),
            remaining_balance_sat: Some(1000),
            ledger_entry: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["remainingBalanceSat"], "1000");
        assert!(json.get("invalidReason").is_none());
    }

    #[test]
    fn test_settle_rejected_shape() {
        let resp = SettleResponse::rejected(InvalidReason::InsufficientFunds, "A");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorReason"], "insufficient_funds");
        assert_eq!(json["transaction"], "");
        assert_eq!(json["network"], CANONICAL_NET);
    }
}
