use serde::{Deserialize, Serialize};

use crate::constants::ANY_UTXO_SENTINEL;
use crate::response::InvalidReason;

/// Serde helpers for satoshi amounts.
///
/// Amounts arrive as JSON strings or integers and are always emitted as
/// strings. Once parsed they live as `u64`; floating-point never enters.
pub(crate) mod sats {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Raw {
        Num(u64),
        Str(String),
    }

    pub(super) fn parse(raw: Raw) -> Result<u64, String> {
        match raw {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid satoshi amount {s:?}: {e}")),
        }
    }

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        parse(Raw::deserialize(d)?).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match v {
                Some(n) => super::serialize(n, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            Option::<super::Raw>::deserialize(d)?
                .map(super::parse)
                .transpose()
                .map_err(de::Error::custom)
        }
    }
}

/// A signed payment authorization, as produced by the paying client.
///
/// `txid` may carry the `"*"` sentinel, in which case `vout` is null and the
/// facilitator selects a funded UTXO for the payer. Field order matters: the
/// signature covers the JSON serialization of this struct in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub from: String,
    pub to: String,
    #[serde(with = "sats")]
    pub value: u64,
    pub txid: String,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(
        default,
        with = "sats::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<u64>,
}

/// Which coin an authorization points at, with the wire sentinel resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationRef {
    Specific { txid: String, vout: u32 },
    AnyForAddress,
}

impl Authorization {
    /// Resolve the `txid`/`vout` pair into a tagged reference.
    ///
    /// A concrete `txid` with a null `vout` has no meaning and is reported as
    /// a payload-shape failure.
    pub fn reference(&self) -> Result<AuthorizationRef, InvalidReason> {
        if self.txid == ANY_UTXO_SENTINEL {
            return Ok(AuthorizationRef::AnyForAddress);
        }
        match self.vout {
            Some(vout) => Ok(AuthorizationRef::Specific {
                txid: self.txid.clone(),
                vout,
            }),
            None => Err(InvalidReason::InvalidPayload),
        }
    }

    /// The exact message the client signed: this struct's JSON serialization,
    /// sentinel and all.
    pub fn signing_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Signature plus the authorization it covers.
///
/// Both fields are optional on the wire so that shape problems surface as
/// pipeline reasons rather than transport-level parse failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAuthorization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
}

/// The scheme/network block of a v2 payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedKind {
    pub scheme: String,
    pub network: String,
}

/// Wire-format payment payload.
///
/// Two generations are in the wild: v2 nests scheme and network under
/// `accepted`, v1 carries them at the top level. When both shapes could
/// apply, `accepted` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentPayload {
    V2 {
        accepted: AcceptedKind,
        payload: SignedAuthorization,
    },
    V1 {
        scheme: String,
        network: String,
        payload: SignedAuthorization,
    },
}

impl PaymentPayload {
    pub fn scheme(&self) -> &str {
        match self {
            PaymentPayload::V2 { accepted, .. } => &accepted.scheme,
            PaymentPayload::V1 { scheme, .. } => scheme,
        }
    }

    pub fn network(&self) -> &str {
        match self {
            PaymentPayload::V2 { accepted, .. } => &accepted.network,
            PaymentPayload::V1 { network, .. } => network,
        }
    }

    pub fn signed(&self) -> &SignedAuthorization {
        match self {
            PaymentPayload::V2 { payload, .. } | PaymentPayload::V1 { payload, .. } => payload,
        }
    }

    /// Payer address for error reporting, if the payload got far enough to
    /// carry one.
    pub fn best_effort_payer(&self) -> String {
        self.signed()
            .authorization
            .as_ref()
            .map(|a| a.from.clone())
            .unwrap_or_default()
    }
}

/// A single entry from the `accepts` array of a 402 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub pay_to: String,
    #[serde(
        default,
        with = "sats::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<u64>,
    #[serde(
        default,
        with = "sats::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_amount_required: Option<u64>,
    #[serde(
        default,
        with = "sats::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_amount_required: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl PaymentRequirements {
    /// The call cost in base units: the first of `amount`,
    /// `minAmountRequired`, `maxAmountRequired` that is present.
    pub fn cost(&self) -> Option<u64> {
        self.amount
            .or(self.min_amount_required)
            .or(self.max_amount_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_json() -> &'static str {
        r#"{"from":"A","to":"S","value":"1000","txid":"tx1","vout":0,"amount":2000}"#
    }

    #[test]
    fn test_amounts_accept_string_or_number() {
        let a: Authorization = serde_json::from_str(auth_json()).unwrap();
        assert_eq!(a.value, 1000);
        assert_eq!(a.amount, Some(2000));

        let b: Authorization =
            serde_json::from_str(r#"{"from":"A","to":"S","value":500,"txid":"*","vout":null}"#)
                .unwrap();
        assert_eq!(b.value, 500);
        assert_eq!(b.amount, None);
    }

    #[test]
    fn test_amounts_reject_garbage() {
        let bad = r#"{"from":"A","to":"S","value":"12.5","txid":"tx1","vout":0}"#;
        assert!(serde_json::from_str::<Authorization>(bad).is_err());
        let neg = r#"{"from":"A","to":"S","value":-3,"txid":"tx1","vout":0}"#;
        assert!(serde_json::from_str::<Authorization>(neg).is_err());
    }

    #[test]
    fn test_reference_specific_and_sentinel() {
        let a: Authorization = serde_json::from_str(auth_json()).unwrap();
        assert_eq!(
            a.reference().unwrap(),
            AuthorizationRef::Specific {
                txid: "tx1".to_string(),
                vout: 0
            }
        );

        let tab: Authorization =
            serde_json::from_str(r#"{"from":"A","to":"S","value":"1","txid":"*","vout":null}"#)
                .unwrap();
        assert_eq!(tab.reference().unwrap(), AuthorizationRef::AnyForAddress);
    }

    #[test]
    fn test_reference_specific_without_vout_is_malformed() {
        let a: Authorization =
            serde_json::from_str(r#"{"from":"A","to":"S","value":"1","txid":"tx1","vout":null}"#)
                .unwrap();
        assert_eq!(a.reference().unwrap_err(), InvalidReason::InvalidPayload);
    }

    #[test]
    fn test_signing_message_keeps_sentinel_and_order() {
        let tab: Authorization =
            serde_json::from_str(r#"{"from":"A","to":"S","value":"1000","txid":"*","vout":null}"#)
                .unwrap();
        assert_eq!(
            tab.signing_message().unwrap(),
            r#"{"from":"A","to":"S","value":"1000","txid":"*","vout":null}"#
        );
    }

    #[test]
    fn test_payload_v1_and_v2_parse() {
        let v1 = format!(
            r#"{{"scheme":"utxo","network":"bch","payload":{{"signature":"sig","authorization":{}}}}}"#,
            auth_json()
        );
        let p: PaymentPayload = serde_json::from_str(&v1).unwrap();
        assert_eq!(p.scheme(), "utxo");
        assert_eq!(p.network(), "bch");
        assert!(p.signed().authorization.is_some());

        let v2 = format!(
            r#"{{"accepted":{{"scheme":"utxo","network":"bch","extra":1}},"payload":{{"signature":"sig","authorization":{}}}}}"#,
            auth_json()
        );
        let p: PaymentPayload = serde_json::from_str(&v2).unwrap();
        assert!(matches!(p, PaymentPayload::V2 { .. }));
        assert_eq!(p.scheme(), "utxo");
    }

    #[test]
    fn test_payload_missing_signature_still_parses() {
        let v1 = format!(
            r#"{{"scheme":"utxo","network":"bch","payload":{{"authorization":{}}}}}"#,
            auth_json()
        );
        let p: PaymentPayload = serde_json::from_str(&v1).unwrap();
        assert!(p.signed().signature.is_none());
    }

    #[test]
    fn test_requirements_cost_precedence() {
        let r: PaymentRequirements = serde_json::from_str(
            r#"{"scheme":"utxo","network":"bch","payTo":"S","minAmountRequired":"700","maxAmountRequired":900}"#,
        )
        .unwrap();
        assert_eq!(r.cost(), Some(700));

        let r: PaymentRequirements = serde_json::from_str(
            r#"{"scheme":"utxo","network":"bch","payTo":"S","amount":100,"minAmountRequired":"700"}"#,
        )
        .unwrap();
        assert_eq!(r.cost(), Some(100));

        let r: PaymentRequirements =
            serde_json::from_str(r#"{"scheme":"utxo","network":"bch","payTo":"S"}"#).unwrap();
        assert_eq!(r.cost(), None);
    }
}
