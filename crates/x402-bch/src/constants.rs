/// CAIP-2 network identifier for the Bitcoin Cash main chain.
pub const CANONICAL_NET: &str = "bip122:000000000000000000651ef99cb9fcbe";

/// Legacy network tag still sent by older clients; treated as [`CANONICAL_NET`].
pub const LEGACY_NETWORK: &str = "bch";

/// x402 scheme name for UTXO-backed payments.
pub const SCHEME_NAME: &str = "utxo";

/// Protocol version advertised in supported kinds.
pub const PROTOCOL_VERSION: u32 = 2;

/// Signer namespace advertised for BIP-122 chains.
pub const SIGNER_NAMESPACE: &str = "bip122:*";

/// `txid` sentinel meaning "select any funded UTXO for this payer".
pub const ANY_UTXO_SENTINEL: &str = "*";

/// Default HTTP port for the facilitator server.
pub const DEFAULT_PORT: u16 = 4345;
