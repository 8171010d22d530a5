//! Network identity resolution.
//!
//! The facilitator serves exactly one chain. Legacy and CAIP-2 tags that name
//! it collapse to [`CANONICAL_NET`]; every other tag passes through unchanged
//! and never matches.

use crate::constants::{CANONICAL_NET, LEGACY_NETWORK};

/// Map a network tag to its canonical form.
///
/// Empty input and the legacy `"bch"` tag resolve to [`CANONICAL_NET`].
/// Foreign tags (including other `bip122:*` chains) are returned unchanged.
pub fn canonicalize(net: &str) -> &str {
    if net.is_empty() || net == LEGACY_NETWORK || net == CANONICAL_NET {
        CANONICAL_NET
    } else {
        net
    }
}

/// True iff both tags resolve to the native chain.
///
/// Foreign networks never match, even when textually equal: this facilitator
/// settles on one chain only.
pub fn same_network(a: &str, b: &str) -> bool {
    canonicalize(a) == CANONICAL_NET && canonicalize(b) == CANONICAL_NET
}
