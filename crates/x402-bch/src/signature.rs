use std::future::Future;

use crate::error::FacilitatorError;

/// Message-signature verification seam.
///
/// The facilitator never does signature math itself; implementations
/// delegate to a node or library that understands the chain's signed-message
/// format. A `false` return and an error are both treated as "not authentic"
/// by the verification pipeline.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        address: &str,
        signature: &str,
        message: &str,
    ) -> impl Future<Output = Result<bool, FacilitatorError>> + Send;
}
