//! Purchase verification policy.

use async_trait::async_trait;
use iabhub_types::{Purchase, Status, VerificationResult};

/// Decides whether a completed purchase can be trusted.
///
/// Implementations may talk to a receipt-validation server but must not
/// touch engine state. The engine calls this after a provider reports a
/// successful purchase and before the response is posted.
#[async_trait]
pub trait PurchaseVerifier: Send + Sync {
    async fn verify(&self, purchase: &Purchase) -> VerificationResult;
}

/// Trusts every purchase. The zero-configuration default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

#[async_trait]
impl PurchaseVerifier for AcceptAllVerifier {
    async fn verify(&self, _purchase: &Purchase) -> VerificationResult {
        VerificationResult::Success
    }
}

/// Status a purchase response carries for a given verification outcome.
pub fn verification_status(result: VerificationResult) -> Status {
    match result {
        VerificationResult::Success => Status::Success,
        VerificationResult::Failed => Status::Unauthorized,
        VerificationResult::Error => Status::VerificationError,
    }
}
