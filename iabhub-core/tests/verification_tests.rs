use iabhub_core::{AcceptAllVerifier, PurchaseVerifier, verification_status};
use iabhub_types::{Purchase, SkuKind, Status, VerificationResult};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn accept_all_trusts_every_kind() {
    let verifier: Arc<dyn PurchaseVerifier> = Arc::new(AcceptAllVerifier);
    for kind in SkuKind::ALL {
        let purchase = Purchase::new("sku", kind).with_signature("forged");
        assert_eq!(verifier.verify(&purchase).await, VerificationResult::Success);
    }
}

#[tokio::test]
async fn accept_all_trusts_canceled_purchases() {
    let purchase = Purchase::new("sub", SkuKind::Subscription).canceled();
    assert!(AcceptAllVerifier.verify(&purchase).await.is_verified());
}

#[test]
fn verification_maps_to_distinct_statuses() {
    assert_eq!(verification_status(VerificationResult::Success), Status::Success);
    assert_eq!(verification_status(VerificationResult::Failed), Status::Unauthorized);
    assert_eq!(verification_status(VerificationResult::Error), Status::VerificationError);
}
