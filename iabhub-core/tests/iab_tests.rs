mod common;

use common::{FakeInspector, FakeProvider, FixedVerifier, RecordingListener, wait_until};
use iabhub_core::{Iab, IabConfig, IabError, MapSkuResolver};
use iabhub_types::{
    Purchase, RequestType, Response, SkuDetails, SkuKind, Status, VerificationResult,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

// ── Config ───────────────────────────────────────────────────────

#[test]
fn default_config() {
    let config = IabConfig::default();
    assert_eq!(config.request_timeout, None);
    assert!(config.verify_inventory);
}

// ── Start ────────────────────────────────────────────────────────

#[tokio::test]
async fn start_selects_first_installed_provider() {
    common::init_tracing();
    let mut iab = Iab::builder()
        .provider(Arc::new(FakeProvider::new("absent").with_package("com.absent")))
        .provider(Arc::new(
            FakeProvider::new("market")
                .with_package("com.market")
                .with_store_uri("market://details?id=com.app"),
        ))
        .inspector(Arc::new(FakeInspector::with(&["com.market"])))
        .build();
    assert!(!iab.is_started());

    let selected = iab.start().await.unwrap();

    assert_eq!(selected.unwrap().name, "market");
    assert!(iab.is_started());
    assert_eq!(iab.active_provider().unwrap().name, "market");
    assert_eq!(
        iab.store_page_uri().as_deref(),
        Some("market://details?id=com.app")
    );
    assert_eq!(iab.rate_it_uri(), None);
    iab.shutdown().await;
}

#[tokio::test]
async fn start_twice_is_illegal() {
    let mut iab = Iab::builder().build();
    iab.start().await.unwrap();

    let err = iab.start().await.unwrap_err();

    assert!(matches!(err, IabError::IllegalState(_)));
    iab.shutdown().await;
}

#[tokio::test]
async fn no_provider_answers_no_billing_provider() {
    let mut iab = Iab::builder().build();
    let listener = Arc::new(RecordingListener::default());
    let mut helper = iab.helper(listener.clone());
    helper.on_create();

    assert!(iab.start().await.unwrap().is_none());
    assert_eq!(listener.setups()[0].status, Status::NoBillingProvider);
    assert_eq!(iab.store_page_uri(), None);

    helper.inventory(true);
    wait_until(|| listener.responses().len() == 1).await;
    assert_eq!(listener.responses()[0].status(), &Status::NoBillingProvider);
    iab.shutdown().await;
}

#[tokio::test]
async fn requests_posted_before_start_are_queued() {
    let provider = Arc::new(FakeProvider::new("market").with_package("com.market"));
    let mut iab = Iab::builder()
        .provider(provider.clone())
        .inspector(Arc::new(FakeInspector::with(&["com.market"])))
        .build();
    let listener = Arc::new(RecordingListener::default());
    let mut helper = iab.helper(listener.clone());
    helper.on_create();

    let id = helper.sku_details(["a"]);
    assert!(listener.responses().is_empty());

    iab.start().await.unwrap();

    wait_until(|| listener.responses().len() == 1).await;
    let response = &listener.responses()[0];
    assert_eq!(response.request_id(), id);
    assert_eq!(response.request_type(), RequestType::SkuDetails);
    assert_eq!(provider.calls(), vec![common::Call::SkuDetails(vec!["a".into()])]);
    iab.shutdown().await;
}

#[tokio::test]
async fn requests_after_shutdown_are_answered_unavailable() {
    let mut iab = Iab::builder().build();
    iab.start().await.unwrap();
    iab.shutdown().await;

    let listener = Arc::new(RecordingListener::default());
    let mut helper = iab.helper(listener.clone());
    helper.on_create();
    let id = helper.inventory(false);

    let responses = listener.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].request_id(), id);
    assert_eq!(responses[0].status(), &Status::ServiceUnavailable);
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn purchase_and_consume_through_helper() {
    let provider = Arc::new(FakeProvider::new("market").with_package("com.market"));
    let resolver = MapSkuResolver::from_pairs([("gold_100", "com.app.gold100")]).unwrap();
    let mut iab = Iab::builder()
        .provider_with(
            provider.clone(),
            Arc::new(FixedVerifier::new(VerificationResult::Success)),
            Arc::new(resolver),
        )
        .inspector(Arc::new(FakeInspector::with(&["com.market"])))
        .build();
    iab.start().await.unwrap();

    let listener = Arc::new(RecordingListener::default());
    let mut helper = iab.helper(listener.clone());
    helper.on_create();

    helper.purchase(SkuDetails::new("gold_100", SkuKind::Consumable));
    wait_until(|| listener.responses().len() == 1).await;
    let purchase = match &listener.responses()[0] {
        Response::Purchase(r) => {
            assert_eq!(r.status, Status::Success);
            r.purchase.clone().unwrap()
        }
        other => panic!("Expected Purchase, got {other:?}"),
    };
    assert_eq!(purchase.sku, "gold_100");

    helper.consume(purchase);
    wait_until(|| listener.responses().len() == 2).await;
    let consumed = &listener.responses()[1];
    assert_eq!(consumed.request_type(), RequestType::Consume);
    assert!(consumed.is_successful());

    assert_eq!(
        provider.calls(),
        vec![
            common::Call::Purchase("com.app.gold100".into(), SkuKind::Consumable),
            common::Call::Consume("com.app.gold100".into()),
        ]
    );
    iab.shutdown().await;
}

#[tokio::test]
async fn configured_timeout_applies_to_requests() {
    let mut iab = Iab::builder()
        .provider(Arc::new(
            FakeProvider::new("market")
                .with_package("com.market")
                .hanging(),
        ))
        .inspector(Arc::new(FakeInspector::with(&["com.market"])))
        .config(IabConfig {
            request_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        })
        .build();
    iab.start().await.unwrap();
    let listener = Arc::new(RecordingListener::default());
    let fragment = iab.fragment_helper(listener.clone());
    fragment.on_attach();

    fragment
        .purchase(SkuDetails::new("gold", SkuKind::Consumable))
        .unwrap();

    wait_until(|| listener.responses().len() == 1).await;
    assert_eq!(listener.responses()[0].status(), &Status::Timeout);
    iab.shutdown().await;
}

#[tokio::test]
async fn inventory_verification_follows_config() {
    let verifier = Arc::new(FixedVerifier::new(VerificationResult::Success));
    let mut iab = Iab::builder()
        .provider_with(
            Arc::new(
                FakeProvider::new("market")
                    .with_package("com.market")
                    .with_inventory(vec![Purchase::new("gold", SkuKind::Consumable)], false),
            ),
            verifier.clone(),
            Arc::new(MapSkuResolver::new()),
        )
        .inspector(Arc::new(FakeInspector::with(&["com.market"])))
        .config(IabConfig {
            verify_inventory: false,
            ..Default::default()
        })
        .build();
    iab.start().await.unwrap();
    let listener = Arc::new(RecordingListener::default());
    let mut helper = iab.helper(listener.clone());
    helper.on_resume();

    helper.inventory(true);

    wait_until(|| listener.responses().len() == 1).await;
    assert!(listener.responses()[0].is_successful());
    assert!(verifier.seen().is_empty());
    iab.shutdown().await;
}

#[tokio::test]
async fn shutdown_before_start_is_harmless() {
    let mut iab = Iab::builder().build();
    iab.shutdown().await;
    assert!(!iab.is_started());
    assert_eq!(iab.bus().subscriber_count(), 0);
}
