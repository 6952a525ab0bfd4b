//! Shared fakes for billing core tests.

#![allow(dead_code)]

use async_trait::async_trait;
use iabhub_core::{
    BillingListener, BillingProvider, EventStream, PackageInspector, ProviderFailure,
    ProviderResult, PurchaseVerifier,
};
use iabhub_types::{
    ActivityResultEvent, BillingEvent, ConsumeResponse, Inventory, InventoryResponse,
    ProviderInfo, Purchase, PurchaseRequest, PurchaseResponse, Response, SetupResponse,
    SkuDetails, SkuDetailsResponse, SkuKind, SkusDetails, VerificationResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

pub const RESULT_OK: i32 = -1;
pub const RESULT_CANCELED: i32 = 0;

/// Installs a test log subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Fake provider ────────────────────────────────────────────────

/// One call the fake provider received.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Purchase(String, SkuKind),
    Consume(String),
    SkuDetails(Vec<String>),
    Inventory(bool),
}

#[derive(Debug, Clone, Default)]
enum PurchaseMode {
    #[default]
    Succeed,
    Fail(ProviderFailure),
    /// Waits for an activity result before resolving.
    Gated,
    Hang,
    Panic,
}

/// Scriptable in-memory billing provider.
pub struct FakeProvider {
    info: ProviderInfo,
    kinds: Vec<SkuKind>,
    purchase_mode: PurchaseMode,
    consume_failure: Option<ProviderFailure>,
    details_failure: Option<ProviderFailure>,
    details: HashMap<String, SkuDetails>,
    batch_size: Option<usize>,
    inventory: Vec<Purchase>,
    has_more: bool,
    store_uri: Option<String>,
    calls: Mutex<Vec<Call>>,
    activity_results: Mutex<Vec<ActivityResultEvent>>,
    gate: Mutex<Option<oneshot::Sender<bool>>>,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            info: ProviderInfo::new(name),
            kinds: SkuKind::ALL.to_vec(),
            purchase_mode: PurchaseMode::Succeed,
            consume_failure: None,
            details_failure: None,
            details: HashMap::new(),
            batch_size: None,
            inventory: Vec::new(),
            has_more: false,
            store_uri: None,
            calls: Mutex::new(Vec::new()),
            activity_results: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.info = self.info.with_package(package);
        self
    }

    pub fn with_kinds(mut self, kinds: &[SkuKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn failing_purchase(mut self, failure: ProviderFailure) -> Self {
        self.purchase_mode = PurchaseMode::Fail(failure);
        self
    }

    /// Purchases resolve only once an activity result arrives.
    pub fn gated(mut self) -> Self {
        self.purchase_mode = PurchaseMode::Gated;
        self
    }

    /// Purchases never resolve.
    pub fn hanging(mut self) -> Self {
        self.purchase_mode = PurchaseMode::Hang;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.purchase_mode = PurchaseMode::Panic;
        self
    }

    pub fn failing_consume(mut self, failure: ProviderFailure) -> Self {
        self.consume_failure = Some(failure);
        self
    }

    pub fn failing_sku_details(mut self, failure: ProviderFailure) -> Self {
        self.details_failure = Some(failure);
        self
    }

    /// Details the provider knows, keyed by their (provider) sku.
    pub fn with_details(mut self, details: impl IntoIterator<Item = SkuDetails>) -> Self {
        self.details = details.into_iter().map(|d| (d.sku.clone(), d)).collect();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn with_inventory(mut self, purchases: Vec<Purchase>, has_more: bool) -> Self {
        self.inventory = purchases;
        self.has_more = has_more;
        self
    }

    pub fn with_store_uri(mut self, uri: &str) -> Self {
        self.store_uri = Some(uri.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn activity_results(&self) -> Vec<ActivityResultEvent> {
        self.activity_results.lock().unwrap().clone()
    }

    /// Waits until the provider has received at least `n` calls.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("provider was not called in time");
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn purchase_of(&self, request: &PurchaseRequest) -> Purchase {
        let sku = &request.sku_details.sku;
        Purchase::new(sku.clone(), request.sku_details.kind)
            .with_token(format!("token-{sku}"))
            .with_provider(self.info.name.clone())
    }
}

#[async_trait]
impl BillingProvider for FakeProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    fn purchase_kinds(&self) -> &[SkuKind] {
        &self.kinds
    }

    async fn purchase(&self, request: &PurchaseRequest) -> ProviderResult<Purchase> {
        let call = Call::Purchase(request.sku_details.sku.clone(), request.sku_details.kind);
        match &self.purchase_mode {
            PurchaseMode::Succeed => {
                self.record(call);
                Ok(self.purchase_of(request))
            }
            PurchaseMode::Fail(failure) => {
                self.record(call);
                Err(failure.clone())
            }
            PurchaseMode::Gated => {
                let (tx, rx) = oneshot::channel();
                *self.gate.lock().unwrap() = Some(tx);
                self.record(call);
                match rx.await {
                    Ok(true) => Ok(self.purchase_of(request)),
                    Ok(false) => Err(ProviderFailure::UserCanceled),
                    Err(_) => Err(ProviderFailure::other("purchase flow abandoned")),
                }
            }
            PurchaseMode::Hang => {
                self.record(call);
                std::future::pending().await
            }
            PurchaseMode::Panic => {
                self.record(call);
                panic!("vendor sdk crashed");
            }
        }
    }

    async fn consume(&self, purchase: &Purchase) -> ProviderResult<Purchase> {
        self.record(Call::Consume(purchase.sku.clone()));
        match &self.consume_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(purchase.clone()),
        }
    }

    async fn sku_details(&self, skus: &[String]) -> ProviderResult<SkusDetails> {
        self.record(Call::SkuDetails(skus.to_vec()));
        if let Some(failure) = &self.details_failure {
            return Err(failure.clone());
        }
        let mut found = SkusDetails::new();
        for sku in skus {
            match self.details.get(sku) {
                Some(details) => found.insert(details.clone()),
                None => found.mark_unavailable(sku.clone()),
            }
        }
        Ok(found)
    }

    async fn inventory(&self, start_over: bool) -> ProviderResult<Inventory> {
        self.record(Call::Inventory(start_over));
        Ok(Inventory::from_purchases(self.inventory.clone(), self.has_more))
    }

    fn sku_details_batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    fn store_page_uri(&self) -> Option<String> {
        self.store_uri.clone()
    }

    fn on_activity_result(&self, event: &ActivityResultEvent) {
        self.activity_results.lock().unwrap().push(event.clone());
        if let Some(gate) = self.gate.lock().unwrap().take() {
            let _ = gate.send(event.result_code == RESULT_OK);
        }
    }
}

// ── Policies ─────────────────────────────────────────────────────

/// Reports a fixed package set as installed.
#[derive(Debug, Default)]
pub struct FakeInspector {
    installed: HashSet<String>,
}

impl FakeInspector {
    pub fn with(packages: &[&str]) -> Self {
        Self {
            installed: packages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl PackageInspector for FakeInspector {
    fn is_installed(&self, package_name: &str) -> bool {
        self.installed.contains(package_name)
    }
}

/// Verifier that returns the same verdict for every purchase and remembers
/// which skus it saw.
pub struct FixedVerifier {
    verdict: VerificationResult,
    seen: Mutex<Vec<String>>,
}

impl FixedVerifier {
    pub fn new(verdict: VerificationResult) -> Self {
        Self {
            verdict,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PurchaseVerifier for FixedVerifier {
    async fn verify(&self, purchase: &Purchase) -> VerificationResult {
        self.seen.lock().unwrap().push(purchase.sku.clone());
        self.verdict
    }
}

// ── Listener ─────────────────────────────────────────────────────

/// Listener that records every callback.
#[derive(Default)]
pub struct RecordingListener {
    setups: Mutex<Vec<SetupResponse>>,
    responses: Mutex<Vec<Response>>,
}

impl RecordingListener {
    pub fn setups(&self) -> Vec<SetupResponse> {
        self.setups.lock().unwrap().clone()
    }

    pub fn responses(&self) -> Vec<Response> {
        self.responses.lock().unwrap().clone()
    }

    fn push(&self, response: Response) {
        self.responses.lock().unwrap().push(response);
    }
}

impl BillingListener for RecordingListener {
    fn on_setup(&self, setup: &SetupResponse) {
        self.setups.lock().unwrap().push(setup.clone());
    }

    fn on_purchase(&self, response: &PurchaseResponse) {
        self.push(Response::Purchase(response.clone()));
    }

    fn on_consume(&self, response: &ConsumeResponse) {
        self.push(Response::Consume(response.clone()));
    }

    fn on_sku_details(&self, response: &SkuDetailsResponse) {
        self.push(Response::SkuDetails(response.clone()));
    }

    fn on_inventory(&self, response: &InventoryResponse) {
        self.push(Response::Inventory(response.clone()));
    }
}

// ── Bus helpers ──────────────────────────────────────────────────

/// Next response on a stream subscribed to responses. Panics after 5s.
pub async fn next_response(stream: &mut EventStream) -> Response {
    let event = tokio::time::timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("no response within 5s")
        .expect("stream closed");
    match event {
        BillingEvent::Response(response) => response,
        other => panic!("Expected Response, got {other:?}"),
    }
}

/// Polls `condition` until it holds. Panics after 5s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}
