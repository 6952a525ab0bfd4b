//! Provider engine: single-pending-request state machine over one provider.
//!
//! The engine owns no tasks. [`ProviderEngine::handle_request`] either
//! answers a request on the spot or hands back a [`ProviderCall`] for the
//! caller to drive; the call's [`Completion`] is fed back through
//! [`ProviderEngine::complete`]. The billing worker is the only caller in
//! production, which keeps every write to the pending request on one
//! serialized context.

use crate::bus::{EventBus, Subscription};
use crate::error::{IabError, IabResult};
use crate::provider::{BillingProvider, PackageInspector, ProviderFailure};
use crate::sku::{IdentityResolver, SkuResolver, to_canonical_or_same, to_provider_or_same};
use crate::verification::{AcceptAllVerifier, PurchaseVerifier, verification_status};
use futures::FutureExt;
use futures::future::BoxFuture;
use iabhub_types::{
    BillingEvent, ConsumeResponse, EventKind, Inventory, InventoryResponse, ProviderInfo,
    Purchase, PurchaseRequest, PurchaseResponse, Request, RequestId, RequestType, Response,
    SkuDetailsResponse, SkuKind, SkusDetails, Status,
};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Payload a response can carry. Must match the pending request's type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    None,
    Purchase(Purchase),
    Consumed(Purchase),
    SkusDetails(SkusDetails),
    Inventory(Inventory),
}

impl ResponsePayload {
    fn fits(&self, request_type: RequestType) -> bool {
        match self {
            Self::None => true,
            Self::Purchase(_) => request_type == RequestType::Purchase,
            Self::Consumed(_) => request_type == RequestType::Consume,
            Self::SkusDetails(_) => request_type == RequestType::SkuDetails,
            Self::Inventory(_) => request_type == RequestType::Inventory,
        }
    }
}

/// Future behind a [`ProviderCall`].
pub type CallFuture = BoxFuture<'static, (Status, ResponsePayload)>;

/// Final outcome of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub request_id: RequestId,
    pub status: Status,
    pub payload: ResponsePayload,
}

impl Completion {
    /// A completion carrying only a status.
    pub fn status(request_id: RequestId, status: Status) -> Self {
        Self {
            request_id,
            status,
            payload: ResponsePayload::None,
        }
    }
}

/// A provider operation started by the engine. Resolves exactly once.
pub struct ProviderCall {
    request_id: RequestId,
    future: CallFuture,
}

impl ProviderCall {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Drives the provider operation to its completion.
    pub async fn run(self) -> Completion {
        let (status, payload) = self.future.await;
        Completion {
            request_id: self.request_id,
            status,
            payload,
        }
    }

    /// Splits the call into its id and the raw future.
    pub fn into_parts(self) -> (RequestId, CallFuture) {
        (self.request_id, self.future)
    }
}

impl fmt::Debug for ProviderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCall")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

/// What happened to a request handed to the engine.
#[derive(Debug)]
pub enum Admission {
    /// The request is pending; drive the call and feed its completion back.
    Dispatched(ProviderCall),
    /// The request was answered immediately and this response was posted.
    Answered(Response),
}

/// Engine over one billing provider.
///
/// Two engines are equal iff their providers have the same
/// [`ProviderInfo`].
pub struct ProviderEngine {
    provider: Arc<dyn BillingProvider>,
    verifier: Arc<dyn PurchaseVerifier>,
    resolver: Arc<dyn SkuResolver>,
    bus: EventBus,
    /// The single in-flight request.
    pending: Option<Request>,
    verify_inventory: bool,
    activity_results: Option<Subscription>,
}

impl ProviderEngine {
    /// Creates an engine with the accept-all verifier and identity resolver.
    pub fn new(provider: Arc<dyn BillingProvider>, bus: EventBus) -> Self {
        Self::with_policies(
            provider,
            Arc::new(AcceptAllVerifier),
            Arc::new(IdentityResolver),
            bus,
        )
    }

    /// Creates an engine with a custom verifier and sku resolver.
    pub fn with_policies(
        provider: Arc<dyn BillingProvider>,
        verifier: Arc<dyn PurchaseVerifier>,
        resolver: Arc<dyn SkuResolver>,
        bus: EventBus,
    ) -> Self {
        Self {
            provider,
            verifier,
            resolver,
            bus,
            pending: None,
            verify_inventory: true,
            activity_results: None,
        }
    }

    /// Whether inventory purchases are run through the verifier.
    pub fn set_verify_inventory(&mut self, verify: bool) {
        self.verify_inventory = verify;
    }

    /// Starts forwarding activity results from the bus to the provider.
    /// They are delivered synchronously on the posting thread.
    pub fn attach(&mut self) {
        if self.activity_results.is_some() {
            return;
        }
        let provider = self.provider.clone();
        let subscription = self.bus.subscribe(
            &[EventKind::ActivityResult],
            Arc::new(move |event: &BillingEvent| {
                if let BillingEvent::ActivityResult(result) = event {
                    provider.on_activity_result(result);
                }
            }),
        );
        self.activity_results = Some(subscription);
    }

    /// Stops forwarding activity results.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.activity_results.take() {
            self.bus.unsubscribe(&subscription);
        }
    }

    pub fn provider(&self) -> &Arc<dyn BillingProvider> {
        &self.provider
    }

    pub fn provider_info(&self) -> &ProviderInfo {
        self.provider.info()
    }

    /// The request currently being serviced, if any.
    pub fn pending(&self) -> Option<&Request> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// See [`BillingProvider::is_available`].
    pub fn is_available(&self, inspector: &dyn PackageInspector) -> IabResult<bool> {
        self.provider.is_available(inspector)
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Accepts a request.
    ///
    /// While another request is pending the new one is rejected with a
    /// [`Status::Busy`] response and the pending request is left alone.
    /// Otherwise the request becomes pending and is dispatched to exactly
    /// one provider operation.
    pub fn handle_request(&mut self, request: Request) -> Admission {
        if let Some(pending) = &self.pending {
            warn!(
                "rejecting {} request {}: {} request {} still pending on {}",
                request.request_type(),
                request.id(),
                pending.request_type(),
                pending.id(),
                self.provider_info()
            );
            let response =
                Response::from_status(request, Status::Busy, Some(self.provider_info().clone()));
            self.bus.post(response.clone());
            return Admission::Answered(response);
        }

        if let Some(status) = self.refusal(&request) {
            debug!(
                "refusing {} request {} on {}: {}",
                request.request_type(),
                request.id(),
                self.provider_info(),
                status
            );
            return Admission::Answered(self.respond(request, status, ResponsePayload::None));
        }

        let request_id = request.id();
        debug!(
            "accepted {} request {} on {}",
            request.request_type(),
            request_id,
            self.provider_info()
        );
        let future = match &request {
            Request::Consume(r) => self.consume_call(&r.purchase),
            Request::Purchase(r) => {
                let mut translated = r.clone();
                translated.sku_details.sku =
                    to_provider_or_same(self.resolver.as_ref(), &r.sku_details.sku);
                self.purchase_call(translated)
            }
            Request::SkuDetails(r) => self.sku_details_call(&r.skus),
            Request::Inventory(r) => self.inventory_call(r.start_over),
        };
        self.pending = Some(request);
        Admission::Dispatched(ProviderCall { request_id, future })
    }

    /// Status for a request that cannot be dispatched to the provider at all.
    fn refusal(&self, request: &Request) -> Option<Status> {
        match request {
            Request::Purchase(r) if !self.supports(r.sku_details.kind) => Some(Status::failed(
                format!("purchase kind {} not supported", r.sku_details.kind),
            )),
            Request::Consume(r) if r.purchase.kind != SkuKind::Consumable => Some(Status::failed(
                format!("cannot consume {} purchase", r.purchase.kind),
            )),
            _ => None,
        }
    }

    fn supports(&self, kind: SkuKind) -> bool {
        self.provider.purchase_kinds().contains(&kind)
    }

    fn purchase_call(&self, request: PurchaseRequest) -> CallFuture {
        let provider = self.provider.clone();
        let verifier = self.verifier.clone();
        let resolver = self.resolver.clone();
        async move {
            match provider.purchase(&request).await {
                Ok(mut purchase) => {
                    let verification = verifier.verify(&purchase).await;
                    purchase.sku = to_canonical_or_same(resolver.as_ref(), &purchase.sku);
                    let status = verification_status(verification);
                    if !status.is_successful() {
                        warn!("purchase of {} failed verification: {}", purchase.sku, status);
                    }
                    (status, ResponsePayload::Purchase(purchase))
                }
                Err(failure) => failed("purchase", failure),
            }
        }
        .boxed()
    }

    fn consume_call(&self, purchase: &Purchase) -> CallFuture {
        let provider = self.provider.clone();
        let resolver = self.resolver.clone();
        let mut translated = purchase.clone();
        translated.sku = to_provider_or_same(self.resolver.as_ref(), &purchase.sku);
        async move {
            match provider.consume(&translated).await {
                Ok(mut consumed) => {
                    consumed.sku = to_canonical_or_same(resolver.as_ref(), &consumed.sku);
                    (Status::Success, ResponsePayload::Consumed(consumed))
                }
                Err(failure) => failed("consume", failure),
            }
        }
        .boxed()
    }

    fn sku_details_call(&self, skus: &[String]) -> CallFuture {
        let provider = self.provider.clone();
        let resolver = self.resolver.clone();
        let translated: Vec<String> = skus
            .iter()
            .map(|sku| to_provider_or_same(self.resolver.as_ref(), sku))
            .collect();
        let batch_size = provider
            .sku_details_batch_size()
            .filter(|n| *n > 0)
            .unwrap_or(translated.len().max(1));
        async move {
            let mut merged = SkusDetails::new();
            for batch in translated.chunks(batch_size) {
                match provider.sku_details(batch).await {
                    Ok(details) => merged.merge(details),
                    Err(failure) => return failed("sku details", failure),
                }
            }
            let canonical = canonical_skus_details(resolver.as_ref(), merged);
            (Status::Success, ResponsePayload::SkusDetails(canonical))
        }
        .boxed()
    }

    fn inventory_call(&self, start_over: bool) -> CallFuture {
        let provider = self.provider.clone();
        let verifier = self.verifier.clone();
        let resolver = self.resolver.clone();
        let verify = self.verify_inventory;
        async move {
            match provider.inventory(start_over).await {
                Ok(mut inventory) => {
                    for item in &mut inventory.items {
                        if verify {
                            item.verification = verifier.verify(&item.purchase).await;
                        }
                        item.purchase.sku =
                            to_canonical_or_same(resolver.as_ref(), &item.purchase.sku);
                    }
                    (Status::Success, ResponsePayload::Inventory(inventory))
                }
                Err(failure) => failed("inventory", failure),
            }
        }
        .boxed()
    }

    // ── Responses ────────────────────────────────────────────────

    /// Feeds a provider call's completion back into the engine.
    ///
    /// Fails with [`IabError::IllegalState`] if the completion is not for
    /// the pending request.
    pub fn complete(&mut self, completion: Completion) -> IabResult<Response> {
        match &self.pending {
            Some(pending) if pending.id() == completion.request_id => {
                self.post_response(completion.status, completion.payload)
            }
            Some(pending) => {
                let msg = format!(
                    "completion for request {} while request {} is pending",
                    completion.request_id,
                    pending.id()
                );
                error!("{msg}");
                Err(IabError::IllegalState(msg))
            }
            None => {
                error!(
                    "completion for request {} with no pending request",
                    completion.request_id
                );
                Err(IabError::NoPendingRequest)
            }
        }
    }

    /// Builds the response for the pending request, publishes it on the bus
    /// and clears the pending request.
    ///
    /// Posting with nothing pending, or with a payload that does not fit the
    /// pending request's type, is an error and leaves the state unchanged.
    pub fn post_response(
        &mut self,
        status: Status,
        payload: ResponsePayload,
    ) -> IabResult<Response> {
        let Some(pending) = self.pending.take() else {
            error!("post_response({status}) with no pending request");
            return Err(IabError::NoPendingRequest);
        };
        if !payload.fits(pending.request_type()) {
            let msg = format!(
                "payload {:?} does not fit pending {} request {}",
                payload_name(&payload),
                pending.request_type(),
                pending.id()
            );
            error!("{msg}");
            self.pending = Some(pending);
            return Err(IabError::IllegalState(msg));
        }

        Ok(self.respond(pending, status, payload))
    }

    /// Builds the response shaped like `request` and publishes it.
    fn respond(&self, request: Request, status: Status, payload: ResponsePayload) -> Response {
        let provider = Some(self.provider_info().clone());
        let response = match (request, payload) {
            (Request::Purchase(request), ResponsePayload::Purchase(purchase)) => {
                Response::Purchase(PurchaseResponse {
                    request,
                    status,
                    provider,
                    purchase: Some(purchase),
                })
            }
            (Request::Consume(request), ResponsePayload::Consumed(purchase)) => {
                Response::Consume(ConsumeResponse {
                    request,
                    status,
                    provider,
                    purchase: Some(purchase),
                })
            }
            (Request::SkuDetails(request), ResponsePayload::SkusDetails(details)) => {
                Response::SkuDetails(SkuDetailsResponse {
                    request,
                    status,
                    provider,
                    skus_details: Some(details),
                })
            }
            (Request::Inventory(request), ResponsePayload::Inventory(inventory)) => {
                Response::Inventory(InventoryResponse {
                    request,
                    status,
                    provider,
                    inventory: Some(inventory),
                })
            }
            (request, _) => Response::from_status(request, status, provider),
        };

        info!(
            "{} request {} finished on {}: {}",
            response.request_type(),
            response.request_id(),
            self.provider_info(),
            response.status()
        );
        self.bus.post(response.clone());
        response
    }
}

impl Drop for ProviderEngine {
    fn drop(&mut self) {
        self.detach();
    }
}

impl PartialEq for ProviderEngine {
    fn eq(&self, other: &Self) -> bool {
        self.provider_info() == other.provider_info()
    }
}

impl Eq for ProviderEngine {}

impl Hash for ProviderEngine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider_info().hash(state);
    }
}

impl fmt::Debug for ProviderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEngine")
            .field("provider", self.provider_info())
            .field("pending", &self.pending.as_ref().map(Request::id))
            .finish_non_exhaustive()
    }
}

fn failed(operation: &str, failure: ProviderFailure) -> (Status, ResponsePayload) {
    warn!("provider {operation} failed: {failure}");
    (failure.into(), ResponsePayload::None)
}

fn payload_name(payload: &ResponsePayload) -> &'static str {
    match payload {
        ResponsePayload::None => "none",
        ResponsePayload::Purchase(_) => "purchase",
        ResponsePayload::Consumed(_) => "consumed",
        ResponsePayload::SkusDetails(_) => "skus_details",
        ResponsePayload::Inventory(_) => "inventory",
    }
}

/// Rewrites provider sku ids in a details result back to canonical ids.
fn canonical_skus_details(resolver: &dyn SkuResolver, details: SkusDetails) -> SkusDetails {
    let mut canonical = SkusDetails::new();
    for (_, mut item) in details.details {
        item.sku = to_canonical_or_same(resolver, &item.sku);
        canonical.insert(item);
    }
    canonical.unavailable = details
        .unavailable
        .iter()
        .map(|sku| to_canonical_or_same(resolver, sku))
        .collect();
    canonical
}
