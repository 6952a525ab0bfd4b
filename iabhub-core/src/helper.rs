//! Host-facing helpers that tie bus subscriptions to a UI host's lifecycle.
//!
//! [`IabHelper`] follows an activity: it listens while created or resumed
//! and stops on pause or destroy. [`FragmentHelper`] follows a fragment
//! through a [`LifecycleObserver`] that reports attach and detach under its
//! own [`HostId`], so helpers on different fragments never react to each
//! other's lifecycle.
//!
//! Responses reach the [`BillingListener`] synchronously on the thread that
//! posted them. A purchase response for a request issued by another host is
//! not delivered.

use crate::bus::{EventBus, Subscription};
use crate::error::{IabError, IabResult};
use iabhub_types::{
    ActivityResultEvent, BillingEvent, ConsumeResponse, EventKind, HostId, InventoryResponse,
    LifecycleEvent, LifecycleKind, Purchase, PurchaseResponse, Request, RequestId, Response,
    SetupResponse, SkuDetails, SkuDetailsResponse, Status,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Receives billing outcomes. Every callback defaults to a no-op.
pub trait BillingListener: Send + Sync {
    fn on_setup(&self, _setup: &SetupResponse) {}

    fn on_purchase(&self, _response: &PurchaseResponse) {}

    fn on_consume(&self, _response: &ConsumeResponse) {}

    fn on_sku_details(&self, _response: &SkuDetailsResponse) {}

    fn on_inventory(&self, _response: &InventoryResponse) {}
}

/// Subscribes `listener` to responses and setup results on behalf of `host`.
fn subscribe_listener(
    bus: &EventBus,
    host: HostId,
    listener: Arc<dyn BillingListener>,
) -> Subscription {
    bus.subscribe(
        &[EventKind::Response, EventKind::Setup],
        Arc::new(move |event: &BillingEvent| deliver(listener.as_ref(), host, event)),
    )
}

fn deliver(listener: &dyn BillingListener, host: HostId, event: &BillingEvent) {
    match event {
        BillingEvent::Setup(setup) => listener.on_setup(setup),
        BillingEvent::Response(Response::Purchase(response)) => {
            if response.request.host.is_some_and(|origin| origin != host) {
                trace!("purchase response for another host, skipping");
                return;
            }
            listener.on_purchase(response);
        }
        BillingEvent::Response(Response::Consume(response)) => listener.on_consume(response),
        BillingEvent::Response(Response::SkuDetails(response)) => {
            listener.on_sku_details(response)
        }
        BillingEvent::Response(Response::Inventory(response)) => listener.on_inventory(response),
        _ => {}
    }
}

/// Posts `request`. With no billing worker listening it is answered
/// [`Status::ServiceUnavailable`] on the spot.
fn post_request(bus: &EventBus, request: Request) -> RequestId {
    let id = request.id();
    debug!("posting {} request {}", request.request_type(), id);
    if bus.post(request.clone()) == 0 {
        warn!("request {id} reached no billing worker");
        bus.post(Response::from_status(request, Status::ServiceUnavailable, None));
    }
    id
}

// ── Activity helper ──────────────────────────────────────────────

/// Billing helper bound to one activity-style host.
pub struct IabHelper {
    bus: EventBus,
    host: HostId,
    listener: Arc<dyn BillingListener>,
    subscription: Option<Subscription>,
}

impl IabHelper {
    pub fn new(bus: EventBus, listener: Arc<dyn BillingListener>) -> Self {
        Self {
            bus,
            host: HostId::new(),
            listener,
            subscription: None,
        }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn on_create(&mut self) {
        self.lifecycle(LifecycleKind::Create);
        self.subscribe();
    }

    pub fn on_resume(&mut self) {
        self.lifecycle(LifecycleKind::Resume);
        self.subscribe();
    }

    pub fn on_pause(&mut self) {
        self.unsubscribe();
        self.lifecycle(LifecycleKind::Pause);
    }

    pub fn on_destroy(&mut self) {
        self.unsubscribe();
        self.lifecycle(LifecycleKind::Destroy);
    }

    /// Forwards a UI result to the active provider before returning.
    pub fn on_activity_result(
        &self,
        request_code: i32,
        result_code: i32,
        data: Option<serde_json::Value>,
    ) {
        self.bus.post(ActivityResultEvent {
            host: self.host,
            request_code,
            result_code,
            data,
        });
    }

    pub fn purchase(&self, sku_details: SkuDetails) -> RequestId {
        post_request(&self.bus, Request::purchase(Some(self.host), sku_details))
    }

    pub fn consume(&self, purchase: Purchase) -> RequestId {
        post_request(&self.bus, Request::consume(purchase))
    }

    pub fn sku_details<I, S>(&self, skus: I) -> RequestId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        post_request(&self.bus, Request::sku_details(skus))
    }

    pub fn inventory(&self, start_over: bool) -> RequestId {
        post_request(&self.bus, Request::inventory(start_over))
    }

    fn subscribe(&mut self) {
        if self.subscription.is_none() {
            self.subscription = Some(subscribe_listener(
                &self.bus,
                self.host,
                self.listener.clone(),
            ));
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(&subscription);
        }
    }

    fn lifecycle(&self, kind: LifecycleKind) {
        self.bus.post(LifecycleEvent::new(self.host, kind));
    }
}

impl Drop for IabHelper {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ── Fragment helper ──────────────────────────────────────────────

/// Reports attach and detach of one fragment host on the bus.
#[derive(Debug, Clone)]
pub struct LifecycleObserver {
    host: HostId,
    bus: EventBus,
}

impl LifecycleObserver {
    pub fn new(bus: EventBus) -> Self {
        Self {
            host: HostId::new(),
            bus,
        }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn attach(&self) {
        self.bus.post(LifecycleEvent::new(self.host, LifecycleKind::Attach));
    }

    pub fn detach(&self) {
        self.bus.post(LifecycleEvent::new(self.host, LifecycleKind::Detach));
    }
}

#[derive(Default)]
struct FragmentState {
    responses: Option<Subscription>,
    lifecycle: Option<Subscription>,
}

/// Billing helper bound to a fragment through its [`LifecycleObserver`].
///
/// Attach subscribes the listener. Detach unsubscribes it and disposes the
/// lifecycle handler, so a detached helper stays detached.
pub struct FragmentHelper {
    bus: EventBus,
    observer: LifecycleObserver,
    state: Arc<Mutex<FragmentState>>,
}

impl FragmentHelper {
    pub fn new(bus: EventBus, listener: Arc<dyn BillingListener>) -> Self {
        let observer = LifecycleObserver::new(bus.clone());
        let state = Arc::new(Mutex::new(FragmentState::default()));

        let host = observer.host();
        let handler_bus = bus.clone();
        let handler_state = state.clone();
        let lifecycle = bus.subscribe(
            &[EventKind::Lifecycle],
            Arc::new(move |event: &BillingEvent| {
                let BillingEvent::Lifecycle(event) = event else {
                    return;
                };
                if event.host != host {
                    return;
                }
                let mut state = handler_state.lock().unwrap_or_else(PoisonError::into_inner);
                match event.kind {
                    LifecycleKind::Attach => {
                        if state.responses.is_none() {
                            debug!("fragment {host} attached");
                            state.responses =
                                Some(subscribe_listener(&handler_bus, host, listener.clone()));
                        }
                    }
                    LifecycleKind::Detach => {
                        debug!("fragment {host} detached");
                        if let Some(subscription) = state.responses.take() {
                            handler_bus.unsubscribe(&subscription);
                        }
                        if let Some(subscription) = state.lifecycle.take() {
                            handler_bus.unsubscribe(&subscription);
                        }
                    }
                    _ => {}
                }
            }),
        );
        state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lifecycle = Some(lifecycle);

        Self {
            bus,
            observer,
            state,
        }
    }

    pub fn observer(&self) -> &LifecycleObserver {
        &self.observer
    }

    pub fn host(&self) -> HostId {
        self.observer.host()
    }

    pub fn on_attach(&self) {
        self.observer.attach();
    }

    pub fn on_detach(&self) {
        self.observer.detach();
    }

    pub fn is_attached(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .responses
            .is_some()
    }

    /// Whether the lifecycle handler has been disposed by a detach.
    pub fn is_disposed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lifecycle
            .is_none()
    }

    /// Starts a purchase flow hosted by this fragment.
    ///
    /// Fails with [`IabError::IllegalState`] while the fragment is detached,
    /// since there is no host to run the flow on.
    pub fn purchase(&self, sku_details: SkuDetails) -> IabResult<RequestId> {
        if !self.is_attached() {
            return Err(IabError::illegal_state(format!(
                "purchase of {} on detached fragment {}",
                sku_details.sku,
                self.host()
            )));
        }
        Ok(post_request(
            &self.bus,
            Request::purchase(Some(self.host()), sku_details),
        ))
    }

    pub fn consume(&self, purchase: Purchase) -> RequestId {
        post_request(&self.bus, Request::consume(purchase))
    }

    pub fn sku_details<I, S>(&self, skus: I) -> RequestId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        post_request(&self.bus, Request::sku_details(skus))
    }

    pub fn inventory(&self, start_over: bool) -> RequestId {
        post_request(&self.bus, Request::inventory(start_over))
    }

    pub fn on_activity_result(
        &self,
        request_code: i32,
        result_code: i32,
        data: Option<serde_json::Value>,
    ) {
        self.bus.post(ActivityResultEvent {
            host: self.host(),
            request_code,
            result_code,
            data,
        });
    }
}

impl Drop for FragmentHelper {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for subscription in [state.responses.take(), state.lifecycle.take()]
            .into_iter()
            .flatten()
        {
            self.bus.unsubscribe(&subscription);
        }
    }
}
