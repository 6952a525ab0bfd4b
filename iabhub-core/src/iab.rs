//! Entry point that wires providers, the bus and the billing worker.

use crate::bus::{EventBus, EventStream, Subscription};
use crate::error::{IabError, IabResult};
use crate::helper::{BillingListener, FragmentHelper, IabHelper};
use crate::provider::{BillingProvider, NoPackages, PackageInspector};
use crate::selection::{ProviderEntry, ProviderSelector};
use crate::sku::SkuResolver;
use crate::verification::PurchaseVerifier;
use crate::worker::{BillingWorker, WorkerHandle};
use iabhub_types::{EventKind, ProviderInfo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for an [`Iab`] instance.
#[derive(Debug, Clone)]
pub struct IabConfig {
    /// Answer a provider call with a timeout status if it has not resolved
    /// in this long. Unset means wait forever.
    pub request_timeout: Option<Duration>,
    /// Run inventory purchases through the verifier.
    pub verify_inventory: bool,
}

impl Default for IabConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            verify_inventory: true,
        }
    }
}

/// Builder for [`Iab`].
pub struct IabBuilder {
    selector: ProviderSelector,
    config: IabConfig,
    inspector: Arc<dyn PackageInspector>,
}

impl IabBuilder {
    /// Registers a provider with the default verifier and resolver.
    pub fn provider(self, provider: Arc<dyn BillingProvider>) -> Self {
        self.entry(ProviderEntry::new(provider))
    }

    /// Registers a provider with its own verifier and sku resolver.
    pub fn provider_with(
        self,
        provider: Arc<dyn BillingProvider>,
        verifier: Arc<dyn PurchaseVerifier>,
        resolver: Arc<dyn SkuResolver>,
    ) -> Self {
        self.entry(
            ProviderEntry::new(provider)
                .with_verifier(verifier)
                .with_resolver(resolver),
        )
    }

    pub fn entry(mut self, entry: ProviderEntry) -> Self {
        self.selector.add(entry);
        self
    }

    pub fn config(mut self, config: IabConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the installed-package check used for provider selection.
    pub fn inspector(mut self, inspector: Arc<dyn PackageInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Creates the session. Requests posted from here on queue until
    /// [`Iab::start`] hands them to the worker.
    pub fn build(self) -> Iab {
        let bus = EventBus::new();
        let requests = bus.subscribe_stream(&[EventKind::Request]);
        Iab {
            bus,
            config: self.config,
            inspector: self.inspector,
            selector: Some(self.selector),
            requests: Some(requests),
            provider: None,
            worker: None,
        }
    }
}

/// A billing session: one bus, one selected provider, one worker.
pub struct Iab {
    bus: EventBus,
    config: IabConfig,
    inspector: Arc<dyn PackageInspector>,
    selector: Option<ProviderSelector>,
    requests: Option<(Subscription, EventStream)>,
    provider: Option<Arc<dyn BillingProvider>>,
    worker: Option<WorkerHandle>,
}

impl Iab {
    pub fn builder() -> IabBuilder {
        IabBuilder {
            selector: ProviderSelector::new(),
            config: IabConfig::default(),
            inspector: Arc::new(NoPackages),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &IabConfig {
        &self.config
    }

    /// Selects a provider and starts the billing worker.
    ///
    /// Returns the selected provider, or `None` if no candidate is
    /// available; requests are then answered with
    /// [`Status::NoBillingProvider`](iabhub_types::Status::NoBillingProvider).
    /// Must be called from within a tokio runtime, once.
    pub async fn start(&mut self) -> IabResult<Option<ProviderInfo>> {
        let (Some(selector), Some(requests)) = (self.selector.take(), self.requests.take()) else {
            return Err(IabError::illegal_state("billing already started or shut down"));
        };

        let mut engine = selector.select(self.inspector.as_ref(), &self.bus);
        if let Some(engine) = engine.as_mut() {
            engine.set_verify_inventory(self.config.verify_inventory);
        }
        self.provider = engine.as_ref().map(|e| e.provider().clone());

        let worker = BillingWorker::with_requests(engine, self.bus.clone(), requests)
            .with_request_timeout(self.config.request_timeout);
        self.worker = Some(worker.spawn());

        let selected = self.active_provider().cloned();
        match &selected {
            Some(provider) => info!("billing started on {provider}"),
            None => info!("billing started without a provider"),
        }
        Ok(selected)
    }

    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    /// The provider chosen by [`start`](Self::start).
    pub fn active_provider(&self) -> Option<&ProviderInfo> {
        self.provider.as_ref().map(|p| p.info())
    }

    /// A helper for an activity-style host.
    pub fn helper(&self, listener: Arc<dyn BillingListener>) -> IabHelper {
        IabHelper::new(self.bus.clone(), listener)
    }

    /// A helper for a fragment-style host.
    pub fn fragment_helper(&self, listener: Arc<dyn BillingListener>) -> FragmentHelper {
        FragmentHelper::new(self.bus.clone(), listener)
    }

    pub fn store_page_uri(&self) -> Option<String> {
        self.provider.as_ref().and_then(|p| p.store_page_uri())
    }

    pub fn rate_it_uri(&self) -> Option<String> {
        self.provider.as_ref().and_then(|p| p.rate_it_uri())
    }

    /// Stops the billing worker. A request still pending gets no response;
    /// later requests are answered
    /// [`Status::ServiceUnavailable`](iabhub_types::Status::ServiceUnavailable).
    pub async fn shutdown(&mut self) {
        match self.worker.take() {
            Some(worker) => worker.shutdown().await,
            None => {
                warn!("shutdown called on billing that was never started");
                self.release_queue();
            }
        }
    }

    fn release_queue(&mut self) {
        if let Some((subscription, _)) = self.requests.take() {
            self.bus.unsubscribe(&subscription);
        }
    }
}

impl Drop for Iab {
    fn drop(&mut self) {
        self.release_queue();
    }
}
