//! Picks the billing provider to drive on this device.

use crate::bus::EventBus;
use crate::engine::ProviderEngine;
use crate::provider::{BillingProvider, PackageInspector};
use crate::sku::{IdentityResolver, SkuResolver};
use crate::verification::{AcceptAllVerifier, PurchaseVerifier};
use iabhub_types::{ProviderInfo, SetupResponse, Status};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A candidate provider together with the policies its engine will use.
#[derive(Clone)]
pub struct ProviderEntry {
    provider: Arc<dyn BillingProvider>,
    verifier: Arc<dyn PurchaseVerifier>,
    resolver: Arc<dyn SkuResolver>,
}

impl ProviderEntry {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self {
            provider,
            verifier: Arc::new(AcceptAllVerifier),
            resolver: Arc::new(IdentityResolver),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn PurchaseVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SkuResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn info(&self) -> &ProviderInfo {
        self.provider.info()
    }

    pub fn provider(&self) -> &Arc<dyn BillingProvider> {
        &self.provider
    }

    /// Builds the engine for this candidate on `bus`.
    pub fn into_engine(self, bus: EventBus) -> ProviderEngine {
        ProviderEngine::with_policies(self.provider, self.verifier, self.resolver, bus)
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("provider", self.info())
            .finish_non_exhaustive()
    }
}

/// Ordered, de-duplicated list of candidate providers.
///
/// Candidates are tried in registration order. Registering a provider whose
/// [`ProviderInfo`] is already present is ignored; the first one wins.
#[derive(Debug, Default, Clone)]
pub struct ProviderSelector {
    candidates: Vec<ProviderEntry>,
    seen: HashSet<ProviderInfo>,
}

impl ProviderSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate. Returns false if an equal provider was already
    /// registered.
    pub fn add(&mut self, entry: ProviderEntry) -> bool {
        if !self.seen.insert(entry.info().clone()) {
            warn!("ignoring duplicate billing provider {}", entry.info());
            return false;
        }
        debug!("registered billing provider {}", entry.info());
        self.candidates.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Identities of the registered candidates, in order.
    pub fn candidates(&self) -> impl Iterator<Item = &ProviderInfo> {
        self.candidates.iter().map(ProviderEntry::info)
    }

    /// Picks the first available candidate and publishes the outcome as a
    /// [`SetupResponse`].
    ///
    /// A candidate whose availability check fails is logged and skipped.
    pub fn select(
        self,
        inspector: &dyn PackageInspector,
        bus: &EventBus,
    ) -> Option<ProviderEngine> {
        let chosen = self
            .candidates
            .into_iter()
            .find(|entry| match entry.provider.is_available(inspector) {
                Ok(available) => {
                    debug!("provider {} available: {}", entry.info(), available);
                    available
                }
                Err(e) => {
                    warn!("skipping provider {}: {e}", entry.info());
                    false
                }
            });

        let setup = match &chosen {
            Some(entry) => {
                info!("selected billing provider {}", entry.info());
                SetupResponse {
                    status: Status::Success,
                    provider: Some(entry.info().clone()),
                }
            }
            None => {
                warn!("no billing provider available");
                SetupResponse {
                    status: Status::NoBillingProvider,
                    provider: None,
                }
            }
        };
        bus.post(setup);

        chosen.map(|entry| entry.into_engine(bus.clone()))
    }
}
