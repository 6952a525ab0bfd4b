//! Billing provider abstraction.
//!
//! A provider wraps one vendor's billing SDK. Every operation is a future
//! that resolves exactly once with the outcome; the engine turns that
//! outcome into a response. Providers never see the bus.

use crate::error::{IabError, IabResult};
use async_trait::async_trait;
use iabhub_types::{
    ActivityResultEvent, Inventory, ProviderInfo, Purchase, PurchaseRequest, SkuKind, SkusDetails,
    Status,
};
use thiserror::Error;

/// Result of a provider operation.
pub type ProviderResult<T> = Result<T, ProviderFailure>;

/// Why a provider operation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderFailure {
    #[error("user canceled")]
    UserCanceled,

    #[error("billing unavailable")]
    BillingUnavailable,

    #[error("item already owned")]
    ItemAlreadyOwned,

    #[error("item unavailable")]
    ItemUnavailable,

    #[error("service unavailable")]
    ServiceUnavailable,

    /// The vendor SDK returned something the provider could not parse.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderFailure {
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other(reason.into())
    }
}

impl From<ProviderFailure> for Status {
    fn from(failure: ProviderFailure) -> Self {
        match failure {
            ProviderFailure::UserCanceled => Status::UserCanceled,
            ProviderFailure::BillingUnavailable => Status::BillingUnavailable,
            ProviderFailure::ItemAlreadyOwned => Status::ItemAlreadyOwned,
            ProviderFailure::ItemUnavailable => Status::ItemUnavailable,
            ProviderFailure::ServiceUnavailable => Status::ServiceUnavailable,
            ProviderFailure::Protocol(_) => Status::ProtocolError,
            ProviderFailure::Other(reason) => Status::Failed(reason),
        }
    }
}

/// Answers "is this package installed on the device".
pub trait PackageInspector: Send + Sync {
    fn is_installed(&self, package_name: &str) -> bool;
}

/// Inspector that reports every package as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPackages;

impl PackageInspector for NoPackages {
    fn is_installed(&self, _package_name: &str) -> bool {
        false
    }
}

/// One vendor billing SDK.
///
/// Sku ids passed in and returned are in the provider's own vocabulary; the
/// engine translates to and from canonical ids around every call.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Name and package of this provider.
    fn info(&self) -> &ProviderInfo;

    /// Purchase kinds this provider can sell. A purchase of any other kind
    /// is answered with a failure without calling [`purchase`](Self::purchase).
    fn purchase_kinds(&self) -> &[SkuKind];

    /// Runs a purchase flow. Only called for kinds listed in
    /// [`purchase_kinds`](Self::purchase_kinds).
    async fn purchase(&self, request: &PurchaseRequest) -> ProviderResult<Purchase>;

    /// Consumes a consumable purchase, returning it on success.
    async fn consume(&self, purchase: &Purchase) -> ProviderResult<Purchase>;

    /// Looks up details for the given skus.
    async fn sku_details(&self, skus: &[String]) -> ProviderResult<SkusDetails>;

    /// Returns one page of owned purchases.
    async fn inventory(&self, start_over: bool) -> ProviderResult<Inventory>;

    /// Maximum skus per [`sku_details`](Self::sku_details) call, if the
    /// vendor imposes one.
    fn sku_details_batch_size(&self) -> Option<usize> {
        None
    }

    /// Whether this provider can be used on this device.
    ///
    /// The default checks whether the provider's package is installed.
    /// Providers without a package name must override this; calling the
    /// default without one is an [`IabError::IllegalState`].
    fn is_available(&self, inspector: &dyn PackageInspector) -> IabResult<bool> {
        match self.info().package_name() {
            Some(package) => Ok(inspector.is_installed(package)),
            None => Err(IabError::illegal_state(format!(
                "provider {} has no package name and must override is_available",
                self.info().name
            ))),
        }
    }

    /// Link to this app's page in the provider's store.
    fn store_page_uri(&self) -> Option<String> {
        None
    }

    /// Link that lets the user rate this app in the provider's store.
    fn rate_it_uri(&self) -> Option<String> {
        None
    }

    /// Result of a UI round-trip the provider launched. Called on the
    /// posting thread.
    fn on_activity_result(&self, _event: &ActivityResultEvent) {}
}
