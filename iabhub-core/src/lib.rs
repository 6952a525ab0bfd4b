//! Vendor-neutral in-app billing core.
//!
//! Hosts issue purchase, consume, sku-details and inventory requests through
//! one API while this crate selects and drives whichever billing provider is
//! available on the device.
//!
//! # Architecture
//!
//! - **Bus**: typed publish/subscribe connecting helpers and engines
//! - **Provider**: trait over one vendor billing SDK
//! - **Verification / Sku**: pluggable purchase-trust and sku-mapping policies
//! - **Engine**: single-pending-request state machine over one provider
//! - **Worker**: the serialized task that drives the engine
//! - **Selection**: picks the first available provider
//! - **Helper**: binds bus subscriptions to a host's lifecycle
//!
//! ## Request Flow
//!
//! 1. A helper posts a request on the bus
//! 2. The worker hands it to the engine, which calls the provider
//! 3. The provider resolves; the engine verifies and remaps skus
//! 4. The response is posted on the bus and reaches subscribed helpers
//!
//! # Example
//!
//! ```
//! use iabhub_core::{Iab, IabConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut iab = Iab::builder()
//!     .config(IabConfig {
//!         request_timeout: Some(Duration::from_secs(30)),
//!         ..Default::default()
//!     })
//!     .build();
//!
//! // No providers registered: every request is answered NoBillingProvider.
//! let selected = iab.start().await.unwrap();
//! assert!(selected.is_none());
//! iab.shutdown().await;
//! # }
//! ```

pub mod bus;
mod engine;
mod error;
pub mod helper;
mod iab;
pub mod provider;
pub mod selection;
pub mod sku;
pub mod verification;
pub mod worker;

pub use bus::{EventBus, EventHandler, EventStream, Subscription, SubscriptionId};
pub use engine::{
    Admission, CallFuture, Completion, ProviderCall, ProviderEngine, ResponsePayload,
};
pub use error::{IabError, IabResult};
pub use helper::{BillingListener, FragmentHelper, IabHelper, LifecycleObserver};
pub use iab::{Iab, IabBuilder, IabConfig};
pub use provider::{
    BillingProvider, NoPackages, PackageInspector, ProviderFailure, ProviderResult,
};
pub use selection::{ProviderEntry, ProviderSelector};
pub use sku::{
    IdentityResolver, MapSkuResolver, SkuResolver, to_canonical_or_same, to_provider_or_same,
};
pub use verification::{AcceptAllVerifier, PurchaseVerifier, verification_status};
pub use worker::{BillingWorker, WorkerHandle};
