//! Events carried on the billing bus.
//!
//! Requests flow from host helpers to the active provider engine, responses
//! flow back. Activity-result and lifecycle events are emitted by the host
//! shell and tagged with the [`HostId`] of the component that produced them.
//!
//! Requests and responses are closed sum types: every response variant
//! embeds the request variant it answers, so pairing is checked by the
//! compiler rather than by downcasts.

use crate::billing::{Inventory, ProviderInfo, Purchase, SkuDetails, SkusDetails};
use crate::ids::{HostId, RequestId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Consume,
    Purchase,
    SkuDetails,
    Inventory,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Consume => "consume",
            Self::Purchase => "purchase",
            Self::SkuDetails => "sku_details",
            Self::Inventory => "inventory",
        };
        f.write_str(s)
    }
}

/// Consume a previously bought consumable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub id: RequestId,
    pub purchase: Purchase,
}

/// Start a purchase flow for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    /// Host component the purchase UI should be launched from.
    #[serde(default)]
    pub host: Option<HostId>,
    pub sku_details: SkuDetails,
}

/// Look up details for a list of skus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuDetailsRequest {
    pub id: RequestId,
    pub skus: Vec<String>,
}

/// Query purchases the user owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRequest {
    pub id: RequestId,
    /// Restart paging from the first page.
    pub start_over: bool,
}

/// A billing request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Request {
    Consume(ConsumeRequest),
    Purchase(PurchaseRequest),
    SkuDetails(SkuDetailsRequest),
    Inventory(InventoryRequest),
}

impl Request {
    /// Creates a consume request.
    #[must_use]
    pub fn consume(purchase: Purchase) -> Self {
        Self::Consume(ConsumeRequest {
            id: RequestId::new(),
            purchase,
        })
    }

    /// Creates a purchase request.
    #[must_use]
    pub fn purchase(host: Option<HostId>, sku_details: SkuDetails) -> Self {
        Self::Purchase(PurchaseRequest {
            id: RequestId::new(),
            host,
            sku_details,
        })
    }

    /// Creates a sku details request.
    #[must_use]
    pub fn sku_details<I, S>(skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SkuDetails(SkuDetailsRequest {
            id: RequestId::new(),
            skus: skus.into_iter().map(Into::into).collect(),
        })
    }

    /// Creates an inventory request.
    #[must_use]
    pub fn inventory(start_over: bool) -> Self {
        Self::Inventory(InventoryRequest {
            id: RequestId::new(),
            start_over,
        })
    }

    pub fn id(&self) -> RequestId {
        match self {
            Self::Consume(r) => r.id,
            Self::Purchase(r) => r.id,
            Self::SkuDetails(r) => r.id,
            Self::Inventory(r) => r.id,
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Consume(_) => RequestType::Consume,
            Self::Purchase(_) => RequestType::Purchase,
            Self::SkuDetails(_) => RequestType::SkuDetails,
            Self::Inventory(_) => RequestType::Inventory,
        }
    }
}

/// Outcome status of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Status {
    Success,
    /// The user aborted an interactive flow.
    UserCanceled,
    /// The provider is not installed or not usable.
    BillingUnavailable,
    /// Purchase verification rejected the purchase.
    Unauthorized,
    /// Purchase verification could not be completed.
    VerificationError,
    /// The provider returned a malformed response.
    ProtocolError,
    ItemAlreadyOwned,
    ItemUnavailable,
    /// The provider's backing service could not be reached.
    ServiceUnavailable,
    /// No provider was selected.
    NoBillingProvider,
    /// Another request is still pending on the provider.
    Busy,
    /// The provider did not answer within the configured timeout.
    Timeout,
    Failed(String),
}

impl Status {
    /// Creates a generic failure status.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::UserCanceled => f.write_str("user canceled"),
            Self::BillingUnavailable => f.write_str("billing unavailable"),
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::VerificationError => f.write_str("verification error"),
            Self::ProtocolError => f.write_str("protocol error"),
            Self::ItemAlreadyOwned => f.write_str("item already owned"),
            Self::ItemUnavailable => f.write_str("item unavailable"),
            Self::ServiceUnavailable => f.write_str("service unavailable"),
            Self::NoBillingProvider => f.write_str("no billing provider"),
            Self::Busy => f.write_str("busy"),
            Self::Timeout => f.write_str("timed out"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeResponse {
    pub request: ConsumeRequest,
    pub status: Status,
    #[serde(default)]
    pub provider: Option<ProviderInfo>,
    /// The consumed purchase, on success.
    #[serde(default)]
    pub purchase: Option<Purchase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub request: PurchaseRequest,
    pub status: Status,
    #[serde(default)]
    pub provider: Option<ProviderInfo>,
    /// Present on success, and also when verification rejected a purchase
    /// that did happen.
    #[serde(default)]
    pub purchase: Option<Purchase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuDetailsResponse {
    pub request: SkuDetailsRequest,
    pub status: Status,
    #[serde(default)]
    pub provider: Option<ProviderInfo>,
    #[serde(default)]
    pub skus_details: Option<SkusDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub request: InventoryRequest,
    pub status: Status,
    #[serde(default)]
    pub provider: Option<ProviderInfo>,
    #[serde(default)]
    pub inventory: Option<Inventory>,
}

/// A response to exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Response {
    Consume(ConsumeResponse),
    Purchase(PurchaseResponse),
    SkuDetails(SkuDetailsResponse),
    Inventory(InventoryResponse),
}

impl Response {
    /// Builds the payload-less response matching the shape of `request`.
    #[must_use]
    pub fn from_status(request: Request, status: Status, provider: Option<ProviderInfo>) -> Self {
        match request {
            Request::Consume(request) => Self::Consume(ConsumeResponse {
                request,
                status,
                provider,
                purchase: None,
            }),
            Request::Purchase(request) => Self::Purchase(PurchaseResponse {
                request,
                status,
                provider,
                purchase: None,
            }),
            Request::SkuDetails(request) => Self::SkuDetails(SkuDetailsResponse {
                request,
                status,
                provider,
                skus_details: None,
            }),
            Request::Inventory(request) => Self::Inventory(InventoryResponse {
                request,
                status,
                provider,
                inventory: None,
            }),
        }
    }

    pub fn status(&self) -> &Status {
        match self {
            Self::Consume(r) => &r.status,
            Self::Purchase(r) => &r.status,
            Self::SkuDetails(r) => &r.status,
            Self::Inventory(r) => &r.status,
        }
    }

    pub fn provider(&self) -> Option<&ProviderInfo> {
        match self {
            Self::Consume(r) => r.provider.as_ref(),
            Self::Purchase(r) => r.provider.as_ref(),
            Self::SkuDetails(r) => r.provider.as_ref(),
            Self::Inventory(r) => r.provider.as_ref(),
        }
    }

    /// Id of the request this response answers.
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Consume(r) => r.request.id,
            Self::Purchase(r) => r.request.id,
            Self::SkuDetails(r) => r.request.id,
            Self::Inventory(r) => r.request.id,
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Consume(_) => RequestType::Consume,
            Self::Purchase(_) => RequestType::Purchase,
            Self::SkuDetails(_) => RequestType::SkuDetails,
            Self::Inventory(_) => RequestType::Inventory,
        }
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status().is_successful()
    }
}

/// Result of a UI round-trip launched by a provider (e.g. a purchase screen).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityResultEvent {
    pub host: HostId,
    pub request_code: i32,
    pub result_code: i32,
    /// Free-form data returned by the UI, if any.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Lifecycle transitions reported by the host shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Create,
    Resume,
    Pause,
    Destroy,
    Attach,
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub host: HostId,
    pub kind: LifecycleKind,
}

impl LifecycleEvent {
    pub fn new(host: HostId, kind: LifecycleKind) -> Self {
        Self { host, kind }
    }
}

/// Published once provider selection has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupResponse {
    pub status: Status,
    #[serde(default)]
    pub provider: Option<ProviderInfo>,
}

impl SetupResponse {
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status.is_successful() && self.provider.is_some()
    }
}

/// Message kinds subscribers can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Request,
    Response,
    ActivityResult,
    Lifecycle,
    Setup,
}

/// Everything that travels on the billing bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum BillingEvent {
    Request(Request),
    Response(Response),
    ActivityResult(ActivityResultEvent),
    Lifecycle(LifecycleEvent),
    Setup(SetupResponse),
}

impl BillingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Request(_) => EventKind::Request,
            Self::Response(_) => EventKind::Response,
            Self::ActivityResult(_) => EventKind::ActivityResult,
            Self::Lifecycle(_) => EventKind::Lifecycle,
            Self::Setup(_) => EventKind::Setup,
        }
    }

    /// Human-readable JSON with 4-space indentation.
    ///
    /// Returns an empty string if serialization fails; the failure is logged.
    pub fn to_pretty_json(&self) -> String {
        match crate::pretty_json(self) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("failed to serialize {:?} event: {}", self.kind(), e);
                String::new()
            }
        }
    }
}

impl From<Request> for BillingEvent {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for BillingEvent {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<ActivityResultEvent> for BillingEvent {
    fn from(event: ActivityResultEvent) -> Self {
        Self::ActivityResult(event)
    }
}

impl From<LifecycleEvent> for BillingEvent {
    fn from(event: LifecycleEvent) -> Self {
        Self::Lifecycle(event)
    }
}

impl From<SetupResponse> for BillingEvent {
    fn from(event: SetupResponse) -> Self {
        Self::Setup(event)
    }
}
