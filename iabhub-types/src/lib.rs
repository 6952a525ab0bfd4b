//! Core type definitions for iabhub.
//!
//! This crate defines the vendor-neutral types shared by the provider
//! engine and host helpers:
//! - Request identifiers (UUID v7) and host identifiers
//! - Billing models (sku details, purchases, inventory)
//! - Bus events (requests, responses, activity results, lifecycle)
//!
//! Anything specific to one store's SDK belongs in that store's provider,
//! not here.

mod billing;
mod event;
mod ids;

pub use billing::{
    Inventory, InventoryItem, ProviderInfo, Purchase, SkuDetails, SkuKind, SkusDetails,
    VerificationResult,
};
pub use event::{
    ActivityResultEvent, BillingEvent, ConsumeRequest, ConsumeResponse, EventKind,
    InventoryRequest, InventoryResponse, LifecycleEvent, LifecycleKind, PurchaseRequest,
    PurchaseResponse, Request, RequestType, Response, SetupResponse, SkuDetailsRequest,
    SkuDetailsResponse, Status,
};
pub use ids::{HostId, RequestId};

use serde::Serialize;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid request id {input:?}")]
    InvalidRequestId {
        input: String,
        #[source]
        source: uuid::Error,
    },
}

const JSON_INDENT: &[u8] = b"    ";

/// Serializes `value` as JSON indented with four spaces.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(JSON_INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever writes valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
