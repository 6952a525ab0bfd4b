//! Error types for the billing core.
//!
//! Provider failures never show up here: they are turned into a response
//! status. These errors describe misuse of the engine or of the bus.

use thiserror::Error;

/// Result type for billing core operations.
pub type IabResult<T> = Result<T, IabError>;

/// Errors that can occur in the billing core.
#[derive(Debug, Error)]
pub enum IabError {
    /// Programming misuse, e.g. posting a response with nothing pending.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A response was posted while no request was pending.
    #[error("no pending request")]
    NoPendingRequest,

    /// A sku mapping is not one-to-one.
    #[error("invalid sku mapping: {0}")]
    InvalidSkuMapping(String),
}

impl IabError {
    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// True for errors that indicate an integration bug rather than a
    /// runtime condition.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::IllegalState(_) | Self::NoPendingRequest)
    }
}
