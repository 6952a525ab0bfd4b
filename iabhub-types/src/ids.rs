//! Request and host identifiers.
//!
//! A [`RequestId`] is minted when a request is created and copied onto the
//! response that answers it. Ids are UUID v7, so they sort in issue order
//! and carry the time they were issued.
//!
//! A [`HostId`] names one UI host for as long as its helper lives. It only
//! has to be unique within the process, so it is random and never parsed.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one billing request and every response to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Milliseconds since the Unix epoch at which the request was issued.
    ///
    /// `None` for an id parsed from a UUID that carries no timestamp.
    #[must_use]
    pub fn issued_at_ms(&self) -> Option<u64> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        Some(secs * 1000 + u64::from(nanos) / 1_000_000)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|source| Error::InvalidRequestId {
                input: s.to_owned(),
                source,
            })
    }
}

/// Identifies one host UI component (an activity or a fragment).
///
/// Lifecycle and activity-result events are tagged with the host that
/// emitted them, so helpers bound to different hosts never react to each
/// other's signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(Uuid);

impl HostId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0.simple())
    }
}
