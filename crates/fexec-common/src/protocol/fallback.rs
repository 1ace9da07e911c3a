//! Fallback Protocol Types
//!
//! The orchestrator pushes a [`FallbackUpdate`] to the sidecar's fallback
//! listener whenever the set of nodes able to take over a migrated
//! container's results changes. When a reply cannot reach its caller, the
//! serialized [`InvocationResponse`](super::InvocationResponse) is posted to
//! [`RECEIVE_PATH`] on one of those nodes.

use serde::{Deserialize, Serialize};

/// Path on a fallback node that accepts forwarded results.
pub const RECEIVE_PATH: &str = "/receiveResultAfterMigration";

/// Port the fallback nodes' API listens on when an address has no port.
pub const DEFAULT_RECEIVE_PORT: u16 = 1323;

/// A new fallback address list, in priority order. Replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FallbackUpdate {
    pub fallback_addresses: Vec<String>,
}

impl FallbackUpdate {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fallback_addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FallbackUpdateAck {
    pub success: bool,
}

impl FallbackUpdateAck {
    pub fn ok() -> Self {
        Self { success: true }
    }

    pub fn failed() -> Self {
        Self { success: false }
    }
}
