//! Cross-network placeholder bridge
//!
//! A backend server asks the proxy to resolve placeholders it does not own
//! locally. The pieces, leaves first:
//!
//! - [`RequestCorrelator`] tracks outstanding requests by identifier
//! - [`TransportAdapter`] moves frames over a [`BridgeChannel`]
//! - [`ResolutionCache`] keeps recent values for a bounded time
//! - [`BridgeCoordinator`] is the façade plugins call
//! - [`BridgeResponder`] answers requests on the proxy side

pub mod cache;
pub mod coordinator;
pub mod correlator;
pub mod responder;
pub mod transport;

pub use cache::{CacheKey, ResolutionCache};
pub use coordinator::{BridgeCoordinator, SweepReport};
pub use correlator::{PendingEntry, RequestCorrelator};
pub use responder::BridgeResponder;
pub use transport::{BridgeChannel, ChannelEnd, MemoryChannel, TransportAdapter};

use chrono::{DateTime, Utc};
use proto::{RequestFrame, ResponseFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Roughly thirty years
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, clamped to a far future instant instead of overflowing
pub(crate) fn instant_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// The entity a placeholder is resolved for, usually a player.
///
/// The empty context stands for "no player" and is used for server wide
/// placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetContext(String);

impl TargetContext {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Context without a player
    pub fn global() -> Self {
        Self(String::new())
    }

    /// Context for a player's stable UUID
    pub fn player(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TargetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "<global>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for TargetContext {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl From<String> for TargetContext {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

impl From<Uuid> for TargetContext {
    fn from(uuid: Uuid) -> Self {
        Self::player(uuid)
    }
}

/// A placeholder lookup sent across the bridge. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    id: Uuid,
    key: String,
    target: TargetContext,
    issued_at: DateTime<Utc>,
}

impl ResolutionRequest {
    /// Create a request with a fresh identifier
    pub fn new(key: impl Into<String>, target: TargetContext) -> Self {
        Self::with_id(Uuid::new_v4(), key, target)
    }

    /// Create a request with a caller supplied identifier
    pub fn with_id(id: Uuid, key: impl Into<String>, target: TargetContext) -> Self {
        Self {
            id,
            key: key.into(),
            target,
            issued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> &TargetContext {
        &self.target
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Wire representation of this request
    pub fn to_frame(&self) -> RequestFrame {
        RequestFrame {
            id: self.id,
            key: self.key.clone(),
            target: self.target.as_str().to_owned(),
        }
    }
}

/// The answer to a [`ResolutionRequest`], consumed exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResponse {
    pub id: Uuid,
    pub value: String,
    pub success: bool,
    pub received_at: DateTime<Utc>,
}

impl ResolutionResponse {
    pub fn new(id: Uuid, value: impl Into<String>, success: bool) -> Self {
        Self {
            id,
            value: value.into(),
            success,
            received_at: Utc::now(),
        }
    }

    /// A successful response carrying `value`
    pub fn resolved(id: Uuid, value: impl Into<String>) -> Self {
        Self::new(id, value, true)
    }

    /// A response telling the caller the remote side had no value
    pub fn unresolved(id: Uuid) -> Self {
        Self::new(id, String::new(), false)
    }
}

impl From<ResponseFrame> for ResolutionResponse {
    fn from(frame: ResponseFrame) -> Self {
        Self::new(frame.id, frame.value, frame.success)
    }
}

/// How a pending request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The remote side answered with a value
    Resolved(String),
    /// The remote side answered but could not resolve the placeholder
    Rejected,
    /// No answer before the deadline
    TimedOut,
    /// The request never left or the bridge shut down
    TransportFailed,
}

impl ResolutionOutcome {
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Resolved(value) => Some(value),
            _ => None,
        }
    }
}
