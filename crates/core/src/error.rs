//! Error types for the LyttleUtils core crate

use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Primary error type for the placeholder bridge.
///
/// The bridge coordinator absorbs every network or timing variant into the
/// configured fallback value. Only callers of the `try_*` entry points see them.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(#[source] proto::ProtocolError),

    #[error("Remote side could not resolve '{0}'")]
    Unresolved(String),

    #[error("Duplicate request identifier {0}")]
    DuplicateIdentifier(Uuid),

    #[error("Resolver '{0}' already registered")]
    DuplicateResolver(String),

    #[error("Invalid resolver identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid replacement key '{0}': only A-Z and _ are allowed")]
    InvalidKey(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Whether the error signals a bug rather than a runtime condition
    pub fn is_internal_defect(&self) -> bool {
        matches!(self, Self::DuplicateIdentifier(_))
    }
}
