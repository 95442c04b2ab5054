//! LyttleUtils
//!
//! Shared utilities for Lyttle server plugins. The centrepiece is the
//! cross-network placeholder bridge: a backend server asks the proxy to resolve
//! placeholders it cannot answer locally, with request correlation, a short
//! lived cache, timeouts and graceful fallback.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lyttleutils::bridge::{BridgeCoordinator, MemoryChannel, TargetContext};
//! use lyttleutils::config::BridgeConfig;
//!
//! # async fn run() -> lyttleutils::Result<()> {
//! let (backend, _proxy) = MemoryChannel::pair(64);
//! let coordinator = Arc::new(BridgeCoordinator::new(BridgeConfig::default(), Arc::new(backend.channel))?);
//!
//! let rank = coordinator
//!     .resolve_default("luckperms_prefix", &TargetContext::new("player-123"))
//!     .await;
//! # Ok(())
//! # }
//! ```

#![warn(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::missing_assert_message,
    clippy::unwrap_in_result,
    clippy::unwrap_used,
    clippy::clone_on_ref_ptr,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::manual_let_else,
    clippy::redundant_closure_for_method_calls,
    clippy::trivially_copy_pass_by_ref
)]
#![allow(clippy::use_self)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod placeholder;

pub use proto;

pub use bridge::{
    BridgeChannel, BridgeCoordinator, BridgeResponder, MemoryChannel, ResolutionOutcome, ResolutionRequest,
    ResolutionResponse, TargetContext,
};
pub use config::{BridgeConfig, ConfigError, LyttleConfig, MessageConfig};
pub use error::{BridgeError, Result};
pub use message::{MessageFormatter, ReplacementKey, Replacements};
pub use metrics::{BridgeMetrics, BridgeStats};
pub use placeholder::{BridgeResolver, FnResolver, PlaceholderExpander, PlaceholderResolver, ResolverRegistry};
