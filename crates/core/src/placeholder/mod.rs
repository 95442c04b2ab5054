//! Placeholder resolvers
//!
//! A resolver owns one identifier, e.g. `player` in `%player_name%`, and
//! answers the rest of the token. Local resolvers live in a
//! [`ResolverRegistry`]; [`BridgeResolver`] forwards to the other side of the
//! network instead.

pub mod expander;
pub mod registry;

pub use expander::PlaceholderExpander;
pub use registry::ResolverRegistry;

use crate::bridge::{BridgeCoordinator, TargetContext};
use futures::future::{self, BoxFuture};
use std::fmt;
use std::sync::Arc;

/// Something that can answer placeholders for one identifier
pub trait PlaceholderResolver: Send + Sync {
    /// Identifier this resolver answers for, matched case-insensitively
    fn identifier(&self) -> &str;

    /// Resolve `params` (the token text after `identifier_`) for `target`.
    ///
    /// `None` means the resolver does not know the placeholder.
    fn resolve<'a>(&'a self, params: &'a str, target: &'a TargetContext) -> BoxFuture<'a, Option<String>>;
}

/// Resolver backed by a synchronous closure
pub struct FnResolver<F> {
    identifier: String,
    resolve: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&str, &TargetContext) -> Option<String> + Send + Sync,
{
    pub fn new(identifier: impl Into<String>, resolve: F) -> Self {
        Self {
            identifier: identifier.into(),
            resolve,
        }
    }
}

impl<F> PlaceholderResolver for FnResolver<F>
where
    F: Fn(&str, &TargetContext) -> Option<String> + Send + Sync,
{
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn resolve<'a>(&'a self, params: &'a str, target: &'a TargetContext) -> BoxFuture<'a, Option<String>> {
        Box::pin(future::ready((self.resolve)(params, target)))
    }
}

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Resolves placeholders through the bridge.
///
/// The params are sent as the placeholder key. Failures resolve to the
/// coordinator's configured fallback, so this resolver always answers.
pub struct BridgeResolver {
    identifier: String,
    coordinator: Arc<BridgeCoordinator>,
}

impl BridgeResolver {
    pub fn new(identifier: impl Into<String>, coordinator: Arc<BridgeCoordinator>) -> Self {
        Self {
            identifier: identifier.into(),
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<BridgeCoordinator> {
        &self.coordinator
    }
}

impl PlaceholderResolver for BridgeResolver {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn resolve<'a>(&'a self, params: &'a str, target: &'a TargetContext) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { Some(self.coordinator.resolve_default(params, target).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryChannel;
    use crate::config::BridgeConfig;

    #[tokio::test]
    async fn test_fn_resolver() {
        let resolver = FnResolver::new("player", |params, target| match params {
            "name" => Some(target.as_str().to_string()),
            _ => None,
        });

        let target = TargetContext::new("Steve");
        assert_eq!(resolver.identifier(), "player");
        assert_eq!(resolver.resolve("name", &target).await.as_deref(), Some("Steve"));
        assert_eq!(resolver.resolve("health", &target).await, None);
    }

    #[tokio::test]
    async fn test_bridge_resolver_always_answers() {
        let (backend, proxy) = MemoryChannel::pair(1);
        drop(proxy);
        let config = BridgeConfig {
            fallback: "-".to_string(),
            ..BridgeConfig::default()
        };
        let coordinator = Arc::new(BridgeCoordinator::new(config, Arc::new(backend.channel)).unwrap());
        let resolver = BridgeResolver::new("proxy", coordinator);

        let value = resolver.resolve("luckperms_prefix", &TargetContext::global()).await;
        assert_eq!(value.as_deref(), Some("-"));
    }
}
