//! Registry of local placeholder resolvers

use super::PlaceholderResolver;
use crate::bridge::TargetContext;
use crate::error::{BridgeError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Resolvers indexed by lowercase identifier
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: DashMap<String, Arc<dyn PlaceholderResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under its identifier
    pub fn register(&self, resolver: Arc<dyn PlaceholderResolver>) -> Result<()> {
        let identifier = resolver.identifier().to_ascii_lowercase();
        if identifier.is_empty() || identifier.contains(|c: char| c == '_' || c == '%' || c.is_whitespace()) {
            return Err(BridgeError::InvalidIdentifier(identifier));
        }

        match self.resolvers.entry(identifier) {
            Entry::Occupied(entry) => Err(BridgeError::DuplicateResolver(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(identifier = %entry.key(), "Registered placeholder resolver");
                entry.insert(resolver);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, identifier: &str) -> Option<Arc<dyn PlaceholderResolver>> {
        self.resolvers
            .remove(&identifier.to_ascii_lowercase())
            .map(|(_, resolver)| resolver)
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn PlaceholderResolver>> {
        self.resolvers
            .get(&identifier.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.resolvers.contains_key(&identifier.to_ascii_lowercase())
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.resolvers.iter().map(|entry| entry.key().clone()).collect();
        identifiers.sort();
        identifiers
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolve a full placeholder key such as `player_name`.
    ///
    /// The identifier is the text before the first `_`; a key without one is
    /// passed with empty params.
    pub async fn resolve_key(&self, key: &str, target: &TargetContext) -> Option<String> {
        let (identifier, params) = split_key(key);
        let resolver = self.get(identifier)?;
        resolver.resolve(params, target).await
    }
}

/// Split `identifier_params` at the first underscore
pub(crate) fn split_key(key: &str) -> (&str, &str) {
    key.split_once('_').unwrap_or((key, ""))
}
