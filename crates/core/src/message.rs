//! Chat message templating
//!
//! A message template goes through three passes: literal replacement of
//! `UPPER_CASE` keys, placeholder expansion, then cleanup of escape sequences.
//! Templates are either passed in directly or looked up by key in the
//! configured message catalog.

use crate::bridge::TargetContext;
use crate::config::MessageConfig;
use crate::error::{BridgeError, Result};
use crate::placeholder::PlaceholderExpander;
use std::fmt;
use std::sync::Arc;

/// Replacement key, restricted to `A-Z` and `_`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplacementKey(String);

impl ReplacementKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
            return Err(BridgeError::InvalidKey(key));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplacementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ReplacementKey {
    type Error = BridgeError;

    fn try_from(key: &str) -> Result<Self> {
        Self::new(key)
    }
}

/// Ordered key/value replacements for a message template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    entries: Vec<(ReplacementKey, String)>,
}

#[derive(Debug, Default)]
pub struct ReplacementsBuilder {
    entries: Vec<(ReplacementKey, String)>,
}

impl ReplacementsBuilder {
    pub fn add(mut self, key: &str, value: impl Into<String>) -> Result<Self> {
        self.entries.push((ReplacementKey::new(key)?, value.into()));
        Ok(self)
    }

    pub fn build(self) -> Replacements {
        Replacements {
            entries: self.entries,
        }
    }
}

impl Replacements {
    pub fn builder() -> ReplacementsBuilder {
        ReplacementsBuilder::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(key, value)| ReplacementKey::new(key.as_ref()).map(|key| (key, value.into())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    /// Value of the first entry with `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.as_str() == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplacementKey, &str)> {
        self.entries.iter().map(|(key, value)| (key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every occurrence of each key in order
    pub fn apply(&self, text: &str) -> String {
        self.entries
            .iter()
            .fold(text.to_owned(), |text, (key, value)| text.replace(key.as_str(), value))
    }
}

impl fmt::Display for Replacements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

/// Catalog key used when a requested message is missing
pub const MESSAGE_NOT_FOUND_KEY: &str = "message_not_found";

/// Shown when neither the requested message nor `message_not_found` exists
pub const MESSAGE_NOT_FOUND: &str = "<red>Oh... I can't react to that. (Contact the Administrators)";

/// Builds finished chat messages from templates
pub struct MessageFormatter {
    expander: Arc<PlaceholderExpander>,
    config: MessageConfig,
}

impl MessageFormatter {
    /// Formatter with `prefix` and an empty catalog
    pub fn new(expander: Arc<PlaceholderExpander>, prefix: impl Into<String>) -> Self {
        Self::from_config(
            expander,
            MessageConfig {
                prefix: prefix.into(),
                ..MessageConfig::default()
            },
        )
    }

    pub fn from_config(expander: Arc<PlaceholderExpander>, config: MessageConfig) -> Self {
        Self { expander, config }
    }

    pub fn config(&self) -> &MessageConfig {
        &self.config
    }

    /// The global `prefix` override while enabled, otherwise the configured prefix
    pub fn prefix(&self) -> &str {
        self.global_override("prefix").unwrap_or(&self.config.prefix)
    }

    /// Look up the template for `key`.
    ///
    /// Order: the global override while enabled, the catalog, the catalog's
    /// `message_not_found` entry, then [`MESSAGE_NOT_FOUND`].
    pub fn template(&self, key: &str) -> &str {
        if let Some(template) = self.global_override(key) {
            return template;
        }

        if let Some(template) = self.config.messages.get(key) {
            return template;
        }
        tracing::warn!(key, "Message key not found in the message catalog");

        if let Some(template) = self.config.messages.get(MESSAGE_NOT_FOUND_KEY) {
            return template;
        }
        tracing::warn!(key = MESSAGE_NOT_FOUND_KEY, "Fallback message not found in the message catalog");

        MESSAGE_NOT_FOUND
    }

    fn global_override(&self, key: &str) -> Option<&str> {
        let global = &self.config.global;
        if !global.enabled {
            return None;
        }
        global.messages.get(key).map(String::as_str)
    }

    /// Apply replacements, expand placeholders and clean up the result
    pub async fn format(&self, template: &str, replacements: &Replacements, target: &TargetContext) -> String {
        let replaced = replacements.apply(template);
        let expanded = self.expander.expand(&replaced, target).await;
        cleanup(&expanded)
    }

    /// [`format`](Self::format) with the prefix in front
    pub async fn format_prefixed(&self, template: &str, replacements: &Replacements, target: &TargetContext) -> String {
        let replaced = format!("{}{}", self.prefix(), replacements.apply(template));
        let expanded = self.expander.expand(&replaced, target).await;
        cleanup(&expanded)
    }

    /// Prefixed message for catalog entry `key`
    pub async fn message(&self, key: &str, replacements: &Replacements, target: &TargetContext) -> String {
        self.format_prefixed(self.template(key), replacements, target)
            .await
    }
}

/// Turn `\n` escapes into newlines and drop the remaining backslashes
pub fn cleanup(message: &str) -> String {
    message.replace("\\n", "\n").replace('\\', "")
}
