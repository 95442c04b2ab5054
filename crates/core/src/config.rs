//! Configuration for the placeholder bridge
//!
//! Files are TOML or JSON, chosen by extension. Every field has a default so a
//! partial file only needs to name what it changes.

use crate::logging::LogConfig;
use proto::{CHANNEL_NAME, DEFAULT_MAX_FRAME_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Smallest frame that can still carry a request with short strings
const MIN_FRAME_SIZE: usize = 64;

/// Five minutes
const MAX_REQUEST_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// One day
const MAX_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// One hour
const MAX_SWEEP_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Top level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LyttleConfig {
    pub bridge: BridgeConfig,
    pub messages: MessageConfig,
    pub logging: LogConfig,
}

/// Bridge coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a resolution may wait for the proxy
    pub request_timeout_ms: u64,
    /// How long a resolved value stays cached
    pub cache_ttl_ms: u64,
    pub cache_capacity: usize,
    /// Period of the maintenance sweep
    pub sweep_interval_ms: u64,
    /// Value returned whenever resolution fails
    pub fallback: String,
    pub max_frame_size: usize,
    /// Plugin-message channel the frames travel on
    pub channel: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2000,
            cache_ttl_ms: 5000,
            cache_capacity: 4096,
            sweep_interval_ms: 1000,
            fallback: String::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel: CHANNEL_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("Request timeout cannot be 0".to_string()));
        }

        // Nothing may be cached indefinitely, and a zero TTL disables the cache
        if self.cache_ttl_ms == 0 {
            return Err(ConfigError::Invalid("Cache TTL cannot be 0".to_string()));
        }

        if self.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "Request timeout cannot exceed {} ms",
                MAX_REQUEST_TIMEOUT_MS
            )));
        }

        if self.cache_ttl_ms > MAX_CACHE_TTL_MS {
            return Err(ConfigError::Invalid(format!("Cache TTL cannot exceed {} ms", MAX_CACHE_TTL_MS)));
        }

        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("Cache capacity cannot be 0".to_string()));
        }

        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("Sweep interval cannot be 0".to_string()));
        }

        if self.sweep_interval_ms > MAX_SWEEP_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "Sweep interval cannot exceed {} ms",
                MAX_SWEEP_INTERVAL_MS
            )));
        }

        if self.max_frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::Invalid(format!(
                "Max frame size must be at least {} bytes",
                MIN_FRAME_SIZE
            )));
        }

        if !self.channel.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "Channel '{}' must be namespaced as 'namespace:name'",
                self.channel
            )));
        }

        Ok(())
    }
}

/// Chat message settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Prepended to every formatted message
    pub prefix: String,
    /// Message templates by key
    pub messages: HashMap<String, String>,
    pub global: GlobalMessages,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            prefix: "<dark_gray>[<gold>Lyttle</gold>]</dark_gray> ".to_string(),
            messages: HashMap::new(),
            global: GlobalMessages::default(),
        }
    }
}

/// Network wide message overrides.
///
/// While enabled, a key found here wins over the local catalog. This includes
/// `prefix`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalMessages {
    pub enabled: bool,
    pub messages: HashMap<String, String>,
}

impl LyttleConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: LyttleConfig = match ConfigFormat::from_extension(path) {
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseFailed(format!("JSON parse error: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| ConfigError::ParseFailed(format!("TOML parse error: {}", e)))?,
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        let content = match ConfigFormat::from_extension(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| ConfigError::ParseFailed(format!("JSON serialize error: {}", e)))?,
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| ConfigError::ParseFailed(format!("TOML serialize error: {}", e)))?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.validate()?;

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("Log filter cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
