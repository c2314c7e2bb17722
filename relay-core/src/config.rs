//! Runtime Configuration
//!
//! [`RuntimeConfig`] is loaded from TOML. Every key is optional:
//!
//! ```toml
//! idle_timeout_secs = 900
//! max_event_chain = 256
//! wire_format = "msgpack"
//! log_filter = "info,relay_core=debug"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::DEFAULT_MAX_CHAIN;
use crate::protocol::WireFormat;

/// Settings for an [`App`](crate::session::App).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Sessions idle for longer than this are reaped. `None` keeps them
    /// until they disconnect.
    pub idle_timeout_secs: Option<u64>,
    /// Maximum number of events one inbound event may trigger, itself
    /// included.
    pub max_event_chain: usize,
    pub wire_format: WireFormat,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: None,
            max_event_chain: DEFAULT_MAX_CHAIN,
            wire_format: WireFormat::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_event_chain == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_event_chain must be at least 1".into(),
            });
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                reason: "idle_timeout_secs must be positive; omit it to disable reaping".into(),
            });
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}
