//! Adapter configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default database name when none is configured.
pub const DEFAULT_DB_NAME: &str = "idbridge";

/// Configuration for opening an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Name of the database to open or create
    pub db_name: String,
    /// Schema version to request; `None` opens the stored version (1 when new)
    pub version: Option<u32>,
    /// Per-request wait limit in milliseconds; `None` waits forever
    pub request_timeout_ms: Option<u64>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            version: None,
            request_timeout_ms: None,
        }
    }
}

impl AdapterConfig {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Limit each wait to `timeout`, rounded up to whole milliseconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.request_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_name.trim().is_empty() {
            return Err(Error::Config("db_name must not be empty".into()));
        }
        if self.version == Some(0) {
            return Err(Error::Config("version must be positive".into()));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
