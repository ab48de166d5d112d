//! Token store configuration.

use crate::error::{StoreError, StoreResult};

/// Which backend persists tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl StoreBackend {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(StoreError::config(format!("unknown token store backend '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Redis => "redis",
        }
    }
}

/// Token store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// Redis URL (redis backend only)
    pub redis_url: String,
    /// Key prefix for all Redis keys
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "streammind".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let backend = match std::env::var("TOKEN_STORE") {
            Ok(raw) => StoreBackend::parse(&raw)?,
            Err(_) => StoreBackend::Memory,
        };

        Ok(Self {
            backend,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("TOKEN_KEY_PREFIX")
                .unwrap_or_else(|_| "streammind".to_string()),
        })
    }
}
