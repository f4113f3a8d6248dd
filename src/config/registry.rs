//! Subscription registry configuration.

use std::time::Duration;

use serde::Deserialize;

/// Postgres registry connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// PostgreSQL connection URI.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a pooled connection, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Upper bound on one subscriber query, in milliseconds.
    pub query_timeout_ms: u64,
    /// Retries for transient registry failures (0 = single attempt).
    pub max_retries: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            query_timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

impl RegistryConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
