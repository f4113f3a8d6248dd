//! Webhook delivery configuration.

use std::time::Duration;

use serde::Deserialize;

/// Outbound HTTP delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// TCP connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum deliveries in flight at once.
    pub concurrency: usize,
    /// Retries for transient delivery failures (0 = single attempt).
    pub max_retries: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 250,
            request_timeout_ms: 5_000,
            concurrency: 16,
            max_retries: 0,
        }
    }
}

impl DeliveryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Worker pool width, never zero.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
