//! Inbound queue configuration.

use std::time::Duration;

use serde::Deserialize;

/// SQS allows at most 10 messages per receive call.
const MAX_RECEIVE_BATCH: i32 = 10;

/// Inbound SQS queue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    /// Queue name. Defaults to `{environment}-webhook-queue`.
    pub queue_name: Option<String>,
    /// Queue URL. Skips the name lookup when set.
    pub queue_url: Option<String>,
    /// AWS region. Uses the default provider chain if not set.
    pub region: Option<String>,
    /// Custom endpoint URL (for LocalStack or testing).
    pub endpoint_url: Option<String>,
    /// Max number of messages to receive in one poll (1-10).
    pub max_messages: i32,
    /// Wait time seconds for long polling.
    pub wait_time_secs: i32,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            queue_url: None,
            region: None,
            endpoint_url: None,
            max_messages: MAX_RECEIVE_BATCH,
            wait_time_secs: 20,
        }
    }
}

impl InboundConfig {
    /// Queue name, namespaced by environment unless overridden.
    pub fn queue_name(&self, environment: &str) -> String {
        self.queue_name
            .clone()
            .unwrap_or_else(|| format!("{}-webhook-queue", environment))
    }

    pub fn max_messages(&self) -> i32 {
        self.max_messages.clamp(1, MAX_RECEIVE_BATCH)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs.max(0) as u64)
    }
}
