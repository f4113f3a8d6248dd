//! Webhook broadcasting.
//!
//! This module contains:
//! - `WebhookClient` trait: one HTTP POST to one endpoint
//! - `Broadcaster`: delivers a set of tasks concurrently, isolating failures
//! - `DeliveryReport`: per-batch delivery outcome
//! - Implementations: HTTP (reqwest), Recording (tests)
//!
//! A failed delivery is logged and dropped. It never affects other tasks and
//! never fails the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::DeliveryConfig;
use crate::dispatch::DeliveryTask;
use crate::event::payload_text;
use crate::utils::retry::{delivery_backoff, is_retryable_status};

pub mod http;
pub mod mock;

pub use http::HttpWebhookClient;
pub use mock::RecordingClient;

/// JSON body posted to every webhook: `{"text": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    pub text: String,
}

impl WebhookMessage {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            text: payload_text(payload),
        }
    }
}

/// Why a single delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("batch deadline exceeded before delivery completed")]
    DeadlineExceeded,
}

impl DeliveryFailure {
    /// Classification used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryFailure::Connect(_) => "connect",
            DeliveryFailure::Timeout => "timeout",
            DeliveryFailure::Status { .. } => "status",
            DeliveryFailure::Transport(_) => "transport",
            DeliveryFailure::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Connect errors, timeouts, 429 and 5xx may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryFailure::Connect(_) | DeliveryFailure::Timeout => true,
            DeliveryFailure::Status { status } => StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            DeliveryFailure::Transport(_) | DeliveryFailure::DeadlineExceeded => false,
        }
    }
}

/// A delivery that did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDelivery {
    pub organization_id: String,
    pub endpoint_url: String,
    pub failure: DeliveryFailure,
}

/// Outcome of delivering one batch of tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    /// Tasks handed to the broadcaster.
    pub planned: usize,
    /// Tasks that reached the client before the deadline.
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<FailedDelivery>,
}

impl DeliveryReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Transport for a single webhook POST.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// POST `message` as JSON to `endpoint_url`. Succeeds on any 2xx.
    async fn post(&self, endpoint_url: &str, message: &WebhookMessage)
        -> Result<(), DeliveryFailure>;

    /// Client name for logging.
    fn name(&self) -> &str;
}

/// Concurrent, failure-isolated delivery of webhook tasks.
pub struct Broadcaster {
    client: Arc<dyn WebhookClient>,
    concurrency: usize,
    max_retries: usize,
}

impl Broadcaster {
    pub fn new(client: Arc<dyn WebhookClient>) -> Self {
        let defaults = DeliveryConfig::default();
        Self {
            client,
            concurrency: defaults.concurrency(),
            max_retries: defaults.max_retries,
        }
    }

    pub fn from_config(client: Arc<dyn WebhookClient>, config: &DeliveryConfig) -> Self {
        Self::new(client)
            .with_concurrency(config.concurrency())
            .with_max_retries(config.max_retries)
    }

    /// Maximum deliveries in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Retry transient failures up to `max_retries` times.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attempt every task once (plus retries), in parallel up to the
    /// configured concurrency.
    ///
    /// Tasks still pending at `deadline` are abandoned and reported as
    /// `DeadlineExceeded`. Always returns a report covering every task;
    /// `attempted` counts only those that were actually sent.
    pub async fn deliver_all(&self, tasks: Vec<DeliveryTask>, deadline: Instant) -> DeliveryReport {
        let planned = tasks.len();

        let mut report = stream::iter(tasks)
            .map(|task| async move {
                // Tasks reached only after the deadline never touch the client.
                if Instant::now() >= deadline {
                    return (task, false, Err(DeliveryFailure::DeadlineExceeded));
                }
                let result = tokio::time::timeout_at(deadline, self.deliver(&task))
                    .await
                    .unwrap_or(Err(DeliveryFailure::DeadlineExceeded));
                (task, true, result)
            })
            .buffer_unordered(self.concurrency)
            .fold(DeliveryReport::default(), |mut report, (task, sent, result)| async move {
                if sent {
                    report.attempted += 1;
                }
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(failure) => {
                        warn!(
                            organization_id = %task.organization_id,
                            endpoint = %task.endpoint_url,
                            error_kind = failure.kind(),
                            error = %failure,
                            "Webhook delivery failed"
                        );
                        report.failures.push(FailedDelivery {
                            organization_id: task.organization_id,
                            endpoint_url: task.endpoint_url,
                            failure,
                        });
                    }
                }
                report
            })
            .await;

        report.planned = planned;
        report
    }

    async fn deliver(&self, task: &DeliveryTask) -> Result<(), DeliveryFailure> {
        let message = WebhookMessage::from_payload(&task.payload);
        let message = &message;
        let client = &self.client;

        (|| async move { client.post(&task.endpoint_url, message).await })
            .retry(delivery_backoff(self.max_retries))
            .when(DeliveryFailure::is_transient)
            .notify(|failure: &DeliveryFailure, delay: Duration| {
                debug!(
                    endpoint = %task.endpoint_url,
                    client = %client.name(),
                    error_kind = failure.kind(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Retrying webhook delivery"
                );
            })
            .await
    }
}

#[cfg(test)]
mod tests;
