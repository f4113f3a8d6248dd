//! Recording WebhookClient for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DeliveryFailure, WebhookClient, WebhookMessage};

/// One recorded POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub endpoint_url: String,
    pub text: String,
    pub succeeded: bool,
}

struct Failure {
    failure: DeliveryFailure,
    /// Remaining failing attempts; `None` fails forever.
    remaining: Option<usize>,
}

/// Client that records every attempt and fails configured endpoints.
#[derive(Default)]
pub struct RecordingClient {
    attempts: Mutex<Vec<Attempt>>,
    failures: Mutex<HashMap<String, Failure>>,
    latency: Mutex<Option<Duration>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every POST to `endpoint_url`.
    pub fn fail_endpoint(&self, endpoint_url: &str, failure: DeliveryFailure) {
        self.lock_failures().insert(
            endpoint_url.to_string(),
            Failure {
                failure,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` POSTs to `endpoint_url`.
    pub fn fail_endpoint_times(&self, endpoint_url: &str, times: usize, failure: DeliveryFailure) {
        self.lock_failures().insert(
            endpoint_url.to_string(),
            Failure {
                failure,
                remaining: Some(times),
            },
        );
    }

    /// Delay every POST.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    /// Every attempt so far, in completion order.
    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Successful deliveries so far.
    pub fn delivered(&self) -> Vec<Attempt> {
        self.attempts().into_iter().filter(|a| a.succeeded).collect()
    }

    pub fn attempts_to(&self, endpoint_url: &str) -> usize {
        self.attempts()
            .iter()
            .filter(|a| a.endpoint_url == endpoint_url)
            .count()
    }

    fn take_failure(&self, endpoint_url: &str) -> Option<DeliveryFailure> {
        let mut failures = self.lock_failures();
        let remaining = failures.get(endpoint_url)?.remaining;
        match remaining {
            Some(0) => {
                failures.remove(endpoint_url);
                None
            }
            Some(n) => {
                let entry = failures.get_mut(endpoint_url)?;
                entry.remaining = Some(n - 1);
                Some(entry.failure.clone())
            }
            None => failures.get(endpoint_url).map(|f| f.failure.clone()),
        }
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<String, Failure>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WebhookClient for RecordingClient {
    async fn post(
        &self,
        endpoint_url: &str,
        message: &WebhookMessage,
    ) -> Result<(), DeliveryFailure> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.take_failure(endpoint_url) {
            Some(failure) => Err(failure),
            None => Ok(()),
        };

        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Attempt {
                endpoint_url: endpoint_url.to_string(),
                text: message.text.clone(),
                succeeded: result.is_ok(),
            });

        result
    }

    fn name(&self) -> &str {
        "recording"
    }
}
