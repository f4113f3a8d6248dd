//! Mock SubscriptionRegistry implementation for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{RegistryError, Result, SubscriberRecord, SubscriptionRegistry};

struct Failure {
    error: RegistryError,
    /// Remaining failing calls; `None` fails until `recover`.
    remaining: Option<usize>,
}

/// In-memory registry with failure injection and call counting.
#[derive(Default)]
pub struct MockRegistry {
    subscribers: Mutex<HashMap<String, Vec<SubscriberRecord>>>,
    failing: Mutex<Option<Failure>>,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subscriptions registered for an organization.
    pub fn set_subscribers(&self, organization_id: &str, records: Vec<SubscriberRecord>) {
        self.lock_subscribers()
            .insert(organization_id.to_string(), records);
    }

    /// Register one subscription.
    pub fn add_subscriber(&self, record: SubscriberRecord) {
        self.lock_subscribers()
            .entry(record.organization_id.clone())
            .or_default()
            .push(record);
    }

    /// Make every subsequent fetch fail with `error` until cleared.
    pub fn fail_with(&self, error: RegistryError) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = Some(Failure {
            error,
            remaining: None,
        });
    }

    /// Make the next `times` fetches fail with `error`.
    pub fn fail_next(&self, times: usize, error: RegistryError) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = Some(Failure {
            error,
            remaining: Some(times),
        });
    }

    pub fn recover(&self) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Delay every fetch, to exercise concurrent callers and deadlines.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    /// Number of fetches issued so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<RegistryError> {
        let mut failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = failing.as_ref()?.remaining;
        match remaining {
            Some(0) => {
                *failing = None;
                None
            }
            Some(n) => {
                let failure = failing.as_mut()?;
                failure.remaining = Some(n - 1);
                Some(failure.error.clone())
            }
            None => failing.as_ref().map(|f| f.error.clone()),
        }
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<SubscriberRecord>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SubscriptionRegistry for MockRegistry {
    async fn fetch_subscribers(&self, organization_id: &str) -> Result<Vec<SubscriberRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        Ok(self
            .lock_subscribers()
            .get(organization_id)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
