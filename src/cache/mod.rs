//! Per-organization subscription cache.
//!
//! Answers "what are organization O's webhook subscriptions?" without a
//! registry round-trip on every batch. Entries are replaced wholesale on
//! refresh and live for the life of the process.
//!
//! Each organization has its own slot guarded by an async mutex, so at most
//! one refresh per organization is in flight. Callers that queued behind a
//! refresh reuse its outcome instead of querying the registry again.
//!
//! Registry failures never reach the caller: the previous snapshot is served
//! if there is one, otherwise the organization has no subscribers for now.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{CacheConfig, RegistryConfig};
use crate::registry::{self, RegistryError, SubscriberRecord, SubscriptionRegistry};
use crate::utils::retry::registry_backoff;

/// Immutable list of subscribers shared by every reader of a snapshot.
pub type Subscribers = Arc<[SubscriberRecord]>;

/// A registry snapshot for one organization.
#[derive(Debug)]
pub struct CacheEntry {
    pub organization_id: String,
    pub refreshed_at: Instant,
    pub subscribers: Subscribers,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed_at.elapsed() < ttl
    }
}

#[derive(Default)]
struct Slot {
    entry: Mutex<Option<Arc<CacheEntry>>>,
    /// Completed refresh attempts, successful or not.
    refreshes: AtomicU64,
}

/// TTL-bounded cache of subscriber snapshots keyed by organization.
pub struct SubscriptionCache {
    registry: Arc<dyn SubscriptionRegistry>,
    ttl: Duration,
    max_retries: usize,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl SubscriptionCache {
    /// Create a cache over `registry`. Refreshes are attempted once.
    pub fn new(registry: Arc<dyn SubscriptionRegistry>, ttl: Duration) -> Self {
        Self {
            registry,
            ttl,
            max_retries: 0,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Create a cache with TTL and retry policy from configuration.
    pub fn from_config(
        registry: Arc<dyn SubscriptionRegistry>,
        cache: &CacheConfig,
        registry_config: &RegistryConfig,
    ) -> Self {
        Self::new(registry, cache.ttl()).with_max_retries(registry_config.max_retries)
    }

    /// Retry transient registry failures up to `max_retries` times.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current subscribers for an organization.
    ///
    /// Serves the cached snapshot when it exists, is younger than the TTL and
    /// `force_refresh` is false. Otherwise refreshes from the registry.
    pub async fn get(&self, organization_id: &str, force_refresh: bool) -> Subscribers {
        let slot = self.slot(organization_id).await;
        let seen = slot.refreshes.load(Ordering::Acquire);
        let mut entry = slot.entry.lock().await;

        if slot.refreshes.load(Ordering::Acquire) != seen {
            debug!(
                organization_id = %organization_id,
                "Reusing refresh completed while waiting"
            );
            return subscribers_of(entry.as_ref());
        }

        if let Some(current) = entry.as_ref() {
            if !force_refresh && current.is_fresh(self.ttl) {
                return current.subscribers.clone();
            }
        }

        let result = self.fetch(organization_id).await;
        slot.refreshes.fetch_add(1, Ordering::Release);

        match result {
            Ok(records) => {
                info!(
                    organization_id = %organization_id,
                    subscribers = records.len(),
                    forced = force_refresh,
                    "Refreshed webhook subscriptions"
                );
                let refreshed = Arc::new(CacheEntry {
                    organization_id: organization_id.to_string(),
                    refreshed_at: Instant::now(),
                    subscribers: records.into(),
                });
                let subscribers = refreshed.subscribers.clone();
                *entry = Some(refreshed);
                subscribers
            }
            Err(err) => match entry.as_ref() {
                Some(stale) => {
                    warn!(
                        organization_id = %organization_id,
                        error = %err,
                        error_kind = "registry_unavailable",
                        snapshot_age_secs = stale.refreshed_at.elapsed().as_secs(),
                        "Registry refresh failed, serving stale subscriptions"
                    );
                    stale.subscribers.clone()
                }
                None => {
                    error!(
                        organization_id = %organization_id,
                        error = %err,
                        error_kind = "registry_unavailable",
                        "Registry refresh failed with no cached subscriptions"
                    );
                    Subscribers::from(Vec::new())
                }
            },
        }
    }

    /// Cached snapshot for an organization, without refreshing.
    pub async fn snapshot(&self, organization_id: &str) -> Option<Arc<CacheEntry>> {
        let slot = self.slots.read().await.get(organization_id).cloned()?;
        let entry = slot.entry.lock().await;
        entry.clone()
    }

    /// Number of organizations with a slot.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    async fn slot(&self, organization_id: &str) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().await.get(organization_id) {
            return slot.clone();
        }

        self.slots
            .write()
            .await
            .entry(organization_id.to_string())
            .or_default()
            .clone()
    }

    async fn fetch(&self, organization_id: &str) -> registry::Result<Vec<SubscriberRecord>> {
        let registry = &self.registry;

        (|| async move { registry.fetch_subscribers(organization_id).await })
            .retry(registry_backoff(self.max_retries))
            .when(RegistryError::is_transient)
            .notify(|err: &RegistryError, delay: Duration| {
                warn!(
                    organization_id = %organization_id,
                    registry = %registry.name(),
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "Registry query failed, retrying"
                );
            })
            .await
    }
}

fn subscribers_of(entry: Option<&Arc<CacheEntry>>) -> Subscribers {
    entry
        .map(|e| e.subscribers.clone())
        .unwrap_or_else(|| Subscribers::from(Vec::new()))
}
