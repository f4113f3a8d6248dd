//! Batch dispatch pipeline.
//!
//! One invocation per inbound batch:
//! decode → group → per-organization cache lookup → plan → broadcast.
//!
//! Every stage isolates its own failures, so `process_batch` always returns
//! a report. A per-invocation deadline bounds the whole batch; lookups and
//! deliveries still running when it passes are abandoned.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, DeliveryReport};
use crate::cache::{Subscribers, SubscriptionCache};
use crate::config::PipelineConfig;
use crate::dispatch::{self, DeliveryTask};
use crate::event::{decode_batch, group, RawMessage, SqsTriggerEvent};

/// Summary of one processed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_id: Uuid,
    /// Messages in the batch.
    pub received: usize,
    /// Messages rejected by the decoder.
    pub malformed: usize,
    /// Organizations with at least one well-formed event.
    pub organizations: BTreeSet<String>,
    /// Delivery tasks produced by the planner.
    pub planned: usize,
    pub delivery: DeliveryReport,
}

/// Wires the subscription cache and broadcaster into a batch processor.
pub struct WebhookPipeline {
    cache: Arc<SubscriptionCache>,
    broadcaster: Broadcaster,
    deadline: Duration,
    gate: Mutex<()>,
}

impl WebhookPipeline {
    pub fn new(cache: Arc<SubscriptionCache>, broadcaster: Broadcaster) -> Self {
        Self {
            cache,
            broadcaster,
            deadline: PipelineConfig::default().deadline(),
            gate: Mutex::new(()),
        }
    }

    pub fn from_config(
        cache: Arc<SubscriptionCache>,
        broadcaster: Broadcaster,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(cache, broadcaster).with_deadline(config.deadline())
    }

    /// Upper bound on processing one batch.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Process one inbound batch to completion.
    ///
    /// Overlapping calls run one after another.
    pub async fn process_batch(&self, batch: Vec<RawMessage>) -> BatchReport {
        let _gate = self.gate.lock().await;

        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", batch_id = %batch_id, messages = batch.len());
        self.run(batch_id, batch).instrument(span).await
    }

    /// Process a batch in handler-trigger form.
    pub async fn process_trigger(&self, trigger: SqsTriggerEvent) -> BatchReport {
        self.process_batch(trigger.into_batch()).await
    }

    async fn run(&self, batch_id: Uuid, batch: Vec<RawMessage>) -> BatchReport {
        let deadline = Instant::now() + self.deadline;
        let received = batch.len();

        let decoded = decode_batch(&batch);
        let malformed = decoded.rejected.len();
        let groups = group(decoded.events);
        let organizations = groups.organization_ids();
        let force_refresh = groups.force_refresh;

        let plans = groups.organizations.iter().map(|(organization_id, events)| async move {
            let subscribers = self.lookup(organization_id, force_refresh, deadline).await;
            dispatch::plan(organization_id, events, &subscribers)
        });
        let tasks: Vec<DeliveryTask> = join_all(plans).await.into_iter().flatten().collect();
        let planned = tasks.len();

        let delivery = self.broadcaster.deliver_all(tasks, deadline).await;

        info!(
            received,
            malformed,
            organizations = organizations.len(),
            forced_refresh = force_refresh,
            planned,
            attempted = delivery.attempted,
            delivered = delivery.delivered,
            failed = delivery.failed(),
            "Batch processed"
        );

        BatchReport {
            batch_id,
            received,
            malformed,
            organizations,
            planned,
            delivery,
        }
    }

    async fn lookup(&self, organization_id: &str, force_refresh: bool, deadline: Instant) -> Subscribers {
        match tokio::time::timeout_at(deadline, self.cache.get(organization_id, force_refresh)).await {
            Ok(subscribers) => subscribers,
            Err(_) => {
                warn!(
                    organization_id = %organization_id,
                    error_kind = "deadline_exceeded",
                    "Subscription lookup did not finish before the batch deadline"
                );
                Subscribers::from(Vec::new())
            }
        }
    }
}
