//! AWS SQS consumer.
//!
//! Long-polls the webhook queue and hands each received batch to the
//! pipeline. Every received message is deleted once its batch has been
//! processed, whatever the delivery outcome: delivery is best-effort and a
//! batch is never redelivered.

use std::future::Future;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, Message};
use aws_sdk_sqs::Client as SqsClient;
use tracing::{debug, error, info, warn};

use crate::config::InboundConfig;
use crate::event::RawMessage;
use crate::pipeline::WebhookPipeline;

/// SQS accepts at most 10 entries per DeleteMessageBatch call.
const MAX_DELETE_BATCH: usize = 10;

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Errors from the SQS transport.
#[derive(Debug, thiserror::Error)]
pub enum SqsError {
    #[error("failed to resolve queue URL for {queue}: {message}")]
    QueueUrl { queue: String, message: String },

    #[error("failed to receive messages: {0}")]
    Receive(String),

    #[error("failed to delete messages: {0}")]
    Delete(String),
}

pub type Result<T> = std::result::Result<T, SqsError>;

/// Long-polling consumer of the inbound webhook queue.
pub struct SqsConsumer {
    sqs: SqsClient,
    queue_url: String,
    max_messages: i32,
    wait_time_secs: i32,
}

impl SqsConsumer {
    /// Wrap an existing client and queue URL.
    pub fn new(sqs: SqsClient, queue_url: impl Into<String>, config: &InboundConfig) -> Self {
        Self {
            sqs,
            queue_url: queue_url.into(),
            max_messages: config.max_messages(),
            wait_time_secs: config.wait_time().as_secs() as i32,
        }
    }

    /// Load AWS configuration and resolve the queue URL.
    ///
    /// Uses the configured URL when set, otherwise looks the queue up by
    /// name (`{environment}-webhook-queue` unless overridden).
    pub async fn connect(config: &InboundConfig, environment: &str) -> Result<Self> {
        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            aws_config_builder =
                aws_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let Some(ref endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let sqs = SqsClient::new(&aws_config);

        let queue_url = match &config.queue_url {
            Some(url) => url.clone(),
            None => resolve_queue_url(&sqs, &config.queue_name(environment)).await?,
        };

        info!(
            region = ?config.region,
            endpoint = ?config.endpoint_url,
            queue_url = %queue_url,
            "Connected to AWS SQS"
        );

        Ok(Self::new(sqs, queue_url, config))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Consume batches until `shutdown` resolves.
    ///
    /// Shutdown is observed between batches; a batch already handed to the
    /// pipeline is processed and acknowledged first.
    pub async fn run<F>(&self, pipeline: &WebhookPipeline, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(queue_url = %self.queue_url, "Starting SQS consumer");

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                received = self.receive() => received,
            };

            match received {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => {
                    let batch = messages.iter().map(to_raw_message).collect();
                    pipeline.process_batch(batch).await;

                    let receipts = receipt_handles(&messages);
                    if let Err(e) = self.delete(&receipts).await {
                        error!(error = %e, "Failed to acknowledge processed messages");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to receive messages from SQS");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(queue_url = %self.queue_url, "SQS consumer stopped");
    }

    async fn receive(&self) -> Result<Vec<Message>> {
        let output = self
            .sqs
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_messages)
            .wait_time_seconds(self.wait_time_secs)
            .send()
            .await
            .map_err(|e| SqsError::Receive(e.to_string()))?;

        let messages = output.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received SQS messages");
        Ok(messages)
    }

    async fn delete(&self, receipts: &[String]) -> Result<()> {
        for entries in delete_batches(receipts)? {
            let count = entries.len();
            let output = self
                .sqs
                .delete_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| SqsError::Delete(e.to_string()))?;

            let failed = output.failed();
            if !failed.is_empty() {
                warn!(
                    failed = failed.len(),
                    attempted = count,
                    "Some processed messages could not be deleted"
                );
            }
        }

        Ok(())
    }
}

async fn resolve_queue_url(sqs: &SqsClient, queue_name: &str) -> Result<String> {
    let output = sqs
        .get_queue_url()
        .queue_name(queue_name)
        .send()
        .await
        .map_err(|e| SqsError::QueueUrl {
            queue: queue_name.to_string(),
            message: e.to_string(),
        })?;

    output
        .queue_url()
        .map(str::to_string)
        .ok_or_else(|| SqsError::QueueUrl {
            queue: queue_name.to_string(),
            message: "GetQueueUrl returned no URL".to_string(),
        })
}

/// Missing bodies become empty strings; the decoder rejects them.
fn to_raw_message(message: &Message) -> RawMessage {
    RawMessage {
        message_id: message.message_id().map(str::to_string),
        body: message.body().unwrap_or_default().to_string(),
    }
}

fn receipt_handles(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| m.receipt_handle().map(str::to_string))
        .collect()
}

/// Group receipt handles into DeleteMessageBatch requests.
fn delete_batches(receipts: &[String]) -> Result<Vec<Vec<DeleteMessageBatchRequestEntry>>> {
    receipts
        .chunks(MAX_DELETE_BATCH)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, receipt)| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(i.to_string())
                        .receipt_handle(receipt)
                        .build()
                        .map_err(|e| SqsError::Delete(e.to_string()))
                })
                .collect()
        })
        .collect()
}
