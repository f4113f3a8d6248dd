//! webhook-dispatcher: SQS-fed webhook fan-out
//!
//! Long-polls the webhook queue, resolves each organization's subscriptions
//! from the Postgres registry (through the subscription cache) and POSTs
//! matching event payloads to subscriber endpoints.
//!
//! ## Architecture
//! ```text
//! [SQS webhook queue] --> [webhook-dispatcher] --(HTTP POST)--> [subscriber endpoints]
//!                                 |
//!                                 v
//!                       [Postgres registry]
//! ```
//!
//! ## Configuration
//! - First argument: optional path to a YAML config file
//! - WEBHOOK_CONFIG: config file path (overrides the argument)
//! - WEBHOOK__<SECTION>__<KEY>: individual settings
//! - DATABASE_URL: registry connection string fallback
//! - WEBHOOK_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use webhook_fanout::broadcast::{Broadcaster, HttpWebhookClient};
use webhook_fanout::cache::SubscriptionCache;
use webhook_fanout::config::Config;
use webhook_fanout::inbound::SqsConsumer;
use webhook_fanout::pipeline::WebhookPipeline;
use webhook_fanout::registry::PostgresRegistry;
use webhook_fanout::utils::bootstrap::{connect_with_retry, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    init_tracing(config.logging.format);

    let registry = connect_with_retry("registry", || PostgresRegistry::connect(&config.registry)).await?;
    let cache = Arc::new(SubscriptionCache::from_config(
        Arc::new(registry),
        &config.cache,
        &config.registry,
    ));

    let client = HttpWebhookClient::from_config(&config.delivery)?;
    let broadcaster = Broadcaster::from_config(Arc::new(client), &config.delivery);
    let pipeline = WebhookPipeline::from_config(cache, broadcaster, &config.pipeline);

    let consumer = SqsConsumer::connect(&config.inbound, &config.environment).await?;

    info!(
        environment = %config.environment,
        queue_url = %consumer.queue_url(),
        cache_ttl_secs = config.cache.ttl_secs,
        "webhook-dispatcher started"
    );

    consumer
        .run(&pipeline, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await;

    Ok(())
}
