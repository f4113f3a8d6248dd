//! HTTP webhook client.
//!
//! POSTs `{"text": ...}` with `application/json` content type. Retries are
//! left to the `Broadcaster`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{DeliveryFailure, WebhookClient, WebhookMessage};
use crate::config::DeliveryConfig;

/// reqwest-backed webhook client.
pub struct HttpWebhookClient {
    client: Client,
}

impl HttpWebhookClient {
    /// Create a client with the given connect and whole-request timeouts.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }

    pub fn from_config(config: &DeliveryConfig) -> reqwest::Result<Self> {
        Self::new(config.connect_timeout(), config.request_timeout())
    }
}

fn classify(err: reqwest::Error) -> DeliveryFailure {
    if err.is_timeout() {
        DeliveryFailure::Timeout
    } else if err.is_connect() {
        DeliveryFailure::Connect(err.to_string())
    } else {
        DeliveryFailure::Transport(err.to_string())
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn post(
        &self,
        endpoint_url: &str,
        message: &WebhookMessage,
    ) -> Result<(), DeliveryFailure> {
        let response = self
            .client
            .post(endpoint_url)
            .json(message)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint = %endpoint_url, status = %status, "Webhook delivered");
            Ok(())
        } else {
            Err(DeliveryFailure::Status {
                status: status.as_u16(),
            })
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
