//! Bootstrap utilities for the dispatcher binary.

use std::future::Future;
use std::time::Duration;

use backon::Retryable;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::retry::connection_backoff;
use crate::config::{LogFormat, LOG_ENV_VAR};

/// Initialize tracing with the WEBHOOK_LOG environment variable.
///
/// Defaults to "info" level if WEBHOOK_LOG is not set.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Establish a connection with exponential backoff retry.
///
/// Every error is retried until the backoff gives up; the last error is
/// returned.
pub async fn connect_with_retry<T, E, F, Fut>(service_name: &str, connect: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(connection_backoff())
        .notify(|e: &E, delay: Duration| {
            warn!(
                service = %service_name,
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Connection failed, retrying"
            );
        })
        .await;

    match &result {
        Ok(_) => info!(service = %service_name, "Connected"),
        Err(e) => error!(service = %service_name, error = %e, "Giving up on connection"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_recovers() {
        let attempts = AtomicUsize::new(0);
        let counter = &attempts;

        let result: Result<&str, String> = connect_with_retry("registry", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("connection refused".to_string())
            } else {
                Ok("connected")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_gives_up() {
        let attempts = AtomicUsize::new(0);
        let counter = &attempts;

        let result: Result<(), String> = connect_with_retry("registry", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("connection refused".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 31);
    }
}
