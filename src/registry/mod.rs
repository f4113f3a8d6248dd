//! Webhook subscription registry.
//!
//! This module contains:
//! - `SubscriberRecord`: one registered webhook bound to a dataset and event category
//! - `SubscriptionRegistry` trait: source of truth for an organization's subscriptions
//! - Implementations: Postgres, Mock

use std::time::Duration;

use async_trait::async_trait;

use crate::event::GroupKey;

pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

pub use mock::MockRegistry;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistry;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while querying the registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry query timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid registry row: {0}")]
    InvalidRow(String),
}

impl RegistryError {
    /// Connectivity problems may clear up on retry; bad data will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_) | RegistryError::Timeout(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => RegistryError::Unavailable("connection pool timed out".into()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => RegistryError::InvalidRow(err.to_string()),
            other => RegistryError::Unavailable(other.to_string()),
        }
    }
}

/// One registered webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberRecord {
    pub organization_id: String,
    pub dataset_id: i64,
    pub event_category: String,
    pub endpoint_url: String,
}

impl SubscriberRecord {
    pub fn new(
        organization_id: impl Into<String>,
        dataset_id: i64,
        event_category: impl Into<String>,
        endpoint_url: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            dataset_id,
            event_category: event_category.into(),
            endpoint_url: endpoint_url.into(),
        }
    }

    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.dataset_id, self.event_category.clone())
    }
}

/// Source of an organization's current webhook subscriptions.
///
/// Implementations return the complete list for the organization and must
/// exclude disabled subscriptions themselves.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    async fn fetch_subscribers(&self, organization_id: &str) -> Result<Vec<SubscriberRecord>>;

    /// Registry name for logging.
    fn name(&self) -> &str;
}
