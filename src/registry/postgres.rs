//! PostgreSQL SubscriptionRegistry implementation.
//!
//! Each organization's registry tables live in a schema named after the
//! organization id. The schema name is emitted as a quoted identifier by the
//! query builder; all values are bound as parameters.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{Alias, Expr, PostgresQueryBuilder, Query};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use super::schema::{DatasetIntegrations, WebhookEventSubscriptions, WebhookEventTypes, Webhooks};
use super::{RegistryError, Result, SubscriberRecord, SubscriptionRegistry};
use crate::config::RegistryConfig;

/// Postgres-backed subscription registry.
pub struct PostgresRegistry {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresRegistry {
    /// Create a registry over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: RegistryConfig::default().query_timeout(),
        }
    }

    /// Bound each registry query.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Open a connection pool and wrap it.
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.database_url)
            .await?;

        Ok(Self::new(pool).with_query_timeout(config.query_timeout()))
    }
}

/// Build the subscriber query for one organization.
///
/// Joins webhooks to their subscribed event types and integrated datasets,
/// excluding disabled webhooks. `dataset_id` is widened to BIGINT so both
/// INTEGER and BIGINT key columns decode.
pub(crate) fn subscriber_query(organization_id: &str) -> (String, SqlxValues) {
    let schema = Alias::new(organization_id);

    Query::select()
        .column((Webhooks::Table, Webhooks::ApiUrl))
        .column((WebhookEventTypes::Table, WebhookEventTypes::EventName))
        .expr_as(
            Expr::col((DatasetIntegrations::Table, DatasetIntegrations::DatasetId))
                .cast_as(Alias::new("BIGINT")),
            DatasetIntegrations::DatasetId,
        )
        .from((schema.clone(), Webhooks::Table))
        .inner_join(
            (schema.clone(), WebhookEventSubscriptions::Table),
            Expr::col((
                WebhookEventSubscriptions::Table,
                WebhookEventSubscriptions::WebhookId,
            ))
            .equals((Webhooks::Table, Webhooks::Id)),
        )
        .inner_join(
            (schema.clone(), WebhookEventTypes::Table),
            Expr::col((WebhookEventTypes::Table, WebhookEventTypes::Id)).equals((
                WebhookEventSubscriptions::Table,
                WebhookEventSubscriptions::EventTypeId,
            )),
        )
        .inner_join(
            (schema, DatasetIntegrations::Table),
            Expr::col((DatasetIntegrations::Table, DatasetIntegrations::WebhookId))
                .equals((Webhooks::Table, Webhooks::Id)),
        )
        .and_where(Expr::col((Webhooks::Table, Webhooks::IsDisabled)).eq(false))
        .build_sqlx(PostgresQueryBuilder)
}

fn decode_row(organization_id: &str, row: &PgRow) -> Result<SubscriberRecord> {
    Ok(SubscriberRecord {
        organization_id: organization_id.to_string(),
        endpoint_url: row.try_get("api_url")?,
        event_category: row.try_get("event_name")?,
        dataset_id: row.try_get("dataset_id")?,
    })
}

#[async_trait]
impl SubscriptionRegistry for PostgresRegistry {
    async fn fetch_subscribers(&self, organization_id: &str) -> Result<Vec<SubscriberRecord>> {
        let (sql, values) = subscriber_query(organization_id);

        // The connection is returned to the pool when `conn` drops, on every path.
        let query = async {
            let mut conn = self.pool.acquire().await?;
            let rows = sqlx::query_with(&sql, values).fetch_all(&mut *conn).await?;
            Ok::<_, RegistryError>(rows)
        };

        let rows = tokio::time::timeout(self.query_timeout, query)
            .await
            .map_err(|_| RegistryError::Timeout(self.query_timeout))??;

        let records: Vec<SubscriberRecord> = rows
            .iter()
            .filter_map(|row| match decode_row(organization_id, row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        organization_id = %organization_id,
                        error = %e,
                        "Skipping undecodable subscription row"
                    );
                    None
                }
            })
            .collect();

        debug!(
            organization_id = %organization_id,
            subscribers = records.len(),
            "Loaded webhook subscriptions"
        );

        Ok(records)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
