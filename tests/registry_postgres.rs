//! PostgreSQL registry integration tests using testcontainers.
//!
//! Run with: cargo test --test registry_postgres --features postgres -- --nocapture
//!
//! These tests spin up PostgreSQL in a container, create per-organization
//! registry schemas and check the subscriber query against them.

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};
use webhook_fanout::cache::SubscriptionCache;
use webhook_fanout::registry::{
    PostgresRegistry, RegistryError, SubscriberRecord, SubscriptionRegistry,
};

/// Start PostgreSQL container.
///
/// Returns (container, connection_string) where connection_string is suitable
/// for sqlx PgPool connection.
async fn start_postgres() -> (testcontainers::ContainerAsync<GenericImage>, String) {
    // PostgreSQL prints the readiness message twice: once during initial
    // setup and once when fully ready.
    let image = GenericImage::new("postgres", "16")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ));

    let container = image
        .with_env_var("POSTGRES_USER", "webhook")
        .with_env_var("POSTGRES_PASSWORD", "webhook")
        .with_env_var("POSTGRES_DB", "webhook")
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start postgres container");

    tokio::time::sleep(Duration::from_secs(1)).await;

    let host_port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get mapped port");

    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let connection_string = format!("postgres://webhook:webhook@{}:{}/webhook", host, host_port);

    println!("PostgreSQL available at: {}", connection_string);

    (container, connection_string)
}

async fn execute(pool: &sqlx::PgPool, statements: &[String]) {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .unwrap_or_else(|e| panic!("{statement}: {e}"));
    }
}

/// Create an organization schema holding two webhooks, one disabled.
///
/// Enabled webhook `{prefix}-a` listens to X and Y on dataset 10.
/// Disabled webhook `{prefix}-disabled` listens to X on dataset 10.
async fn create_organization(pool: &sqlx::PgPool, organization_id: &str, prefix: &str) {
    let s = format!("\"{}\"", organization_id);
    execute(
        pool,
        &[
            format!("CREATE SCHEMA {s}"),
            format!(
                "CREATE TABLE {s}.webhooks (id INTEGER PRIMARY KEY, api_url TEXT NOT NULL, is_disabled BOOLEAN NOT NULL DEFAULT FALSE)"
            ),
            format!("CREATE TABLE {s}.webhook_event_types (id INTEGER PRIMARY KEY, event_name TEXT NOT NULL)"),
            format!("CREATE TABLE {s}.webhook_event_subscriptions (webhook_id INTEGER NOT NULL, event_type_id INTEGER NOT NULL)"),
            format!("CREATE TABLE {s}.dataset_integrations (webhook_id INTEGER NOT NULL, dataset_id INTEGER NOT NULL)"),
            format!(
                "INSERT INTO {s}.webhooks VALUES (1, 'https://{prefix}-a.example', FALSE), (2, 'https://{prefix}-disabled.example', TRUE)"
            ),
            format!("INSERT INTO {s}.webhook_event_types VALUES (1, 'X'), (2, 'Y')"),
            format!("INSERT INTO {s}.webhook_event_subscriptions VALUES (1, 1), (1, 2), (2, 1)"),
            format!("INSERT INTO {s}.dataset_integrations VALUES (1, 10), (2, 10)"),
        ],
    )
    .await;
}

fn sorted(mut records: Vec<SubscriberRecord>) -> Vec<SubscriberRecord> {
    records.sort_by(|a, b| a.event_category.cmp(&b.event_category));
    records
}

#[tokio::test]
async fn test_postgres_registry() {
    println!("=== PostgreSQL SubscriptionRegistry Tests ===");
    println!("Starting PostgreSQL container...");

    let (_container, connection_string) = start_postgres().await;
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("Failed to connect to PostgreSQL");

    create_organization(&pool, "N:organization:1", "one").await;
    create_organization(&pool, "N:organization:2", "two").await;
    create_organization(&pool, "N:organization:3", "three").await;
    let s = "\"N:organization:3\"";
    execute(
        &pool,
        &[
            format!("ALTER TABLE {s}.webhooks ALTER COLUMN api_url DROP NOT NULL"),
            format!("INSERT INTO {s}.webhooks VALUES (3, NULL, FALSE)"),
            format!("INSERT INTO {s}.webhook_event_subscriptions VALUES (3, 1)"),
            format!("INSERT INTO {s}.dataset_integrations VALUES (3, 10)"),
        ],
    )
    .await;

    let registry = PostgresRegistry::new(pool.clone());

    println!("Testing disabled webhooks are excluded...");
    let records = sorted(registry.fetch_subscribers("N:organization:1").await.unwrap());
    assert_eq!(
        records,
        vec![
            SubscriberRecord::new("N:organization:1", 10, "X", "https://one-a.example"),
            SubscriberRecord::new("N:organization:1", 10, "Y", "https://one-a.example"),
        ]
    );

    println!("Testing organizations are isolated...");
    let records = registry.fetch_subscribers("N:organization:2").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.endpoint_url == "https://two-a.example"));

    println!("Testing undecodable rows are skipped...");
    let records = registry.fetch_subscribers("N:organization:3").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.endpoint_url == "https://three-a.example" && r.dataset_id == 10));

    println!("Testing unknown organization fails as unavailable...");
    let err = registry.fetch_subscribers("N:organization:404").await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)), "{err:?}");

    println!("Testing connections are returned after failures...");
    for _ in 0..20 {
        let _ = registry.fetch_subscribers("N:organization:404").await;
    }
    assert!(registry.fetch_subscribers("N:organization:1").await.is_ok());

    println!("=== All PostgreSQL SubscriptionRegistry tests PASSED ===");
}

#[tokio::test]
async fn test_postgres_registry_behind_cache() {
    println!("=== PostgreSQL registry behind SubscriptionCache ===");

    let (_container, connection_string) = start_postgres().await;
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("Failed to connect to PostgreSQL");
    create_organization(&pool, "org", "cached").await;

    let registry = Arc::new(PostgresRegistry::new(pool.clone()));
    let cache = SubscriptionCache::new(
        registry as Arc<dyn SubscriptionRegistry>,
        Duration::from_secs(600),
    );

    let first = cache.get("org", false).await;
    assert_eq!(first.len(), 2);

    println!("Testing stale snapshot is served when the schema disappears...");
    execute(&pool, &["DROP SCHEMA \"org\" CASCADE".to_string()]).await;
    let stale = cache.get("org", true).await;
    assert_eq!(stale.len(), 2);

    println!("=== SubscriptionCache over PostgreSQL PASSED ===");
}
