//! Registry schema definitions using sea-query.
//!
//! Every organization owns a Postgres schema named after its id; these
//! identifiers are qualified with that schema at query time.

use sea_query::Iden;

/// Registered webhook endpoints.
#[derive(Iden)]
pub enum Webhooks {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "api_url"]
    ApiUrl,
    #[iden = "is_disabled"]
    IsDisabled,
}

/// Event types a webhook is subscribed to.
#[derive(Iden)]
#[iden = "webhook_event_subscriptions"]
pub enum WebhookEventSubscriptions {
    Table,
    #[iden = "webhook_id"]
    WebhookId,
    #[iden = "event_type_id"]
    EventTypeId,
}

/// Event type definitions.
#[derive(Iden)]
#[iden = "webhook_event_types"]
pub enum WebhookEventTypes {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_name"]
    EventName,
}

/// Links between webhooks and the datasets they are integrated with.
#[derive(Iden)]
pub enum DatasetIntegrations {
    Table,
    #[iden = "webhook_id"]
    WebhookId,
    #[iden = "dataset_id"]
    DatasetId,
}
