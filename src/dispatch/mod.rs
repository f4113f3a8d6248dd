//! Dispatch planning.
//!
//! Joins one organization's grouped events against its subscriber snapshot.
//! Subscribers are indexed once into a multimap keyed by `GroupKey`; every
//! event payload is then paired with each endpoint listening on its key.
//! Keys nobody listens on produce nothing.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::event::{GroupKey, GroupedEvent};
use crate::registry::SubscriberRecord;

/// One outbound webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTask {
    pub organization_id: String,
    pub endpoint_url: String,
    pub payload: Arc<Value>,
}

/// Endpoints per join key, deduplicated, in registry order.
fn index_subscribers(subscribers: &[SubscriberRecord]) -> HashMap<GroupKey, Vec<&str>> {
    let mut index: HashMap<GroupKey, Vec<&str>> = HashMap::new();
    for subscriber in subscribers {
        let endpoints = index.entry(subscriber.key()).or_default();
        if !endpoints.contains(&subscriber.endpoint_url.as_str()) {
            endpoints.push(&subscriber.endpoint_url);
        }
    }
    index
}

/// Produce the delivery tasks for one organization.
///
/// Emits one task per (payload, matching endpoint) pair. The result is a set;
/// callers must not rely on its order.
pub fn plan(
    organization_id: &str,
    events: &[GroupedEvent],
    subscribers: &[SubscriberRecord],
) -> Vec<DeliveryTask> {
    if events.is_empty() || subscribers.is_empty() {
        return Vec::new();
    }

    let index = index_subscribers(subscribers);

    events
        .iter()
        .filter_map(|event| index.get(&event.key).map(|endpoints| (event, endpoints)))
        .flat_map(|(event, endpoints)| {
            endpoints.iter().map(move |endpoint| DeliveryTask {
                organization_id: organization_id.to_string(),
                endpoint_url: (*endpoint).to_string(),
                payload: event.payload.clone(),
            })
        })
        .collect()
}
