//! Event grouping.
//!
//! Partitions a decoded batch by organization. Within an organization events
//! keep their arrival order, so every (dataset, category) group sees its
//! payloads in the order they arrived.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use super::{GroupKey, InboundEvent};

/// One event as seen by the planner: its join key and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedEvent {
    pub key: GroupKey,
    pub payload: Arc<Value>,
}

/// A batch partitioned by organization.
#[derive(Debug, Default)]
pub struct EventGroups {
    /// Events per organization, in arrival order.
    pub organizations: BTreeMap<String, Vec<GroupedEvent>>,
    /// True when any event in the batch is a dataset creation.
    pub force_refresh: bool,
}

impl EventGroups {
    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty()
    }

    pub fn organization_ids(&self) -> BTreeSet<String> {
        self.organizations.keys().cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.organizations.values().map(Vec::len).sum()
    }
}

/// Group events by organization and flag whether cached subscriptions must
/// be refreshed.
pub fn group(events: impl IntoIterator<Item = InboundEvent>) -> EventGroups {
    let mut groups = EventGroups::default();

    for event in events {
        groups.force_refresh |= event.forces_refresh();
        let key = event.key();
        groups
            .organizations
            .entry(event.organization_id)
            .or_default()
            .push(GroupedEvent {
                key,
                payload: event.payload,
            });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CREATE_DATASET;
    use serde_json::json;

    fn event(org: &str, dataset: i64, category: &str, payload: &str) -> InboundEvent {
        InboundEvent {
            organization_id: org.to_string(),
            dataset_id: dataset,
            event_category: category.to_string(),
            event_type: "UPDATE_DATASET".to_string(),
            payload: Arc::new(json!(payload)),
        }
    }

    fn payloads(events: &[GroupedEvent], key: &GroupKey) -> Vec<String> {
        events
            .iter()
            .filter(|e| &e.key == key)
            .map(|e| e.payload.as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_group_by_organization() {
        let groups = group(vec![
            event("a", 1, "X", "p1"),
            event("b", 1, "X", "p2"),
            event("a", 2, "Y", "p3"),
        ]);

        assert_eq!(groups.organizations.len(), 2);
        assert_eq!(groups.organizations["a"].len(), 2);
        assert_eq!(groups.organizations["b"].len(), 1);
        assert_eq!(groups.event_count(), 3);
        assert!(!groups.force_refresh);
    }

    #[test]
    fn test_group_preserves_arrival_order() {
        let groups = group(vec![
            event("a", 1, "X", "first"),
            event("a", 2, "X", "other"),
            event("a", 1, "X", "second"),
            event("b", 1, "X", "elsewhere"),
            event("a", 1, "X", "third"),
        ]);

        assert_eq!(
            payloads(&groups.organizations["a"], &GroupKey::new(1, "X")),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn test_create_dataset_forces_refresh() {
        let mut created = event("b", 9, "X", "new");
        created.event_type = CREATE_DATASET.to_string();

        let groups = group(vec![event("a", 1, "X", "p1"), created]);
        assert!(groups.force_refresh);
    }

    #[test]
    fn test_empty_batch() {
        let groups = group(Vec::new());
        assert!(groups.is_empty());
        assert!(!groups.force_refresh);
        assert!(groups.organization_ids().is_empty());
    }
}
