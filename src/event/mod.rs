//! Inbound platform events.
//!
//! This module contains:
//! - `RawMessage`: one undecoded message envelope as delivered by the transport
//! - `InboundEvent`: the decoded dataset event
//! - `GroupKey`: the (dataset, category) join key between events and subscribers
//! - Decoder and grouper stages of the dispatch pipeline

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

pub mod decoder;
pub mod grouper;

pub use decoder::{decode, decode_batch, MalformedEvent};
pub use grouper::{group, EventGroups, GroupedEvent};

/// Event type announcing a new dataset.
///
/// A new dataset implies subscription topology may have changed, so any
/// cached subscriber snapshot is treated as stale.
pub const CREATE_DATASET: &str = "CREATE_DATASET";

/// One undecoded message envelope from the inbound transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawMessage {
    /// Transport-assigned message id, used only for logging.
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    /// Message body as received.
    #[serde(default)]
    pub body: String,
}

impl RawMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            body: body.into(),
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Message id for log fields.
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("unknown")
    }
}

/// Batch trigger shape produced by the queue integration.
///
/// `{"Records": [{"messageId": "...", "body": "..."}, ...]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqsTriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<RawMessage>,
}

impl SqsTriggerEvent {
    pub fn into_batch(self) -> Vec<RawMessage> {
        self.records
    }
}

/// A decoded dataset event.
///
/// The payload is shared rather than copied: one event fans out to every
/// matching subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub organization_id: String,
    pub dataset_id: i64,
    pub event_category: String,
    pub event_type: String,
    pub payload: Arc<Value>,
}

impl InboundEvent {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.dataset_id, self.event_category.clone())
    }

    /// Whether this event invalidates cached subscriptions for its organization.
    pub fn forces_refresh(&self) -> bool {
        self.event_type == CREATE_DATASET
    }
}

/// Join key linking events to subscriber records within one organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub dataset_id: i64,
    pub event_category: String,
}

impl GroupKey {
    pub fn new(dataset_id: i64, event_category: impl Into<String>) -> Self {
        Self {
            dataset_id,
            event_category: event_category.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset_id, self.event_category)
    }
}

/// Render a payload as the text delivered to webhooks.
///
/// JSON strings are delivered verbatim, anything else as compact JSON.
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
