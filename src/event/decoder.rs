//! Event decoding.
//!
//! Inbound bodies may arrive double-wrapped: the queue body is a
//! notification envelope whose string `Message` field holds the actual
//! event envelope. Bodies may also carry literal `\n` escape sequences
//! (backslash followed by `n`) that break JSON decoding; these are stripped
//! before each decode stage. A body with no `Message` field is decoded as
//! the event envelope directly.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{InboundEvent, RawMessage};

/// Literal escape sequence removed from bodies before decoding.
const LITERAL_NEWLINE: &str = "\\n";

/// Field of a notification envelope that wraps the event envelope.
const NOTIFICATION_MESSAGE_FIELD: &str = "Message";

/// Errors that make a message undecodable.
#[derive(Debug, thiserror::Error)]
pub enum MalformedEvent {
    #[error("invalid transport envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("invalid event envelope: {0}")]
    InvalidNotification(#[source] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid datasetId: {0}")]
    InvalidDatasetId(String),
}

/// Event envelope as published by the platform.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope {
    organization_id: Option<String>,
    dataset_id: Option<DatasetId>,
    event_category: Option<String>,
    event_type: Option<String>,
    #[serde(alias = "detail")]
    event_detail: Option<Value>,
}

/// Dataset ids are published as numeric strings; integers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DatasetId {
    Number(i64),
    Text(String),
}

impl DatasetId {
    fn parse(self) -> Result<i64, MalformedEvent> {
        match self {
            DatasetId::Number(n) => Ok(n),
            DatasetId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| MalformedEvent::InvalidDatasetId(s)),
        }
    }
}

/// A message that failed to decode.
#[derive(Debug)]
pub struct RejectedMessage {
    pub message_id: Option<String>,
    pub error: MalformedEvent,
}

/// Outcome of decoding a batch: well-formed events in arrival order plus
/// the rejected messages.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub events: Vec<InboundEvent>,
    pub rejected: Vec<RejectedMessage>,
}

fn strip_literal_newlines(text: &str) -> String {
    text.replace(LITERAL_NEWLINE, "")
}

/// Decode one raw message into an event.
pub fn decode(message: &RawMessage) -> Result<InboundEvent, MalformedEvent> {
    let outer: Value = serde_json::from_str(&strip_literal_newlines(&message.body))
        .map_err(MalformedEvent::InvalidEnvelope)?;

    let envelope: EventEnvelope = match outer.get(NOTIFICATION_MESSAGE_FIELD) {
        Some(Value::String(inner)) => serde_json::from_str(&strip_literal_newlines(inner))
            .map_err(MalformedEvent::InvalidNotification)?,
        _ => serde_json::from_value(outer).map_err(MalformedEvent::InvalidNotification)?,
    };

    into_event(envelope)
}

fn into_event(envelope: EventEnvelope) -> Result<InboundEvent, MalformedEvent> {
    let organization_id = envelope
        .organization_id
        .filter(|s| !s.is_empty())
        .ok_or(MalformedEvent::MissingField("organizationId"))?;
    let dataset_id = envelope
        .dataset_id
        .ok_or(MalformedEvent::MissingField("datasetId"))?
        .parse()?;
    let event_category = envelope
        .event_category
        .filter(|s| !s.is_empty())
        .ok_or(MalformedEvent::MissingField("eventCategory"))?;
    let payload = envelope
        .event_detail
        .ok_or(MalformedEvent::MissingField("eventDetail"))?;

    Ok(InboundEvent {
        organization_id,
        dataset_id,
        event_category,
        event_type: envelope.event_type.unwrap_or_default(),
        payload: Arc::new(payload),
    })
}

/// Decode a batch, isolating failures per message.
///
/// Malformed messages are logged and collected; they never abort the batch.
pub fn decode_batch(messages: &[RawMessage]) -> DecodedBatch {
    let mut decoded = DecodedBatch::default();

    for message in messages {
        match decode(message) {
            Ok(event) => decoded.events.push(event),
            Err(error) => {
                warn!(
                    message_id = %message.id(),
                    error = %error,
                    "Skipping malformed event"
                );
                decoded.rejected.push(RejectedMessage {
                    message_id: message.message_id.clone(),
                    error,
                });
            }
        }
    }

    decoded
}
