//! Event envelopes and their `text/event-stream` wire framing.

use std::fmt::Debug;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

/// A stamped, immutable unit of data delivered through a mailbox.
///
/// Serializes flat: `{"id", "timestamp", "type", ...payload fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The `type` discriminator and its type-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ConnectionEstablished,
    ContentStatusUpdate(ContentStatusUpdate),
    Heartbeat,
}

impl EventKind {
    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ConnectionEstablished => "connection_established",
            EventKind::ContentStatusUpdate(_) => "content_status_update",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

/// Processing-state change for a single content item.
///
/// Optional fields are always present on the wire, as `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContentStatusUpdate {
    pub content_id: String,
    pub status: String,
    pub title: Option<String>,
    pub error_message: Option<String>,
    pub progress: Option<f64>,
}

impl Envelope {
    /// Stamp a payload with a fresh UUID and the current UTC instant.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn connection_established() -> Self {
        Self::new(EventKind::ConnectionEstablished)
    }

    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat)
    }

    pub fn content_status(update: ContentStatusUpdate) -> Self {
        Self::new(EventKind::ContentStatusUpdate(update))
    }

    /// Serialize to JSON. Non-ASCII text is emitted as-is.
    ///
    /// A payload value that cannot be represented in JSON does not fail the
    /// envelope: that value alone is carried as its string form.
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(
                    envelope_id = %self.id,
                    event_type = self.kind.name(),
                    error = %err,
                    "envelope not representable as JSON, rendering field by field"
                );
                self.fallback_json()
            }
        }
    }

    /// Frame for the wire: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    /// Field-by-field rendering used when whole-envelope serialization fails.
    fn fallback_json(&self) -> String {
        let mut object = Map::new();
        object.insert("id".into(), Value::String(self.id.to_string()));
        object.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        object.insert("type".into(), Value::String(self.kind.name().into()));
        if let EventKind::ContentStatusUpdate(update) = &self.kind {
            object.insert("content_id".into(), value_or_string(&update.content_id));
            object.insert("status".into(), value_or_string(&update.status));
            object.insert("title".into(), value_or_string(&update.title));
            object.insert("error_message".into(), value_or_string(&update.error_message));
            object.insert("progress".into(), value_or_string(&update.progress));
        }
        Value::Object(object).to_string()
    }
}

/// JSON form of `value`, or its `Debug` string when it has none.
fn value_or_string<T: Serialize + Debug>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "payload value not representable as JSON, using string form");
        Value::String(format!("{value:?}"))
    })
}
