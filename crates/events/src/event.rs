use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use edumyles_core::{DomainError, EventId, TenantId};

/// Schema-less event payload (a JSON object).
///
/// The bus never interprets it; subscribers decode it with
/// [`Event::decode_data`] into whatever shape their event type uses.
pub type EventData = serde_json::Map<String, JsonValue>;

/// Correlation metadata carried alongside an event.
///
/// Not interpreted by the bus, passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// An event as supplied by a publisher: everything except `id` and `timestamp`.
///
/// This is the only shape `EventBus::publish` accepts, so callers cannot
/// forge ids or timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl NewEvent {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        tenant_id: impl Into<TenantId>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            tenant_id: tenant_id.into(),
            data: EventData::new(),
            metadata: None,
        }
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Set a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Serialize a typed payload into the event's data bag.
    ///
    /// The payload must serialize to a JSON object.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, DomainError> {
        match serde_json::to_value(payload) {
            Ok(JsonValue::Object(map)) => {
                self.data = map;
                Ok(self)
            }
            Ok(other) => Err(DomainError::validation(format!(
                "event payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(DomainError::validation(format!(
                "event payload serialization failed: {e}"
            ))),
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A published event: immutable once stamped.
///
/// Wire format (JSON): `{id, type, source, tenantId, timestamp, data, metadata?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    id: EventId,
    #[serde(rename = "type")]
    event_type: String,
    source: String,
    tenant_id: TenantId,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<EventMetadata>,
}

impl Event {
    /// Assign a fresh id and the current time. Only the bus stamps events.
    pub(crate) fn stamp(new: NewEvent) -> Self {
        Self::restore(EventId::new(), Utc::now(), new)
    }

    /// Rehydrate an event that was stamped earlier (e.g. read back from the
    /// durable log).
    pub fn restore(id: EventId, timestamp: DateTime<Utc>, new: NewEvent) -> Self {
        Self {
            id,
            event_type: new.event_type,
            source: new.source,
            tenant_id: new.tenant_id,
            timestamp,
            data: new.data,
            metadata: new.metadata,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn metadata(&self) -> Option<&EventMetadata> {
        self.metadata.as_ref()
    }

    /// Decode the payload into a subscriber-specific type.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(JsonValue::Object(self.data.clone()))
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct LoginData {
        user_id: String,
        email: String,
    }

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let event = Event::stamp(
            NewEvent::new("user.login", "auth", "t1").with_field("userId", "u1"),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "user.login");
        assert_eq!(value["tenantId"], "t1");
        assert_eq!(value["data"]["userId"], "u1");
        assert!(value.get("metadata").is_none());
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn decodes_messages_published_by_other_services() {
        let raw = json!({
            "id": "0190f4f4-8f3a-7c2e-9a51-4c1d2f0e5b6a",
            "type": "student.enrolled",
            "source": "student.controller",
            "tenantId": "school-1",
            "timestamp": "2024-08-01T09:30:00.123Z",
            "data": { "studentId": "s-9" },
            "metadata": { "correlationId": "c-1", "retryCount": 0 }
        });

        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type(), "student.enrolled");
        assert_eq!(event.tenant_id().as_str(), "school-1");
        assert_eq!(event.metadata().unwrap().correlation_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn typed_payload_round_trips_through_data() {
        let payload = LoginData {
            user_id: "u1".into(),
            email: "a@school.test".into(),
        };
        let event = Event::stamp(
            NewEvent::new("user.login", "auth", "t1")
                .with_payload(&payload)
                .unwrap(),
        );

        assert_eq!(event.decode_data::<LoginData>().unwrap(), payload);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = NewEvent::new("x.y", "test", "t1").with_payload(&42).unwrap_err();
        assert!(err.to_string().contains("number"));
    }
}
