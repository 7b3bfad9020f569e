//! Envelopes exchanged with the broker.
//!
//! Both directions are JSON objects. The outbound envelope names the operation
//! and the queue the reply must go to; the inbound envelope only echoes the
//! correlation ID and carries the result (or an `"error"` key).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CorrelationId;

/// Key a remote service uses to report failure instead of a result.
pub const ERROR_KEY: &str = "error";

/// Request envelope published to a remote service queue.
///
/// Immutable once built. `target_queue` is the publish destination and is not
/// part of the serialized body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    pub id: CorrelationId,
    pub message_type: String,
    pub message_data: Map<String, Value>,
    pub reply_to: String,
    #[serde(skip)]
    pub target_queue: String,
}

impl OutboundEnvelope {
    pub fn new(
        id: CorrelationId,
        target_queue: impl Into<String>,
        message_type: impl Into<String>,
        message_data: Map<String, Value>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            id,
            message_type: message_type.into(),
            message_data,
            reply_to: reply_to.into(),
            target_queue: target_queue.into(),
        }
    }

    /// Encode the envelope body for publishing.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Reply envelope consumed from this service's reply queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub id: CorrelationId,
    #[serde(default)]
    pub message_data: Map<String, Value>,
}

impl InboundEnvelope {
    pub fn new(id: CorrelationId, message_data: Map<String, Value>) -> Self {
        Self { id, message_data }
    }

    /// Decode a raw reply body.
    ///
    /// Fails if the body is not JSON, or if `id` is missing or not a
    /// correlation ID this process could have issued.
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    /// The remote failure message, if the reply carries one.
    ///
    /// Non-string error values are rendered as their JSON text so nothing the
    /// remote side reported is lost.
    pub fn remote_error(&self) -> Option<String> {
        match self.message_data.get(ERROR_KEY)? {
            Value::String(message) => Some(message.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test data must be an object"),
        }
    }

    #[test]
    fn outbound_body_has_wire_fields_only() {
        let id = CorrelationId::generate();
        let envelope = OutboundEnvelope::new(
            id,
            "organization.requests",
            "find_organization_by_id",
            data(json!({"organization_id": "org-1"})),
            "manpower.replies",
        );

        let body: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "id": id.to_string(),
                "message_type": "find_organization_by_id",
                "message_data": {"organization_id": "org-1"},
                "reply_to": "manpower.replies",
            })
        );
        assert!(body.get("target_queue").is_none());
    }

    #[test]
    fn inbound_decodes_reply() {
        let id = CorrelationId::generate();
        let raw = json!({
            "id": id.to_string(),
            "message_data": {"organization_id": "org-1", "name": "Acme"}
        })
        .to_string();

        let envelope = InboundEnvelope::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.message_data["name"], "Acme");
        assert_eq!(envelope.remote_error(), None);
    }

    #[test]
    fn inbound_missing_message_data_is_empty() {
        let id = CorrelationId::generate();
        let raw = format!(r#"{{"id":"{id}"}}"#);
        let envelope = InboundEnvelope::from_slice(raw.as_bytes()).unwrap();
        assert!(envelope.message_data.is_empty());
    }

    #[test]
    fn inbound_ignores_unknown_fields() {
        let id = CorrelationId::generate();
        let raw = json!({"id": id.to_string(), "message_data": {}, "trace": "x"}).to_string();
        assert!(InboundEnvelope::from_slice(raw.as_bytes()).is_ok());
    }

    #[test]
    fn inbound_rejects_malformed_bodies() {
        assert!(InboundEnvelope::from_slice(b"not json").is_err());
        assert!(InboundEnvelope::from_slice(br#"{"message_data":{}}"#).is_err());
        assert!(InboundEnvelope::from_slice(br#"{"id":17,"message_data":{}}"#).is_err());
    }

    #[test]
    fn remote_error_prefers_string_message() {
        let envelope = InboundEnvelope::new(
            CorrelationId::generate(),
            data(json!({"error": "not found"})),
        );
        assert_eq!(envelope.remote_error().as_deref(), Some("not found"));
    }

    #[test]
    fn remote_error_renders_structured_values() {
        let envelope = InboundEnvelope::new(
            CorrelationId::generate(),
            data(json!({"error": {"code": 404}})),
        );
        assert_eq!(envelope.remote_error().as_deref(), Some(r#"{"code":404}"#));
    }
}
