//! The envelope: Tether's unit of application-level messaging.
//!
//! Every frame on the wire is `{"type": <string>, "payload": <any>}`.
//! The `type` routes the message (built-in behaviors or registered
//! handler bindings); the `payload` is opaque at this layer and only
//! gains meaning once a [`PayloadSchema`](crate::PayloadSchema) looks
//! at it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// A parsed `{type, payload}` message.
///
/// Envelopes are transient: one is constructed per inbound frame,
/// dispatched, and dropped. Nothing persists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type, used for routing. `type` on the wire.
    ///
    /// Defaults to the empty string when the key is absent — such an
    /// envelope matches no built-in and no binding, but it still flows
    /// through dispatch like any other object frame.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// The message body. `Value::Null` when the key is absent.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates an outbound envelope.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parses a raw text frame into an envelope.
    ///
    /// Succeeds if and only if `raw` is valid JSON **and** the top-level
    /// value is a plain key-value object. Arrays, scalars, `null`, and
    /// malformed input all fail with [`ProtocolError::NonJson`].
    ///
    /// No side effects — this is a pure function of its input.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|_| ProtocolError::NonJson)?;
        if !value.is_object() {
            return Err(ProtocolError::NonJson);
        }
        // A non-string "type" key is as unusable as a non-object frame.
        serde_json::from_value(value).map_err(|_| ProtocolError::NonJson)
    }

    /// Serializes the envelope to its wire form.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =====================================================================
    // parse() — accepted input
    // =====================================================================

    #[test]
    fn test_parse_object_frame_returns_envelope() {
        let env = Envelope::parse(r#"{"type":"chat","payload":{"n":1}}"#)
            .expect("should parse");
        assert_eq!(env.kind, "chat");
        assert_eq!(env.payload, json!({"n": 1}));
    }

    #[test]
    fn test_parse_missing_payload_defaults_to_null() {
        let env = Envelope::parse(r#"{"type":"ping"}"#).expect("should parse");
        assert_eq!(env.kind, "ping");
        assert!(env.payload.is_null());
    }

    #[test]
    fn test_parse_missing_type_defaults_to_empty_string() {
        // An object frame without a "type" key still parses — it just
        // won't match any route downstream.
        let env = Envelope::parse(r#"{"payload":42}"#).expect("should parse");
        assert_eq!(env.kind, "");
        assert_eq!(env.payload, json!(42));
    }

    #[test]
    fn test_parse_ignores_extra_keys() {
        let env = Envelope::parse(r#"{"type":"x","payload":1,"seq":9}"#)
            .expect("should parse");
        assert_eq!(env.kind, "x");
    }

    // =====================================================================
    // parse() — rejected input
    // =====================================================================

    #[test]
    fn test_parse_malformed_json_fails_non_json() {
        let result = Envelope::parse("not json");
        assert!(matches!(result, Err(ProtocolError::NonJson)));
    }

    #[test]
    fn test_parse_empty_string_fails_non_json() {
        assert!(matches!(Envelope::parse(""), Err(ProtocolError::NonJson)));
    }

    #[test]
    fn test_parse_array_fails_non_json() {
        let result = Envelope::parse(r#"[{"type":"x"}]"#);
        assert!(matches!(result, Err(ProtocolError::NonJson)));
    }

    #[test]
    fn test_parse_scalar_fails_non_json() {
        for raw in [r#""hello""#, "42", "true", "null"] {
            assert!(
                matches!(Envelope::parse(raw), Err(ProtocolError::NonJson)),
                "scalar frame {raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_non_string_type_fails_non_json() {
        let result = Envelope::parse(r#"{"type":5,"payload":{}}"#);
        assert!(matches!(result, Err(ProtocolError::NonJson)));
    }

    // =====================================================================
    // Round trip
    // =====================================================================

    #[test]
    fn test_round_trip_preserves_type_and_payload() {
        let original = Envelope::new(
            "orderUpdate",
            json!({"id": "o-1", "items": [1, 2, 3], "note": null}),
        );
        let text = original.to_text().expect("should encode");
        let parsed = Envelope::parse(&text).expect("should parse back");
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_to_text_wire_shape() {
        // The wire format carries exactly two keys: "type" and "payload".
        let text = Envelope::new("pong", Value::Null).to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "pong", "payload": null}));
    }
}
