//! Envelope types for the homehub event bus

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while normalizing a bus payload into an [`Envelope`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not a valid envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for payload decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Event tag carried by every envelope
///
/// The tag selects which handler branch a component runs. Tags this crate
/// does not know about are preserved as [`EventTag::Other`] so handlers can
/// ignore them without failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventTag {
    ControlUpdate,
    Message,
    Clear,
    ClearQueue,
    Timelapse,
    StateChanged,
    MessageQueued,
    Other(String),
}

impl EventTag {
    /// Get the tag as it appears on the wire
    pub fn as_str(&self) -> &str {
        match self {
            EventTag::ControlUpdate => "ControlUpdate",
            EventTag::Message => "Message",
            EventTag::Clear => "Clear",
            EventTag::ClearQueue => "ClearQueue",
            EventTag::Timelapse => "Timelapse",
            EventTag::StateChanged => "StateChanged",
            EventTag::MessageQueued => "MessageQueued",
            EventTag::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventTag {
    fn from(s: &str) -> Self {
        match s {
            "ControlUpdate" => EventTag::ControlUpdate,
            "Message" => EventTag::Message,
            "Clear" => EventTag::Clear,
            "ClearQueue" => EventTag::ClearQueue,
            "Timelapse" => EventTag::Timelapse,
            "StateChanged" => EventTag::StateChanged,
            "MessageQueued" => EventTag::MessageQueued,
            other => EventTag::Other(other.to_string()),
        }
    }
}

impl From<String> for EventTag {
    fn from(s: String) -> Self {
        EventTag::from(s.as_str())
    }
}

impl From<EventTag> for String {
    fn from(tag: EventTag) -> Self {
        tag.as_str().to_string()
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged message flowing over the bus: `{"event": ..., "data": ...}`
///
/// Envelopes are immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The event tag
    pub event: EventTag,

    /// The event payload
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(event: impl Into<EventTag>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize the envelope to its JSON wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        // An Envelope is always representable as JSON
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// A payload as delivered by the bus
///
/// Publishers may hand the bus either an encoded message or a ready-made
/// envelope. Every handler goes through [`BusPayload::decode`], so a
/// structured envelope is never decoded twice.
#[derive(Debug, Clone, PartialEq)]
pub enum BusPayload {
    /// Encoded bytes, expected to be a UTF-8 JSON envelope
    Raw(Vec<u8>),
    /// An already-structured envelope
    Decoded(Envelope),
}

impl BusPayload {
    /// Normalize the payload into an envelope
    pub fn decode(self) -> DecodeResult<Envelope> {
        match self {
            BusPayload::Decoded(envelope) => Ok(envelope),
            BusPayload::Raw(bytes) => {
                let text = std::str::from_utf8(&bytes)?;
                Ok(serde_json::from_str(text)?)
            }
        }
    }
}

impl From<Envelope> for BusPayload {
    fn from(envelope: Envelope) -> Self {
        BusPayload::Decoded(envelope)
    }
}

impl From<Vec<u8>> for BusPayload {
    fn from(bytes: Vec<u8>) -> Self {
        BusPayload::Raw(bytes)
    }
}

impl From<String> for BusPayload {
    fn from(text: String) -> Self {
        BusPayload::Raw(text.into_bytes())
    }
}

impl From<&str> for BusPayload {
    fn from(text: &str) -> Self {
        BusPayload::Raw(text.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_raw_envelope() {
        let payload = BusPayload::from(r#"{"event": "ControlUpdate", "data": {"switch_1": 1}}"#);
        let envelope = payload.decode().unwrap();
        assert_eq!(envelope.event, EventTag::ControlUpdate);
        assert_eq!(envelope.data["switch_1"], 1);
    }

    #[test]
    fn test_decoded_payload_passes_through() {
        // A string data field must stay a string, not get decoded again
        let envelope = Envelope::new("StateChanged", json!("{\"nested\": true}"));
        let decoded = BusPayload::from(envelope.clone()).decode().unwrap();
        assert_eq!(decoded, envelope);
        assert!(decoded.data.is_string());
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let envelope = BusPayload::from(r#"{"event": "SomethingElse"}"#)
            .decode()
            .unwrap();
        assert_eq!(envelope.event, EventTag::Other("SomethingElse".to_string()));
        assert!(envelope.data.is_null());
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(matches!(
            BusPayload::Raw(vec![0xff, 0xfe]).decode(),
            Err(DecodeError::Utf8(_))
        ));
        assert!(matches!(
            BusPayload::from("not json").decode(),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            BusPayload::from(r#"{"data": {}}"#).decode(),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_wire_format() {
        let envelope = Envelope::new(EventTag::MessageQueued, json!({"message": "hi"}));
        let value: serde_json::Value = serde_json::from_slice(&envelope.to_bytes()).unwrap();
        assert_eq!(value, json!({"event": "MessageQueued", "data": {"message": "hi"}}));
    }
}
