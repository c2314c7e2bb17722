//! Wire Protocol
//!
//! Payloads exchanged with the client transport:
//!
//! - [`InboundEvent`]: `{handler_path, args, session_id}`
//! - [`OutboundDelta`]: `{session_id, patch, final, error?}`
//!
//! Both are encoded as JSON or MessagePack, selected by [`WireFormat`].
//! MessagePack structs are written as maps so field names survive.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::delta::Delta;
use crate::error::ProtocolError;
use crate::event::{Event, StateUpdate};
use crate::value::Value;

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// `"<container path>.<handler name>"`
    pub handler_path: String,
    #[serde(default)]
    pub args: Vec<Value>,
    pub session_id: String,
}

impl InboundEvent {
    pub fn new(
        session_id: impl Into<String>,
        handler_path: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            handler_path: handler_path.into(),
            args,
            session_id: session_id.into(),
        }
    }

    pub fn into_event(self) -> (String, Event) {
        (self.session_id, Event::new(self.handler_path, self.args))
    }
}

/// A patch sent to a client. An empty patch means nothing observable changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundDelta {
    pub session_id: String,
    pub patch: Delta,
    /// True on the last delta produced for an inbound event.
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutboundDelta {
    pub fn from_update(session_id: &str, update: StateUpdate) -> Self {
        Self {
            session_id: session_id.to_string(),
            patch: update.delta,
            is_final: update.is_final,
            error: update.error,
        }
    }

    /// A final, patch-less delta carrying only an error.
    pub fn error(session_id: &str, error: impl ToString) -> Self {
        Self {
            session_id: session_id.to_string(),
            patch: Delta::new(),
            is_final: true,
            error: Some(error.to_string()),
        }
    }
}

/// Encoding used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireFormat {
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl WireFormat {
    pub fn encode<T: Serialize>(self, payload: &T) -> Result<Vec<u8>, ProtocolError> {
        Ok(match self {
            WireFormat::Json => serde_json::to_vec(payload)?,
            WireFormat::MessagePack => rmp_serde::to_vec_named(payload)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, ProtocolError> {
        Ok(match self {
            WireFormat::Json => serde_json::from_slice(bytes)?,
            WireFormat::MessagePack => rmp_serde::from_slice(bytes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_json_shape() {
        let mut patch = Delta::new();
        patch.insert("counter", "count", Value::Int(1));
        let delta = OutboundDelta {
            session_id: "s1".into(),
            patch,
            is_final: true,
            error: None,
        };
        let bytes = WireFormat::Json.encode(&delta).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"session_id":"s1","patch":{"counter":{"count":1}},"final":true}"#
        );
    }

    #[test]
    fn inbound_json_without_args() {
        let event: InboundEvent = WireFormat::Json
            .decode(br#"{"handler_path": "app.reset", "session_id": "s1"}"#)
            .unwrap();
        assert_eq!(event, InboundEvent::new("s1", "app.reset", Vec::new()));

        let (session, event) = event.into_event();
        assert_eq!(session, "s1");
        assert_eq!(event.handler, "app.reset");
    }

    #[test]
    fn msgpack_keeps_field_names_and_values() {
        let event = InboundEvent::new(
            "s1",
            "app.todo.add",
            vec![Value::from("milk"), Value::Int(2), Value::Float(0.5)],
        );
        let bytes = WireFormat::MessagePack.encode(&event).unwrap();
        let decoded: InboundEvent = WireFormat::MessagePack.decode(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        let err = WireFormat::Json.decode::<InboundEvent>(b"{").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));

        let err = WireFormat::MessagePack
            .decode::<InboundEvent>(&[0xc1])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MsgPackDecode(_)));
    }

    #[test]
    fn wire_format_names() {
        assert_eq!(serde_json::to_string(&WireFormat::MessagePack).unwrap(), r#""msgpack""#);
        assert_eq!(
            serde_json::from_str::<WireFormat>(r#""json""#).unwrap(),
            WireFormat::Json
        );
    }
}
