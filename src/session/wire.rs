//! Peer-to-peer payload: one JSON object per frame.
//!
//! Field order is irrelevant and unknown fields are ignored, so newer peers
//! can add fields without breaking older ones. A record without `type` is an
//! ordinary chat message.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::common::OutgoingMessage;

pub const HANDSHAKE_TYPE: &str = "handshake";
pub const MESSAGE_TYPE: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WireRecord {
    pub fn chat(message: &OutgoingMessage) -> Self {
        Self {
            kind: None,
            text: Some(message.text.clone()),
            username: Some(message.username.clone()),
            timestamp: Some(message.timestamp),
        }
    }

    pub fn handshake() -> Self {
        Self {
            kind: Some(HANDSHAKE_TYPE.to_string()),
            text: None,
            username: None,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    pub fn is_handshake(&self) -> bool {
        self.kind.as_deref() == Some(HANDSHAKE_TYPE)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn parse(chunk: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_record_has_no_type_field() {
        let message = OutgoingMessage {
            text: "hi".into(),
            username: "u1".into(),
            timestamp: 1_700_000_000_000,
        };
        let json: serde_json::Value =
            serde_json::from_slice(&WireRecord::chat(&message).encode().unwrap()).unwrap();

        assert_eq!(json["text"], "hi");
        assert_eq!(json["username"], "u1");
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert!(json.get("type").is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record = WireRecord::parse(
            br#"{"timestamp":1,"username":"u","text":"t","peerId":"self","color":"red"}"#,
        )
        .unwrap();

        assert_eq!(record.text.as_deref(), Some("t"));
        assert!(!record.is_handshake());
    }

    #[test]
    fn handshake_round_trips_its_type() {
        let bytes = WireRecord::handshake().encode().unwrap();
        assert!(WireRecord::parse(&bytes).unwrap().is_handshake());
    }
}
