use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Label shown in place of a peer id for records authored on this node.
pub const LOCAL_PEER_LABEL: &str = "you";

/// A chat message composed locally, waiting to be broadcast or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub username: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            username: username.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Where an inbound record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Local,
    Remote(String),
}

/// A record handed to subscribers: either a remote chat message or the local echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRecord {
    pub text: String,
    pub username: String,
    pub timestamp: i64,
    pub origin: Origin,
}

impl InboundRecord {
    pub fn local_echo(message: &OutgoingMessage) -> Self {
        Self {
            text: message.text.clone(),
            username: message.username.clone(),
            timestamp: Utc::now().timestamp_millis(),
            origin: Origin::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    /// Peer id of the author, or `"you"` for the local echo.
    pub fn peer_label(&self) -> &str {
        match &self.origin {
            Origin::Local => LOCAL_PEER_LABEL,
            Origin::Remote(peer_id) => peer_id,
        }
    }

    /// Local wall-clock time of the record, `HH:MM:SS`.
    pub fn clock_time(&self) -> String {
        match Local.timestamp_millis_opt(self.timestamp).single() {
            Some(time) => time.format("%H:%M:%S").to_string(),
            None => "--:--:--".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_echo_is_labelled_you() {
        let message = OutgoingMessage::new("hi", "u1");
        let echo = InboundRecord::local_echo(&message);

        assert!(echo.is_local());
        assert_eq!(echo.peer_label(), "you");
        assert_eq!(echo.text, "hi");
        assert_eq!(echo.username, "u1");
    }

    #[test]
    fn remote_records_carry_their_peer_id() {
        let record = InboundRecord {
            text: "yo".into(),
            username: "u2".into(),
            timestamp: 0,
            origin: Origin::Remote("ab12cd34".into()),
        };

        assert!(!record.is_local());
        assert_eq!(record.peer_label(), "ab12cd34");
        assert_eq!(record.clock_time().len(), 8);
    }
}
