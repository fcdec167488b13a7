use serde::{Deserialize, Serialize};

use crate::messages::InboundMessage;

/// Lifecycle and message events emitted by a session provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A new pairing code must be scanned. Replaces any previous one.
    #[serde(rename = "pairing_challenge")]
    PairingChallenge { code: String },

    #[serde(rename = "ready")]
    Ready { account: Option<String> },

    /// Terminal until the operator intervenes.
    #[serde(rename = "auth_failure")]
    AuthFailure { reason: String },

    #[serde(rename = "disconnected")]
    Disconnected { reason: String },

    #[serde(rename = "message")]
    Message(InboundMessage),
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PairingChallenge { .. } => "pairing_challenge",
            Self::Ready { .. } => "ready",
            Self::AuthFailure { .. } => "auth_failure",
            Self::Disconnected { .. } => "disconnected",
            Self::Message(_) => "message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let events = vec![
            SessionEvent::PairingChallenge { code: "2@abc".into() },
            SessionEvent::Ready { account: Some("5511".into()) },
            SessionEvent::AuthFailure { reason: "bad".into() },
            SessionEvent::Disconnected { reason: "NAVIGATION".into() },
            SessionEvent::Message(InboundMessage::text("1@c.us", "hi", 1)),
        ];
        for event in &events {
            let value = serde_json::to_value(event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn message_event_flattens_fields() {
        let event = SessionEvent::Message(InboundMessage::text("1@c.us", "hi", 7));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["from"], "1@c.us");
        assert_eq!(value["timestamp"], 7);
    }
}
