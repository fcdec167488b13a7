use serde::{Deserialize, Serialize};

/// Sender used by WhatsApp for status updates. Never relayed.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// A message received from the session provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub body: String,
    /// Unix seconds, as reported by WhatsApp.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub has_media: bool,
    /// WhatsApp message type (`chat`, `image`, `ptt`, ...).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub is_group: bool,
}

fn default_kind() -> String {
    "chat".into()
}

impl InboundMessage {
    pub fn text(from: impl Into<String>, body: impl Into<String>, timestamp: i64) -> Self {
        let from = from.into();
        let is_group = from.ends_with("@g.us");
        Self {
            from,
            body: body.into(),
            timestamp,
            has_media: false,
            kind: default_kind(),
            is_group,
        }
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.from == STATUS_BROADCAST
    }
}

/// JSON body posted to the relay destination.
///
/// `message` duplicates `body`; existing webhook consumers read either key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub from: String,
    pub body: String,
    pub message: String,
    pub timestamp: i64,
    pub has_media: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_group: bool,
}

impl From<&InboundMessage> for WebhookEnvelope {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            from: msg.from.clone(),
            body: msg.body.clone(),
            message: msg.body.clone(),
            timestamp: msg.timestamp,
            has_media: msg.has_media,
            kind: msg.kind.clone(),
            is_group: msg.is_group,
        }
    }
}

/// Convert a `/send` payload into the text handed to the provider.
///
/// Strings pass through; objects and arrays become compact JSON; numbers and
/// `true` use their JSON text. Falsy payloads (`null`, `""`, `0`, `false`)
/// count as missing.
pub fn outbound_text(message: &serde_json::Value) -> Option<String> {
    if is_falsy(message) {
        return None;
    }
    match message {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Whether a JSON request field counts as absent: `null`, `false`, `""` or
/// any zero number.
pub fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_duplicates_body_into_message() {
        let msg = InboundMessage::text("5511999999999@c.us", "oi", 1_700_000_000);
        let env = WebhookEnvelope::from(&msg);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["from"], "5511999999999@c.us");
        assert_eq!(value["body"], "oi");
        assert_eq!(value["message"], "oi");
        assert_eq!(value["timestamp"], 1_700_000_000);
        assert_eq!(value["hasMedia"], false);
        assert_eq!(value["type"], "chat");
        assert_eq!(value["isGroup"], false);
    }

    #[test]
    fn group_detected_from_jid() {
        let msg = InboundMessage::text("120363000000000000@g.us", "hi all", 1);
        assert!(msg.is_group);
    }

    #[test]
    fn status_broadcast_sentinel() {
        assert!(InboundMessage::text(STATUS_BROADCAST, "story", 1).is_status_broadcast());
        assert!(!InboundMessage::text("123@c.us", "hi", 1).is_status_broadcast());
    }

    #[test]
    fn inbound_defaults_missing_fields() {
        let msg: InboundMessage = serde_json::from_value(json!({"from": "1@c.us"})).unwrap();
        assert_eq!(msg.body, "");
        assert_eq!(msg.kind, "chat");
        assert!(!msg.has_media);
    }

    #[test]
    fn outbound_text_conversion() {
        assert_eq!(outbound_text(&json!("hello")), Some("hello".into()));
        assert_eq!(outbound_text(&json!(42)), Some("42".into()));
        assert_eq!(outbound_text(&json!(true)), Some("true".into()));
        assert_eq!(outbound_text(&json!({"a": 1})), Some("{\"a\":1}".into()));
        assert_eq!(outbound_text(&json!([1, 2])), Some("[1,2]".into()));
        assert_eq!(outbound_text(&json!("")), None);
        assert_eq!(outbound_text(&json!(null)), None);
    }

    #[test]
    fn falsy_payloads_count_as_missing() {
        for value in [json!(null), json!(false), json!(0), json!(0.0), json!(-0.0), json!("")] {
            assert!(is_falsy(&value), "{value} should be falsy");
            assert_eq!(outbound_text(&value), None);
        }
        for value in [json!(" "), json!("0"), json!(1), json!(true), json!([]), json!({})] {
            assert!(!is_falsy(&value), "{value} should be present");
        }
    }
}
