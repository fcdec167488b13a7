use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one outbound webhook delivery in logs.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    pub fn new() -> Self {
        Self(format!("dlv_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_ids_are_prefixed_and_unique() {
        let a = DeliveryId::new();
        let b = DeliveryId::new();
        assert!(a.as_str().starts_with("dlv_"));
        assert_ne!(a, b);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = DeliveryId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
