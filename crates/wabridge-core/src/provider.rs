use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::errors::ProviderError;
use crate::events::SessionEvent;

/// Acknowledgement for a message accepted by the provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendReceipt {
    pub to: String,
    pub message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl SendReceipt {
    pub fn new(to: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            to: to.into(),
            message_id,
            sent_at: Utc::now(),
        }
    }
}

/// Capability that keeps an authenticated WhatsApp session alive.
///
/// Implementations own browser automation and session persistence. The
/// bridge only starts them, listens to their events and asks them to send.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start (or restart) the session. Events flow into `events` until the
    /// session ends; a restart replaces the previous session.
    async fn initialize(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), ProviderError>;

    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt, ProviderError>;

    async fn shutdown(&self);
}
