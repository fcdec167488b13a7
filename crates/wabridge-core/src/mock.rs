use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::ProviderError;
use crate::events::SessionEvent;
use crate::messages::InboundMessage;
use crate::provider::{SendReceipt, SessionProvider};
use crate::relay::MessageRelay;

/// Scripted provider for deterministic tests without a browser.
///
/// `initialize` and `send_text` pop pre-programmed results in order and
/// succeed once the script runs out.
#[derive(Default)]
pub struct MockSessionProvider {
    init_results: Mutex<VecDeque<Result<(), ProviderError>>>,
    send_results: Mutex<VecDeque<Result<Option<String>, ProviderError>>>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    sent: Mutex<Vec<(String, String)>>,
    init_count: AtomicUsize,
    shutdown_count: AtomicUsize,
}

impl MockSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init_results(self, results: Vec<Result<(), ProviderError>>) -> Self {
        *self.init_results.lock() = results.into();
        self
    }

    pub fn with_send_results(self, results: Vec<Result<Option<String>, ProviderError>>) -> Self {
        *self.send_results.lock() = results.into();
        self
    }

    /// Push an event as if the session produced it. Returns false before
    /// the first `initialize` or once the receiver is gone.
    pub async fn emit(&self, event: SessionEvent) -> bool {
        let tx = self.events.lock().clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdown_count.load(Ordering::SeqCst)
    }

    /// `(to, text)` pairs passed to `send_text`, in call order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), ProviderError> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        *self.events.lock() = Some(events);
        self.init_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        self.sent.lock().push((to.to_string(), text.to_string()));
        let result = self.send_results.lock().pop_front().unwrap_or(Ok(None));
        result.map(|message_id| SendReceipt::new(to, message_id))
    }

    async fn shutdown(&self) {
        self.shutdown_count.fetch_add(1, Ordering::SeqCst);
        self.events.lock().take();
    }
}

/// Relay that records what it was asked to forward.
pub struct RecordingRelay {
    accept: bool,
    forwarded: Mutex<Vec<InboundMessage>>,
}

impl RecordingRelay {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn forwarded(&self) -> Vec<InboundMessage> {
        self.forwarded.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.forwarded.lock().len()
    }
}

#[async_trait]
impl MessageRelay for RecordingRelay {
    async fn forward(&self, message: &InboundMessage) -> bool {
        self.forwarded.lock().push(message.clone());
        self.accept
    }
}
