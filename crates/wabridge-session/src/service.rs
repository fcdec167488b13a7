use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wabridge_core::messages::outbound_text;
use wabridge_core::{
    BridgeError, BridgeState, MessageRelay, SendReceipt, SessionEvent, SessionProvider,
};

use crate::lifecycle::LifecycleAdapter;
use crate::supervisor::{BackoffPolicy, ReconnectSupervisor};

const EVENT_BUFFER: usize = 256;

/// Owns the session provider and everything that reacts to it.
///
/// A single task consumes provider events in arrival order and hands them
/// to the lifecycle adapter; the control API only reads state and calls
/// [`BridgeService::send`].
pub struct BridgeService {
    provider: Arc<dyn SessionProvider>,
    state: Arc<BridgeState>,
    supervisor: Arc<ReconnectSupervisor>,
    events_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    _event_loop: JoinHandle<()>,
}

impl BridgeService {
    /// Wire the service and start its event loop. Call [`connect`] to start
    /// the session itself.
    ///
    /// [`connect`]: BridgeService::connect
    pub fn spawn(
        provider: Arc<dyn SessionProvider>,
        relay: Arc<dyn MessageRelay>,
        policy: BackoffPolicy,
    ) -> Self {
        let state = Arc::new(BridgeState::new());
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let supervisor = Arc::new(ReconnectSupervisor::new(
            Arc::clone(&provider),
            events_tx.clone(),
            policy,
            cancel.clone(),
        ));
        let adapter = LifecycleAdapter::new(Arc::clone(&state), relay, Arc::clone(&supervisor));
        let event_loop = tokio::spawn(run_event_loop(events_rx, adapter, cancel.clone()));

        Self {
            provider,
            state,
            supervisor,
            events_tx,
            cancel,
            _event_loop: event_loop,
        }
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    pub fn reconnect_pending(&self) -> bool {
        self.supervisor.is_pending()
    }

    /// Start the session. Retryable failures are handed to the reconnect
    /// supervisor; fatal ones leave the bridge in the failed state.
    pub async fn connect(&self) {
        info!(provider = self.provider.name(), "initializing WhatsApp session");
        match self.provider.initialize(self.events_tx.clone()).await {
            Ok(()) => info!("session provider started"),
            Err(e) if e.is_fatal() => {
                error!(error = %e, kind = e.error_kind(), "session provider failed to start");
                self.state.mark_failed();
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "session provider failed to start, retrying");
                self.supervisor.schedule();
            }
        }
    }

    /// Send `message` to `to`. Non-string payloads are serialized to text.
    pub async fn send(
        &self,
        to: &str,
        message: &serde_json::Value,
    ) -> Result<SendReceipt, BridgeError> {
        let to = to.trim();
        let text = match outbound_text(message) {
            Some(text) if !to.is_empty() => text,
            _ => return Err(BridgeError::Validation("to and message are required".into())),
        };

        if !self.state.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        match self.provider.send_text(to, &text).await {
            Ok(receipt) => {
                info!(to = %to, message_id = ?receipt.message_id, "message sent");
                Ok(receipt)
            }
            Err(e) => {
                error!(to = %to, error = %e, kind = e.error_kind(), "failed to send message");
                Err(e.into())
            }
        }
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.provider.shutdown().await;
        info!("bridge service stopped");
    }
}

async fn run_event_loop(
    mut rx: mpsc::Receiver<SessionEvent>,
    adapter: LifecycleAdapter,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => adapter.handle(event),
                None => break,
            },
        }
    }
}
