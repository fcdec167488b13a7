use std::sync::Arc;

use tracing::{debug, error, info, warn};

use wabridge_core::{BridgeState, InboundMessage, MessageRelay, SessionEvent};

use crate::qr;
use crate::supervisor::ReconnectSupervisor;

/// Applies session events to the shared state, the relay and the
/// reconnect supervisor. One handler per event variant.
pub struct LifecycleAdapter {
    state: Arc<BridgeState>,
    relay: Arc<dyn MessageRelay>,
    supervisor: Arc<ReconnectSupervisor>,
}

impl LifecycleAdapter {
    pub fn new(
        state: Arc<BridgeState>,
        relay: Arc<dyn MessageRelay>,
        supervisor: Arc<ReconnectSupervisor>,
    ) -> Self {
        Self {
            state,
            relay,
            supervisor,
        }
    }

    pub fn handle(&self, event: SessionEvent) {
        debug!(event = event.event_type(), "session event");
        match event {
            SessionEvent::PairingChallenge { code } => self.on_pairing_challenge(&code),
            SessionEvent::Ready { account } => self.on_ready(account),
            SessionEvent::AuthFailure { reason } => self.on_auth_failure(&reason),
            SessionEvent::Disconnected { reason } => self.on_disconnected(&reason),
            SessionEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_pairing_challenge(&self, code: &str) {
        match qr::render_terminal(code) {
            // Console output stays human-readable regardless of log format.
            Ok(rendered) => eprintln!("{rendered}"),
            Err(e) => warn!(error = %e, "could not render QR code for the console"),
        }

        match qr::challenge(code) {
            Ok(challenge) => {
                self.state.set_challenge(challenge);
                info!("QR code issued, scan it with WhatsApp or open /qr");
            }
            Err(e) => error!(error = %e, "could not encode QR code image"),
        }
    }

    fn on_ready(&self, account: Option<String>) {
        info!(account = account.as_deref().unwrap_or("unknown"), "WhatsApp session ready");
        self.state.mark_ready(account);
        self.supervisor.reset();
    }

    fn on_auth_failure(&self, reason: &str) {
        error!(reason = %reason, "WhatsApp authentication failed, operator action required");
        self.state.mark_failed();
    }

    fn on_disconnected(&self, reason: &str) {
        warn!(reason = %reason, "WhatsApp session disconnected");
        self.state.mark_disconnected();
        self.supervisor.schedule();
    }

    fn on_message(&self, message: InboundMessage) {
        if message.is_status_broadcast() {
            debug!("skipping status broadcast");
            self.state.stats().record_skipped();
            return;
        }

        let relay = Arc::clone(&self.relay);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if relay.forward(&message).await {
                state.stats().record_forwarded();
            } else {
                state.stats().record_failed();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use wabridge_core::mock::{MockSessionProvider, RecordingRelay};
    use wabridge_core::{ConnectionState, STATUS_BROADCAST};

    use crate::supervisor::BackoffPolicy;

    const CODE: &str = "2@pairing-code,abc,def";

    struct Harness {
        adapter: LifecycleAdapter,
        state: Arc<BridgeState>,
        relay: Arc<RecordingRelay>,
        provider: Arc<MockSessionProvider>,
        supervisor: Arc<ReconnectSupervisor>,
        _rx: mpsc::Receiver<SessionEvent>,
    }

    fn harness(relay: RecordingRelay) -> Harness {
        let state = Arc::new(BridgeState::new());
        let relay = Arc::new(relay);
        let provider = Arc::new(MockSessionProvider::new());
        let (tx, rx) = mpsc::channel(16);
        let policy = BackoffPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        };
        let supervisor = Arc::new(ReconnectSupervisor::new(
            Arc::clone(&provider) as Arc<dyn wabridge_core::SessionProvider>,
            tx,
            policy,
            CancellationToken::new(),
        ));
        let adapter = LifecycleAdapter::new(
            Arc::clone(&state),
            Arc::clone(&relay) as Arc<dyn MessageRelay>,
            Arc::clone(&supervisor),
        );
        Harness {
            adapter,
            state,
            relay,
            provider,
            supervisor,
            _rx: rx,
        }
    }

    #[tokio::test]
    async fn challenge_is_cached_until_ready() {
        let h = harness(RecordingRelay::accepting());
        h.adapter.handle(SessionEvent::PairingChallenge { code: CODE.into() });

        let cached = h.state.challenge().unwrap();
        assert_eq!(cached.code, CODE);
        assert_eq!(h.state.connection(), ConnectionState::AwaitingScan);

        h.adapter.handle(SessionEvent::Ready {
            account: Some("5511999999999".into()),
        });
        assert!(h.state.challenge().is_none());
        assert_eq!(h.state.connection(), ConnectionState::Connected);
        assert_eq!(h.state.account().as_deref(), Some("5511999999999"));
    }

    #[tokio::test]
    async fn auth_failure_is_terminal_without_reconnect() {
        let h = harness(RecordingRelay::accepting());
        h.adapter.handle(SessionEvent::AuthFailure {
            reason: "restore session failed".into(),
        });
        assert_eq!(h.state.connection(), ConnectionState::Failed);
        assert!(!h.supervisor.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_clears_challenge_and_schedules_one_reconnect() {
        let h = harness(RecordingRelay::accepting());
        h.adapter.handle(SessionEvent::PairingChallenge { code: CODE.into() });
        h.adapter.handle(SessionEvent::Disconnected {
            reason: "NAVIGATION".into(),
        });
        assert!(h.state.challenge().is_none());
        assert_eq!(h.state.connection(), ConnectionState::Disconnected);
        assert!(h.supervisor.is_pending());

        // A second disconnect while the first reconnect is pending
        h.adapter.handle(SessionEvent::Disconnected {
            reason: "CONFLICT".into(),
        });

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(h.provider.init_count(), 0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.provider.init_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_resets_backoff() {
        let h = harness(RecordingRelay::accepting());
        h.adapter.handle(SessionEvent::Disconnected { reason: "x".into() });
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.supervisor.attempts(), 1);

        h.adapter.handle(SessionEvent::Ready { account: None });
        assert_eq!(h.supervisor.attempts(), 0);
    }

    #[tokio::test]
    async fn status_broadcast_is_never_relayed() {
        let h = harness(RecordingRelay::accepting());
        h.adapter
            .handle(SessionEvent::Message(InboundMessage::text(STATUS_BROADCAST, "story", 1)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.relay.count(), 0);
        assert_eq!(h.state.stats().counts().skipped, 1);
    }

    #[tokio::test]
    async fn message_is_relayed_exactly_once() {
        let h = harness(RecordingRelay::accepting());
        let msg = InboundMessage::text("5511988887777@c.us", "bom dia", 1_700_000_000);
        h.adapter.handle(SessionEvent::Message(msg.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let forwarded = h.relay.forwarded();
        assert_eq!(forwarded, vec![msg]);
        assert_eq!(h.state.stats().counts().forwarded, 1);
    }

    #[tokio::test]
    async fn relay_failure_is_counted_not_raised() {
        let h = harness(RecordingRelay::rejecting());
        h.adapter
            .handle(SessionEvent::Message(InboundMessage::text("1@c.us", "hi", 1)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.relay.count(), 1);
        assert_eq!(h.state.stats().counts().failed, 1);
        assert_eq!(h.state.connection(), ConnectionState::Disconnected);
    }
}
