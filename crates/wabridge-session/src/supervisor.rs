use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wabridge_core::{SessionEvent, SessionProvider};

/// Delay schedule between reconnect attempts.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
    /// Stop after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.2,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff (`base * 2^attempt`, capped) with ± jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp_delay = self.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let capped = exp_delay.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter_factor > 0.0 {
            let range = capped * self.jitter_factor;
            rand::thread_rng().gen_range(-range..=range)
        } else {
            0.0
        };

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Re-initializes the session provider after a disconnect.
///
/// At most one reconnect cycle is pending at any time. A cycle sleeps the
/// backoff delay, calls `initialize`, and keeps retrying retryable failures
/// with growing delays. Fatal errors end the cycle; `reset` (on ready)
/// restarts the schedule from the base delay.
///
/// A disconnect reported while `initialize` is running belongs to the new
/// session, so it re-arms the supervisor: once the running cycle ends
/// successfully another one starts.
pub struct ReconnectSupervisor {
    provider: Arc<dyn SessionProvider>,
    events: mpsc::Sender<SessionEvent>,
    policy: BackoffPolicy,
    in_flight: Arc<AtomicBool>,
    rearm: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
}

impl ReconnectSupervisor {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        events: mpsc::Sender<SessionEvent>,
        policy: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            events,
            policy,
            in_flight: Arc::new(AtomicBool::new(false)),
            rearm: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicU32::new(0)),
            cancel,
        }
    }

    /// Schedule a reconnect cycle. Returns false if one is already pending
    /// or the supervisor has been shut down.
    pub fn schedule(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rearm.store(true, Ordering::SeqCst);
            info!("reconnect already pending, not scheduling another");
            return false;
        }

        let cycle = Cycle {
            provider: Arc::clone(&self.provider),
            events: self.events.clone(),
            policy: self.policy.clone(),
            rearm: Arc::clone(&self.rearm),
            attempts: Arc::clone(&self.attempts),
            cancel: self.cancel.clone(),
        };
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            loop {
                let connected = cycle.run().await;
                in_flight.store(false, Ordering::SeqCst);

                // A disconnect may have landed between the end of the cycle
                // and the release above; pick it up here.
                if !connected || !cycle.rearm.swap(false, Ordering::SeqCst) {
                    break;
                }
                if cycle.cancel.is_cancelled()
                    || in_flight
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                {
                    break;
                }
                info!("session dropped while reconnecting, scheduling another attempt");
            }
        });

        true
    }

    /// Forget past failures; the next cycle starts at the base delay.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Consecutive attempts since the last `reset`.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct Cycle {
    provider: Arc<dyn SessionProvider>,
    events: mpsc::Sender<SessionEvent>,
    policy: BackoffPolicy,
    rearm: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
}

impl Cycle {
    /// Returns true once `initialize` succeeded, false when the cycle gave
    /// up or was cancelled.
    async fn run(&self) -> bool {
        loop {
            let attempt = self.attempts.load(Ordering::SeqCst);
            if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                error!(attempts = attempt, "giving up on reconnect");
                return false;
            }

            let delay = self.policy.delay(attempt);
            info!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("reconnect cancelled");
                    return false;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            // Disconnects seen while sleeping are covered by this attempt.
            self.rearm.store(false, Ordering::SeqCst);
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.provider.initialize(self.events.clone()).await {
                Ok(()) => {
                    info!(provider = self.provider.name(), "session re-initialized");
                    return true;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, kind = e.error_kind(), "reconnect failed, not retrying");
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, kind = e.error_kind(), "reconnect attempt failed");
                }
            }
        }
    }
}
