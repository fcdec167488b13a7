use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Connection status as reported by `/status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    AwaitingScan,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingScan => "awaiting_scan",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

/// The most recent pairing code, pre-rendered for the control API.
#[derive(Clone, Debug, PartialEq)]
pub struct PairingChallenge {
    pub code: String,
    /// `data:image/png;base64,...`
    pub data_url: String,
    pub issued_at: DateTime<Utc>,
}

/// Outbound relay counters.
#[derive(Debug, Default)]
pub struct RelayStats {
    forwarded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelayCounts {
    pub forwarded: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl RelayStats {
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> RelayCounts {
        RelayCounts {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct SessionView {
    connection: ConnectionState,
    account: Option<String>,
    challenge: Option<PairingChallenge>,
}

/// Process-wide session state shared by the lifecycle adapter (writer) and
/// the control API (reader).
#[derive(Debug)]
pub struct BridgeState {
    view: RwLock<SessionView>,
    stats: RelayStats,
}

/// Point-in-time copy of the session state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub connection: ConnectionState,
    pub account: Option<String>,
    pub has_challenge: bool,
    pub relay: RelayCounts,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeState {
    pub fn new() -> Self {
        Self {
            view: RwLock::new(SessionView {
                connection: ConnectionState::Disconnected,
                account: None,
                challenge: None,
            }),
            stats: RelayStats::default(),
        }
    }

    /// Cache a new pairing challenge, replacing any previous one.
    pub fn set_challenge(&self, challenge: PairingChallenge) {
        let mut view = self.view.write();
        view.challenge = Some(challenge);
        view.connection = ConnectionState::AwaitingScan;
    }

    pub fn mark_ready(&self, account: Option<String>) {
        let mut view = self.view.write();
        view.challenge = None;
        view.connection = ConnectionState::Connected;
        view.account = account;
    }

    pub fn mark_failed(&self) {
        let mut view = self.view.write();
        view.connection = ConnectionState::Failed;
        view.account = None;
    }

    pub fn mark_disconnected(&self) {
        let mut view = self.view.write();
        view.challenge = None;
        view.connection = ConnectionState::Disconnected;
        view.account = None;
    }

    pub fn connection(&self) -> ConnectionState {
        self.view.read().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection() == ConnectionState::Connected
    }

    pub fn account(&self) -> Option<String> {
        self.view.read().account.clone()
    }

    pub fn challenge(&self) -> Option<PairingChallenge> {
        self.view.read().challenge.clone()
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let view = self.view.read();
        StatusSnapshot {
            connection: view.connection,
            account: view.account.clone(),
            has_challenge: view.challenge.is_some(),
            relay: self.stats.counts(),
        }
    }
}
