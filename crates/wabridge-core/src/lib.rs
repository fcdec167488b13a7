pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod mock;
pub mod provider;
pub mod relay;
pub mod state;

pub use errors::{BridgeError, ProviderError};
pub use events::SessionEvent;
pub use messages::{InboundMessage, WebhookEnvelope, STATUS_BROADCAST};
pub use provider::{SendReceipt, SessionProvider};
pub use relay::MessageRelay;
pub use state::{
    BridgeState, ConnectionState, PairingChallenge, RelayCounts, RelayStats, StatusSnapshot,
};
