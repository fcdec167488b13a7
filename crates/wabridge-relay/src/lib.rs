mod error;
mod webhook;

pub use error::RelayError;
pub use webhook::{synthetic_envelope, RelayConfig, RelayOutcome, WebhookRelay};
