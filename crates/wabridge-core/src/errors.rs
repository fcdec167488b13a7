use std::time::Duration;

/// Errors reported by a session provider.
/// Classifies errors as fatal (operator must intervene) or retryable.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    // Fatal, never retried
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("failed to launch session: {0}")]
    Launch(String),

    // Retryable
    #[error("session disconnected")]
    Disconnected,
    #[error("io error: {0}")]
    Io(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // Per-call
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Io(_) | Self::Timeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::Launch(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::Launch(_) => "launch",
            Self::Disconnected => "disconnected",
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
            Self::SendFailed(_) => "send_failed",
            Self::Protocol(_) => "protocol",
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io(e.to_string())
    }
}

/// Errors surfaced to control API callers.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("WhatsApp is not connected")]
    NotConnected,

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl BridgeError {
    /// HTTP status code the control API answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotConnected => 503,
            Self::Provider(_) => 500,
        }
    }
}
