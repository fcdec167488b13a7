#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}
