use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use wabridge_core::BridgeError;

/// Error responses of the control API. Every variant renders `{error}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    NotConnected(String),
    Internal(String),
    /// The webhook destination could not be reached.
    BadGateway { url: String, error: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Validation(msg) => Self::BadRequest(msg),
            BridgeError::NotConnected => Self::NotConnected(e.to_string()),
            BridgeError::Provider(cause) => Self::Internal(cause.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadGateway { url, error } => serde_json::json!({ "url": url, "error": error }),
            Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::NotConnected(msg)
            | Self::Internal(msg) => serde_json::json!({ "error": msg }),
        };
        (status, Json(body)).into_response()
    }
}
