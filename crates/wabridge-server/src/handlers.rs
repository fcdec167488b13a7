use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use wabridge_core::messages::is_falsy;
use wabridge_relay::RelayOutcome;

use crate::error::ApiError;
use crate::server::AppState;

const INDEX_HTML: &str = "<!doctype html>\
<html><head><title>wabridge</title></head><body>\
<h1>wabridge</h1>\
<p>WhatsApp bridge is running.</p>\
<ul><li><a href=\"/status\">/status</a></li><li><a href=\"/qr\">/qr</a></li></ul>\
</body></html>";

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.service.state().snapshot();
    Json(json!({
        "api": "online",
        "whatsapp": snapshot.connection.as_str(),
        "info": snapshot.account,
        "has_qr": snapshot.has_challenge,
        "relay": snapshot.relay,
    }))
}

pub async fn qr(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let challenge = state
        .service
        .state()
        .challenge()
        .ok_or_else(|| ApiError::NotFound("no QR code available".into()))?;

    Ok(Html(format!(
        "<!doctype html>\
<html><head><title>wabridge - scan QR code</title></head><body>\
<h1>Scan with WhatsApp</h1>\
<img src=\"{}\" alt=\"WhatsApp pairing QR code\"/>\
<p>Issued at {}</p>\
</body></html>",
        challenge.data_url,
        challenge.issued_at.to_rfc3339(),
    )))
}

/// Body of `POST /send`. Both fields stay loose so validation can answer
/// with a 400 instead of a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendRequest {
    pub to: Value,
    pub message: Value,
}

impl SendRequest {
    /// Recipient as text; numeric ids are accepted as-is. Falsy values
    /// (`0`, `false`, `""`, `null`) come back empty.
    fn recipient(&self) -> String {
        if is_falsy(&self.to) {
            return String::new();
        }
        match &self.to {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

pub async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    let to = req.recipient();
    let receipt = state.service.send(&to, &req.message).await?;
    Ok(Json(json!({ "status": "sent", "to": receipt.to })))
}

pub async fn test_webhook(State(state): State<AppState>) -> Result<Json<RelayOutcome>, ApiError> {
    deliver_test(&state, state.relay.config().url.clone()).await
}

/// Only the operator-configured test destination is reachable; callers
/// cannot pick the target.
pub async fn test_webhook_url(State(state): State<AppState>) -> Result<Json<RelayOutcome>, ApiError> {
    let url = state
        .relay
        .config()
        .test_url
        .clone()
        .ok_or_else(|| ApiError::BadRequest("no test webhook URL configured".into()))?;
    deliver_test(&state, url).await
}

async fn deliver_test(state: &AppState, url: String) -> Result<Json<RelayOutcome>, ApiError> {
    match state.relay.test_delivery(Some(&url)).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            warn!(url = %url, error = %e, "test webhook delivery failed");
            Err(ApiError::BadGateway {
                url,
                error: e.to_string(),
            })
        }
    }
}
