use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use wabridge_core::ids::DeliveryId;
use wabridge_core::{InboundMessage, MessageRelay, WebhookEnvelope};

use crate::error::RelayError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_BODY_LIMIT: usize = 512;

/// Where and how inbound messages are posted.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub url: String,
    /// Alternate destination used by `/test-webhook-url`.
    pub test_url: Option<String>,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            test_url: None,
            connect_timeout: CONNECT_TIMEOUT,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Raw outcome of one POST, reported back by the diagnostic endpoints.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayOutcome {
    pub url: String,
    pub status: u16,
    pub ok: bool,
    pub body: String,
}

/// Posts webhook envelopes to the configured destination.
///
/// TLS certificates are verified and every field travels in the JSON body.
pub struct WebhookRelay {
    client: Client,
    config: RelayConfig,
}

impl WebhookRelay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// POST one envelope and capture the destination's answer verbatim.
    pub async fn deliver(
        &self,
        url: &str,
        envelope: &WebhookEnvelope,
    ) -> Result<RelayOutcome, RelayError> {
        let resp = self.client.post(url).json(envelope).send().await?;
        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %url, status = status.as_u16(), error = %e, "failed to read webhook response body");
                String::new()
            }
        };
        Ok(RelayOutcome {
            url: url.to_string(),
            status: status.as_u16(),
            ok: status.is_success(),
            body,
        })
    }

    /// Fire a synthetic envelope at `url`, or the configured destination.
    pub async fn test_delivery(&self, url: Option<&str>) -> Result<RelayOutcome, RelayError> {
        let url = url.unwrap_or(self.config.url.as_str());
        let outcome = self.deliver(url, &synthetic_envelope()).await?;
        debug!(url = %outcome.url, status = outcome.status, "test webhook delivered");
        Ok(outcome)
    }
}

#[async_trait]
impl MessageRelay for WebhookRelay {
    #[instrument(skip_all, fields(delivery_id = %DeliveryId::new(), from = %message.from))]
    async fn forward(&self, message: &InboundMessage) -> bool {
        let envelope = WebhookEnvelope::from(message);
        match self.deliver(&self.config.url, &envelope).await {
            Ok(outcome) if outcome.ok => {
                debug!(status = outcome.status, "message relayed");
                true
            }
            Ok(outcome) => {
                let err = RelayError::Status {
                    status: outcome.status,
                    body: truncate(&outcome.body, LOG_BODY_LIMIT),
                };
                warn!(error = %err, "webhook rejected message");
                false
            }
            Err(err) => {
                warn!(error = %err, "webhook delivery failed");
                false
            }
        }
    }
}

/// Envelope used by the webhook diagnostics.
pub fn synthetic_envelope() -> WebhookEnvelope {
    let body = "Test message from wabridge".to_string();
    WebhookEnvelope {
        from: "test@c.us".into(),
        message: body.clone(),
        body,
        timestamp: Utc::now().timestamp(),
        has_media: false,
        kind: "chat".into(),
        is_group: false,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
