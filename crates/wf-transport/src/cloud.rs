//! WhatsApp Cloud API transport
//!
//! Posts outbound payloads to `/{phone_number_id}/messages` with the
//! tenant's bearer token and classifies failures by response status:
//! 401/403 and OAuth error bodies are credential failures, other 4xx are
//! provider rejections, 5xx/timeouts/connection errors are transient.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use wf_common::Tenant;

use crate::{OutboundMessage, SendError, SendReceipt, Transport};

pub const DEFAULT_GRAPH_API_VERSION: &str = "v20.0";

/// Provider OAuth error code for an expired/invalid access token.
const OAUTH_ERROR_CODE: i64 = 190;

#[derive(Debug, Clone)]
pub struct CloudApiTransportConfig {
    /// Graph API base URL, overridable for tests.
    pub base_url: String,
    pub api_version: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for CloudApiTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com".to_string(),
            api_version: DEFAULT_GRAPH_API_VERSION.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl CloudApiTransportConfig {
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }
}

/// Successful send response (abridged).
#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// Provider error envelope.
#[derive(Debug, Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    error_type: String,
    #[serde(default)]
    code: i64,
}

pub struct CloudApiTransport {
    config: CloudApiTransportConfig,
    client: reqwest::Client,
}

impl CloudApiTransport {
    pub fn new(config: CloudApiTransportConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.config.base_url, self.config.api_version, phone_number_id
        )
    }

    fn classify_error(status: u16, body: &str) -> SendError {
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
        let provider_error = parsed.error.unwrap_or_default();
        let detail = if provider_error.message.is_empty() {
            format!("HTTP {}", status)
        } else {
            provider_error.message.clone()
        };

        let oauth_failure = provider_error.code == OAUTH_ERROR_CODE
            || provider_error.error_type.eq_ignore_ascii_case("OAuthException");

        if status == 401 || status == 403 || oauth_failure {
            SendError::Credential { status, detail }
        } else if (400..500).contains(&status) {
            SendError::Provider { status, detail }
        } else {
            SendError::Transient { detail: format!("HTTP {}: {}", status, detail) }
        }
    }
}

#[async_trait]
impl Transport for CloudApiTransport {
    async fn send(
        &self,
        tenant: &Tenant,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError> {
        if to.is_empty() || !to.chars().all(|c| c.is_ascii_digit()) {
            return Err(SendError::InvalidRecipient(to.to_string()));
        }

        let url = self.messages_url(&tenant.phone_number_id);
        let payload = message.to_payload(to);

        debug!(
            tenant_id = %tenant.id,
            to,
            kind = message.kind(),
            "Sending outbound message"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&tenant.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Transient { detail: "Request timeout".to_string() }
                } else {
                    SendError::Transient { detail: format!("Connection error: {}", e) }
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let error = Self::classify_error(status.as_u16(), &body);
            warn!(
                tenant_id = %tenant.id,
                to,
                status = status.as_u16(),
                error = %error,
                "Outbound send failed"
            );
            return Err(error);
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|e| SendError::Transient { detail: format!("Unparseable response: {}", e) })?;

        let message_id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| SendError::Transient {
                detail: "Response carried no message id".to_string(),
            })?;

        Ok(SendReceipt { message_id, conversation_id: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_status() {
        assert!(matches!(
            CloudApiTransport::classify_error(401, "{}"),
            SendError::Credential { .. }
        ));
        assert!(matches!(
            CloudApiTransport::classify_error(403, "{}"),
            SendError::Credential { .. }
        ));
        assert!(matches!(
            CloudApiTransport::classify_error(400, "{}"),
            SendError::Provider { .. }
        ));
        assert!(matches!(
            CloudApiTransport::classify_error(500, "{}"),
            SendError::Transient { .. }
        ));
    }

    #[test]
    fn test_oauth_body_is_credential_even_on_400() {
        let body = r#"{"error":{"message":"Error validating access token","type":"OAuthException","code":190}}"#;
        let error = CloudApiTransport::classify_error(400, body);
        assert!(error.is_credential());
        assert!(error.to_string().contains("access token"));
    }

    #[test]
    fn test_messages_url_layout() {
        let transport = CloudApiTransport::new(CloudApiTransportConfig::default()).unwrap();
        assert_eq!(
            transport.messages_url("12345"),
            "https://graph.facebook.com/v20.0/12345/messages"
        );
    }
}
