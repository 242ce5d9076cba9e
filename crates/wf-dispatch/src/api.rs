//! HTTP surface
//!
//! Webhook verification and delivery endpoints plus the thin broadcast
//! kickoff/status API. Delivery handlers answer 200 for anything the
//! dispatcher accepted; the provider retries on anything else.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use wf_broadcast::{BroadcastRequest, BroadcastRunner};
use wf_common::{Broadcast, BroadcastRecipient, WaflowError};
use wf_store::Store;

use crate::dispatcher::Dispatcher;
use crate::webhook::WebhookPayload;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub runner: Arc<BroadcastRunner>,
    pub verify_token: String,
    pub app_secret: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub struct ApiError(WaflowError);

impl From<WaflowError> for ApiError {
    fn from(e: WaflowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            WaflowError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            WaflowError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let body = ErrorResponse { error: error_type.to_string(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/health", get(get_health))
        .route("/api/broadcasts", post(create_broadcast))
        .route("/api/broadcasts/{id}", get(get_broadcast))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// Subscription verification handshake: echo the challenge when the mode
/// and token match.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == Some("subscribe") && token == Some(state.verify_token.as_str()) {
        debug!("Webhook subscription verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("Webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.app_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !signature_matches(secret, &body, signature) {
            warn!("Webhook signature mismatch");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Unparseable webhook body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    state.dispatcher.process_webhook_event(payload).await;
    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}

/// Validate `X-Hub-Signature-256: sha256=<hex>` over the raw body.
fn signature_matches(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_signature) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(expected.as_bytes(), hex_signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBroadcastBody {
    tenant_id: String,
    #[serde(flatten)]
    request: BroadcastRequest,
}

async fn create_broadcast(
    State(state): State<AppState>,
    Json(body): Json<CreateBroadcastBody>,
) -> Result<Json<Broadcast>, ApiError> {
    let broadcast = state.runner.run(&body.tenant_id, body.request).await?;
    Ok(Json(broadcast))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastView {
    broadcast: Broadcast,
    recipients: Vec<BroadcastRecipient>,
}

async fn get_broadcast(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BroadcastView>, ApiError> {
    let broadcast = state
        .store
        .broadcast(&id)
        .await?
        .ok_or_else(|| WaflowError::not_found("Broadcast", &id))?;
    let recipients = state.store.recipients(&id).await?;
    Ok(Json(BroadcastView { broadcast, recipients }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let secret = "app-secret";
        let body = br#"{"object":"whatsapp_business_account"}"#;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let header = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(signature_matches(secret, body, Some(&header)));
        assert!(!signature_matches(secret, body, Some("sha256=deadbeef")));
        assert!(!signature_matches(secret, body, None));
        assert!(!signature_matches("other-secret", body, Some(&header)));
    }
}
