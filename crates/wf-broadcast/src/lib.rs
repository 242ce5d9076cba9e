//! Broadcast Runner
//!
//! Fans one flow out over a recipient set: materializes the broadcast and
//! its per-recipient rows, resets a session per `(contact, flow)`, then
//! invokes the engine strictly sequentially with the flow's trigger text.
//! Credential failures short-circuit the whole run.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use wf_common::{
    Broadcast, BroadcastRecipient, BroadcastStatus, RecipientStatus, Result, SessionStatus,
    WaflowError,
};
use wf_engine::{Engine, EngineError, ExecutionInput, SessionGate};
use wf_store::{BroadcastSelection, Store};

/// Canonical recipient error once credentials are known to be bad.
pub const CREDENTIAL_FAILURE_MESSAGE: &str = "Access token expired; reconnect in Settings";

/// A broadcast initiation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub flow_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub filter_tag: Option<String>,
    pub selection: BroadcastSelection,
}

pub struct BroadcastRunner {
    store: Arc<dyn Store>,
    engine: Arc<Engine>,
    gate: Arc<SessionGate>,
}

/// Credential failures surface as error text mentioning the token or an
/// authorization denial.
fn is_credential_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("access token") || lower.contains("unauthorized")
}

impl BroadcastRunner {
    pub fn new(store: Arc<dyn Store>, engine: Arc<Engine>, gate: Arc<SessionGate>) -> Self {
        Self { store, engine, gate }
    }

    /// Run a broadcast to completion and return its final aggregate state.
    pub async fn run(&self, tenant_id: &str, request: BroadcastRequest) -> Result<Broadcast> {
        let tenant = self
            .store
            .tenant(tenant_id)
            .await?
            .ok_or_else(|| WaflowError::not_found("Tenant", tenant_id))?;
        let flow = self
            .store
            .flow(&request.flow_id)
            .await?
            .ok_or_else(|| WaflowError::not_found("Flow", &request.flow_id))?;
        if flow.tenant_id != tenant_id {
            return Err(WaflowError::validation("flow does not belong to this tenant"));
        }

        let contacts = self
            .store
            .contacts_for_broadcast(tenant_id, &request.selection)
            .await?;
        if contacts.is_empty() {
            return Err(WaflowError::validation("broadcast selection matched no contacts"));
        }

        let mut broadcast = Broadcast::new(tenant_id, &flow.id, &request.body, contacts.len() as u64);
        if let Some(title) = &request.title {
            broadcast = broadcast.with_title(title);
        }
        if let Some(tag) = &request.filter_tag {
            broadcast = broadcast.with_filter_tag(tag);
        }
        let broadcast = self.store.create_broadcast(broadcast).await?;

        info!(
            broadcast_id = %broadcast.id,
            flow_id = %flow.id,
            recipients = contacts.len(),
            "Starting broadcast"
        );

        let mut recipients = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            recipients.push(
                self.store
                    .create_recipient(BroadcastRecipient::new(&broadcast.id, &contact.id))
                    .await?,
            );
        }

        // Attach a fresh session per pair, marked with the broadcast context.
        for contact in &contacts {
            let session = self.store.upsert_session(&contact.id, &flow.id).await?;
            let context = json!({
                "source": "broadcast",
                "lastBroadcastId": broadcast.id,
                "flowId": flow.id,
                "flowName": flow.name,
                "broadcastTitle": request.title,
                "attachedAt": Utc::now().to_rfc3339(),
                "contactId": contact.id,
            });
            self.store.reset_session(&session.id, context).await?;
        }

        let mut success_count: u64 = 0;
        let mut failure_count: u64 = 0;
        let mut credentials_failed = false;

        for (contact, mut recipient) in contacts.iter().zip(recipients) {
            if credentials_failed {
                self.mark_failed(&mut recipient, CREDENTIAL_FAILURE_MESSAGE).await?;
                failure_count += 1;
                continue;
            }

            let _guard = self.gate.acquire(&contact.id, &flow.id).await;
            let session = self.store.upsert_session(&contact.id, &flow.id).await?;
            let session = self.store.session(&session.id).await?.unwrap_or(session);
            let session_id = session.id.clone();

            let result = self
                .engine
                .execute(ExecutionInput {
                    tenant: tenant.clone(),
                    contact: contact.clone(),
                    flow: flow.clone(),
                    session,
                    text: flow.trigger.clone(),
                    meta: None,
                })
                .await;

            match result {
                Err(EngineError::SendAborted(e)) => {
                    warn!(
                        broadcast_id = %broadcast.id,
                        contact_id = %contact.id,
                        error = %e,
                        "Credential failure, aborting broadcast"
                    );
                    credentials_failed = true;
                    self.mark_failed(&mut recipient, CREDENTIAL_FAILURE_MESSAGE).await?;
                    failure_count += 1;
                }
                Err(EngineError::InvalidGraph(e)) => {
                    self.mark_failed(&mut recipient, &e.to_string()).await?;
                    failure_count += 1;
                }
                Ok(_) => {
                    let post = self.store.session(&session_id).await?;
                    let errored =
                        post.as_ref().map_or(false, |s| s.status == SessionStatus::Errored);
                    if errored {
                        let reason = "flow execution failed".to_string();
                        if is_credential_message(&reason) {
                            credentials_failed = true;
                            self.mark_failed(&mut recipient, CREDENTIAL_FAILURE_MESSAGE).await?;
                        } else {
                            self.mark_failed(&mut recipient, &reason).await?;
                        }
                        failure_count += 1;
                    } else {
                        let outbound = self.store.latest_outbound(&session_id).await?;
                        recipient.status = RecipientStatus::Sent;
                        recipient.sent_at = Some(Utc::now());
                        recipient.status_updated_at = Utc::now();
                        recipient.message_id =
                            outbound.as_ref().and_then(|m| m.provider_message_id.clone());
                        recipient.conversation_id =
                            outbound.as_ref().and_then(|m| m.conversation_id.clone());
                        self.store.update_recipient(&recipient).await?;
                        success_count += 1;
                    }
                }
            }
        }

        // A credential abort fails the broadcast as a whole, even when some
        // recipients went out before the token died.
        let status = if credentials_failed {
            BroadcastStatus::Failed
        } else if failure_count == 0 {
            BroadcastStatus::Completed
        } else if success_count == 0 {
            BroadcastStatus::Failed
        } else {
            BroadcastStatus::CompletedWithErrors
        };

        self.store
            .finish_broadcast(&broadcast.id, status, success_count, failure_count)
            .await?;

        info!(
            broadcast_id = %broadcast.id,
            status = ?status,
            success_count,
            failure_count,
            "Broadcast finished"
        );

        self.store
            .broadcast(&broadcast.id)
            .await?
            .ok_or_else(|| WaflowError::not_found("Broadcast", &broadcast.id))
    }

    async fn mark_failed(&self, recipient: &mut BroadcastRecipient, error: &str) -> Result<()> {
        recipient.status = RecipientStatus::Failed;
        recipient.error = Some(error.to_string());
        recipient.status_updated_at = Utc::now();
        self.store.update_recipient(recipient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_message_detection() {
        assert!(is_credential_message("Invalid OAuth access token"));
        assert!(is_credential_message("request was Unauthorized"));
        assert!(!is_credential_message("recipient blocked the sender"));
    }
}
