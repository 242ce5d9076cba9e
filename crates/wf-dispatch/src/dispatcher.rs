//! Inbound dispatcher
//!
//! Normalizes webhook deliveries into engine invocations: resolves the
//! tenant by phone-number id, upserts the contact, picks or rehydrates the
//! session, and calls the engine under the session gate. Every failure is
//! absorbed and logged; the webhook handler always answers 200.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use wf_common::{
    normalize::normalize_phone, Contact, Flow, MessageRecord, Result, Session, Tenant,
    DEFAULT_CHANNEL,
};
use wf_engine::{Engine, EngineError, ExecutionInput, InboundMeta, InteractiveMeta, SessionGate};
use wf_store::Store;

use crate::matcher::{select_flow, MatchContext};
use crate::reconciler::StatusReconciler;
use crate::webhook::{ChangeValue, InboundMessage, WebhookPayload, EXPECTED_OBJECT};

pub struct Dispatcher {
    store: Arc<dyn Store>,
    engine: Arc<Engine>,
    gate: Arc<SessionGate>,
    reconciler: StatusReconciler,
    /// When the environment pins this phone-number id, unresolved deliveries
    /// for it fall back to the first tenant.
    fallback_phone_number_id: Option<String>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<Engine>,
        gate: Arc<SessionGate>,
        fallback_phone_number_id: Option<String>,
    ) -> Self {
        let reconciler = StatusReconciler::new(store.clone());
        Self { store, engine, gate, reconciler, fallback_phone_number_id }
    }

    /// Process one webhook delivery. Never fails; the provider retries on
    /// non-200 and duplicate processing is worse than a dropped log line.
    pub async fn process_webhook_event(&self, payload: WebhookPayload) {
        if payload.object != EXPECTED_OBJECT || payload.entry.is_empty() {
            debug!(object = %payload.object, "Ignoring webhook payload");
            return;
        }

        for entry in payload.entry {
            for change in entry.changes {
                self.process_change(change.value).await;
            }
        }
    }

    async fn process_change(&self, value: ChangeValue) {
        let Some(phone_number_id) = value
            .metadata
            .as_ref()
            .and_then(|m| m.phone_number_id.clone())
        else {
            debug!("Change without phone_number_id, skipping");
            return;
        };

        let Some(tenant) = self.resolve_tenant(&phone_number_id).await else {
            warn!(phone_number_id, "No tenant for inbound delivery, skipping");
            return;
        };

        for status in &value.statuses {
            if let Err(e) = self.reconciler.apply(&tenant, status).await {
                warn!(tenant_id = %tenant.id, error = %e, "Status reconciliation failed");
            }
        }

        // wa_id -> profile name, for contact upserts.
        let profiles: HashMap<&str, &str> = value
            .contacts
            .iter()
            .filter_map(|c| c.profile.name.as_deref().map(|name| (c.wa_id.as_str(), name)))
            .collect();

        for message in &value.messages {
            if let Err(e) = self.process_message(&tenant, &profiles, message).await {
                warn!(
                    tenant_id = %tenant.id,
                    message_id = %message.id,
                    error = %e,
                    "Inbound message processing failed"
                );
            }
        }
    }

    async fn resolve_tenant(&self, phone_number_id: &str) -> Option<Tenant> {
        match self.store.tenant_by_phone_number_id(phone_number_id).await {
            Ok(Some(tenant)) => Some(tenant),
            Ok(None) => {
                if self.fallback_phone_number_id.as_deref() == Some(phone_number_id) {
                    self.store.first_tenant().await.ok().flatten()
                } else {
                    None
                }
            }
            Err(e) => {
                warn!(phone_number_id, error = %e, "Tenant lookup failed");
                None
            }
        }
    }

    async fn process_message(
        &self,
        tenant: &Tenant,
        profiles: &HashMap<&str, &str>,
        message: &InboundMessage,
    ) -> Result<()> {
        let Some(text) = message.visible_text() else {
            debug!(message_type = %message.message_type, "No visible text, skipping message");
            return Ok(());
        };

        let Some(phone) = normalize_phone(&message.from) else {
            warn!(from = %message.from, "Sender phone has no digits, dropping message");
            return Ok(());
        };

        let profile_name = profiles.get(message.from.as_str()).copied();
        let contact = self.store.upsert_contact(&tenant.id, &phone, profile_name).await?;

        let Some((session, flow)) = self.select_session(tenant, &contact, message, &text).await?
        else {
            info!(tenant_id = %tenant.id, "No flow matched inbound message, dropping");
            return Ok(());
        };

        // Reactivate a finished session for a fresh run.
        let session = if session.status.is_terminal() {
            self.store.reset_session(&session.id, json!({})).await?
        } else {
            session
        };

        let _guard = self.gate.acquire(&contact.id, &flow.id).await;
        // Refetch under the gate so we run against the latest persisted state.
        let session = self.store.session(&session.id).await?.unwrap_or(session);

        let inbound_log = MessageRecord::inbound(
            &tenant.id,
            &contact.id,
            &session.id,
            &message.message_type,
            text.chars().take(120).collect::<String>(),
        )
        .with_provider_message_id(&message.id);
        self.store.append_message(inbound_log).await?;

        let input = ExecutionInput {
            tenant: tenant.clone(),
            contact,
            flow,
            session,
            text,
            meta: Some(build_meta(message)),
        };

        match self.engine.execute(input).await {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "Engine invocation finished");
            }
            Err(EngineError::SendAborted(e)) => {
                // Webhook path: nothing upstream to short-circuit.
                warn!(error = %e, "Outbound credentials failed during webhook dispatch");
            }
            Err(EngineError::InvalidGraph(e)) => {
                warn!(error = %e, "Flow definition rejected at load");
            }
        }

        Ok(())
    }

    /// Reuse the most recent open session, or select a flow by keyword and
    /// upsert a `(contact, flow)` session for it.
    async fn select_session(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        message: &InboundMessage,
        text: &str,
    ) -> Result<Option<(Session, Flow)>> {
        if let Some(open) = self.store.latest_open_session(&contact.id).await? {
            if let Some(flow) = self.store.flow(&open.flow_id).await? {
                return Ok(Some((open, flow)));
            }
            warn!(session_id = %open.id, flow_id = %open.flow_id, "Open session references missing flow");
        }

        let flows = self.store.active_flows(&tenant.id, DEFAULT_CHANNEL).await?;
        let reply = message.interactive_reply();
        let context = MatchContext {
            full_text: text,
            interactive_title: reply.map(|r| r.title.as_str()),
            interactive_id: reply.map(|r| r.id.as_str()),
        };

        let Some(flow) = select_flow(&flows, &context).cloned() else {
            return Ok(None);
        };

        let session = self.store.upsert_session(&contact.id, &flow.id).await?;
        Ok(Some((session, flow)))
    }
}

fn build_meta(message: &InboundMessage) -> InboundMeta {
    InboundMeta {
        message_type: message.message_type.clone(),
        raw_text: message.text.as_ref().map(|t| t.body.clone()).unwrap_or_default(),
        interactive: message.interactive.as_ref().and_then(|i| {
            let reply = i.button_reply.as_ref().or(i.list_reply.as_ref())?;
            Some(InteractiveMeta {
                kind: i.interactive_type.clone(),
                id: reply.id.clone(),
                title: reply.title.clone(),
            })
        }),
    }
}
