//! In-memory Store
//!
//! Reference backend over `parking_lot` maps. Counter adjustments and
//! composite-key upserts happen under a write lock, which gives the
//! atomicity the trait requires without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use wf_common::{
    Broadcast, BroadcastRecipient, BroadcastStatus, Contact, Flow, MessageRecord, Result, Session,
    SessionStatus, Tenant, WaflowError,
};

use crate::{BroadcastSelection, Store};

#[derive(Default)]
struct Collections {
    tenants: Vec<Tenant>,
    contacts: Vec<Contact>,
    flows: Vec<Flow>,
    sessions: HashMap<String, Session>,
    broadcasts: HashMap<String, Broadcast>,
    recipients: Vec<BroadcastRecipient>,
    messages: Vec<MessageRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tenant (tenant lifecycle is out-of-band for the orchestrator).
    pub fn seed_tenant(&self, tenant: Tenant) -> Tenant {
        let mut inner = self.inner.write();
        inner.tenants.push(tenant.clone());
        tenant
    }

    /// Seed an authored flow.
    pub fn seed_flow(&self, flow: Flow) -> Flow {
        let mut inner = self.inner.write();
        inner.flows.push(flow.clone());
        flow
    }

    /// Seed a contact directly (broadcast tests and fixtures).
    pub fn seed_contact(&self, contact: Contact) -> Contact {
        let mut inner = self.inner.write();
        inner.contacts.push(contact.clone());
        contact
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn tenant(&self, id: &str) -> Result<Option<Tenant>> {
        let inner = self.inner.read();
        Ok(inner.tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn tenant_by_phone_number_id(&self, phone_number_id: &str) -> Result<Option<Tenant>> {
        let inner = self.inner.read();
        Ok(inner
            .tenants
            .iter()
            .find(|t| t.phone_number_id == phone_number_id)
            .cloned())
    }

    async fn first_tenant(&self) -> Result<Option<Tenant>> {
        let inner = self.inner.read();
        Ok(inner
            .tenants
            .iter()
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn upsert_contact(
        &self,
        tenant_id: &str,
        phone: &str,
        profile_name: Option<&str>,
    ) -> Result<Contact> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .contacts
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.phone == phone)
        {
            if let Some(name) = profile_name {
                if existing.name.as_deref() != Some(name) {
                    existing.name = Some(name.to_string());
                    existing.updated_at = Utc::now();
                }
            }
            return Ok(existing.clone());
        }

        let mut contact = Contact::new(tenant_id, phone);
        if let Some(name) = profile_name {
            contact.name = Some(name.to_string());
        }
        debug!(tenant_id, phone, "Creating contact on first inbound");
        inner.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn contact(&self, id: &str) -> Result<Option<Contact>> {
        let inner = self.inner.read();
        Ok(inner.contacts.iter().find(|c| c.id == id).cloned())
    }

    async fn contacts_for_broadcast(
        &self,
        tenant_id: &str,
        selection: &BroadcastSelection,
    ) -> Result<Vec<Contact>> {
        let inner = self.inner.read();
        let contacts = match selection {
            BroadcastSelection::All { filter_tag } => inner
                .contacts
                .iter()
                .filter(|c| c.tenant_id == tenant_id)
                .filter(|c| filter_tag.as_deref().map_or(true, |tag| c.has_tag(tag)))
                .cloned()
                .collect(),
            BroadcastSelection::Contacts { contact_ids } => contact_ids
                .iter()
                .filter_map(|id| {
                    inner
                        .contacts
                        .iter()
                        .find(|c| c.id == *id && c.tenant_id == tenant_id)
                        .cloned()
                })
                .collect(),
        };
        Ok(contacts)
    }

    async fn flow(&self, id: &str) -> Result<Option<Flow>> {
        let inner = self.inner.read();
        Ok(inner.flows.iter().find(|f| f.id == id).cloned())
    }

    async fn active_flows(&self, tenant_id: &str, channel: &str) -> Result<Vec<Flow>> {
        let inner = self.inner.read();
        let mut flows: Vec<Flow> = inner
            .flows
            .iter()
            .filter(|f| f.tenant_id == tenant_id && f.is_dispatchable(channel))
            .cloned()
            .collect();
        flows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(flows)
    }

    async fn session(&self, id: &str) -> Result<Option<Session>> {
        let inner = self.inner.read();
        Ok(inner.sessions.get(id).cloned())
    }

    async fn latest_open_session(&self, contact_id: &str) -> Result<Option<Session>> {
        let inner = self.inner.read();
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.contact_id == contact_id && s.status.is_open())
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn upsert_session(&self, contact_id: &str, flow_id: &str) -> Result<Session> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .sessions
            .values()
            .find(|s| s.contact_id == contact_id && s.flow_id == flow_id)
        {
            return Ok(existing.clone());
        }
        let session = Session::new(contact_id, flow_id);
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn save_session_progress(
        &self,
        session_id: &str,
        current_node_id: Option<&str>,
        context: &serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WaflowError::not_found("Session", session_id))?;
        session.current_node_id = current_node_id.map(|s| s.to_string());
        session.context = context.clone();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn set_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WaflowError::not_found("Session", session_id))?;
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_session(&self, session_id: &str, context: serde_json::Value) -> Result<Session> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WaflowError::not_found("Session", session_id))?;
        session.status = SessionStatus::Active;
        session.current_node_id = None;
        session.context = context;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn create_broadcast(&self, broadcast: Broadcast) -> Result<Broadcast> {
        let mut inner = self.inner.write();
        inner
            .broadcasts
            .insert(broadcast.id.clone(), broadcast.clone());
        Ok(broadcast)
    }

    async fn broadcast(&self, id: &str) -> Result<Option<Broadcast>> {
        let inner = self.inner.read();
        Ok(inner.broadcasts.get(id).cloned())
    }

    async fn finish_broadcast(
        &self,
        id: &str,
        status: BroadcastStatus,
        success_count: u64,
        failure_count: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let broadcast = inner
            .broadcasts
            .get_mut(id)
            .ok_or_else(|| WaflowError::not_found("Broadcast", id))?;
        broadcast.status = status;
        broadcast.success_count = success_count;
        broadcast.failure_count = failure_count;
        Ok(())
    }

    async fn adjust_broadcast_counters(
        &self,
        id: &str,
        success_delta: i64,
        failure_delta: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let broadcast = inner
            .broadcasts
            .get_mut(id)
            .ok_or_else(|| WaflowError::not_found("Broadcast", id))?;
        broadcast.success_count = broadcast.success_count.saturating_add_signed(success_delta);
        broadcast.failure_count = broadcast.failure_count.saturating_add_signed(failure_delta);
        Ok(())
    }

    async fn create_recipient(&self, recipient: BroadcastRecipient) -> Result<BroadcastRecipient> {
        let mut inner = self.inner.write();
        inner.recipients.push(recipient.clone());
        Ok(recipient)
    }

    async fn update_recipient(&self, recipient: &BroadcastRecipient) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .recipients
            .iter_mut()
            .find(|r| r.id == recipient.id)
            .ok_or_else(|| WaflowError::not_found("BroadcastRecipient", &recipient.id))?;
        *slot = recipient.clone();
        Ok(())
    }

    async fn recipients(&self, broadcast_id: &str) -> Result<Vec<BroadcastRecipient>> {
        let inner = self.inner.read();
        Ok(inner
            .recipients
            .iter()
            .filter(|r| r.broadcast_id == broadcast_id)
            .cloned()
            .collect())
    }

    async fn recipient_by_message_id(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<BroadcastRecipient>> {
        let inner = self.inner.read();
        Ok(inner
            .recipients
            .iter()
            .find(|r| {
                r.message_id.as_deref() == Some(provider_message_id)
                    && inner
                        .broadcasts
                        .get(&r.broadcast_id)
                        .map_or(false, |b| b.tenant_id == tenant_id)
            })
            .cloned())
    }

    async fn append_message(&self, record: MessageRecord) -> Result<()> {
        let mut inner = self.inner.write();
        inner.messages.push(record);
        Ok(())
    }

    async fn latest_outbound(&self, session_id: &str) -> Result<Option<MessageRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .messages
            .iter()
            .rev()
            .find(|m| {
                m.session_id == session_id
                    && m.direction == wf_common::MessageDirection::Outbound
            })
            .cloned())
    }
}
