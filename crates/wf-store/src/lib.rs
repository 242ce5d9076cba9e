//! Store Trait
//!
//! Abstract persistence seam for the orchestrator. Every mutation the engine,
//! dispatcher, and broadcast runner make goes through this trait; the
//! in-memory implementation in [`memory`] is the reference backend used by
//! the single-node server and the test suites.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wf_common::{
    Broadcast, BroadcastRecipient, BroadcastStatus, Contact, Flow, MessageRecord, Result, Session,
    SessionStatus, Tenant,
};

mod memory;

pub use memory::MemoryStore;

/// How a broadcast materializes its recipient set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum BroadcastSelection {
    /// Every contact of the tenant, optionally narrowed to one tag.
    All {
        #[serde(skip_serializing_if = "Option::is_none")]
        filter_tag: Option<String>,
    },
    /// An explicit contact id list.
    Contacts { contact_ids: Vec<String> },
}

#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // Tenants
    // ========================================================================

    async fn tenant(&self, id: &str) -> Result<Option<Tenant>>;

    /// Resolve the tenant owning a provider phone-number id.
    async fn tenant_by_phone_number_id(&self, phone_number_id: &str) -> Result<Option<Tenant>>;

    /// First tenant by creation time, for the env-pinned fallback.
    async fn first_tenant(&self) -> Result<Option<Tenant>>;

    // ========================================================================
    // Contacts
    // ========================================================================

    /// Find-or-create by `(tenant_id, phone)`; refreshes a changed profile
    /// name on an existing contact. `phone` must already be normalized.
    async fn upsert_contact(
        &self,
        tenant_id: &str,
        phone: &str,
        profile_name: Option<&str>,
    ) -> Result<Contact>;

    async fn contact(&self, id: &str) -> Result<Option<Contact>>;

    /// Materialize the recipient set for a broadcast selection.
    async fn contacts_for_broadcast(
        &self,
        tenant_id: &str,
        selection: &BroadcastSelection,
    ) -> Result<Vec<Contact>>;

    // ========================================================================
    // Flows
    // ========================================================================

    async fn flow(&self, id: &str) -> Result<Option<Flow>>;

    /// Active flows of a tenant matching a channel, most recently updated
    /// first.
    async fn active_flows(&self, tenant_id: &str, channel: &str) -> Result<Vec<Flow>>;

    // ========================================================================
    // Sessions
    // ========================================================================

    async fn session(&self, id: &str) -> Result<Option<Session>>;

    /// Most recently updated Active/Paused session of a contact, if any.
    async fn latest_open_session(&self, contact_id: &str) -> Result<Option<Session>>;

    /// Find-or-create by the composite `(contact_id, flow_id)` key.
    async fn upsert_session(&self, contact_id: &str, flow_id: &str) -> Result<Session>;

    /// Persist cursor and context; the engine calls this before executing
    /// the next node so a crash resumes from the last completed transition.
    async fn save_session_progress(
        &self,
        session_id: &str,
        current_node_id: Option<&str>,
        context: &serde_json::Value,
    ) -> Result<()>;

    async fn set_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;

    /// Reactivate: clear the cursor, replace the context, set Active.
    async fn reset_session(&self, session_id: &str, context: serde_json::Value) -> Result<Session>;

    // ========================================================================
    // Broadcasts
    // ========================================================================

    async fn create_broadcast(&self, broadcast: Broadcast) -> Result<Broadcast>;

    async fn broadcast(&self, id: &str) -> Result<Option<Broadcast>>;

    /// Final status and counts once the runner finishes iterating.
    async fn finish_broadcast(
        &self,
        id: &str,
        status: BroadcastStatus,
        success_count: u64,
        failure_count: u64,
    ) -> Result<()>;

    /// Atomic delta adjustment, safe under concurrent status reconciliation.
    async fn adjust_broadcast_counters(
        &self,
        id: &str,
        success_delta: i64,
        failure_delta: i64,
    ) -> Result<()>;

    // ========================================================================
    // Broadcast Recipients
    // ========================================================================

    async fn create_recipient(&self, recipient: BroadcastRecipient) -> Result<BroadcastRecipient>;

    async fn update_recipient(&self, recipient: &BroadcastRecipient) -> Result<()>;

    /// Recipients of a broadcast in creation order.
    async fn recipients(&self, broadcast_id: &str) -> Result<Vec<BroadcastRecipient>>;

    /// Look up a recipient by provider message id, scoped to broadcasts of
    /// the given tenant.
    async fn recipient_by_message_id(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<BroadcastRecipient>>;

    // ========================================================================
    // Message Log
    // ========================================================================

    async fn append_message(&self, record: MessageRecord) -> Result<()>;

    /// Latest outbound record of a session, for broadcast id correlation.
    async fn latest_outbound(&self, session_id: &str) -> Result<Option<MessageRecord>>;
}
