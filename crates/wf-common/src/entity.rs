//! Domain Entities
//!
//! Tenants own flows, contacts, and broadcasts. A session is the live
//! execution state of one contact through one flow; a broadcast fans one
//! flow out over many contacts with per-recipient status tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::title_case;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Tenant
// ============================================================================

/// A tenant with its provider credentials.
///
/// Created out-of-band; the orchestrator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,

    /// Provider access token used for outbound sends.
    pub access_token: String,

    /// Sender phone-number id; inbound deliveries are routed by this value.
    pub phone_number_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_account_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_pin: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(
        name: impl Into<String>,
        access_token: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            business_account_id: None,
            registration_pin: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_business_account_id(mut self, id: impl Into<String>) -> Self {
        self.business_account_id = Some(id.into());
        self
    }
}

// ============================================================================
// Contact
// ============================================================================

/// A contact, unique per `(tenant_id, phone)`.
///
/// `phone` is always stored normalized (decimal digits only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub phone: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(tenant_id: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            phone: phone.into(),
            name: None,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

// ============================================================================
// Flow
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Active,
    Draft,
    Inactive,
}

impl Default for FlowStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl FlowStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// An authored flow. `definition` holds the raw graph document exactly as
/// the authoring surface produced it; unknown fields survive round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,

    /// Normalized trigger keyword, or the literal `default` fallback.
    pub trigger: String,

    #[serde(default)]
    pub status: FlowStatus,

    #[serde(default = "default_channel")]
    pub channel: String,

    pub definition: serde_json::Value,

    pub updated_at: DateTime<Utc>,
}

fn default_channel() -> String {
    crate::DEFAULT_CHANNEL.to_string()
}

impl Flow {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        trigger: impl Into<String>,
        definition: serde_json::Value,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            trigger: trigger.into(),
            status: FlowStatus::Active,
            channel: default_channel(),
            definition,
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: FlowStatus) -> Self {
        self.status = status;
        self
    }

    /// Usable for inbound dispatch on the given channel.
    pub fn is_dispatchable(&self, channel: &str) -> bool {
        self.status.is_active() && self.channel == channel
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Errored,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl SessionStatus {
    /// Open sessions are the ones inbound dispatch may resume.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// Live execution state of one contact through one flow.
///
/// Unique per `(contact_id, flow_id)`. The session exclusively owns its
/// `context` object; only the engine mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub contact_id: String,
    pub flow_id: String,

    #[serde(default)]
    pub status: SessionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,

    #[serde(default = "empty_object")]
    pub context: serde_json::Value,

    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Session {
    pub fn new(contact_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            contact_id: contact_id.into(),
            flow_id: flow_id.into(),
            status: SessionStatus::Active,
            current_node_id: None,
            context: empty_object(),
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Broadcast
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastStatus {
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl Default for BroadcastStatus {
    fn default() -> Self {
        Self::Processing
    }
}

impl BroadcastStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// A fan-out of one flow over a recipient set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub id: String,
    pub tenant_id: String,
    pub flow_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub body: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_tag: Option<String>,

    #[serde(default)]
    pub status: BroadcastStatus,

    pub total_recipients: u64,
    pub success_count: u64,
    pub failure_count: u64,

    pub created_at: DateTime<Utc>,
}

impl Broadcast {
    pub fn new(
        tenant_id: impl Into<String>,
        flow_id: impl Into<String>,
        body: impl Into<String>,
        total_recipients: u64,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            flow_id: flow_id.into(),
            title: None,
            body: body.into(),
            filter_tag: None,
            status: BroadcastStatus::Processing,
            total_recipients,
            success_count: 0,
            failure_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_filter_tag(mut self, tag: impl Into<String>) -> Self {
        self.filter_tag = Some(tag.into());
        self
    }
}

// ============================================================================
// Broadcast Recipient
// ============================================================================

/// Recipient delivery state, string-backed so provider-introduced statuses
/// survive reconciliation as Title-Cased passthrough values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
    Warning,
    Other(String),
}

impl RecipientStatus {
    /// Map a raw provider status string to the canonical set.
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" | "undelivered" | "deleted" => Self::Failed,
            "warning" => Self::Warning,
            "pending" | "queued" => Self::Pending,
            _ => Self::Other(title_case(raw)),
        }
    }

    /// Sent, Delivered and Read count toward broadcast success aggregates.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Read)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Sent => "Sent",
            Self::Delivered => "Delivered",
            Self::Read => "Read",
            Self::Failed => "Failed",
            Self::Warning => "Warning",
            Self::Other(s) => s,
        }
    }
}

impl Default for RecipientStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl From<String> for RecipientStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Pending" => Self::Pending,
            "Sent" => Self::Sent,
            "Delivered" => Self::Delivered,
            "Read" => Self::Read,
            "Failed" => Self::Failed,
            "Warning" => Self::Warning,
            _ => Self::Other(s),
        }
    }
}

impl From<RecipientStatus> for String {
    fn from(status: RecipientStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a broadcast, tracking outbound result and callback status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRecipient {
    pub id: String,
    pub broadcast_id: String,
    pub contact_id: String,

    #[serde(default)]
    pub status: RecipientStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,

    pub status_updated_at: DateTime<Utc>,

    /// Provider message id of the outbound send; status callbacks are
    /// correlated through it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BroadcastRecipient {
    pub fn new(broadcast_id: impl Into<String>, contact_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            broadcast_id: broadcast_id.into(),
            contact_id: contact_id.into(),
            status: RecipientStatus::Pending,
            sent_at: None,
            status_updated_at: Utc::now(),
            message_id: None,
            conversation_id: None,
            error: None,
        }
    }
}

// ============================================================================
// Message Log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Observational log record, one per send or inbound delivery.
///
/// The broadcast runner reads the latest outbound record of a session to
/// pick up the provider message id for callback correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: String,
    pub session_id: String,
    pub direction: MessageDirection,

    /// Outbound kind (text, media, options, template, flow) or inbound type.
    pub kind: String,

    pub body_preview: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn outbound(
        tenant_id: impl Into<String>,
        contact_id: impl Into<String>,
        session_id: impl Into<String>,
        kind: impl Into<String>,
        body_preview: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            contact_id: contact_id.into(),
            session_id: session_id.into(),
            direction: MessageDirection::Outbound,
            kind: kind.into(),
            body_preview: body_preview.into(),
            provider_message_id: None,
            conversation_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn inbound(
        tenant_id: impl Into<String>,
        contact_id: impl Into<String>,
        session_id: impl Into<String>,
        kind: impl Into<String>,
        body_preview: impl Into<String>,
    ) -> Self {
        Self {
            direction: MessageDirection::Inbound,
            ..Self::outbound(tenant_id, contact_id, session_id, kind, body_preview)
        }
    }

    pub fn with_provider_message_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_status_provider_mapping() {
        assert_eq!(RecipientStatus::from_provider("sent"), RecipientStatus::Sent);
        assert_eq!(RecipientStatus::from_provider("DELIVERED"), RecipientStatus::Delivered);
        assert_eq!(RecipientStatus::from_provider("undelivered"), RecipientStatus::Failed);
        assert_eq!(RecipientStatus::from_provider("deleted"), RecipientStatus::Failed);
        assert_eq!(RecipientStatus::from_provider("queued"), RecipientStatus::Pending);
        assert_eq!(
            RecipientStatus::from_provider("on_hold"),
            RecipientStatus::Other("On_hold".to_string())
        );
    }

    #[test]
    fn test_recipient_status_success_set() {
        assert!(RecipientStatus::Sent.is_success());
        assert!(RecipientStatus::Delivered.is_success());
        assert!(RecipientStatus::Read.is_success());
        assert!(!RecipientStatus::Pending.is_success());
        assert!(!RecipientStatus::Failed.is_success());
        assert!(!RecipientStatus::Warning.is_success());
    }

    #[test]
    fn test_recipient_status_round_trips_as_string() {
        let status: RecipientStatus = serde_json::from_str("\"Sent\"").unwrap();
        assert_eq!(status, RecipientStatus::Sent);

        let json = serde_json::to_string(&RecipientStatus::Other("Throttled".into())).unwrap();
        assert_eq!(json, "\"Throttled\"");
    }

    #[test]
    fn test_session_status_openness() {
        assert!(SessionStatus::Active.is_open());
        assert!(SessionStatus::Paused.is_open());
        assert!(!SessionStatus::Completed.is_open());
        assert!(!SessionStatus::Errored.is_open());
    }

    #[test]
    fn test_flow_dispatchable() {
        let flow = Flow::new("t1", "Welcome", "hola", serde_json::json!({}));
        assert!(flow.is_dispatchable("whatsapp"));
        assert!(!flow.is_dispatchable("telegram"));

        let draft = flow.with_status(FlowStatus::Draft);
        assert!(!draft.is_dispatchable("whatsapp"));
    }
}
