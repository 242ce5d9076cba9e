//! Transport Seam
//!
//! Abstract provider-side outbound channel. The engine and broadcast runner
//! only see this trait; the Cloud API client in [`cloud`] is the production
//! implementation.

use async_trait::async_trait;
use wf_common::Tenant;

mod cloud;
mod message;

pub use cloud::{CloudApiTransport, CloudApiTransportConfig};
pub use message::{MediaKind, OutboundMessage, ReplyButton, TemplateParameter};

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider message id; status callbacks are correlated through it.
    pub message_id: String,
    pub conversation_id: Option<String>,
}

/// Outbound failure classification.
///
/// Credential failures are the only ones callers are expected to react to:
/// the broadcast runner short-circuits on them, everything else is logged
/// and the flow proceeds.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Credential failure (HTTP {status}): {detail}")]
    Credential { status: u16, detail: String },

    #[error("Provider rejected message (HTTP {status}): {detail}")]
    Provider { status: u16, detail: String },

    #[error("Transient send failure: {detail}")]
    Transient { detail: String },

    #[error("Invalid recipient phone: {0}")]
    InvalidRecipient(String),
}

impl SendError {
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential { .. })
    }
}

/// Provider-side outbound channel, bound per call to a tenant's credentials.
///
/// Implementations must enforce a bounded wall-clock deadline per call and
/// classify authorization failures distinctly from transient ones.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        tenant: &Tenant,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError>;
}
