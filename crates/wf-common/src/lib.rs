//! Shared domain model for the Waflow orchestrator.
//!
//! Entities, status lifecycles, operational constants, the crate-wide error
//! type, and the text normalizers used at every ingress.

pub mod entity;
pub mod logging;
pub mod normalize;

pub use entity::*;

// ============================================================================
// Operational Constants
// ============================================================================

/// Hard ceiling on node transitions per engine invocation.
pub const SAFE_MAX_STEPS: u32 = 500;

/// Upper bound applied to `delay` nodes, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Deadline for `api` node HTTP calls, in milliseconds.
pub const API_TIMEOUT_MS: u64 = 15_000;

/// Provider limit on interactive reply buttons per message.
pub const BROADCAST_MAX_BUTTONS: usize = 3;

/// Provider limit on a text message body.
pub const TEXT_LIMIT: usize = 4096;

/// Maximum entries an `options` node may declare.
pub const MAX_OPTIONS: usize = 10;

/// Minimum entries an `options` node must declare.
pub const MIN_OPTIONS: usize = 2;

/// Maximum length of a single option label.
pub const OPTION_LABEL_LIMIT: usize = 30;

/// Channel flows are matched against when none is configured.
pub const DEFAULT_CHANNEL: &str = "whatsapp";

/// Trigger keyword that acts as the catch-all fallback.
pub const DEFAULT_TRIGGER: &str = "default";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WaflowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WaflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}

pub type Result<T> = std::result::Result<T, WaflowError>;
