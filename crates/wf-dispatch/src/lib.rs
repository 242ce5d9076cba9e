//! Inbound Dispatcher
//!
//! Webhook normalization, tenant and contact resolution, session selection,
//! keyword-based flow matching, delivery-status reconciliation, and the
//! HTTP surface that fronts it all.

pub mod api;
pub mod dispatcher;
pub mod matcher;
pub mod reconciler;
pub mod webhook;

pub use api::{app_router, AppState};
pub use dispatcher::Dispatcher;
pub use matcher::{select_flow, MatchContext};
pub use reconciler::StatusReconciler;
pub use webhook::{WebhookPayload, EXPECTED_OBJECT};
