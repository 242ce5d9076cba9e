//! Status reconciler
//!
//! Applies provider delivery-status callbacks to broadcast recipients and
//! moves the broadcast aggregates by delta. Replaying a callback verbatim
//! is a no-op: only status transitions touch the counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use wf_common::{RecipientStatus, Result, Tenant};
use wf_store::Store;

use crate::webhook::StatusObject;

pub struct StatusReconciler {
    store: Arc<dyn Store>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply one status callback for the resolved tenant.
    pub async fn apply(&self, tenant: &Tenant, status: &StatusObject) -> Result<()> {
        let Some(message_id) = status.id.as_deref().filter(|id| !id.is_empty()) else {
            debug!("Status callback without message id, skipping");
            return Ok(());
        };

        let Some(mut recipient) = self
            .store
            .recipient_by_message_id(&tenant.id, message_id)
            .await?
        else {
            debug!(message_id, "No broadcast recipient for status callback");
            return Ok(());
        };

        let old_status = recipient.status.clone();
        let new_status = RecipientStatus::from_provider(&status.status);

        recipient.status_updated_at = parse_provider_timestamp(status.timestamp.as_deref());
        if let Some(conversation_id) = status.conversation.as_ref().and_then(|c| c.id.clone()) {
            recipient.conversation_id = Some(conversation_id);
        }

        if new_status.is_failed() {
            recipient.error = status.errors.first().and_then(|e| e.detail());
        } else if old_status.is_failed() {
            // Leaving the failed state clears the stale error.
            recipient.error = None;
        }
        recipient.status = new_status.clone();

        let success_delta =
            i64::from(new_status.is_success() && !old_status.is_success())
                - i64::from(old_status.is_success() && !new_status.is_success());
        let failure_delta = i64::from(new_status.is_failed() && !old_status.is_failed())
            - i64::from(old_status.is_failed() && !new_status.is_failed());

        debug!(
            message_id,
            from = %old_status,
            to = %new_status,
            success_delta,
            failure_delta,
            "Reconciling recipient status"
        );

        self.store.update_recipient(&recipient).await?;
        if success_delta != 0 || failure_delta != 0 {
            if let Err(e) = self
                .store
                .adjust_broadcast_counters(&recipient.broadcast_id, success_delta, failure_delta)
                .await
            {
                warn!(broadcast_id = %recipient.broadcast_id, error = %e, "Counter adjustment failed");
            }
        }

        Ok(())
    }
}

/// Provider timestamps are unix seconds as a string; fall back to now.
fn parse_provider_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_parsing() {
        let parsed = parse_provider_timestamp(Some("1700000000"));
        assert_eq!(parsed.timestamp(), 1_700_000_000);

        // Unparseable values fall back to roughly now.
        let fallback = parse_provider_timestamp(Some("not-a-number"));
        assert!((Utc::now() - fallback).num_seconds() < 5);
    }
}
