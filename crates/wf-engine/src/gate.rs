//! Session Gate
//!
//! Keyed executor: at most one engine invocation runs for a given
//! `(contact_id, flow_id)` pair at a time. Callers hold the guard across
//! the whole `execute` call.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct SessionGate {
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the pair's lock, waiting if another invocation holds it.
    pub async fn acquire(&self, contact_id: &str, flow_id: &str) -> OwnedMutexGuard<()> {
        let key = (contact_id.to_string(), flow_id.to_string());
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_pair_serializes() {
        let gate = Arc::new(SessionGate::new());
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = gate.acquire("c1", "f1").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_pairs_run_concurrently() {
        let gate = Arc::new(SessionGate::new());

        let g1 = gate.acquire("c1", "f1").await;
        // A different flow for the same contact must not block.
        let g2 = tokio::time::timeout(Duration::from_millis(100), gate.acquire("c1", "f2"))
            .await
            .expect("distinct pair should not block");
        drop(g1);
        drop(g2);
    }
}
