//! Request coalescing — one upstream call per key, no matter the caller count.
//!
//! The first caller to resolve a key becomes the leader: it spawns the
//! upstream work onto its own task and registers as the first waiter. Every
//! caller that arrives while that work is in flight attaches as an
//! additional waiter and receives a clone of the same eventual outcome,
//! success or failure.
//!
//! Two details carry the correctness guarantees:
//!
//! - The pending entry is removed **before** results are delivered, so a
//!   caller arriving right after settlement starts a fresh upstream attempt
//!   instead of joining a settled one.
//! - The upstream work runs on a spawned task, not inside any caller's
//!   future, so a caller abandoning interest never cancels the in-flight
//!   call — its result still lands in the cache for the next caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ResolveError;
use crate::metrics::MetricsCollector;
use crate::resolver::ResolvedResult;

type Outcome = Result<ResolvedResult, ResolveError>;
type PendingMap = HashMap<String, Vec<oneshot::Sender<Outcome>>>;

/// Deduplicates concurrent resolutions of the same normalized key.
pub struct RequestCoordinator {
    pending: Arc<Mutex<PendingMap>>,
    metrics: Arc<MetricsCollector>,
}

impl RequestCoordinator {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    /// Resolves `key`, invoking `factory` only if no resolution for `key` is
    /// already in flight.
    ///
    /// All concurrent callers for the same key receive an identical outcome,
    /// delivered in the order their waiter registration occurred.
    pub async fn resolve<F, Fut>(&self, key: &str, factory: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let is_leader = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get_mut(key) {
                Some(waiters) => {
                    waiters.push(tx);
                    self.metrics.record_deduped();
                    debug!(key, waiters = waiters.len(), "coalesced onto in-flight resolution");
                    false
                }
                None => {
                    pending.insert(key.to_owned(), vec![tx]);
                    true
                }
            }
        };

        if is_leader {
            let work = factory();
            let pending = Arc::clone(&self.pending);
            let key = key.to_owned();
            tokio::spawn(async move {
                let outcome = work.await;
                // Remove the entry first: late arrivals must start fresh,
                // never observe a settled in-flight slot.
                let waiters = pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&key)
                    .unwrap_or_default();
                debug!(key, waiters = waiters.len(), "in-flight resolution settled");
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
            });
        }

        rx.await.unwrap_or_else(|_| {
            Err(ResolveError::Upstream {
                message: "in-flight resolution dropped".to_owned(),
            })
        })
    }

    /// Number of keys with a resolution currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
