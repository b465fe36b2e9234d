//! Pending-call table: the bridge from awaited futures to broker replies.
//!
//! Every in-flight `call` is one entry, keyed by correlation token. The
//! reply consumer resolves entries as tokens come back; timeouts and
//! shutdown remove them. An entry leaves the table exactly once.

use crate::error::CallError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchboard_wire::{ActionResponse, CorrelationId};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a waiter receives: the decoded reply, or a client-side failure
/// injected by the reply consumer (for example broker loss).
pub type CallOutcome = Result<ActionResponse, CallError>;

/// One registered call waiting for its token to come back.
struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    created_at: Instant,
    /// `controller.action` label, for logging only.
    route: String,
    deadline: Duration,
}

/// Lifetime counters for the table.
#[derive(Debug, Default)]
pub struct CallStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
    /// Replies whose token matched no entry (late or foreign), dropped.
    pub unmatched: AtomicU64,
}

/// Concurrent map of correlation token to waiting caller.
pub struct PendingCallStore {
    pending: DashMap<CorrelationId, PendingCall>,
    default_deadline: Duration,
    stats: Arc<CallStats>,
}

impl PendingCallStore {
    pub fn new(default_deadline: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_deadline,
            stats: Arc::new(CallStats::default()),
        }
    }

    /// Insert an entry under a fresh token and hand back the receiving end.
    pub fn register(
        &self,
        route: &str,
        deadline: Option<Duration>,
    ) -> (CorrelationId, oneshot::Receiver<CallOutcome>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingCall {
                sender: tx,
                created_at: Instant::now(),
                route: route.to_string(),
                deadline: deadline.unwrap_or(self.default_deadline),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);

        debug!(correlation_id = %correlation_id, route, "call registered");
        (correlation_id, rx)
    }

    /// Resolve the entry for a token, if one is still waiting.
    ///
    /// Returns false when the token matched nothing (already resolved,
    /// timed out, or never ours) or the waiter has gone away.
    pub fn complete(&self, correlation_id: CorrelationId, outcome: CallOutcome) -> bool {
        let Some((_, call)) = self.pending.remove(&correlation_id) else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_id = %correlation_id, "reply for unknown correlation token dropped");
            return false;
        };

        let elapsed = call.created_at.elapsed();
        match call.sender.send(outcome) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    route = call.route,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "call completed"
                );
                true
            }
            Err(_) => {
                // Waiter dropped between its timeout and our remove.
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %correlation_id, route = call.route, "waiter already gone");
                false
            }
        }
    }

    /// Drop an entry without resolving it. Used on timeout and when a call
    /// is abandoned. Returns false if the entry was already gone.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Resolve every entry with the same failure. Used when the reply
    /// stream ends and no reply can ever arrive again.
    pub fn fail_all(&self, error: &CallError) -> usize {
        let tokens: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for token in tokens {
            if let Some((_, call)) = self.pending.remove(&token) {
                if call.sender.send(Err(error.clone())).is_ok() {
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            self.stats
                .cancelled
                .fetch_add(failed as u64, Ordering::Relaxed);
        }
        failed
    }

    /// Sweep entries past their deadline. The per-call timeout normally
    /// removes entries itself; this catches calls whose futures were
    /// dropped early.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|token, call| {
            let elapsed = now.duration_since(call.created_at);
            if elapsed > call.deadline {
                warn!(
                    correlation_id = %token,
                    route = call.route,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "expired pending call swept"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.stats
                .timed_out
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }
}

/// Periodic [`PendingCallStore::remove_expired`] driver.
pub async fn cleanup_task(store: Arc<PendingCallStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let removed = store.remove_expired();
        if removed > 0 {
            debug!(removed, "swept expired pending calls");
        }
    }
}
