//! In-flight proxied-fetch bookkeeping.
//!
//! Every proxied fetch gets a query id from a monotonically increasing
//! counter, unique within the page session. The resolver for the call is
//! stored here until the matching response message arrives; completion is
//! keyed purely by id, so responses may arrive in any order.
//!
//! Entries removed on completion never fire twice. Entries whose response
//! never arrives stay forever by default, matching the surface being
//! normalized; [`PendingFetches::sweep_stale`] is the explicit opt-in
//! eviction for embedders that want an upper bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::http::HttpResponse;

/// Time source for stale-entry sweeps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        u64::try_from(now.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Outcome delivered for one proxied fetch.
pub type FetchOutcome = Result<HttpResponse>;

struct PendingEntry {
    sender: oneshot::Sender<FetchOutcome>,
    issued_at_ms: u64,
}

/// Pending proxied fetches keyed by query id.
pub struct PendingFetches {
    pending: Mutex<HashMap<u64, PendingEntry>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl PendingFetches {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Allocate the next query id and register its resolver.
    pub fn register(&self) -> (u64, oneshot::Receiver<FetchOutcome>) {
        let query_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let issued_at_ms = self.clock.now_ms();
        let mut pending = self.pending.lock();
        tracing::trace!(
            event = "proxy.pending.register",
            query_id,
            pending_count = pending.len() + 1,
            "registered pending fetch"
        );
        pending.insert(
            query_id,
            PendingEntry {
                sender,
                issued_at_ms,
            },
        );
        (query_id, receiver)
    }

    /// Complete a pending fetch by resolving or rejecting its awaitable,
    /// discarding the bookkeeping entry.
    ///
    /// Returns false when the id is unknown or already completed, so a
    /// duplicate response is a no-op rather than a second resolution.
    pub fn complete(&self, query_id: u64, outcome: FetchOutcome) -> bool {
        let Some(entry) = self.pending.lock().remove(&query_id) else {
            tracing::warn!(
                event = "proxy.pending.not_found",
                query_id,
                "completion for unknown query id"
            );
            return false;
        };
        // The caller may have dropped the awaitable; that only loses the
        // notification, never the eviction.
        let _ = entry.sender.send(outcome);
        tracing::trace!(
            event = "proxy.pending.complete",
            query_id,
            remaining = self.pending.lock().len(),
            "pending fetch completed"
        );
        true
    }

    /// Reject and evict every entry older than `max_age_ms`.
    ///
    /// Explicit opt-in: nothing in this crate calls it on its own, so the
    /// default behavior stays wait-forever. Returns the number of entries
    /// evicted.
    pub fn sweep_stale(&self, max_age_ms: u64) -> usize {
        let now_ms = self.clock.now_ms();
        let mut pending = self.pending.lock();
        let stale: Vec<u64> = pending
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.issued_at_ms) > max_age_ms)
            .map(|(query_id, _)| *query_id)
            .collect();
        for query_id in &stale {
            if let Some(entry) = pending.remove(query_id) {
                tracing::warn!(
                    event = "proxy.pending.evicted",
                    query_id,
                    max_age_ms,
                    "evicting stale pending fetch"
                );
                let _ = entry.sender.send(Err(Error::fetch("proxied fetch timed out")));
            }
        }
        stale.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for PendingFetches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            status_text: "OK".to_string(),
            content_type: None,
            body: Vec::new(),
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let pending = PendingFetches::new();
        let (first, _rx1) = pending.register();
        let (second, _rx2) = pending.register();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn completion_is_matched_by_id_not_arrival_order() {
        let pending = PendingFetches::new();
        let (first, mut rx1) = pending.register();
        let (second, mut rx2) = pending.register();

        assert!(pending.complete(second, Ok(response(201))));
        let resolved = rx2
            .try_recv()
            .expect("open")
            .expect("resolved")
            .expect("success");
        assert_eq!(resolved.status, 201);
        assert!(rx1.try_recv().expect("open").is_none());

        assert!(pending.complete(first, Ok(response(200))));
        let resolved = rx1
            .try_recv()
            .expect("open")
            .expect("resolved")
            .expect("success");
        assert_eq!(resolved.status, 200);
    }

    #[test]
    fn duplicate_completion_is_a_noop() {
        let pending = PendingFetches::new();
        let (id, _rx) = pending.register();
        assert!(pending.complete(id, Ok(response(200))));
        assert!(!pending.complete(id, Ok(response(500))));
        assert!(pending.is_empty());
    }

    #[test]
    fn unknown_id_is_rejected() {
        let pending = PendingFetches::new();
        assert!(!pending.complete(42, Ok(response(200))));
    }

    #[test]
    fn entries_without_responses_accumulate_by_default() {
        let pending = PendingFetches::new();
        let _receivers: Vec<_> = (0..3).map(|_| pending.register()).collect();
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn sweep_stale_evicts_and_rejects_only_old_entries() {
        let clock = Arc::new(ManualClock::new(1_000));
        let pending = PendingFetches::with_clock(Arc::clone(&clock) as Arc<dyn Clock>);

        let (old_id, mut old_rx) = pending.register();
        clock.advance(30_000);
        let (fresh_id, mut fresh_rx) = pending.register();
        clock.advance(1_000);

        assert_eq!(pending.sweep_stale(10_000), 1);
        assert_eq!(pending.len(), 1);

        let evicted = old_rx
            .try_recv()
            .expect("open")
            .expect("rejected")
            .expect_err("stale entry rejects");
        assert_eq!(evicted.to_string(), "proxied fetch timed out");
        assert!(fresh_rx.try_recv().expect("open").is_none());

        // The survivor still completes normally.
        assert!(pending.complete(fresh_id, Ok(response(200))));
        let _ = old_id;
    }
}
