//! In-memory accounting for requests, attempts, and outcomes.
//!
//! The ledger is the authoritative answer to "what happened to request X"
//! while the request is pending; once the queue processor archives a
//! resolved request to the history store it is pruned here, and the
//! history row becomes the durable record. Attempts are append-only and
//! attempt numbers are strictly increasing per request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use super::{AttemptOutcome, DeliveryAttempt, DeliveryOutcome, DeliveryRequest, StrategyKind};

/// Everything recorded about one request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// The immutable request.
    pub request: DeliveryRequest,
    /// Append-only attempt history.
    pub attempts: Vec<DeliveryAttempt>,
    /// Terminal outcome, once resolved.
    pub outcome: Option<DeliveryOutcome>,
}

/// Cumulative counters exposed through runtime stats.
#[derive(Debug, Default)]
pub struct Counters {
    /// Requests accepted at the enqueue boundary.
    pub enqueued: AtomicU64,
    /// Requests that resolved to `Succeeded`.
    pub succeeded: AtomicU64,
    /// Requests that resolved to `FailedAfterRetries`.
    pub failed: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CounterSnapshot {
    /// Requests accepted at the enqueue boundary.
    pub enqueued: u64,
    /// Requests that resolved to `Succeeded`.
    pub succeeded: u64,
    /// Requests that resolved to `FailedAfterRetries`.
    pub failed: u64,
    /// Accepted but not yet resolved.
    pub in_flight: u64,
}

/// Request/attempt/outcome bookkeeping shared by enqueuers and the worker.
#[derive(Debug, Default)]
pub struct Ledger {
    records: RwLock<HashMap<Uuid, RequestRecord>>,
    counters: Counters,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a freshly validated request.
    pub fn admit(&self, request: DeliveryRequest) {
        let record = RequestRecord {
            request,
            attempts: Vec::new(),
            outcome: None,
        };
        if let Ok(mut records) = self.records.write() {
            records.insert(record.request.id, record);
        }
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Forget a request that was admitted but could not be queued
    /// (queue-full rollback at the enqueue boundary).
    pub fn evict(&self, id: Uuid) {
        if let Ok(mut records) = self.records.write() {
            records.remove(&id);
        }
        self.counters.enqueued.fetch_sub(1, Ordering::Relaxed);
    }

    /// Append an attempt record.
    ///
    /// Enforces strictly increasing attempt numbers: an out-of-order
    /// append is dropped rather than corrupting the history.
    pub fn record_attempt(
        &self,
        id: Uuid,
        attempt_number: u32,
        strategy_used: Option<StrategyKind>,
        outcome: AttemptOutcome,
    ) {
        let Ok(mut records) = self.records.write() else {
            return;
        };
        let Some(record) = records.get_mut(&id) else {
            return;
        };
        let last = record.attempts.last().map_or(0, |a| a.attempt_number);
        if attempt_number <= last {
            tracing::warn!(
                request_id = %id,
                attempt_number,
                last,
                "dropping out-of-order attempt record"
            );
            return;
        }
        record.attempts.push(DeliveryAttempt {
            request_id: id,
            attempt_number,
            strategy_used,
            outcome,
            timestamp: Utc::now(),
        });
    }

    /// Resolve a request to its terminal outcome. Idempotent: only the
    /// first resolution sticks.
    pub fn resolve(&self, id: Uuid, outcome: DeliveryOutcome) {
        let Ok(mut records) = self.records.write() else {
            return;
        };
        let Some(record) = records.get_mut(&id) else {
            return;
        };
        if record.outcome.is_some() {
            return;
        }
        record.outcome = Some(outcome);
        match outcome {
            DeliveryOutcome::Succeeded => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            DeliveryOutcome::FailedAfterRetries => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop a resolved request after it has been archived to the history
    /// store. A pending request is left alone; the cumulative counters are
    /// unaffected either way.
    pub fn prune_resolved(&self, id: Uuid) {
        if let Ok(mut records) = self.records.write() {
            if records.get(&id).is_some_and(|r| r.outcome.is_some()) {
                records.remove(&id);
            }
        }
    }

    /// Full record for a request, if known.
    pub fn record(&self, id: Uuid) -> Option<RequestRecord> {
        self.records.read().ok()?.get(&id).cloned()
    }

    /// Terminal outcome for a request: `None` for unknown ids,
    /// `Some(None)` while still pending.
    pub fn outcome(&self, id: Uuid) -> Option<Option<DeliveryOutcome>> {
        let records = self.records.read().ok()?;
        records.get(&id).map(|r| r.outcome)
    }

    /// Counter snapshot for runtime stats.
    pub fn counters(&self) -> CounterSnapshot {
        let enqueued = self.counters.enqueued.load(Ordering::Relaxed);
        let succeeded = self.counters.succeeded.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        let resolved = succeeded.saturating_add(failed);
        CounterSnapshot {
            enqueued,
            succeeded,
            failed,
            in_flight: enqueued.saturating_sub(resolved),
        }
    }
}
