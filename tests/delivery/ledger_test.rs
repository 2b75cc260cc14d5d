//! Tests for `src/delivery/ledger.rs` — attempt ordering and counters.

use chrono::Utc;
use uuid::Uuid;

use otpgate::delivery::ledger::Ledger;
use otpgate::delivery::{
    AttemptOutcome, DeliveryOutcome, DeliveryRequest, Destination, RequestSource, StrategyKind,
};

fn request() -> DeliveryRequest {
    DeliveryRequest {
        id: Uuid::new_v4(),
        destination: Destination::normalize("1234567890", 10, "").expect("valid destination"),
        payload: "Your OTP is 123456".to_owned(),
        submitted_at: Utc::now(),
        source: RequestSource::AdHoc,
    }
}

#[test]
fn attempts_are_monotonic_and_append_only() {
    let ledger = Ledger::new();
    let req = request();
    let id = req.id;
    ledger.admit(req);

    ledger.record_attempt(id, 1, None, AttemptOutcome::TransientFailure);
    ledger.record_attempt(id, 2, None, AttemptOutcome::TransientFailure);
    // Out-of-order and duplicate attempt numbers are dropped.
    ledger.record_attempt(id, 2, None, AttemptOutcome::Success);
    ledger.record_attempt(id, 1, None, AttemptOutcome::Success);
    ledger.record_attempt(id, 3, Some(StrategyKind::ExistingChat), AttemptOutcome::Success);

    let record = ledger.record(id).expect("record should exist");
    let numbers: Vec<u32> = record.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn resolve_is_idempotent() {
    let ledger = Ledger::new();
    let req = request();
    let id = req.id;
    ledger.admit(req);

    ledger.resolve(id, DeliveryOutcome::Succeeded);
    ledger.resolve(id, DeliveryOutcome::FailedAfterRetries);

    let outcome = ledger.outcome(id).expect("known id");
    assert_eq!(outcome, Some(DeliveryOutcome::Succeeded));

    let counters = ledger.counters();
    assert_eq!(counters.succeeded, 1);
    assert_eq!(counters.failed, 0);
}

#[test]
fn counters_track_in_flight() {
    let ledger = Ledger::new();
    let first = request();
    let second = request();
    let first_id = first.id;
    ledger.admit(first);
    ledger.admit(second);

    let counters = ledger.counters();
    assert_eq!(counters.enqueued, 2);
    assert_eq!(counters.in_flight, 2);

    ledger.resolve(first_id, DeliveryOutcome::FailedAfterRetries);
    let counters = ledger.counters();
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.in_flight, 1);
}

#[test]
fn evict_rolls_back_admission() {
    let ledger = Ledger::new();
    let req = request();
    let id = req.id;
    ledger.admit(req);
    ledger.evict(id);

    assert!(ledger.outcome(id).is_none());
    assert_eq!(ledger.counters().enqueued, 0);
}

#[test]
fn prune_removes_only_resolved_records() {
    let ledger = Ledger::new();
    let resolved = request();
    let pending = request();
    let resolved_id = resolved.id;
    let pending_id = pending.id;
    ledger.admit(resolved);
    ledger.admit(pending);

    ledger.record_attempt(
        resolved_id,
        1,
        Some(StrategyKind::ExistingChat),
        AttemptOutcome::Success,
    );
    ledger.resolve(resolved_id, DeliveryOutcome::Succeeded);
    ledger.prune_resolved(resolved_id);
    ledger.prune_resolved(pending_id);

    assert!(ledger.record(resolved_id).is_none());
    assert!(ledger.record(pending_id).is_some());

    // Counters are cumulative; pruning must not disturb them.
    let counters = ledger.counters();
    assert_eq!(counters.enqueued, 2);
    assert_eq!(counters.succeeded, 1);
    assert_eq!(counters.in_flight, 1);
}

#[test]
fn unknown_id_is_none_not_error() {
    let ledger = Ledger::new();
    assert!(ledger.outcome(Uuid::new_v4()).is_none());
    assert!(ledger.record(Uuid::new_v4()).is_none());
}
