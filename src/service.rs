//! The [`Relay`] facade: the one object collaborators (HTTP handlers, the
//! scheduled dispatcher) hold to enqueue work and read runtime state.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::delivery::ledger::CounterSnapshot;
use crate::delivery::queue::DeliveryQueue;
use crate::delivery::{DeliveryOutcome, EnqueueError, RequestSource};
use crate::session::{SessionError, SessionManager, SessionState};

/// Point-in-time runtime statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStats {
    /// Requests buffered in the queue.
    pub queue_depth: usize,
    /// Session manager state snapshot.
    pub session_state: SessionState,
    /// Cumulative request counters.
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

/// Status of a single request as seen by callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RequestStatus {
    /// Accepted, not yet resolved.
    Queued,
    /// Resolved successfully.
    Succeeded,
    /// Resolved after exhausting the attempt budget.
    FailedAfterRetries,
}

impl RequestStatus {
    /// Map an archived status string back to a status value; unknown
    /// strings yield `None`.
    pub fn from_archived(status: &str) -> Option<Self> {
        match status {
            "succeeded" => Some(Self::Succeeded),
            "failed_after_retries" => Some(Self::FailedAfterRetries),
            _ => None,
        }
    }
}

/// Facade over the delivery queue and session manager.
#[derive(Clone)]
pub struct Relay {
    queue: DeliveryQueue,
    session: Arc<SessionManager>,
}

impl Relay {
    /// Bundle the queue producer and session manager.
    pub fn new(queue: DeliveryQueue, session: Arc<SessionManager>) -> Self {
        Self { queue, session }
    }

    /// Validate and enqueue a delivery request.
    ///
    /// # Errors
    ///
    /// [`EnqueueError`] on validation failure, a full queue, or shutdown.
    pub fn enqueue(
        &self,
        destination: &str,
        payload: &str,
        source: RequestSource,
    ) -> Result<Uuid, EnqueueError> {
        self.queue.enqueue(destination, payload, source)
    }

    /// Status of a request while the ledger still tracks it: `None` for
    /// unknown ids and for resolved requests already pruned after
    /// archiving (the history store answers for those).
    pub fn status(&self, id: Uuid) -> Option<RequestStatus> {
        self.queue.ledger().outcome(id).map(|outcome| match outcome {
            None => RequestStatus::Queued,
            Some(DeliveryOutcome::Succeeded) => RequestStatus::Succeeded,
            Some(DeliveryOutcome::FailedAfterRetries) => RequestStatus::FailedAfterRetries,
        })
    }

    /// Attempts recorded so far for a request.
    pub fn attempt_count(&self, id: Uuid) -> Option<usize> {
        self.queue.ledger().record(id).map(|r| r.attempts.len())
    }

    /// Runtime statistics snapshot.
    pub fn runtime_stats(&self) -> RuntimeStats {
        RuntimeStats {
            queue_depth: self.queue.depth(),
            session_state: self.session.state(),
            counters: self.queue.ledger().counters(),
        }
    }

    /// Administrative session start.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`] from the session manager.
    pub async fn start_session(&self) -> Result<(), SessionError> {
        self.session.start().await
    }

    /// Administrative session stop. Never fails.
    pub async fn stop_session(&self) {
        self.session.stop().await;
    }

    /// The shared session manager.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// The queue producer (used by the dispatcher).
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }
}
