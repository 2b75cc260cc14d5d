//! The delivery pipeline: request model, target resolution, submission,
//! ledger, rate gate, and the single-consumer queue processor.

pub mod ledger;
pub mod phone;
pub mod queue;
pub mod rate;
pub mod resolver;
pub mod submitter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::DriverError;
use crate::session::SessionError;

pub use self::phone::Destination;
pub use self::resolver::StrategyKind;

/// Where a delivery request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    /// Submitted through the API.
    AdHoc,
    /// Materialized by the scheduled dispatcher.
    Scheduled,
}

impl RequestSource {
    /// Stable string form used in the history store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdHoc => "ad_hoc",
            Self::Scheduled => "scheduled",
        }
    }
}

/// A message to deliver. Immutable once enqueued.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    /// Unique request identifier.
    pub id: Uuid,
    /// Normalized destination phone number.
    pub destination: Destination,
    /// Message text.
    pub payload: String,
    /// Enqueue time.
    pub submitted_at: DateTime<Utc>,
    /// Origin of the request.
    pub source: RequestSource,
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The send action was issued.
    Success,
    /// Failed, but worth retrying (session, resolution, or submit error).
    TransientFailure,
    /// Failed in a way retrying cannot fix.
    FatalFailure,
}

/// One recorded delivery attempt. Append-only per request.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    /// Request this attempt belongs to.
    pub request_id: Uuid,
    /// 1-based, strictly increasing per request.
    pub attempt_number: u32,
    /// Which resolution strategy located the conversation, when one did.
    pub strategy_used: Option<StrategyKind>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// When the attempt was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of a request. Exactly one per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// A send action was issued for the request.
    Succeeded,
    /// The attempt budget was exhausted.
    FailedAfterRetries,
}

impl DeliveryOutcome {
    /// Stable string form used in the history store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::FailedAfterRetries => "failed_after_retries",
        }
    }
}

/// Failure to locate the target conversation.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// Every resolution strategy came up empty.
    #[error("target conversation not found")]
    TargetNotFound,
}

/// Failure to submit the message once a conversation was open.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// No text-entry control candidate resolved within its bound.
    #[error("message input control not found")]
    InputNotFound,

    /// No send control resolved and the confirm-keystroke fallback failed.
    #[error("send control not found")]
    SendControlNotFound,
}

/// Any failure inside a single delivery attempt.
///
/// All variants are converted into retry decisions by the queue processor;
/// none of them escapes the worker loop.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The session could not be made ready.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The conversation could not be located.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The message could not be submitted.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// A driver command failed mid-attempt.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Synchronous rejections at the enqueue boundary.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// Destination has too few digits.
    #[error("destination must contain at least {min_digits} digits")]
    InvalidDestination {
        /// Configured minimum digit count.
        min_digits: usize,
    },

    /// Empty message payload.
    #[error("payload must not be empty")]
    EmptyPayload,

    /// Payload exceeds the configured maximum length.
    #[error("payload exceeds {max_chars} characters")]
    PayloadTooLong {
        /// Configured maximum payload length.
        max_chars: usize,
    },

    /// The inbound queue is at capacity.
    #[error("delivery queue is full")]
    QueueFull,

    /// The worker has stopped; no new work is accepted.
    #[error("service is shutting down")]
    ShuttingDown,
}
