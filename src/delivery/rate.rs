//! Token-bucket gate for outbound delivery rate.
//!
//! The original configuration declared `rate_limit_per_minute` without any
//! code consulting it; here the limit is enforced where it matters — once
//! per request, by the queue processor, before the attempt loop starts.
//! Integer millisecond arithmetic throughout; no float drift.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const MILLIS_PER_MINUTE: u64 = 60_000;

struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// A token bucket refilled at `limit_per_minute` tokens per minute, with a
/// burst capacity of one minute's worth.
pub struct RateGate {
    limit_per_minute: u64,
    state: Mutex<BucketState>,
}

impl RateGate {
    /// Create a gate. `limit_per_minute == 0` disables limiting entirely.
    pub fn new(limit_per_minute: u32) -> Self {
        let limit = u64::from(limit_per_minute);
        Self {
            limit_per_minute: limit,
            state: Mutex::new(BucketState {
                tokens: limit,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Whether the gate enforces anything.
    pub fn enabled(&self) -> bool {
        self.limit_per_minute > 0
    }

    /// Take one token, sleeping until one is available.
    ///
    /// Called on the worker task only, so blocking here delays the queue —
    /// which is exactly the intended throttling behavior.
    pub async fn acquire(&self) {
        if !self.enabled() {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens > 0 {
                    state.tokens = state.tokens.saturating_sub(1);
                    return;
                }
                self.time_to_next_token()
            };
            debug!(wait_ms = %wait.as_millis(), "rate gate: waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed_ms = u64::try_from(state.last_refill.elapsed().as_millis()).unwrap_or(u64::MAX);
        let earned = elapsed_ms
            .saturating_mul(self.limit_per_minute)
            .checked_div(MILLIS_PER_MINUTE)
            .unwrap_or(0);
        if earned == 0 {
            return;
        }
        state.tokens = state
            .tokens
            .saturating_add(earned)
            .min(self.limit_per_minute);
        // Advance by the time the earned tokens represent rather than to
        // now: the fractional remainder of the next token keeps accruing
        // across refills instead of being discarded each time.
        let consumed_ms = earned
            .saturating_mul(MILLIS_PER_MINUTE)
            .checked_div(self.limit_per_minute)
            .unwrap_or(0);
        state.last_refill = state
            .last_refill
            .checked_add(Duration::from_millis(consumed_ms))
            .unwrap_or_else(Instant::now);
    }

    fn time_to_next_token(&self) -> Duration {
        let ms = MILLIS_PER_MINUTE
            .checked_div(self.limit_per_minute)
            .unwrap_or(MILLIS_PER_MINUTE)
            .max(50);
        Duration::from_millis(ms)
    }
}
