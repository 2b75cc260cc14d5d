//! The single-consumer delivery queue and its worker loop.
//!
//! Requests flow in from the API and the scheduled dispatcher over one
//! bounded `mpsc` channel and are processed strictly in enqueue order by a
//! single worker task — the browser session cannot serve concurrent
//! navigations. Every failure inside an attempt becomes a retry decision;
//! nothing escapes the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::driver::UiDriver;
use crate::session::{SessionError, SessionManager};
use crate::store::Store;

use super::ledger::Ledger;
use super::rate::RateGate;
use super::resolver::TargetResolver;
use super::submitter::MessageSubmitter;
use super::{
    AttemptOutcome, DeliveryError, DeliveryOutcome, DeliveryRequest, Destination, EnqueueError,
    RequestSource, StrategyKind,
};

/// Retry and validation knobs for the queue processor.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Maximum attempts per request (at least 1).
    pub max_retries: u32,
    /// Sleep between attempts.
    pub retry_delay: Duration,
    /// Channel capacity.
    pub capacity: usize,
    /// Minimum digit count for destinations.
    pub min_destination_digits: usize,
    /// Country code prepended to local numbers.
    pub default_country_code: String,
    /// Maximum payload length in characters.
    pub max_payload_chars: usize,
    /// Outbound requests per minute (0 disables the gate).
    pub rate_limit_per_minute: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            capacity: 128,
            min_destination_digits: 10,
            default_country_code: String::new(),
            max_payload_chars: 4096,
            rate_limit_per_minute: 0,
        }
    }
}

/// One end-to-end delivery attempt against an open session.
///
/// Seam between the worker's retry/accounting logic and the UI mechanics,
/// so queue behavior is testable without a browser.
#[async_trait]
pub trait DeliveryPipeline: Send + Sync {
    /// Resolve the target and submit the payload; returns the strategy that
    /// located the conversation.
    async fn deliver(
        &self,
        driver: &dyn UiDriver,
        request: &DeliveryRequest,
    ) -> Result<StrategyKind, DeliveryError>;
}

/// Production pipeline: [`TargetResolver`] then [`MessageSubmitter`].
pub struct UiDeliveryPipeline {
    resolver: TargetResolver,
    submitter: MessageSubmitter,
}

impl UiDeliveryPipeline {
    /// Compose the resolver and submitter.
    pub fn new(resolver: TargetResolver, submitter: MessageSubmitter) -> Self {
        Self {
            resolver,
            submitter,
        }
    }
}

#[async_trait]
impl DeliveryPipeline for UiDeliveryPipeline {
    async fn deliver(
        &self,
        driver: &dyn UiDriver,
        request: &DeliveryRequest,
    ) -> Result<StrategyKind, DeliveryError> {
        let target = self.resolver.resolve(driver, &request.destination).await??;
        self.submitter
            .submit(driver, &request.payload, target.payload_prefilled)
            .await??;
        Ok(target.strategy)
    }
}

/// Producer half: validation and enqueue.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<DeliveryRequest>,
    ledger: Arc<Ledger>,
    settings: QueueSettings,
}

impl DeliveryQueue {
    /// Validate and enqueue a request; returns its id immediately.
    ///
    /// # Errors
    ///
    /// [`EnqueueError`] on validation failure, a full queue, or shutdown.
    /// Rejected requests never appear in the ledger or attempt history.
    pub fn enqueue(
        &self,
        destination: &str,
        payload: &str,
        source: RequestSource,
    ) -> Result<Uuid, EnqueueError> {
        let destination = Destination::normalize(
            destination,
            self.settings.min_destination_digits,
            &self.settings.default_country_code,
        )
        .ok_or(EnqueueError::InvalidDestination {
            min_digits: self.settings.min_destination_digits,
        })?;

        if payload.trim().is_empty() {
            return Err(EnqueueError::EmptyPayload);
        }
        if payload.chars().count() > self.settings.max_payload_chars {
            return Err(EnqueueError::PayloadTooLong {
                max_chars: self.settings.max_payload_chars,
            });
        }

        let request = DeliveryRequest {
            id: Uuid::new_v4(),
            destination,
            payload: payload.to_owned(),
            submitted_at: Utc::now(),
            source,
        };
        let id = request.id;

        self.ledger.admit(request.clone());
        match self.tx.try_send(request) {
            Ok(()) => {
                debug!(request_id = %id, source = source.as_str(), "request enqueued");
                Ok(id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.ledger.evict(id);
                Err(EnqueueError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.ledger.evict(id);
                Err(EnqueueError::ShuttingDown)
            }
        }
    }

    /// Requests currently buffered in the channel.
    pub fn depth(&self) -> usize {
        self.settings
            .capacity
            .saturating_sub(self.tx.capacity())
    }

    /// Shared ledger handle.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

/// Consumer half: the worker loop.
pub struct DeliveryWorker {
    rx: mpsc::Receiver<DeliveryRequest>,
    session: Arc<SessionManager>,
    pipeline: Arc<dyn DeliveryPipeline>,
    ledger: Arc<Ledger>,
    store: Option<Arc<Store>>,
    rate_gate: RateGate,
    settings: QueueSettings,
    shutdown: watch::Receiver<bool>,
}

/// Build the connected queue/worker pair.
pub fn channel(
    settings: QueueSettings,
    session: Arc<SessionManager>,
    pipeline: Arc<dyn DeliveryPipeline>,
    store: Option<Arc<Store>>,
    shutdown: watch::Receiver<bool>,
) -> (DeliveryQueue, DeliveryWorker) {
    let (tx, rx) = mpsc::channel(settings.capacity.max(1));
    let ledger = Arc::new(Ledger::new());
    let queue = DeliveryQueue {
        tx,
        ledger: Arc::clone(&ledger),
        settings: settings.clone(),
    };
    let rate_gate = RateGate::new(settings.rate_limit_per_minute);
    let worker = DeliveryWorker {
        rx,
        session,
        pipeline,
        ledger,
        store,
        rate_gate,
        settings,
        shutdown,
    };
    (queue, worker)
}

impl DeliveryWorker {
    /// Spawn the worker onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until shutdown or channel closure.
    pub async fn run(mut self) {
        info!("delivery worker started");
        loop {
            // The change notification may already have been consumed by a
            // wait inside `process`, so the flag itself decides.
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                next = self.rx.recv() => {
                    let Some(request) = next else { break };
                    self.process(request).await;
                }
            }
        }
        info!("delivery worker stopped");
    }

    /// Process one request to a terminal outcome.
    async fn process(&mut self, request: DeliveryRequest) {
        if self.wait_for_rate_slot().await {
            // Shutdown while throttled: leave the request with the state
            // it reached, as with shutdown during backoff.
            return;
        }

        let max_attempts = self.settings.max_retries.max(1);
        let mut attempt_number: u32 = 0;
        loop {
            attempt_number = attempt_number.saturating_add(1);

            match self.attempt(&request).await {
                Ok(strategy) => {
                    self.ledger.record_attempt(
                        request.id,
                        attempt_number,
                        Some(strategy),
                        AttemptOutcome::Success,
                    );
                    self.ledger.resolve(request.id, DeliveryOutcome::Succeeded);
                    info!(
                        request_id = %request.id,
                        attempt = attempt_number,
                        strategy = strategy.as_str(),
                        "delivery succeeded"
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        attempt = attempt_number,
                        error = %e,
                        "delivery attempt failed"
                    );
                    self.ledger.record_attempt(
                        request.id,
                        attempt_number,
                        None,
                        AttemptOutcome::TransientFailure,
                    );
                    if attempt_number >= max_attempts {
                        self.ledger
                            .resolve(request.id, DeliveryOutcome::FailedAfterRetries);
                        error!(
                            request_id = %request.id,
                            attempts = attempt_number,
                            "delivery failed after retries"
                        );
                        break;
                    }
                    if self.sleep_before_retry().await {
                        // Shutdown during backoff: leave the request with
                        // the attempt state it reached.
                        return;
                    }
                }
            }
        }

        self.archive(&request, attempt_number).await;
    }

    /// One attempt: session readiness, then the pipeline.
    async fn attempt(&self, request: &DeliveryRequest) -> Result<StrategyKind, DeliveryError> {
        self.session.ensure_ready().await?;
        let driver = self
            .session
            .driver()
            .await
            .ok_or(DeliveryError::Session(SessionError::UnderlyingSessionCrashed))?;

        let result = self.pipeline.deliver(driver.as_ref(), request).await;
        if matches!(result, Err(DeliveryError::Driver(_))) {
            // Driver-level failure usually means the browser is wedged or
            // gone; force a fresh session for the next attempt.
            self.session.invalidate().await;
        }
        result
    }

    /// Returns true when shutdown fired while waiting on the rate gate.
    ///
    /// The gate can hold the worker for up to a full token interval, so
    /// the wait must not outlive a shutdown signal.
    async fn wait_for_rate_slot(&mut self) -> bool {
        let gate = &self.rate_gate;
        let shutdown = &mut self.shutdown;
        tokio::select! {
            () = gate.acquire() => false,
            _ = shutdown.changed() => *shutdown.borrow(),
        }
    }

    /// Returns true when shutdown fired during the backoff sleep.
    async fn sleep_before_retry(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.retry_delay) => false,
            _ = self.shutdown.changed() => *self.shutdown.borrow(),
        }
    }

    /// Append the resolved request to the history store, best-effort.
    ///
    /// Once the row is written the in-memory record (payload included) is
    /// pruned; retaining every resolved request would grow without bound
    /// in a long-running process. On archive failure the record stays so
    /// status queries keep working.
    async fn archive(&self, request: &DeliveryRequest, attempts: u32) {
        let Some(store) = &self.store else { return };
        let Some(Some(outcome)) = self.ledger.outcome(request.id) else {
            return;
        };
        if let Err(e) = store.append_history(request, outcome, attempts).await {
            warn!(request_id = %request.id, error = %e, "failed to archive history record");
            return;
        }
        self.ledger.prune_resolved(request.id);
    }
}
