//! Recurring message schedules: cadence arithmetic and the dispatcher.
//!
//! A [`Cadence`] is an explicit tagged variant with a pure next-fire-time
//! function, so recurrence logic is testable without any clock or queue.
//! The [`Dispatcher`] tick loop materializes due schedules into ordinary
//! delivery requests; scheduled traffic shares the queue with ad-hoc
//! traffic, with no separate path and no priority.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::delivery::queue::DeliveryQueue;
use crate::delivery::RequestSource;
use crate::store::{ScheduledJob, Store};

/// When a recurring job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cadence {
    /// Fire once at an absolute instant.
    OneTime {
        /// The instant to fire at.
        at: DateTime<Utc>,
    },
    /// Fire every day at a time of day (UTC).
    Daily {
        /// Time of day.
        at: NaiveTime,
    },
    /// Fire on the given weekdays at a time of day (UTC).
    Weekly {
        /// Days of the week to fire on.
        days: Vec<Weekday>,
        /// Time of day.
        at: NaiveTime,
    },
    /// Fire monthly on a day of the month at a time of day (UTC).
    ///
    /// A `day_of_month` beyond a month's length clamps to that month's
    /// last day (31 fires on Feb 28/29).
    Monthly {
        /// Day of the month, 1-based.
        day_of_month: u32,
        /// Time of day.
        at: NaiveTime,
    },
}

impl Cadence {
    /// First fire instant strictly after `after`, if any.
    ///
    /// Pure: no clock access, so tests drive it with fixed instants.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OneTime { at } => (*at > after).then_some(*at),
            Self::Daily { at } => {
                let today = at_instant(after.date_naive(), *at)?;
                if today > after {
                    Some(today)
                } else {
                    let tomorrow = after.date_naive().checked_add_days(Days::new(1))?;
                    at_instant(tomorrow, *at)
                }
            }
            Self::Weekly { days, at } => {
                if days.is_empty() {
                    return None;
                }
                // At most a full week ahead of `after`.
                for offset in 0..=7u64 {
                    let date = after.date_naive().checked_add_days(Days::new(offset))?;
                    if !days.contains(&date.weekday()) {
                        continue;
                    }
                    let candidate = at_instant(date, *at)?;
                    if candidate > after {
                        return Some(candidate);
                    }
                }
                None
            }
            Self::Monthly { day_of_month, at } => {
                for offset in 0..=13u32 {
                    let anchor = after
                        .date_naive()
                        .with_day(1)?
                        .checked_add_months(Months::new(offset))?;
                    let date = clamp_to_month(anchor.year(), anchor.month(), *day_of_month)?;
                    let candidate = at_instant(date, *at)?;
                    if candidate > after {
                        return Some(candidate);
                    }
                }
                None
            }
        }
    }

    /// Whether this cadence only ever fires once.
    pub fn is_one_time(&self) -> bool {
        matches!(self, Self::OneTime { .. })
    }
}

fn at_instant(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    Utc.from_local_datetime(&date.and_time(time)).single()
}

/// `day` clamped into the given month's length.
fn clamp_to_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let mut d = day.clamp(1, 31);
    while d >= 1 {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, d) {
            return Some(date);
        }
        d = d.saturating_sub(1);
    }
    None
}

/// Per-schedule last-fired bookkeeping.
#[derive(Debug, Default)]
pub struct SchedulerState {
    last_fired: HashMap<Uuid, DateTime<Utc>>,
}

impl SchedulerState {
    /// Empty state, nothing fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a schedule fired at `at`.
    pub fn record_fired(&mut self, id: Uuid, at: DateTime<Utc>) {
        self.last_fired.insert(id, at);
    }

    /// Last fire time for a schedule.
    pub fn last_fired(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.last_fired.get(&id).copied()
    }
}

/// Whether `job` is due at `now`, given the anchor (its last fire time, or
/// the dispatcher start for never-fired schedules).
pub fn is_due(cadence: &Cadence, anchor: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    cadence
        .next_fire_after(anchor)
        .is_some_and(|fire| fire <= now)
}

/// Periodically re-submits recurring jobs into the delivery queue.
pub struct Dispatcher {
    store: Arc<Store>,
    queue: DeliveryQueue,
    tick: Duration,
    state: SchedulerState,
    /// Anchor for schedules that have never fired: schedules only count
    /// ticks after the process came up, mirroring the original service
    /// which re-registered schedules on bot start.
    started_at: DateTime<Utc>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Create a dispatcher ticking every `tick`.
    pub fn new(
        store: Arc<Store>,
        queue: DeliveryQueue,
        tick: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            queue,
            tick,
            state: SchedulerState::new(),
            started_at: Utc::now(),
            shutdown,
        }
    }

    /// Spawn the tick loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until shutdown.
    pub async fn run(mut self) {
        info!(tick_secs = self.tick.as_secs(), "scheduled dispatcher started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {
                    self.tick_once(Utc::now()).await;
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("scheduled dispatcher stopped");
    }

    /// Evaluate every active schedule against `now` and enqueue the due ones.
    pub async fn tick_once(&mut self, now: DateTime<Utc>) {
        let jobs = match self.store.active_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed to load schedules, skipping tick");
                return;
            }
        };

        for job in jobs {
            let anchor = self
                .state
                .last_fired(job.schedule.id)
                .unwrap_or(self.started_at);
            if !is_due(&job.schedule.cadence, anchor, now) {
                continue;
            }
            self.fire(&job, now).await;
        }
    }

    async fn fire(&mut self, job: &ScheduledJob, now: DateTime<Utc>) {
        let payload = job.template.render(&job.recipient.name);
        match self
            .queue
            .enqueue(&job.recipient.phone, &payload, RequestSource::Scheduled)
        {
            Ok(request_id) => {
                debug!(
                    schedule_id = %job.schedule.id,
                    %request_id,
                    "scheduled message enqueued"
                );
            }
            Err(e) => {
                warn!(schedule_id = %job.schedule.id, error = %e, "scheduled enqueue rejected");
            }
        }
        // Fired means evaluated: even a rejected enqueue consumes this
        // occurrence, otherwise a bad schedule would retry every tick.
        self.state.record_fired(job.schedule.id, now);

        if job.schedule.cadence.is_one_time() {
            if let Err(e) = self.store.deactivate_schedule(job.schedule.id).await {
                warn!(schedule_id = %job.schedule.id, error = %e, "failed to deactivate one-time schedule");
            }
        }
    }
}
