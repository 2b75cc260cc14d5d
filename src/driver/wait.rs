//! Bounded waiting for asynchronous UI state changes.
//!
//! Every suspension point in the delivery pipeline (navigation settling,
//! element appearance, authentication) goes through [`BoundedWait`], so the
//! timeout and poll interval are explicit, centralized, and controllable
//! from tests. A wait that runs out of budget yields `None`; it is never an
//! error by itself.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::DriverError;

/// A predicate poll loop with an explicit budget.
#[derive(Debug, Clone, Copy)]
pub struct BoundedWait {
    /// Total time budget for the wait.
    pub timeout: Duration,
    /// Pause between predicate evaluations.
    pub poll_interval: Duration,
}

impl BoundedWait {
    /// A wait with the given timeout in seconds and a 250 ms poll interval.
    pub fn seconds(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll `probe` until it yields a value or the budget is spent.
    ///
    /// `probe` returning `Ok(None)` means "not there yet"; `Err` aborts the
    /// wait immediately (driver errors are not retried here — the retry
    /// policy lives in the queue processor).
    pub async fn until<T, F, Fut>(&self, mut probe: F) -> Result<Option<T>, DriverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, DriverError>>,
    {
        let deadline = Instant::now()
            .checked_add(self.timeout)
            .unwrap_or_else(Instant::now);
        loop {
            if let Some(value) = probe().await? {
                return Ok(Some(value));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Convenience: wait until at least one element matches `locator`.
    pub async fn for_element(
        &self,
        driver: &dyn super::UiDriver,
        locator: &super::Locator,
    ) -> Result<bool, DriverError> {
        let found = self
            .until(|| async {
                let count = driver.element_count(locator).await?;
                Ok(if count > 0 { Some(()) } else { None })
            })
            .await?;
        Ok(found.is_some())
    }
}
