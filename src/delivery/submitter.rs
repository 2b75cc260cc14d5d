//! Message submission into an already-open conversation.
//!
//! The markup around the composer and the send control shifts between
//! accounts and sessions, so both are located through ordered candidate
//! lists. Success is optimistic: the UI gives no durable delivery receipt,
//! so this component only guarantees the send action was issued.

use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::locators::{COMPOSER_CANDIDATES, SEND_CANDIDATES};
use crate::driver::wait::BoundedWait;
use crate::driver::{DriverError, Locator, UiDriver};

use super::SubmitError;

/// Wait bounds and retry counts for submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitterTiming {
    /// Wait applied per composer candidate.
    pub input_wait: BoundedWait,
    /// Wait applied per send-control probe round.
    pub send_wait: BoundedWait,
    /// Rounds of send-control probing before the keystroke fallback.
    pub send_retries: u32,
    /// Pause after the send action before reporting success.
    pub post_send_settle: Duration,
}

impl Default for SubmitterTiming {
    fn default() -> Self {
        Self {
            input_wait: BoundedWait::seconds(5),
            send_wait: BoundedWait::seconds(2),
            send_retries: 3,
            post_send_settle: Duration::from_secs(2),
        }
    }
}

/// Types the payload and triggers send.
pub struct MessageSubmitter {
    timing: SubmitterTiming,
}

impl MessageSubmitter {
    /// Create a submitter with the given timing.
    pub fn new(timing: SubmitterTiming) -> Self {
        Self { timing }
    }

    /// Submit `payload` into the currently open conversation.
    ///
    /// `prefilled` skips the typing step for payloads already placed by a
    /// navigation.
    ///
    /// # Errors
    ///
    /// [`SubmitError::InputNotFound`] when no composer candidate resolves,
    /// [`SubmitError::SendControlNotFound`] when neither a send control nor
    /// the confirm-keystroke fallback works. Driver failures propagate
    /// separately.
    pub async fn submit(
        &self,
        driver: &dyn UiDriver,
        payload: &str,
        prefilled: bool,
    ) -> Result<Result<(), SubmitError>, DriverError> {
        if !prefilled {
            let Some(composer) = self.locate_composer(driver).await? else {
                return Ok(Err(SubmitError::InputNotFound));
            };
            driver.type_text(composer, 0, payload).await?;
            debug!("payload typed into composer");
        }

        if self.click_send(driver).await? {
            tokio::time::sleep(self.timing.post_send_settle).await;
            return Ok(Ok(()));
        }

        // Last resort: generic confirm keystroke on the focused element,
        // which is the composer right after typing.
        match driver.confirm_focused().await {
            Ok(()) => {
                warn!("send control not found, used confirm keystroke fallback");
                tokio::time::sleep(self.timing.post_send_settle).await;
                Ok(Ok(()))
            }
            Err(DriverError::SessionClosed) => Err(DriverError::SessionClosed),
            Err(e) => {
                warn!(error = %e, "confirm keystroke fallback failed");
                Ok(Err(SubmitError::SendControlNotFound))
            }
        }
    }

    /// First composer candidate that shows up interactable within its wait.
    async fn locate_composer(
        &self,
        driver: &dyn UiDriver,
    ) -> Result<Option<&'static Locator>, DriverError> {
        for candidate in COMPOSER_CANDIDATES {
            let present = self
                .timing
                .input_wait
                .until(|| async {
                    if driver.element_count(candidate).await? == 0 {
                        return Ok(None);
                    }
                    let usable = driver.is_interactable(candidate, 0).await?;
                    Ok(if usable { Some(()) } else { None })
                })
                .await?;
            if present.is_some() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Probe the send-control candidates over several short rounds; click
    /// the first present-and-interactable one.
    async fn click_send(&self, driver: &dyn UiDriver) -> Result<bool, DriverError> {
        for round in 0..self.timing.send_retries {
            for candidate in SEND_CANDIDATES {
                let found = self
                    .timing
                    .send_wait
                    .until(|| async {
                        if driver.element_count(candidate).await? == 0 {
                            return Ok(None);
                        }
                        let usable = driver.is_interactable(candidate, 0).await?;
                        Ok(if usable { Some(()) } else { None })
                    })
                    .await?;
                if found.is_some() {
                    driver.click_element(candidate, 0).await?;
                    debug!(round, locator = %candidate, "send control clicked");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
