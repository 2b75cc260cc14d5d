//! Target resolution: leave the UI positioned on the right conversation.
//!
//! Strategies are an ordered, first-class list tried in fixed priority
//! order. A strategy that finds nothing reports `None` — that is control
//! flow, not an error. Only after every strategy has passed does resolution
//! fail with [`ResolutionError::TargetNotFound`].

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::driver::locators::{
    CHAT_LIST_TITLES, CONVERSATION_OPEN, UNSAVED_ENTRY_TITLES, WHATSAPP_WEB_URL,
};
use crate::driver::wait::BoundedWait;
use crate::driver::{DriverError, Locator, UiDriver};

use super::{Destination, ResolutionError};

/// Which strategy located the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Matched a row in the visible conversation list.
    ExistingChat,
    /// Matched a visible "start new conversation" result entry.
    UnsavedEntry,
    /// Landed on the conversation through the destination deep link.
    DirectNavigation,
}

impl StrategyKind {
    /// Fixed priority order, first success wins.
    pub const PRIORITY: [Self; 3] = [Self::ExistingChat, Self::UnsavedEntry, Self::DirectNavigation];

    /// Stable string form used in attempt records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExistingChat => "existing_chat",
            Self::UnsavedEntry => "unsaved_entry",
            Self::DirectNavigation => "direct_navigation",
        }
    }
}

/// A successfully positioned conversation.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTarget {
    /// Strategy that produced the match.
    pub strategy: StrategyKind,
    /// Whether the payload was pre-filled by the navigation. Destination
    /// deep links carry no text parameter, so this is currently always
    /// false; the submitter honors it regardless.
    pub payload_prefilled: bool,
}

/// Per-strategy wait bounds.
#[derive(Debug, Clone, Copy)]
pub struct ResolverTiming {
    /// Wait for list/entry scans to produce rows.
    pub scan_wait: BoundedWait,
    /// Wait for a clicked or navigated conversation to open.
    pub open_wait: BoundedWait,
}

impl Default for ResolverTiming {
    fn default() -> Self {
        Self {
            scan_wait: BoundedWait::seconds(3),
            open_wait: BoundedWait::seconds(8),
        }
    }
}

/// Finds or opens the conversation for a destination.
pub struct TargetResolver {
    timing: ResolverTiming,
}

impl TargetResolver {
    /// Create a resolver with the given wait bounds.
    pub fn new(timing: ResolverTiming) -> Self {
        Self { timing }
    }

    /// Try every strategy in priority order.
    ///
    /// # Errors
    ///
    /// [`ResolutionError::TargetNotFound`] when all strategies are
    /// exhausted; driver failures propagate as [`DriverError`] through the
    /// delivery error type.
    pub async fn resolve(
        &self,
        driver: &dyn UiDriver,
        destination: &Destination,
    ) -> Result<Result<ResolvedTarget, ResolutionError>, DriverError> {
        for strategy in StrategyKind::PRIORITY {
            let matched = match strategy {
                StrategyKind::ExistingChat => {
                    self.match_titles(driver, &CHAT_LIST_TITLES, destination)
                        .await?
                }
                StrategyKind::UnsavedEntry => {
                    self.match_titles(driver, &UNSAVED_ENTRY_TITLES, destination)
                        .await?
                }
                StrategyKind::DirectNavigation => {
                    self.navigate_direct(driver, destination).await?
                }
            };
            if matched {
                debug!(strategy = strategy.as_str(), %destination, "conversation resolved");
                return Ok(Ok(ResolvedTarget {
                    strategy,
                    payload_prefilled: false,
                }));
            }
            debug!(strategy = strategy.as_str(), "no match, falling through");
        }
        Ok(Err(ResolutionError::TargetNotFound))
    }

    /// Scan the titles under `locator` for an entry rendering `destination`
    /// in any format; click the first hit and wait for the conversation.
    async fn match_titles(
        &self,
        driver: &dyn UiDriver,
        locator: &Locator,
        destination: &Destination,
    ) -> Result<bool, DriverError> {
        let hit = self
            .timing
            .scan_wait
            .until(|| async {
                let titles = driver.element_texts(locator).await?;
                Ok(titles
                    .iter()
                    .position(|title| destination.matches_rendered(title)))
            })
            .await?;

        let Some(index) = hit else {
            return Ok(false);
        };
        driver.click_element(locator, index).await?;
        self.timing.open_wait.for_element(driver, &CONVERSATION_OPEN).await
    }

    /// Navigate to the destination-only deep link and wait for the
    /// conversation. Lands on a disambiguation screen instead? Give the
    /// unsaved-entry matcher one more pass over the new page.
    async fn navigate_direct(
        &self,
        driver: &dyn UiDriver,
        destination: &Destination,
    ) -> Result<bool, DriverError> {
        let url = deep_link(destination);
        driver.navigate(&url).await?;

        if self
            .timing
            .open_wait
            .for_element(driver, &CONVERSATION_OPEN)
            .await?
        {
            return Ok(true);
        }
        self.match_titles(driver, &UNSAVED_ENTRY_TITLES, destination)
            .await
    }
}

/// Destination-only deep link. No message text is embedded: mixing payload
/// into the URL invites encoding bugs and pre-fill races.
pub fn deep_link(destination: &Destination) -> String {
    let mut url = match Url::parse(WHATSAPP_WEB_URL) {
        Ok(u) => u,
        // WHATSAPP_WEB_URL is a valid constant; this arm is unreachable in
        // practice but keeps the function total.
        Err(_) => return format!("{WHATSAPP_WEB_URL}/send?phone={}", destination.digits()),
    };
    url.set_path("/send");
    url.query_pairs_mut()
        .append_pair("phone", destination.digits());
    url.to_string()
}
