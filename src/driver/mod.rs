//! Browser-driving seam: the [`UiDriver`] trait, locators, and bounded waits.
//!
//! Everything above this module (session manager, resolver, submitter) talks
//! to WhatsApp Web exclusively through [`UiDriver`], so tests can swap in a
//! scripted fake and the WebDriver wire protocol stays confined to
//! [`webdriver`].

pub mod locators;
pub mod wait;
pub mod webdriver;

use std::sync::Arc;

use async_trait::async_trait;

/// Errors from driver commands.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A WebDriver command failed (element stale, protocol error, ...).
    #[error("driver command failed: {0}")]
    Command(String),

    /// The underlying browser session is gone and cannot serve commands.
    #[error("browser session closed")]
    SessionClosed,
}

/// How to locate elements in the driven page.
///
/// Only the mechanisms the delivery pipeline actually uses; the catalog of
/// concrete WhatsApp Web locators lives in [`locators`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// CSS selector.
    Css(&'static str),
    /// XPath expression.
    XPath(&'static str),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(expr) => write!(f, "css:{expr}"),
            Self::XPath(expr) => write!(f, "xpath:{expr}"),
        }
    }
}

/// Low-level operations the delivery pipeline needs from the driven UI.
///
/// Index-based addressing (locator + position) keeps the trait object-safe
/// and avoids handing out element handles that go stale across navigations.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Navigate the page to `url`.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Current page URL.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Number of elements currently matching `locator`.
    async fn element_count(&self, locator: &Locator) -> Result<usize, DriverError>;

    /// Visible text of every element matching `locator`, in DOM order.
    async fn element_texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError>;

    /// Click the `index`-th element matching `locator`.
    async fn click_element(&self, locator: &Locator, index: usize) -> Result<(), DriverError>;

    /// Whether the `index`-th match is displayed and enabled.
    async fn is_interactable(&self, locator: &Locator, index: usize) -> Result<bool, DriverError>;

    /// Type `text` into the `index`-th element matching `locator`.
    async fn type_text(
        &self,
        locator: &Locator,
        index: usize,
        text: &str,
    ) -> Result<(), DriverError>;

    /// Press the platform confirm keystroke (Enter) on the focused element.
    async fn confirm_focused(&self) -> Result<(), DriverError>;

    /// Release the underlying browser session.
    ///
    /// Callers treat failures as log-and-continue; after this returns the
    /// driver must not be used again.
    async fn release(&self) -> Result<(), DriverError>;
}

/// Produces fresh [`UiDriver`] sessions for the session manager.
///
/// The production implementation ([`webdriver::WebDriverSessionFactory`])
/// kills conflicting browser processes and speaks to a chromedriver /
/// msedgedriver endpoint; tests install counting fakes to pin down the
/// one-session-at-a-time guarantee.
#[async_trait]
pub trait UiSessionFactory: Send + Sync {
    /// Launch a new browser-automation session.
    async fn launch(&self) -> Result<Arc<dyn UiDriver>, DriverError>;
}
