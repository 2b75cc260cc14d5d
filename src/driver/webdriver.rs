//! WebDriver-backed [`UiDriver`] implementation using `thirtyfour`.
//!
//! Talks to a chromedriver/msedgedriver endpoint. Session launch kills any
//! conflicting browser instance first: a leftover browser holding the
//! user-data profile lock makes the new session unusable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::error::WebDriverError;
use thirtyfour::{By, ChromiumLikeCapabilities, DesiredCapabilities, WebDriver, WebElement};
use tracing::{debug, info, warn};

use super::{DriverError, Locator, UiDriver, UiSessionFactory};

/// WebDriver Enter key code, sent to the focused element as the generic
/// confirm keystroke fallback.
const ENTER_KEY: &str = "\u{E007}";

/// Pause after killing conflicting browser processes, letting the profile
/// lock be released before relaunch.
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Which chromium-family browser to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    /// Google Chrome / Chromium via chromedriver.
    Chrome,
    /// Microsoft Edge via msedgedriver.
    Edge,
}

/// Launch parameters for the real browser session.
#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    /// WebDriver endpoint, e.g. `http://127.0.0.1:9515`.
    pub webdriver_url: String,
    /// Browser flavour to request capabilities for.
    pub browser: BrowserKind,
    /// Persistent user-data directory holding the WhatsApp Web login.
    pub profile_dir: PathBuf,
    /// Process names to kill before launch (profile lock holders).
    pub kill_processes: Vec<String>,
    /// Page load timeout applied to the session.
    pub page_load_timeout: Duration,
}

/// Factory producing [`WebDriverUi`] sessions.
pub struct WebDriverSessionFactory {
    settings: WebDriverSettings,
}

impl WebDriverSessionFactory {
    /// Create a factory with the given launch settings.
    pub fn new(settings: WebDriverSettings) -> Self {
        Self { settings }
    }

    /// Kill any running browser instance that would contend for the profile.
    ///
    /// Best-effort: a missing process is the normal case, so failures are
    /// only logged at debug level.
    async fn kill_conflicting_processes(&self) {
        for name in &self.settings.kill_processes {
            #[cfg(target_os = "windows")]
            let result = tokio::process::Command::new("taskkill")
                .args(["/F", "/IM", name])
                .output()
                .await;
            #[cfg(not(target_os = "windows"))]
            let result = tokio::process::Command::new("pkill")
                .args(["-f", name])
                .output()
                .await;

            match result {
                Ok(out) if out.status.success() => {
                    info!(process = %name, "killed conflicting browser process");
                }
                Ok(_) => debug!(process = %name, "no conflicting process found"),
                Err(e) => debug!(process = %name, error = %e, "process kill failed"),
            }
        }
        if !self.settings.kill_processes.is_empty() {
            tokio::time::sleep(KILL_SETTLE).await;
        }
    }

    fn browser_args(&self) -> Vec<String> {
        vec![
            "--start-maximized".to_owned(),
            format!("user-data-dir={}", self.settings.profile_dir.display()),
            "--disable-gpu".to_owned(),
            "--no-sandbox".to_owned(),
            "--disable-dev-shm-usage".to_owned(),
        ]
    }

    async fn connect(&self) -> Result<WebDriver, WebDriverError> {
        let args = self.browser_args();
        match self.settings.browser {
            BrowserKind::Chrome => {
                let mut caps = DesiredCapabilities::chrome();
                for arg in &args {
                    caps.add_arg(arg)?;
                }
                WebDriver::new(&self.settings.webdriver_url, caps).await
            }
            BrowserKind::Edge => {
                let mut caps = DesiredCapabilities::edge();
                for arg in &args {
                    caps.add_arg(arg)?;
                }
                WebDriver::new(&self.settings.webdriver_url, caps).await
            }
        }
    }
}

#[async_trait]
impl UiSessionFactory for WebDriverSessionFactory {
    async fn launch(&self) -> Result<Arc<dyn UiDriver>, DriverError> {
        self.kill_conflicting_processes().await;

        let driver = self.connect().await.map_err(map_err)?;
        if let Err(e) = driver
            .set_page_load_timeout(self.settings.page_load_timeout)
            .await
        {
            warn!(error = %e, "failed to set page load timeout");
        }
        info!(url = %self.settings.webdriver_url, "browser session created");
        Ok(Arc::new(WebDriverUi { driver }))
    }
}

/// [`UiDriver`] over a live `thirtyfour` session.
pub struct WebDriverUi {
    driver: WebDriver,
}

impl WebDriverUi {
    fn by(locator: &Locator) -> By {
        match locator {
            Locator::Css(expr) => By::Css(*expr),
            Locator::XPath(expr) => By::XPath(*expr),
        }
    }

    async fn find_nth(&self, locator: &Locator, index: usize) -> Result<WebElement, DriverError> {
        let elements = self
            .driver
            .find_all(Self::by(locator))
            .await
            .map_err(map_err)?;
        elements
            .into_iter()
            .nth(index)
            .ok_or_else(|| DriverError::Command(format!("no element {index} for {locator}")))
    }
}

/// Map a `thirtyfour` error onto the driver taxonomy.
///
/// A dead session must surface as [`DriverError::SessionClosed`] so the
/// queue processor knows to invalidate and restart rather than just retry.
fn map_err(e: WebDriverError) -> DriverError {
    let text = e.to_string();
    if text.contains("invalid session id") || text.contains("session not created") {
        DriverError::SessionClosed
    } else {
        DriverError::Command(text)
    }
}

#[async_trait]
impl UiDriver for WebDriverUi {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!(url, "navigating");
        self.driver.goto(url).await.map_err(map_err)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let url = self.driver.current_url().await.map_err(map_err)?;
        Ok(url.to_string())
    }

    async fn element_count(&self, locator: &Locator) -> Result<usize, DriverError> {
        let elements = self
            .driver
            .find_all(Self::by(locator))
            .await
            .map_err(map_err)?;
        Ok(elements.len())
    }

    async fn element_texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        let elements = self
            .driver
            .find_all(Self::by(locator))
            .await
            .map_err(map_err)?;
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            // Titles carry the full text even when the visible label is
            // truncated, so prefer the attribute.
            let text = match element.attr("title").await.map_err(map_err)? {
                Some(title) if !title.is_empty() => title,
                _ => element.text().await.map_err(map_err)?,
            };
            texts.push(text);
        }
        Ok(texts)
    }

    async fn click_element(&self, locator: &Locator, index: usize) -> Result<(), DriverError> {
        let element = self.find_nth(locator, index).await?;
        element.click().await.map_err(map_err)
    }

    async fn is_interactable(&self, locator: &Locator, index: usize) -> Result<bool, DriverError> {
        let element = self.find_nth(locator, index).await?;
        element.is_clickable().await.map_err(map_err)
    }

    async fn type_text(
        &self,
        locator: &Locator,
        index: usize,
        text: &str,
    ) -> Result<(), DriverError> {
        let element = self.find_nth(locator, index).await?;
        element.click().await.map_err(map_err)?;
        element.send_keys(text).await.map_err(map_err)
    }

    async fn confirm_focused(&self) -> Result<(), DriverError> {
        let element = self.driver.active_element().await.map_err(map_err)?;
        element.send_keys(ENTER_KEY).await.map_err(map_err)
    }

    async fn release(&self) -> Result<(), DriverError> {
        // WebDriver::quit consumes; the handle is internally ref-counted.
        self.driver.clone().quit().await.map_err(map_err)
    }
}
