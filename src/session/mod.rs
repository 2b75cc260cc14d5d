//! Lifecycle of the single WhatsApp Web automation session.
//!
//! The [`SessionManager`] is the only writer of [`SessionState`]. Start and
//! stop are serialized by one internal lock, so an administrative restart
//! racing an automatic restart-on-failure can never spawn a second browser
//! session.

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::driver::locators::{AUTH_READY, QR_CODE, WHATSAPP_WEB_URL};
use crate::driver::wait::BoundedWait;
use crate::driver::{DriverError, UiDriver, UiSessionFactory};

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The UI never reached the authenticated main screen within the bound.
    #[error("authentication timed out")]
    AuthenticationTimeout,

    /// The underlying browser session died or was never established.
    #[error("underlying session crashed")]
    UnderlyingSessionCrashed,

    /// The browser session could not be created at all.
    #[error("session launch failed: {0}")]
    LaunchFailed(String),
}

/// Where the automation session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No browser session exists.
    Stopped,
    /// A browser session is being created.
    Starting,
    /// The browser is up, waiting for the authenticated main screen.
    AwaitingAuthentication,
    /// Authenticated and usable.
    Ready,
    /// The last start or use failed; a restart is required.
    Failed,
}

/// Timing knobs for session startup.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Bound on the wait for the authenticated main screen.
    pub auth_wait: BoundedWait,
    /// Bound on the initial page-settle wait after navigation.
    pub page_settle: BoundedWait,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            auth_wait: BoundedWait::seconds(60),
            page_settle: BoundedWait::seconds(10),
        }
    }
}

struct SessionInner {
    driver: Option<Arc<dyn UiDriver>>,
}

/// Owns the single automation session.
pub struct SessionManager {
    factory: Arc<dyn UiSessionFactory>,
    timing: SessionTiming,
    // Serializes start/stop/invalidate; holding it is the write permit
    // for both `inner` and `state`.
    inner: Mutex<SessionInner>,
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// Create a manager in the `Stopped` state.
    pub fn new(factory: Arc<dyn UiSessionFactory>, timing: SessionTiming) -> Self {
        Self {
            factory,
            timing,
            inner: Mutex::new(SessionInner { driver: None }),
            state: RwLock::new(SessionState::Stopped),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .map(|guard| *guard)
            .unwrap_or(SessionState::Failed)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = next;
        }
    }

    /// Handle to the live driver, if the session is ready.
    pub async fn driver(&self) -> Option<Arc<dyn UiDriver>> {
        if self.state() != SessionState::Ready {
            return None;
        }
        self.inner.lock().await.driver.clone()
    }

    /// Start the session. Idempotent: returns immediately when already ready.
    ///
    /// Transitions Stopped → Starting → AwaitingAuthentication → Ready. On
    /// authentication timeout the browser is released and the state becomes
    /// `Failed`.
    ///
    /// # Errors
    ///
    /// [`SessionError::LaunchFailed`] when the browser session cannot be
    /// created, [`SessionError::AuthenticationTimeout`] when the main screen
    /// never appears within the bound.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.driver.is_some() && self.state() == SessionState::Ready {
            return Ok(());
        }

        // A stale driver from a failed prior run is released first.
        if let Some(old) = inner.driver.take() {
            release_quietly(old.as_ref()).await;
        }

        self.set_state(SessionState::Starting);
        info!("starting WhatsApp Web session");

        let driver = match self.factory.launch().await {
            Ok(d) => d,
            Err(e) => {
                self.set_state(SessionState::Failed);
                return Err(SessionError::LaunchFailed(e.to_string()));
            }
        };

        self.set_state(SessionState::AwaitingAuthentication);
        match self.authenticate(driver.as_ref()).await {
            Ok(()) => {
                inner.driver = Some(driver);
                self.set_state(SessionState::Ready);
                info!("WhatsApp Web session ready");
                Ok(())
            }
            Err(e) => {
                release_quietly(driver.as_ref()).await;
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Navigate to WhatsApp Web and wait for the authenticated main screen.
    async fn authenticate(&self, driver: &dyn UiDriver) -> Result<(), SessionError> {
        driver
            .navigate(WHATSAPP_WEB_URL)
            .await
            .map_err(launch_or_crash)?;

        // First settle: either the main screen or the QR code shows up.
        let landed = self
            .timing
            .page_settle
            .until(|| async {
                if driver.element_count(&AUTH_READY).await? > 0 {
                    return Ok(Some(true));
                }
                if driver.element_count(&QR_CODE).await? > 0 {
                    return Ok(Some(false));
                }
                Ok(None)
            })
            .await
            .map_err(launch_or_crash)?;

        match landed {
            Some(true) => {
                info!("existing WhatsApp Web login found");
                return Ok(());
            }
            Some(false) => info!("QR code displayed, waiting for scan"),
            None => info!("page still settling, waiting for authentication"),
        }

        let authed = self
            .timing
            .auth_wait
            .for_element(driver, &AUTH_READY)
            .await
            .map_err(launch_or_crash)?;
        if authed {
            Ok(())
        } else {
            Err(SessionError::AuthenticationTimeout)
        }
    }

    /// Stop the session, releasing the browser. Never fails: release errors
    /// are logged and the state still ends up `Stopped`.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(driver) = inner.driver.take() {
            release_quietly(driver.as_ref()).await;
        }
        self.set_state(SessionState::Stopped);
        info!("WhatsApp Web session stopped");
    }

    /// Start the session unless it is already ready.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`] from [`start`](Self::start).
    pub async fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Ready {
            return Ok(());
        }
        self.start().await
    }

    /// Drop the driver and mark the session failed.
    ///
    /// Called by the queue processor when a driver command reported the
    /// underlying session as gone; the next `ensure_ready` relaunches.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(driver) = inner.driver.take() {
            release_quietly(driver.as_ref()).await;
        }
        self.set_state(SessionState::Failed);
        warn!("session invalidated, will restart on next delivery");
    }
}

fn launch_or_crash(e: DriverError) -> SessionError {
    match e {
        DriverError::SessionClosed => SessionError::UnderlyingSessionCrashed,
        DriverError::Command(msg) => SessionError::LaunchFailed(msg),
    }
}

async fn release_quietly(driver: &dyn UiDriver) {
    if let Err(e) = driver.release().await {
        warn!(error = %e, "browser release failed (continuing)");
    }
}
