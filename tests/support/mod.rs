//! Shared test doubles: a scriptable fake UI, a counting session factory,
//! and a scripted delivery pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use otpgate::delivery::queue::DeliveryPipeline;
use otpgate::delivery::{DeliveryError, DeliveryRequest, StrategyKind};
use otpgate::driver::wait::BoundedWait;
use otpgate::driver::{DriverError, Locator, UiDriver, UiSessionFactory};
use otpgate::store::{HistoryRecord, Store};

/// A fast wait for tests: 40 ms budget, 2 ms polls.
pub fn fast_wait() -> BoundedWait {
    BoundedWait {
        timeout: Duration::from_millis(40),
        poll_interval: Duration::from_millis(2),
    }
}

/// Poll the history table until at least `n` records appear.
///
/// The archive write races the outcome the ledger reports, so tests that
/// assert on history contents wait for it explicitly.
pub async fn wait_for_history(store: &Store, n: usize) -> Vec<HistoryRecord> {
    for _ in 0..1000_u32 {
        let records = store.recent_history(50).await.expect("history query");
        if records.len() >= n {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("history never reached {n} records");
}

/// One fake element on the fake page.
#[derive(Debug, Clone)]
pub struct MockElement {
    /// Rendered text / title.
    pub text: String,
    /// Whether clicks and typing should be allowed.
    pub interactable: bool,
}

/// Shorthand for an interactable element with the given text.
pub fn element(text: &str) -> MockElement {
    MockElement {
        text: text.to_owned(),
        interactable: true,
    }
}

type Screen = Vec<(Locator, Vec<MockElement>)>;

#[derive(Default)]
struct MockState {
    elements: HashMap<Locator, Vec<MockElement>>,
    click_effects: HashMap<Locator, Screen>,
    nav_screens: VecDeque<Screen>,
    navigations: Vec<String>,
    clicks: Vec<(Locator, usize)>,
    typed: Vec<(Locator, String)>,
    confirms: usize,
    confirm_fails: bool,
    releases: usize,
}

/// Scriptable [`UiDriver`] double.
///
/// Tests install elements per locator, optional screens applied on
/// navigation (popped in order), and per-locator click effects (merged into
/// the current screen when any index of that locator is clicked).
#[derive(Default)]
pub struct MockUi {
    state: Mutex<MockState>,
}

impl MockUi {
    /// Empty page.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Replace the elements matching `locator`.
    pub fn set_elements(&self, locator: Locator, elements: Vec<MockElement>) {
        self.lock().elements.insert(locator, elements);
    }

    /// Queue a screen applied (wholesale) by the next navigation.
    pub fn queue_navigation_screen(&self, screen: Screen) {
        self.lock().nav_screens.push_back(screen);
    }

    /// Merge `screen` into the page whenever `locator` is clicked.
    pub fn set_click_effect(&self, locator: Locator, screen: Screen) {
        self.lock().click_effects.insert(locator, screen);
    }

    /// Make the confirm keystroke fail.
    pub fn set_confirm_fails(&self, fails: bool) {
        self.lock().confirm_fails = fails;
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    /// Clicks recorded, in order.
    pub fn clicks(&self) -> Vec<(Locator, usize)> {
        self.lock().clicks.clone()
    }

    /// Text typed, in order.
    pub fn typed(&self) -> Vec<(Locator, String)> {
        self.lock().typed.clone()
    }

    /// Confirm keystrokes issued.
    pub fn confirms(&self) -> usize {
        self.lock().confirms
    }

    /// Release calls observed.
    pub fn releases(&self) -> usize {
        self.lock().releases
    }
}

#[async_trait]
impl UiDriver for MockUi {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.navigations.push(url.to_owned());
        if let Some(screen) = state.nav_screens.pop_front() {
            state.elements = screen.into_iter().collect();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.lock().navigations.last().cloned().unwrap_or_default())
    }

    async fn element_count(&self, locator: &Locator) -> Result<usize, DriverError> {
        Ok(self.lock().elements.get(locator).map_or(0, Vec::len))
    }

    async fn element_texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        Ok(self
            .lock()
            .elements
            .get(locator)
            .map_or_else(Vec::new, |els| els.iter().map(|e| e.text.clone()).collect()))
    }

    async fn click_element(&self, locator: &Locator, index: usize) -> Result<(), DriverError> {
        let mut state = self.lock();
        let exists = state.elements.get(locator).is_some_and(|els| index < els.len());
        if !exists {
            return Err(DriverError::Command(format!(
                "no element {index} for {locator}"
            )));
        }
        state.clicks.push((locator.clone(), index));
        if let Some(effect) = state.click_effects.get(locator).cloned() {
            for (loc, els) in effect {
                state.elements.insert(loc, els);
            }
        }
        Ok(())
    }

    async fn is_interactable(&self, locator: &Locator, index: usize) -> Result<bool, DriverError> {
        Ok(self
            .lock()
            .elements
            .get(locator)
            .and_then(|els| els.get(index))
            .is_some_and(|e| e.interactable))
    }

    async fn type_text(
        &self,
        locator: &Locator,
        index: usize,
        text: &str,
    ) -> Result<(), DriverError> {
        let mut state = self.lock();
        let exists = state.elements.get(locator).is_some_and(|els| index < els.len());
        if !exists {
            return Err(DriverError::Command(format!(
                "no element {index} for {locator}"
            )));
        }
        state.typed.push((locator.clone(), text.to_owned()));
        Ok(())
    }

    async fn confirm_focused(&self) -> Result<(), DriverError> {
        let mut state = self.lock();
        if state.confirm_fails {
            return Err(DriverError::Command("no focused element".to_owned()));
        }
        state.confirms = state.confirms.saturating_add(1);
        Ok(())
    }

    async fn release(&self) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.releases = state.releases.saturating_add(1);
        Ok(())
    }
}

/// [`UiSessionFactory`] that hands out the same [`MockUi`] and counts
/// launches.
pub struct CountingFactory {
    ui: Arc<MockUi>,
    launches: AtomicUsize,
    launch_delay: Duration,
}

impl CountingFactory {
    /// Factory returning `ui` on every launch.
    pub fn new(ui: Arc<MockUi>) -> Self {
        Self {
            ui,
            launches: AtomicUsize::new(0),
            launch_delay: Duration::ZERO,
        }
    }

    /// Add an artificial launch delay to widen race windows.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Number of sessions launched.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UiSessionFactory for CountingFactory {
    async fn launch(&self) -> Result<Arc<dyn UiDriver>, DriverError> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.ui) as Arc<dyn UiDriver>)
    }
}

/// Scripted [`DeliveryPipeline`]: pops one result per call and records the
/// order requests were processed in.
pub struct ScriptedPipeline {
    script: Mutex<VecDeque<Result<StrategyKind, DeliveryError>>>,
    processed: Mutex<Vec<Uuid>>,
}

impl ScriptedPipeline {
    /// Pipeline that replays `script` and then succeeds via direct
    /// navigation forever.
    pub fn new(script: Vec<Result<StrategyKind, DeliveryError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            processed: Mutex::new(Vec::new()),
        })
    }

    /// Request ids in processing order.
    pub fn processed(&self) -> Vec<Uuid> {
        self.processed.lock().expect("processed poisoned").clone()
    }
}

#[async_trait]
impl DeliveryPipeline for ScriptedPipeline {
    async fn deliver(
        &self,
        _driver: &dyn UiDriver,
        request: &DeliveryRequest,
    ) -> Result<StrategyKind, DeliveryError> {
        self.processed
            .lock()
            .expect("processed poisoned")
            .push(request.id);
        self.script
            .lock()
            .expect("script poisoned")
            .pop_front()
            .unwrap_or(Ok(StrategyKind::DirectNavigation))
    }
}
