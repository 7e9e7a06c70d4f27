//! Scripted in-memory page for tests.
//!
//! A [`FakePage`] is a set of named screens. Each screen maps a locator (by
//! its display form) to the elements it resolves to, and may declare that
//! clicking a locator moves the page to another screen.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BrowserConfig, BrowserDriver, BrowserLauncher, DriverError, ElementSnapshot, PageActivity};
use crate::protocol::Locator;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Default)]
struct Screen {
    elements: HashMap<String, Vec<ElementSnapshot>>,
    transitions: HashMap<String, String>,
    /// Locators that resolve to nothing for their first N queries on this screen.
    delays: HashMap<String, usize>,
}

#[derive(Default)]
struct PageState {
    current: String,
    navigations: Vec<String>,
    clicks: Vec<String>,
    queries: HashMap<(String, String), usize>,
}

pub struct FakePage {
    initial: String,
    screens: HashMap<String, Screen>,
    busy_samples: usize,
    unreachable: bool,
    screenshot_fails: bool,
    /// Screen on which every query fails as if the page context died.
    crashes_on: Option<String>,
    state: Mutex<PageState>,
    samples: AtomicUsize,
    closes: AtomicUsize,
}

impl FakePage {
    pub fn new(initial: &str) -> Self {
        let mut screens = HashMap::new();
        screens.insert(initial.to_string(), Screen::default());
        Self {
            initial: initial.to_string(),
            screens,
            busy_samples: 0,
            unreachable: false,
            screenshot_fails: false,
            crashes_on: None,
            state: Mutex::new(PageState {
                current: initial.to_string(),
                ..PageState::default()
            }),
            samples: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn element(mut self, screen: &str, locator: &Locator, elements: Vec<ElementSnapshot>) -> Self {
        self.screens
            .entry(screen.to_string())
            .or_default()
            .elements
            .insert(locator.to_string(), elements);
        self
    }

    pub fn on_click(mut self, screen: &str, locator: &Locator, next: &str) -> Self {
        self.screens.entry(next.to_string()).or_default();
        self.screens
            .entry(screen.to_string())
            .or_default()
            .transitions
            .insert(locator.to_string(), next.to_string());
        self
    }

    pub fn appears_after(mut self, screen: &str, locator: &Locator, queries: usize) -> Self {
        self.screens
            .entry(screen.to_string())
            .or_default()
            .delays
            .insert(locator.to_string(), queries);
        self
    }

    /// Resource count keeps changing for the first `samples` activity probes.
    pub fn busy_for(mut self, samples: usize) -> Self {
        self.busy_samples = samples;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn crashes_on(mut self, screen: &str) -> Self {
        self.crashes_on = Some(screen.to_string());
        self
    }

    pub fn screenshot_fails(mut self) -> Self {
        self.screenshot_fails = true;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn current_screen(&self) -> String {
        self.lock().current.clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn resolve(&self, state: &mut PageState, key: &str, count_query: bool) -> Vec<ElementSnapshot> {
        let Some(screen) = self.screens.get(&state.current) else {
            return Vec::new();
        };
        if let Some(delay) = screen.delays.get(key) {
            let seen = state
                .queries
                .entry((state.current.clone(), key.to_string()))
                .or_insert(0);
            if count_query {
                *seen += 1;
            }
            if *seen <= *delay {
                return Vec::new();
            }
        }
        screen.elements.get(key).cloned().unwrap_or_default()
    }
}

pub struct FakeDriver(Arc<FakePage>);

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        if self.0.unreachable {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        let mut state = self.0.lock();
        state.navigations.push(url.to_string());
        state.current = self.0.initial.clone();
        Ok(())
    }

    async fn activity(&self) -> Result<PageActivity, DriverError> {
        let sample = self.0.samples.fetch_add(1, Ordering::SeqCst);
        let resources = if sample < self.0.busy_samples {
            sample
        } else {
            self.0.busy_samples
        };
        Ok(PageActivity {
            ready: true,
            resources,
        })
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        let mut state = self.0.lock();
        if self.0.crashes_on.as_deref() == Some(state.current.as_str()) {
            return Err(DriverError::Script(
                "Execution context was destroyed".to_string(),
            ));
        }
        Ok(self.0.resolve(&mut state, &locator.to_string(), true))
    }

    async fn click(&self, locator: &Locator, index: usize) -> Result<(), DriverError> {
        let key = locator.to_string();
        let mut state = self.0.lock();
        let matches = self.0.resolve(&mut state, &key, false);
        if index >= matches.len() {
            return Err(DriverError::Detached {
                locator: key,
                index,
            });
        }
        state.clicks.push(key.clone());
        let next = self
            .0
            .screens
            .get(&state.current)
            .and_then(|screen| screen.transitions.get(&key))
            .cloned();
        if let Some(next) = next {
            state.current = next;
        }
        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        let state = self.0.lock();
        Ok(format!(
            "<html><body data-screen=\"{}\"></body></html>",
            state.current
        ))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        if self.0.screenshot_fails {
            return Err(DriverError::Screenshot("capture timed out".to_string()));
        }
        Ok(PNG_MAGIC.to_vec())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    page: Option<Arc<FakePage>>,
    failure: Option<String>,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page: Some(page),
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            page: None,
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, DriverError> {
        match (&self.page, &self.failure) {
            (Some(page), None) => Ok(Box::new(FakeDriver(page.clone()))),
            (_, Some(message)) => Err(DriverError::Launch(message.clone())),
            (None, None) => Err(DriverError::Launch("no page scripted".to_string())),
        }
    }
}

// ============================================================================
// ELEMENT HELPERS
// ============================================================================

pub fn element(tag: &str, role: &str, name: &str) -> ElementSnapshot {
    ElementSnapshot {
        tag: tag.to_string(),
        role: Some(role.to_string()),
        name: name.to_string(),
        text: name.to_string(),
        visible: true,
        outer_html: format!("<{tag}>{name}</{tag}>"),
        inner_html: name.to_string(),
        ..ElementSnapshot::default()
    }
}

pub fn button(name: &str) -> ElementSnapshot {
    element("button", "button", name)
}

pub trait SnapshotExt {
    fn attr(self, name: &str, value: &str) -> Self;
    fn hidden(self) -> Self;
    fn inner(self, html: &str) -> Self;
}

impl SnapshotExt for ElementSnapshot {
    fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    fn inner(mut self, html: &str) -> Self {
        self.inner_html = html.to_string();
        self.outer_html = format!("<{tag}>{html}</{tag}>", tag = self.tag);
        self
    }
}
