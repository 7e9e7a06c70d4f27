//! # Browser session adapter
//!
//! The engine is an opaque capability behind two traits:
//!
//! - [`BrowserLauncher`] starts an engine and hands back a page driver.
//! - [`BrowserDriver`] is the capability set a run needs: navigate, resolve a
//!   [`Locator`] into element snapshots (role, accessible name, text,
//!   attributes, markup, visibility), click, dump content, screenshot, close.
//!
//! [`Session`] owns exactly one driver for the length of a run and layers the
//! harness contract on top (settle detection, bounded timeouts, close-once).
//!
//! The production engine is Chrome over the DevTools Protocol
//! ([`cdp::CdpLauncher`], behind the `cdp` feature). Any other engine that
//! implements the traits is substitutable.

#[cfg(feature = "cdp")]
pub mod cdp;
#[cfg(test)]
pub mod fake;
pub mod preflight;
mod session;

pub use session::Session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::Locator;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub sandbox: bool,
    /// Chrome/Chromium binary. Auto-detected when `None`.
    pub executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub launch_timeout: Duration,
    /// How long resource activity must stay flat before a page counts as settled.
    pub network_quiet: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            executable: None,
            viewport_width: 1280,
            viewport_height: 720,
            launch_timeout: Duration::from_secs(30),
            network_quiet: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// PAGE DATA
// ============================================================================

/// Immutable copy of one element as it was when the locator was resolved.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Accessible name.
    #[serde(default)]
    pub name: String,
    /// Whitespace-normalized text content.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub visible: bool,
    #[serde(default)]
    pub outer_html: String,
    #[serde(default)]
    pub inner_html: String,
}

impl ElementSnapshot {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// What the page is doing right now, sampled for settle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageActivity {
    /// `document.readyState == "complete"`.
    pub ready: bool,
    /// Resources fetched so far; stable counts mean the network is quiet.
    pub resources: usize,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("page script failed: {0}")]
    Script(String),

    #[error("{locator} has no element #{index} any more")]
    Detached { locator: String, index: usize },

    #[error("interaction failed: {0}")]
    Interaction(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("browser already closed")]
    Closed,
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, DriverError>;
}

/// One page of one browser. Implementations must be safe to call from a
/// single task in sequence; the harness never issues concurrent calls.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Starts loading `url`. Settle detection is the caller's job.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    async fn activity(&self) -> Result<PageActivity, DriverError>;

    /// Resolves `locator` against the current DOM, in document order.
    async fn query(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError>;

    /// Re-resolves `locator` and clicks match number `index`.
    async fn click(&self, locator: &Locator, index: usize) -> Result<(), DriverError>;

    /// Serialized markup of the whole document.
    async fn content(&self) -> Result<String, DriverError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}
