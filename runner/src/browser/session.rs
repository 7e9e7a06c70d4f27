//! # Browser session
//!
//! Owns the one engine instance and page a scenario run works on.
//!
//! ## Lifecycle
//!
//! ```text
//! open ──▶ navigate / query / click / content / screenshot ... ──▶ close
//!   │                                                               │
//!   └── SessionError (E2001)                          exactly once ─┘
//! ```
//!
//! - [`Session::open`] bounds the launch by the configured timeout.
//! - [`Session::navigate`] counts a page as loaded once the load event fired
//!   and the number of fetched resources stayed unchanged for the
//!   network-quiet window. Both share a single timeout.
//! - [`Session::close`] takes `self`. A session dropped without it (a panic
//!   in a step, a cancelled task) still releases its driver from `Drop`.
//!
//! Everything else is a thin pass-through to the [`BrowserDriver`].

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    BrowserConfig, BrowserDriver, BrowserLauncher, DriverError, ElementSnapshot, PageActivity,
};
use crate::errors::HarnessError;
use crate::protocol::Locator;
use crate::retry::{poll_until, PollPolicy};

/// The single browser page a scenario run operates on.
///
/// `close` consumes the session, so it can run at most once. A session that
/// is dropped without being closed releases its driver in the background.
pub struct Session {
    id: Uuid,
    driver: Box<dyn BrowserDriver>,
    network_quiet: Duration,
    poll: PollPolicy,
    closed: bool,
}

impl Session {
    /// Launches the engine and opens a page.
    #[instrument(name = "session_open", skip_all, fields(headless = config.headless))]
    pub async fn open(
        launcher: &dyn BrowserLauncher,
        config: &BrowserConfig,
    ) -> Result<Self, HarnessError> {
        let driver = match timeout(config.launch_timeout, launcher.launch(config)).await {
            Ok(Ok(driver)) => driver,
            Ok(Err(e)) => return Err(HarnessError::Session(e.to_string())),
            Err(_) => {
                return Err(HarnessError::Session(format!(
                    "engine did not start within {}ms",
                    config.launch_timeout.as_millis()
                )))
            }
        };

        let session = Self {
            id: Uuid::new_v4(),
            driver,
            network_quiet: config.network_quiet,
            poll: PollPolicy::default(),
            closed: false,
        };
        info!(session_id = %session.id, "browser session opened");
        Ok(session)
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    /// Loads `url` and waits until the document is complete and no new
    /// resources have been fetched for the quiet window. The whole operation,
    /// load plus settle, is bounded by `limit`.
    #[instrument(skip(self), fields(session_id = %self.id, timeout_ms = limit.as_millis() as u64))]
    pub async fn navigate(&self, url: &str, limit: Duration) -> Result<Duration, HarnessError> {
        let start = Instant::now();
        let timed_out = |detail: String| HarnessError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: limit.as_millis() as u64,
            detail,
        };

        match timeout(limit, self.driver.goto(url)).await {
            Err(_) => return Err(timed_out("page load did not finish".to_string())),
            Ok(Err(DriverError::Navigation { message, .. })) => return Err(timed_out(message)),
            Ok(Err(other)) => return Err(other.into()),
            Ok(Ok(())) => {}
        }

        let remaining = limit.saturating_sub(start.elapsed());
        if !self.wait_for_quiet(remaining).await? {
            return Err(timed_out("network activity did not settle".to_string()));
        }

        let elapsed = start.elapsed();
        info!(url, elapsed_ms = elapsed.as_millis() as u64, "page settled");
        Ok(elapsed)
    }

    async fn wait_for_quiet(&self, limit: Duration) -> Result<bool, HarnessError> {
        // Last observed resource count and when it was first seen.
        let tracker: Mutex<Option<(usize, Instant)>> = Mutex::new(None);
        let tracker = &tracker;
        let driver = self.driver.as_ref();
        let quiet = self.network_quiet;

        let settled = poll_until(&self.poll, limit, move || async move {
            let activity: PageActivity = driver.activity().await?;
            let now = Instant::now();
            let mut last = tracker.lock().unwrap_or_else(|p| p.into_inner());

            let stable_since = match *last {
                Some((count, since)) if count == activity.resources => since,
                _ => {
                    *last = Some((activity.resources, now));
                    now
                }
            };

            debug!(ready = activity.ready, resources = activity.resources, "page activity");
            if activity.ready && now.duration_since(stable_since) >= quiet {
                Ok::<_, DriverError>(Some(()))
            } else {
                Ok(None)
            }
        })
        .await?;

        Ok(settled.is_some())
    }

    pub async fn query(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        self.driver.query(locator).await
    }

    pub async fn click(&self, locator: &Locator, index: usize) -> Result<(), DriverError> {
        self.driver.click(locator, index).await
    }

    pub async fn content(&self) -> Result<String, DriverError> {
        self.driver.content().await
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.driver.screenshot().await
    }

    /// Releases the browser.
    pub async fn close(mut self) -> Result<(), DriverError> {
        self.closed = true;
        let result = self.driver.close().await;
        match &result {
            Ok(()) => info!(session_id = %self.id, "browser session closed"),
            Err(e) => warn!(session_id = %self.id, error = %e, "browser session closed with error"),
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(session_id = %self.id, "session dropped without close, releasing in background");
        let driver = std::mem::replace(&mut self.driver, Box::new(ReleasedDriver));
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = driver.close().await {
                    warn!(error = %e, "background session release failed");
                }
            });
        }
    }
}

/// Stand-in left behind once a dropped session hands its driver off.
struct ReleasedDriver;

#[async_trait]
impl BrowserDriver for ReleasedDriver {
    async fn goto(&self, _url: &str) -> Result<(), DriverError> {
        Err(DriverError::Closed)
    }

    async fn activity(&self) -> Result<PageActivity, DriverError> {
        Err(DriverError::Closed)
    }

    async fn query(&self, _locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        Err(DriverError::Closed)
    }

    async fn click(&self, _locator: &Locator, _index: usize) -> Result<(), DriverError> {
        Err(DriverError::Closed)
    }

    async fn content(&self) -> Result<String, DriverError> {
        Err(DriverError::Closed)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::Closed)
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakePage};
    use crate::errors::ErrorCode;
    use std::sync::Arc;

    fn config() -> BrowserConfig {
        BrowserConfig {
            network_quiet: Duration::from_millis(20),
            ..BrowserConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_failure_is_session_error() {
        let launcher = FakeLauncher::failing("chrome not installed");
        let err = Session::open(&launcher, &config()).await.err().unwrap();
        assert_eq!(err.code(), ErrorCode::SESSION_START);
        assert!(err.to_string().contains("chrome not installed"));
    }

    #[tokio::test]
    async fn test_navigate_waits_for_quiet_network() {
        let page = Arc::new(FakePage::new("home").busy_for(3));
        let launcher = FakeLauncher::new(page.clone());
        let session = Session::open(&launcher, &config()).await.unwrap();

        let elapsed = session
            .navigate("http://localhost:5173/", Duration::from_secs(2))
            .await
            .unwrap();

        assert!(elapsed >= Duration::from_millis(20));
        assert_eq!(page.navigations(), vec!["http://localhost:5173/".to_string()]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_navigate_times_out_when_page_never_settles() {
        let page = Arc::new(FakePage::new("home").busy_for(usize::MAX));
        let launcher = FakeLauncher::new(page.clone());
        let session = Session::open(&launcher, &config()).await.unwrap();

        let err = session
            .navigate("http://localhost:5173/", Duration::from_millis(150))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::NAVIGATION_TIMEOUT);
        session.close().await.unwrap();
        assert_eq!(page.close_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_page_is_navigation_timeout() {
        let page = Arc::new(FakePage::new("home").unreachable());
        let launcher = FakeLauncher::new(page.clone());
        let session = Session::open(&launcher, &config()).await.unwrap();

        let err = session
            .navigate("http://localhost:5173/", Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::NavigationTimeout { .. }));
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_session_is_released() {
        let page = Arc::new(FakePage::new("home"));
        let launcher = FakeLauncher::new(page.clone());
        let session = Session::open(&launcher, &config()).await.unwrap();

        drop(session);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(page.close_count(), 1);
    }
}
