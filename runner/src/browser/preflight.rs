//! Reachability probe run before the browser is pointed at a URL.
//!
//! A dev server that is still starting makes the engine show its own error
//! page, which then "settles" and fails every later step with a misleading
//! cause. Probing over plain HTTP first turns that into one clear
//! navigation error.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::HarnessError;
use crate::retry::{poll_until, PollPolicy};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Waits until `url` answers any HTTP response. Non-HTTP URLs pass through.
pub async fn wait_until_reachable(url: &str, timeout: Duration) -> Result<(), HarnessError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        debug!(url, "skipping reachability probe for non-http url");
        return Ok(());
    }

    let client = Client::builder()
        .timeout(PROBE_TIMEOUT.min(timeout.max(Duration::from_millis(100))))
        .build()
        .map_err(|e| HarnessError::Session(format!("http client: {}", e)))?;

    let policy = PollPolicy {
        initial_interval: Duration::from_millis(100),
        backoff_factor: 2.0,
        max_interval: Duration::from_secs(1),
    };

    let last_error = std::sync::Mutex::new(String::from("no response"));
    let last_error_ref = &last_error;
    let client_ref = &client;

    let reached = poll_until(&policy, timeout, move || async move {
        match client_ref.get(url).send().await {
            Ok(response) => Ok::<_, HarnessError>(Some(response.status())),
            Err(e) => {
                debug!(url, error = %e, "server not reachable yet");
                *last_error_ref.lock().unwrap_or_else(|p| p.into_inner()) = e.to_string();
                Ok(None)
            }
        }
    })
    .await?;

    match reached {
        Some(status) => {
            info!(url, status = status.as_u16(), "server reachable");
            Ok(())
        }
        None => Err(HarnessError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
            detail: last_error.into_inner().unwrap_or_else(|p| p.into_inner()),
        }),
    }
}
