//! Bounded polling with exponential backoff.
//!
//! Every wait in the harness goes through [`poll_until`]: the page renders
//! asynchronously, so a probe is repeated until it reports a value or the
//! timeout elapses. A timeout is a normal outcome (`Ok(None)`), never a hang.
//! Probe errors stop the loop immediately and are returned as-is.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Interval schedule between probes.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(50),
            backoff_factor: 1.5,
            max_interval: Duration::from_millis(250),
        }
    }
}

impl PollPolicy {
    /// Constant interval, no backoff.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            backoff_factor: 1.0,
            max_interval: interval,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_factor.max(1.0);
        Duration::from_secs_f64(scaled).min(self.max_interval)
    }
}

/// Polls `probe` until it yields `Some`, the timeout elapses, or it errors.
///
/// The probe always runs at least once, even with a zero timeout, and once
/// more right at the deadline so a late render is not missed.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    timeout: Duration,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    let mut interval = policy.initial_interval;
    let mut attempt: u32 = 1;

    loop {
        if let Some(value) = probe().await? {
            if attempt > 1 {
                debug!(attempt, "condition met after polling");
            }
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(attempt, timeout_ms = timeout.as_millis() as u64, "polling timed out");
            return Ok(None);
        }

        sleep(interval.min(deadline - now)).await;
        interval = policy.next_interval(interval);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick() -> PollPolicy {
        PollPolicy::fixed(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_returns_immediately_when_condition_holds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<Option<u32>, &str> = poll_until(&quick(), Duration::from_secs(1), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(7))
            }
        })
        .await;

        assert_eq!(result.unwrap(), Some(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_several_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<Option<u32>, &str> = poll_until(&quick(), Duration::from_secs(2), || {
            let counter = counter.clone();
            async move {
                let current = counter.fetch_add(1, Ordering::SeqCst);
                Ok(if current < 3 { None } else { Some(current) })
            }
        })
        .await;

        assert_eq!(result.unwrap(), Some(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out_with_none() {
        let start = std::time::Instant::now();
        let result: Result<Option<()>, &str> =
            poll_until(&quick(), Duration::from_millis(60), || async { Ok(None) }).await;

        assert_eq!(result.unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_timeout_still_probes_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<Option<()>, &str> = poll_until(&quick(), Duration::ZERO, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_error_stops_polling() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<Option<()>, &str> = poll_until(&quick(), Duration::from_secs(1), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("engine gone")
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "engine gone");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut interval = policy.initial_interval;
        for _ in 0..20 {
            interval = policy.next_interval(interval);
        }
        assert_eq!(interval, policy.max_interval);
    }
}
