//! # Execution limits
//!
//! Bounds that keep a run from hanging on a page that never settles or a
//! scenario file that asks for unreasonable waits.
//!
//! | Limit              | Default | Description                                |
//! |--------------------|---------|--------------------------------------------|
//! | max_steps          | 200     | Steps allowed in one scenario              |
//! | max_wait           | 60s     | Upper bound for any single wait or timeout |
//! | max_execution_time | 300s    | Wall-clock budget for a whole scenario     |
//! | navigation_timeout | 30s     | Default page-load settle timeout           |
//!
//! Requested waits above `max_wait` are rejected by validation for scenario
//! files and clamped at runtime for everything else.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// DEFAULTS
// ============================================================================

pub const DEFAULT_MAX_STEPS: usize = 200;

pub const DEFAULT_MAX_WAIT_SECS: u64 = 60;

pub const DEFAULT_MAX_EXECUTION_SECS: u64 = 300;

pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// LIMITS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub max_steps: usize,
    pub max_wait: Duration,
    /// Once spent, the step in flight is recorded as an error and the run aborts.
    pub max_execution_time: Duration,
    /// Used by navigate steps that do not carry their own timeout.
    pub navigation_timeout: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
            max_execution_time: Duration::from_secs(DEFAULT_MAX_EXECUTION_SECS),
            navigation_timeout: Duration::from_secs(DEFAULT_NAVIGATION_TIMEOUT_SECS),
        }
    }
}

impl ExecutionLimits {
    /// Reads overrides from the environment.
    ///
    /// - `HARNESS_MAX_STEPS`
    /// - `HARNESS_MAX_WAIT_SECS`
    /// - `HARNESS_MAX_EXECUTION_SECS`
    /// - `HARNESS_NAVIGATION_TIMEOUT_SECS`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(n) = env_number("HARNESS_MAX_STEPS") {
            limits.max_steps = n as usize;
        }
        if let Some(n) = env_number("HARNESS_MAX_WAIT_SECS") {
            limits.max_wait = Duration::from_secs(n);
        }
        if let Some(n) = env_number("HARNESS_MAX_EXECUTION_SECS") {
            limits.max_execution_time = Duration::from_secs(n);
        }
        if let Some(n) = env_number("HARNESS_NAVIGATION_TIMEOUT_SECS") {
            limits.navigation_timeout = Duration::from_secs(n);
        }

        limits
    }

    /// Tight limits, handy in tests.
    pub fn strict() -> Self {
        Self {
            max_steps: 20,
            max_wait: Duration::from_secs(10),
            max_execution_time: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(10),
        }
    }

    /// Generous limits for slow machines or debugging sessions.
    pub fn relaxed() -> Self {
        Self {
            max_steps: 1_000,
            max_wait: Duration::from_secs(300),
            max_execution_time: Duration::from_secs(3_600),
            navigation_timeout: Duration::from_secs(120),
        }
    }

    /// Clamps a requested wait to `max_wait`.
    pub fn clamp_wait(&self, requested_ms: u64) -> Duration {
        Duration::from_millis(requested_ms).min(self.max_wait)
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// LIMIT VALIDATION
// ============================================================================

#[derive(Debug)]
pub struct LimitValidationResult {
    pub passed: bool,
    pub violations: Vec<LimitViolation>,
}

#[derive(Debug, Clone)]
pub struct LimitViolation {
    pub limit_name: String,
    pub limit_value: String,
    pub actual_value: String,
    pub message: String,
}

/// Checks a scenario's shape against the limits.
///
/// `longest_wait_ms` is the largest timeout or pause declared by any step.
pub fn validate_limits(
    step_count: usize,
    longest_wait_ms: u64,
    limits: &ExecutionLimits,
) -> LimitValidationResult {
    let mut violations = Vec::new();

    if step_count > limits.max_steps {
        violations.push(LimitViolation {
            limit_name: "max_steps".to_string(),
            limit_value: limits.max_steps.to_string(),
            actual_value: step_count.to_string(),
            message: format!(
                "scenario has {} steps, at most {} are allowed",
                step_count, limits.max_steps
            ),
        });
    }

    let max_wait_ms = limits.max_wait.as_millis() as u64;
    if longest_wait_ms > max_wait_ms {
        violations.push(LimitViolation {
            limit_name: "max_wait".to_string(),
            limit_value: format!("{}ms", max_wait_ms),
            actual_value: format!("{}ms", longest_wait_ms),
            message: format!(
                "a step waits up to {}ms, the limit is {}ms",
                longest_wait_ms, max_wait_ms
            ),
        });
    }

    LimitValidationResult {
        passed: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_steps, 200);
        assert_eq!(limits.max_wait, Duration::from_secs(60));
        assert_eq!(limits.navigation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_clamp_wait() {
        let limits = ExecutionLimits::strict();
        assert_eq!(limits.clamp_wait(2_000), Duration::from_millis(2_000));
        assert_eq!(limits.clamp_wait(600_000), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_limits_ok() {
        let result = validate_limits(10, 5_000, &ExecutionLimits::default());
        assert!(result.passed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_validate_limits_steps_exceeded() {
        let result = validate_limits(25, 1_000, &ExecutionLimits::strict());
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].limit_name, "max_steps");
    }

    #[test]
    fn test_validate_limits_wait_exceeded() {
        let result = validate_limits(3, 90_000, &ExecutionLimits::default());
        assert!(!result.passed);
        assert_eq!(result.violations[0].limit_name, "max_wait");
        assert_eq!(result.violations[0].actual_value, "90000ms");
    }
}
