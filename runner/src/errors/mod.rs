//! # Structured error codes and the harness error taxonomy
//!
//! Every failure the harness reports carries a stable code so transcripts,
//! JSON reports and CI logs can be grepped and compared across runs.
//!
//! ## Categories
//!
//! | Range | Category      | Meaning                                   |
//! |-------|---------------|-------------------------------------------|
//! | E1xxx | Validation    | The scenario file itself is wrong         |
//! | E2xxx | Browser       | Engine could not start, load or respond   |
//! | E3xxx | Assertion     | The page does not satisfy an expectation  |
//! | E4xxx | Configuration | Variables, files, execution budget        |
//! | E5xxx | Internal      | Bug in the harness                        |
//!
//! Two enums sit on top of the codes:
//!
//! - [`CheckFailure`]: non-fatal. Recorded as `Failed` and the run goes on.
//! - [`HarnessError`]: fatal. Recorded as `Error` and the run is aborted.
//!
//! ```text
//! [FAIL ] close_label  expect role=button[name="Close menu"i] visible
//!         [E3003] role=button[name="Close menu"i]: expected visible, observed hidden
//! ```

use std::fmt;
use thiserror::Error;

use crate::browser::DriverError;
use crate::context::ContextError;
use crate::protocol::{Outcome, RunState, WaitState};

// ============================================================================
// ERROR CODE
// ============================================================================

/// Four-digit code: first digit is the category, the rest the specific error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // E1xxx: scenario validation
    pub const EMPTY_SCENARIO: Self = Self(1001);
    pub const EMPTY_ID: Self = Self(1002);
    pub const DUPLICATE_STEP_ID: Self = Self(1003);
    pub const INVALID_TIMEOUT: Self = Self(1004);
    pub const INVALID_LOCATOR: Self = Self(1005);
    pub const INVALID_EXPECTATION: Self = Self(1006);
    pub const INVALID_URL: Self = Self(1007);
    pub const LIMIT_EXCEEDED: Self = Self(1008);
    pub const INVALID_SCENARIO_FORMAT: Self = Self(1009);

    // E2xxx: browser engine and session
    pub const SESSION_START: Self = Self(2001);
    pub const NAVIGATION_TIMEOUT: Self = Self(2002);
    pub const ENGINE_FAULT: Self = Self(2003);
    pub const SESSION_CLOSED: Self = Self(2004);

    // E3xxx: assertions
    pub const ELEMENT_NOT_FOUND: Self = Self(3001);
    pub const ATTRIBUTE_MISMATCH: Self = Self(3002);
    pub const VISIBILITY_MISMATCH: Self = Self(3003);
    pub const COUNT_MISMATCH: Self = Self(3004);
    pub const CONTENT_MISMATCH: Self = Self(3005);

    // E4xxx: configuration and environment
    pub const ENV_VAR_NOT_FOUND: Self = Self(4001);
    pub const CONTEXT_VAR_NOT_FOUND: Self = Self(4002);
    pub const SCENARIO_FILE_NOT_FOUND: Self = Self(4003);
    pub const EXECUTION_BUDGET_EXHAUSTED: Self = Self(4004);
    pub const UNKNOWN_BUILTIN: Self = Self(4005);

    // E5xxx: internal
    pub const INTERNAL_ERROR: Self = Self(5001);
    pub const NO_EXECUTOR_FOR_ACTION: Self = Self(5002);
    pub const SERIALIZATION_ERROR: Self = Self(5003);
    pub const INVALID_STATE_TRANSITION: Self = Self(5004);

    pub fn code(&self) -> u16 {
        self.0
    }

    /// `E` followed by the zero-padded code, e.g. `E3001`.
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Validation,
            2 => ErrorCategory::Browser,
            3 => ErrorCategory::Assertion,
            4 => ErrorCategory::Configuration,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Scenario has no steps",
            1002 => "Empty identifier",
            1003 => "Duplicate step id",
            1004 => "Invalid timeout",
            1005 => "Invalid locator",
            1006 => "Invalid expectation",
            1007 => "Invalid URL",
            1008 => "Execution limit exceeded",
            1009 => "Invalid scenario format",
            2001 => "Browser session could not start",
            2002 => "Navigation did not settle",
            2003 => "Browser engine fault",
            2004 => "Browser session already closed",
            3001 => "Element not found",
            3002 => "Attribute mismatch",
            3003 => "Visibility mismatch",
            3004 => "Count mismatch",
            3005 => "Content mismatch",
            4001 => "Environment variable not set",
            4002 => "Scenario variable not set",
            4003 => "Scenario file not found",
            4004 => "Execution budget exhausted",
            4005 => "Unknown built-in scenario",
            5001 => "Internal error",
            5002 => "No executor for action",
            5003 => "Serialization error",
            5004 => "Invalid run state transition",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Browser,
    Assertion,
    Configuration,
    Internal,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "Validation"),
            Self::Browser => write!(f, "Browser"),
            Self::Assertion => write!(f, "Assertion"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Internal => write!(f, "Internal"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

// ============================================================================
// NON-FATAL: CHECK FAILURES
// ============================================================================

/// An expectation that did not hold. Always recorded, never aborts on its own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFailure {
    #[error("no element matches {locator}")]
    ElementNotFound { locator: String },

    #[error("{locator}: expected {expected}, observed {observed}")]
    VisibilityMismatch {
        locator: String,
        expected: String,
        observed: String,
    },

    #[error("{locator} #{index}: attribute '{attribute}' expected {expected}, observed {}", observed_label(.observed))]
    AttributeMismatch {
        locator: String,
        index: usize,
        attribute: String,
        expected: String,
        observed: Option<String>,
    },

    #[error("{locator}: expected {expected} element(s), observed {observed}")]
    CountMismatch {
        locator: String,
        expected: String,
        observed: usize,
    },

    #[error("{locator} #{index}: {content} does not contain {needle:?}")]
    ContentMismatch {
        locator: String,
        index: usize,
        content: &'static str,
        needle: String,
    },
}

fn observed_label(observed: &Option<String>) -> String {
    match observed {
        Some(value) => format!("{:?}", value),
        None => "<absent>".to_string(),
    }
}

impl CheckFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            CheckFailure::ElementNotFound { .. } => ErrorCode::ELEMENT_NOT_FOUND,
            CheckFailure::VisibilityMismatch { .. } => ErrorCode::VISIBILITY_MISMATCH,
            CheckFailure::AttributeMismatch { .. } => ErrorCode::ATTRIBUTE_MISMATCH,
            CheckFailure::CountMismatch { .. } => ErrorCode::COUNT_MISMATCH,
            CheckFailure::ContentMismatch { .. } => ErrorCode::CONTENT_MISMATCH,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CheckFailure::ElementNotFound { .. })
    }

    pub fn to_outcome(&self) -> Outcome {
        Outcome::Failed {
            code: self.code().formatted(),
            reason: self.to_string(),
        }
    }
}

// ============================================================================
// FATAL: HARNESS ERRORS
// ============================================================================

/// Conditions that end a scenario run early.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("browser session could not start: {0}")]
    Session(String),

    #[error("{url} did not become reachable and quiet within {timeout_ms}ms: {detail}")]
    NavigationTimeout {
        url: String,
        timeout_ms: u64,
        detail: String,
    },

    #[error("required element {locator} was not {state} within {timeout_ms}ms")]
    RequiredElementMissing {
        locator: String,
        state: WaitState,
        timeout_ms: u64,
    },

    #[error("browser engine fault: {0}")]
    Engine(#[from] DriverError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("execution budget of {budget_secs}s exhausted")]
    BudgetExhausted { budget_secs: u64 },

    #[error("no executor handles action '{0}'")]
    NoExecutor(String),

    #[error("invalid run state transition {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl HarnessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HarnessError::Session(_) => ErrorCode::SESSION_START,
            HarnessError::NavigationTimeout { .. } => ErrorCode::NAVIGATION_TIMEOUT,
            HarnessError::RequiredElementMissing { state, .. } => match state {
                WaitState::Visible | WaitState::Attached => ErrorCode::ELEMENT_NOT_FOUND,
                WaitState::Hidden | WaitState::Detached => ErrorCode::VISIBILITY_MISMATCH,
            },
            HarnessError::Engine(DriverError::Closed) => ErrorCode::SESSION_CLOSED,
            HarnessError::Engine(_) => ErrorCode::ENGINE_FAULT,
            HarnessError::Context(e) => e.code(),
            HarnessError::BudgetExhausted { .. } => ErrorCode::EXECUTION_BUDGET_EXHAUSTED,
            HarnessError::NoExecutor(_) => ErrorCode::NO_EXECUTOR_FOR_ACTION,
            HarnessError::InvalidTransition { .. } => ErrorCode::INVALID_STATE_TRANSITION,
        }
    }

    pub fn to_outcome(&self) -> Outcome {
        Outcome::Error {
            code: self.code().formatted(),
            cause: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::EMPTY_SCENARIO.formatted(), "E1001");
        assert_eq!(ErrorCode::NAVIGATION_TIMEOUT.formatted(), "E2002");
        assert_eq!(ErrorCode::ELEMENT_NOT_FOUND.to_string(), "E3001");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::DUPLICATE_STEP_ID.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::SESSION_START.category(), ErrorCategory::Browser);
        assert_eq!(ErrorCode::COUNT_MISMATCH.category(), ErrorCategory::Assertion);
        assert_eq!(
            ErrorCode::CONTEXT_VAR_NOT_FOUND.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCode::INTERNAL_ERROR.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_attribute_mismatch_reports_absent_value() {
        let failure = CheckFailure::AttributeMismatch {
            locator: "role=button".to_string(),
            index: 0,
            attribute: "aria-pressed".to_string(),
            expected: "one of [\"true\", \"false\"]".to_string(),
            observed: None,
        };

        let msg = failure.to_string();
        assert!(msg.contains("aria-pressed"));
        assert!(msg.contains("<absent>"));
        assert_eq!(failure.code(), ErrorCode::ATTRIBUTE_MISMATCH);
    }

    #[test]
    fn test_check_failure_outcome_is_failed() {
        let failure = CheckFailure::ElementNotFound {
            locator: "role=menu".to_string(),
        };
        match failure.to_outcome() {
            Outcome::Failed { code, reason } => {
                assert_eq!(code, "E3001");
                assert!(reason.contains("role=menu"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_required_hidden_wait_maps_to_visibility_code() {
        let err = HarnessError::RequiredElementMissing {
            locator: "role=dialog".to_string(),
            state: WaitState::Hidden,
            timeout_ms: 100,
        };
        assert_eq!(err.code(), ErrorCode::VISIBILITY_MISMATCH);
        assert!(err.to_outcome().is_error());
    }

    #[test]
    fn test_closed_session_has_own_code() {
        let err = HarnessError::from(DriverError::Closed);
        assert_eq!(err.code(), ErrorCode::SESSION_CLOSED);
    }
}
