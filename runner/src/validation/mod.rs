//! # Scenario validation
//!
//! Checks a scenario before any browser is launched, so a typo in a scenario
//! file fails in milliseconds with every problem listed, instead of halfway
//! through a run.
//!
//! ## Checks
//!
//! 1. The scenario has an id and at least one step
//! 2. Step ids are non-empty and unique
//! 3. Timeouts are positive and within [`ExecutionLimits`]
//! 4. Locators and expectations have no empty fields
//! 5. URLs are absolute http(s) URLs or `${...}` placeholders
//! 6. Count expectations can actually fail
//!
//! All errors are collected; validation does not stop at the first one.
//!
//! ```ignore
//! if let Err(errors) = validate_scenario(&scenario, &limits) {
//!     for err in errors {
//!         eprintln!("[{}] {}", err.code(), err);
//!     }
//! }
//! ```

use std::collections::HashSet;
use thiserror::Error;

use crate::errors::ErrorCode;
use crate::limits::{validate_limits, ExecutionLimits};
use crate::protocol::{Action, Expectation, Locator, Scenario, Step};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("scenario '{scenario_id}' has no steps")]
    EmptyScenario { scenario_id: String },

    #[error("scenario id is empty")]
    EmptyScenarioId,

    #[error("step #{position} has an empty id")]
    EmptyStepId { position: usize },

    #[error("step id '{step_id}' is used more than once")]
    DuplicateStepId { step_id: String },

    #[error("step '{step_id}': {field} must be greater than zero")]
    InvalidTimeout { step_id: String, field: &'static str },

    #[error("step '{step_id}': invalid locator: {detail}")]
    InvalidLocator { step_id: String, detail: String },

    #[error("step '{step_id}': invalid expectation: {detail}")]
    InvalidExpectation { step_id: String, detail: String },

    #[error("step '{step_id}': '{url}' is not an http(s) URL")]
    InvalidUrl { step_id: String, url: String },

    #[error("{message}")]
    LimitExceeded { limit: String, message: String },
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::EmptyScenario { .. } => ErrorCode::EMPTY_SCENARIO,
            ValidationError::EmptyScenarioId | ValidationError::EmptyStepId { .. } => {
                ErrorCode::EMPTY_ID
            }
            ValidationError::DuplicateStepId { .. } => ErrorCode::DUPLICATE_STEP_ID,
            ValidationError::InvalidTimeout { .. } => ErrorCode::INVALID_TIMEOUT,
            ValidationError::InvalidLocator { .. } => ErrorCode::INVALID_LOCATOR,
            ValidationError::InvalidExpectation { .. } => ErrorCode::INVALID_EXPECTATION,
            ValidationError::InvalidUrl { .. } => ErrorCode::INVALID_URL,
            ValidationError::LimitExceeded { .. } => ErrorCode::LIMIT_EXCEEDED,
        }
    }
}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// SCENARIO
// ============================================================================

pub fn validate_scenario(scenario: &Scenario, limits: &ExecutionLimits) -> ValidationResult {
    let mut errors = Vec::new();

    if scenario.id.trim().is_empty() {
        errors.push(ValidationError::EmptyScenarioId);
    }

    if scenario.steps.is_empty() {
        errors.push(ValidationError::EmptyScenario {
            scenario_id: scenario.id.clone(),
        });
        return Err(errors);
    }

    if !is_valid_url(&scenario.config.base_url) {
        errors.push(ValidationError::InvalidUrl {
            step_id: "config.base_url".to_string(),
            url: scenario.config.base_url.clone(),
        });
    }

    if scenario.config.default_timeout_ms == 0 {
        errors.push(ValidationError::InvalidTimeout {
            step_id: "config".to_string(),
            field: "default_timeout_ms",
        });
    }

    let mut seen = HashSet::new();
    for (position, step) in scenario.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            errors.push(ValidationError::EmptyStepId {
                position: position + 1,
            });
        } else if !seen.insert(step.id.as_str()) {
            errors.push(ValidationError::DuplicateStepId {
                step_id: step.id.clone(),
            });
        }
        validate_step(step, &mut errors);
    }

    let longest_wait_ms = scenario
        .steps
        .iter()
        .filter_map(|s| declared_wait_ms(&s.action))
        .chain(std::iter::once(scenario.config.default_timeout_ms))
        .max()
        .unwrap_or(0);
    let limit_check = validate_limits(scenario.steps.len(), longest_wait_ms, limits);
    errors.extend(
        limit_check
            .violations
            .into_iter()
            .map(|v| ValidationError::LimitExceeded {
                limit: v.limit_name,
                message: v.message,
            }),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn declared_wait_ms(action: &Action) -> Option<u64> {
    match action {
        Action::Navigate { timeout_ms, .. }
        | Action::Interact { timeout_ms, .. }
        | Action::Assert { timeout_ms, .. } => *timeout_ms,
        Action::WaitFor { timeout_ms, .. } => Some(*timeout_ms),
        Action::Pause { duration_ms } => Some(*duration_ms),
    }
}

fn is_valid_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("${") || url.starts_with("http://") || url.starts_with("https://")
}

// ============================================================================
// STEPS
// ============================================================================

fn validate_step(step: &Step, errors: &mut Vec<ValidationError>) {
    let zero_timeout = |field: &'static str| ValidationError::InvalidTimeout {
        step_id: step.id.clone(),
        field,
    };

    match &step.action {
        Action::Navigate { url, timeout_ms } => {
            if !is_valid_url(url) {
                errors.push(ValidationError::InvalidUrl {
                    step_id: step.id.clone(),
                    url: url.clone(),
                });
            }
            if *timeout_ms == Some(0) {
                errors.push(zero_timeout("timeout_ms"));
            }
        }
        Action::Interact {
            locator,
            timeout_ms,
            ..
        } => {
            check_locator(step, locator, errors);
            if *timeout_ms == Some(0) {
                errors.push(zero_timeout("timeout_ms"));
            }
        }
        Action::WaitFor {
            locator,
            timeout_ms,
            ..
        } => {
            check_locator(step, locator, errors);
            if *timeout_ms == 0 {
                errors.push(zero_timeout("timeout_ms"));
            }
        }
        Action::Assert {
            locator,
            expectation,
            timeout_ms,
        } => {
            check_locator(step, locator, errors);
            check_expectation(step, expectation, errors);
            if *timeout_ms == Some(0) {
                errors.push(zero_timeout("timeout_ms"));
            }
        }
        Action::Pause { .. } => {}
    }
}

fn check_locator(step: &Step, locator: &Locator, errors: &mut Vec<ValidationError>) {
    let blank = |s: &str| s.trim().is_empty();
    let problems: Vec<&str> = match locator {
        Locator::Within { parent, child } => {
            check_locator(step, parent, errors);
            check_locator(step, child, errors);
            return;
        }
        Locator::Role { role, name, .. } => [
            blank(role.as_str()).then_some("role is empty"),
            name.as_deref().filter(|n| blank(*n)).map(|_| "accessible name is empty"),
        ]
        .into_iter()
        .flatten()
        .collect(),
        Locator::Text { text, .. } => blank(text.as_str()).then_some("text is empty").into_iter().collect(),
        Locator::Css { selector, has_text } => [
            blank(selector.as_str()).then_some("selector is empty"),
            has_text.as_deref().filter(|t| blank(*t)).map(|_| "has_text is empty"),
        ]
        .into_iter()
        .flatten()
        .collect(),
    };

    errors.extend(problems.into_iter().map(|detail| ValidationError::InvalidLocator {
        step_id: step.id.clone(),
        detail: detail.to_string(),
    }));
}

fn check_expectation(step: &Step, expectation: &Expectation, errors: &mut Vec<ValidationError>) {
    let detail = match expectation {
        Expectation::Visible | Expectation::Hidden | Expectation::CountEquals { .. } => None,
        Expectation::AttributeEquals { attribute, .. }
        | Expectation::AttributeContains { attribute, .. }
        | Expectation::AttributeAbsent { attribute, .. }
            if attribute.trim().is_empty() =>
        {
            Some("attribute name is empty")
        }
        Expectation::AttributeOneOf {
            attribute, values, ..
        } => {
            if attribute.trim().is_empty() {
                Some("attribute name is empty")
            } else if values.is_empty() {
                Some("one_of needs at least one value")
            } else {
                None
            }
        }
        Expectation::CountAtLeast { min: 0 } => Some("count_at_least 0 always holds"),
        Expectation::MarkupContains { needle, .. } | Expectation::TextContains { needle, .. }
            if needle.is_empty() =>
        {
            Some("needle is empty")
        }
        _ => None,
    };

    if let Some(detail) = detail {
        errors.push(ValidationError::InvalidExpectation {
            step_id: step.id.clone(),
            detail: detail.to_string(),
        });
    }
}
