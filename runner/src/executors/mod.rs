//! # Step executors
//!
//! One executor per action kind. The runner asks each registered executor
//! whether it handles a step and hands the step to the first one that does.
//!
//! An executor returns:
//! - `Ok(StepResult)` for anything that should be recorded and let the run go
//!   on, passed or failed;
//! - `Err(HarnessError)` for conditions that must abort the scenario.

pub mod assert;
pub mod interact;
pub mod navigate;
pub mod wait;

use async_trait::async_trait;
use std::time::Duration;

use crate::browser::Session;
use crate::errors::{CheckFailure, HarnessError};
use crate::limits::ExecutionLimits;
use crate::protocol::{Action, Locator, Step, StepResult, WaitState};

pub use assert::AssertExecutor;
pub use interact::InteractExecutor;
pub use navigate::NavigateExecutor;
pub use wait::{PauseExecutor, WaitForExecutor};

/// What a step may touch while it runs.
pub struct StepEnv<'a> {
    pub session: &'a Session,
    pub limits: &'a ExecutionLimits,
    /// Timeout for interactions that do not declare one.
    pub default_timeout: Duration,
}

impl StepEnv<'_> {
    /// Requested timeout, or the default, clamped to `max_wait`.
    pub fn timeout(&self, requested_ms: Option<u64>) -> Duration {
        match requested_ms {
            Some(ms) => self.limits.clamp_wait(ms),
            None => self.default_timeout.min(self.limits.max_wait),
        }
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn can_handle(&self, action: &Action) -> bool;

    async fn execute(&self, step: &Step, env: &StepEnv<'_>) -> Result<StepResult, HarnessError>;
}

/// Every executor the harness ships with.
pub fn default_executors() -> Vec<Box<dyn StepExecutor>> {
    vec![
        Box::new(NavigateExecutor),
        Box::new(InteractExecutor),
        Box::new(WaitForExecutor),
        Box::new(AssertExecutor),
        Box::new(PauseExecutor),
    ]
}

/// Outcome for a target that never reached `state`: a recorded failure for
/// ordinary steps, an abort for mandatory ones.
pub(crate) fn unresolved(
    step: &Step,
    locator: &Locator,
    state: WaitState,
    timeout: Duration,
) -> Result<StepResult, HarnessError> {
    if step.mandatory {
        return Err(HarnessError::RequiredElementMissing {
            locator: locator.to_string(),
            state,
            timeout_ms: timeout.as_millis() as u64,
        });
    }

    let failure = match state {
        WaitState::Visible | WaitState::Attached => CheckFailure::ElementNotFound {
            locator: locator.to_string(),
        },
        WaitState::Hidden | WaitState::Detached => CheckFailure::VisibilityMismatch {
            locator: locator.to_string(),
            expected: state.to_string(),
            observed: "still present".to_string(),
        },
    };
    Ok(StepResult::new(step, failure.to_outcome())
        .with_diagnostic(format!("not {} within {}ms", state, timeout.as_millis())))
}

/// Error for a step routed to an executor that cannot run it.
pub(crate) fn wrong_action(step: &Step) -> HarnessError {
    HarnessError::NoExecutor(step.action.name().to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_action_has_an_executor() {
        let executors = default_executors();
        let actions = [
            Action::Navigate {
                url: "http://localhost:5173/".to_string(),
                timeout_ms: None,
            },
            Action::Interact {
                locator: Locator::role("button"),
                interaction: Default::default(),
                timeout_ms: None,
            },
            Action::WaitFor {
                locator: Locator::role("menu"),
                state: WaitState::Visible,
                timeout_ms: 10,
            },
            Action::Assert {
                locator: Locator::role("menu"),
                expectation: crate::protocol::Expectation::Visible,
                timeout_ms: None,
            },
            Action::Pause { duration_ms: 1 },
        ];
        for action in &actions {
            let handlers = executors.iter().filter(|e| e.can_handle(action)).count();
            assert_eq!(handlers, 1, "action {}", action.name());
        }
    }

    #[test]
    fn test_unresolved_mandatory_step_aborts() {
        let locator = Locator::css("button").has_text("Start Game");
        let step = Step::new(
            "start",
            Action::Interact {
                locator: locator.clone(),
                interaction: Default::default(),
                timeout_ms: None,
            },
        );

        let recorded = unresolved(&step, &locator, WaitState::Visible, Duration::from_millis(5))
            .unwrap();
        assert!(recorded.outcome.is_failed());
        assert_eq!(recorded.diagnostic.as_deref(), Some("not visible within 5ms"));

        let err = unresolved(&step.mandatory(), &locator, WaitState::Visible, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, HarnessError::RequiredElementMissing { .. }));
    }
}
