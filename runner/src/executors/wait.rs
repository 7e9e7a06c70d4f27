//! # Wait and pause
//!
//! - `wait_for`: polls a locator until it reaches a [`WaitState`]. A mandatory
//!   wait that times out aborts the scenario; otherwise the timeout is recorded
//!   as a failure.
//! - `pause`: fixed delay, for animations that have no observable end state.
//!
//! ```json
//! { "id": "menu_open", "action": "wait_for", "mandatory": true,
//!   "locator": { "by": "role", "role": "menu" }, "timeout_ms": 2000 }
//! { "id": "settle", "action": "pause", "duration_ms": 500 }
//! ```

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, instrument};

use super::{unresolved, wrong_action, StepEnv, StepExecutor};
use crate::errors::HarnessError;
use crate::locator;
use crate::protocol::{Action, Step, StepResult};

pub struct WaitForExecutor;

#[async_trait]
impl StepExecutor for WaitForExecutor {
    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::WaitFor { .. })
    }

    #[instrument(name = "wait_for", skip_all, fields(step_id = %step.id, mandatory = step.mandatory))]
    async fn execute(&self, step: &Step, env: &StepEnv<'_>) -> Result<StepResult, HarnessError> {
        let Action::WaitFor {
            locator,
            state,
            timeout_ms,
        } = &step.action
        else {
            return Err(wrong_action(step));
        };

        let timeout = env.limits.clamp_wait(*timeout_ms);
        match locator::wait_for(env.session, locator, *state, timeout).await? {
            Some(set) => {
                info!(locator = %locator, state = %state, matches = set.len(), "wait satisfied");
                Ok(StepResult::passed(step))
            }
            None => unresolved(step, locator, *state, timeout),
        }
    }
}

/// Sleeps for the requested duration, clamped to `max_wait`. Always passes.
pub struct PauseExecutor;

#[async_trait]
impl StepExecutor for PauseExecutor {
    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::Pause { .. })
    }

    #[instrument(name = "pause", skip_all, fields(step_id = %step.id))]
    async fn execute(&self, step: &Step, env: &StepEnv<'_>) -> Result<StepResult, HarnessError> {
        let Action::Pause { duration_ms } = &step.action else {
            return Err(wrong_action(step));
        };

        sleep(env.limits.clamp_wait(*duration_ms)).await;
        Ok(StepResult::passed(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{element, FakePage};
    use crate::errors::ErrorCode;
    use crate::executors::test_support::{env, open};
    use crate::limits::ExecutionLimits;
    use crate::protocol::{Locator, WaitState};
    use std::time::{Duration, Instant};

    fn wait_menu(timeout_ms: u64) -> Step {
        Step::new(
            "menu_open",
            Action::WaitFor {
                locator: Locator::role("menu"),
                state: WaitState::Visible,
                timeout_ms,
            },
        )
    }

    #[tokio::test]
    async fn test_wait_passes_when_element_renders() {
        let menu = Locator::role("menu");
        let (_page, session) = open(
            FakePage::new("game")
                .element("game", &menu, vec![element("div", "menu", "")])
                .appears_after("game", &menu, 1),
        )
        .await;
        let limits = ExecutionLimits::strict();

        let result = WaitForExecutor
            .execute(&wait_menu(1_000).mandatory(), &env(&session, &limits))
            .await
            .unwrap();
        assert!(result.outcome.is_passed());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mandatory_wait_timeout_aborts() {
        let (_page, session) = open(FakePage::new("game")).await;
        let limits = ExecutionLimits::strict();

        let err = WaitForExecutor
            .execute(&wait_menu(100).mandatory(), &env(&session, &limits))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ELEMENT_NOT_FOUND);
        assert!(err.to_string().contains("100ms"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_optional_wait_timeout_is_recorded() {
        let (_page, session) = open(FakePage::new("game")).await;
        let limits = ExecutionLimits::strict();

        let result = WaitForExecutor
            .execute(&wait_menu(50), &env(&session, &limits))
            .await
            .unwrap();
        assert!(result.outcome.is_failed());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_sleeps_and_passes() {
        let (_page, session) = open(FakePage::new("game")).await;
        let limits = ExecutionLimits::strict();
        let step = Step::new("settle", Action::Pause { duration_ms: 60 });

        let start = Instant::now();
        let result = PauseExecutor
            .execute(&step, &env(&session, &limits))
            .await
            .unwrap();

        assert!(result.outcome.is_passed());
        assert!(start.elapsed() >= Duration::from_millis(60));
        session.close().await.unwrap();
    }

    #[test]
    fn test_handles_only_its_action() {
        assert!(PauseExecutor.can_handle(&Action::Pause { duration_ms: 1 }));
        assert!(!PauseExecutor.can_handle(&wait_menu(1).action));
        assert!(WaitForExecutor.can_handle(&wait_menu(1).action));
    }
}
