use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};

use super::{wrong_action, StepEnv, StepExecutor};
use crate::assertions;
use crate::errors::HarnessError;
use crate::protocol::{Action, Step, StepResult, WaitState};

/// Evaluates an expectation. Mismatches are recorded and never abort, except
/// a mandatory step whose target is missing altogether.
pub struct AssertExecutor;

#[async_trait]
impl StepExecutor for AssertExecutor {
    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::Assert { .. })
    }

    #[instrument(name = "assert", skip_all, fields(step_id = %step.id, mandatory = step.mandatory))]
    async fn execute(&self, step: &Step, env: &StepEnv<'_>) -> Result<StepResult, HarnessError> {
        let Action::Assert {
            locator,
            expectation,
            timeout_ms,
        } = &step.action
        else {
            return Err(wrong_action(step));
        };

        let timeout = timeout_ms.map_or(Duration::ZERO, |ms| env.limits.clamp_wait(ms));
        let evaluation = assertions::verify(env.session, locator, expectation, timeout).await?;

        let result = match &evaluation.failure {
            None => {
                info!(locator = %locator, expectation = %expectation, "expectation holds");
                StepResult::passed(step)
            }
            Some(failure) if failure.is_not_found() && step.mandatory => {
                return Err(HarnessError::RequiredElementMissing {
                    locator: locator.to_string(),
                    state: WaitState::Attached,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Some(failure) => {
                info!(locator = %locator, code = %failure.code(), "expectation failed");
                StepResult::new(step, failure.to_outcome())
            }
        };

        Ok(match evaluation.diagnostic {
            Some(diagnostic) => result.with_diagnostic(diagnostic),
            None => result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{button, FakePage, SnapshotExt};
    use crate::executors::test_support::{env, open};
    use crate::limits::ExecutionLimits;
    use crate::protocol::{Expectation, Locator, Outcome};

    fn expect(locator: &Locator, expectation: Expectation, timeout_ms: Option<u64>) -> Step {
        Step::new(
            "check",
            Action::Assert {
                locator: locator.clone(),
                expectation,
                timeout_ms,
            },
        )
    }

    #[tokio::test]
    async fn test_passing_assertion_echoes_observed_value() {
        let menu = Locator::role("button").named("Open menu");
        let (_page, session) = open(FakePage::new("game").element(
            "game",
            &menu,
            vec![button("Open menu").attr("aria-expanded", "false")],
        ))
        .await;
        let limits = ExecutionLimits::strict();

        let result = AssertExecutor
            .execute(
                &expect(&menu, Expectation::attribute_equals("aria-expanded", "false"), None),
                &env(&session, &limits),
            )
            .await
            .unwrap();

        assert!(result.outcome.is_passed());
        assert_eq!(result.diagnostic.as_deref(), Some("aria-expanded=\"false\""));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_is_recorded_not_raised() {
        let players = Locator::role("button").named("4 Players");
        let (_page, session) =
            open(FakePage::new("setup").element("setup", &players, vec![button("4 Players")])).await;
        let limits = ExecutionLimits::strict();

        let result = AssertExecutor
            .execute(
                &expect(
                    &players,
                    Expectation::attribute_one_of("aria-pressed", &["true", "false"]),
                    None,
                )
                .mandatory(),
                &env(&session, &limits),
            )
            .await
            .unwrap();

        match result.outcome {
            Outcome::Failed { code, reason } => {
                assert_eq!(code, "E3002");
                assert!(reason.contains("<absent>"));
            }
            other => panic!("unexpected {:?}", other),
        }
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_until_element_renders() {
        let menu = Locator::role("menu");
        let (_page, session) = open(
            FakePage::new("game")
                .element("game", &menu, vec![crate::browser::fake::element("div", "menu", "")])
                .appears_after("game", &menu, 2),
        )
        .await;
        let limits = ExecutionLimits::strict();

        let once = AssertExecutor
            .execute(&expect(&menu, Expectation::Visible, None), &env(&session, &limits))
            .await
            .unwrap();
        assert!(once.outcome.is_failed());

        let retried = AssertExecutor
            .execute(&expect(&menu, Expectation::Visible, Some(1_000)), &env(&session, &limits))
            .await
            .unwrap();
        assert!(retried.outcome.is_passed());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_target_of_mandatory_assertion_aborts() {
        let menu = Locator::role("menu");
        let (_page, session) = open(FakePage::new("game")).await;
        let limits = ExecutionLimits::strict();

        let err = AssertExecutor
            .execute(
                &expect(&menu, Expectation::Visible, None).mandatory(),
                &env(&session, &limits),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::RequiredElementMissing { .. }));
        session.close().await.unwrap();
    }
}
