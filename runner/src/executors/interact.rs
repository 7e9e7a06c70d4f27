use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{unresolved, wrong_action, StepEnv, StepExecutor};
use crate::browser::DriverError;
use crate::errors::HarnessError;
use crate::locator;
use crate::protocol::{Action, Interaction, Step, StepResult, WaitState};

/// Waits for the target to become visible, then acts on the first visible
/// match. The locator is resolved again for the click itself.
pub struct InteractExecutor;

#[async_trait]
impl StepExecutor for InteractExecutor {
    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::Interact { .. })
    }

    #[instrument(name = "interact", skip_all, fields(step_id = %step.id, mandatory = step.mandatory))]
    async fn execute(&self, step: &Step, env: &StepEnv<'_>) -> Result<StepResult, HarnessError> {
        let Action::Interact {
            locator,
            interaction,
            timeout_ms,
        } = &step.action
        else {
            return Err(wrong_action(step));
        };

        let timeout = env.timeout(*timeout_ms);
        let Some(set) = locator::wait_visible(env.session, locator, timeout).await? else {
            return unresolved(step, locator, WaitState::Visible, timeout);
        };
        let index = set.first_visible_index().unwrap_or(0);

        match interaction {
            Interaction::Click => match env.session.click(locator, index).await {
                Ok(()) => {
                    info!(locator = %locator, index, "clicked");
                    Ok(StepResult::passed(step))
                }
                Err(DriverError::Detached { .. }) => {
                    warn!(locator = %locator, index, "target went away before the click");
                    unresolved(step, locator, WaitState::Visible, timeout)
                }
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{button, FakePage, SnapshotExt};
    use crate::errors::ErrorCode;
    use crate::executors::test_support::{env, open};
    use crate::limits::ExecutionLimits;
    use crate::protocol::Locator;

    fn click(locator: &Locator) -> Step {
        Step::new(
            "click",
            Action::Interact {
                locator: locator.clone(),
                interaction: Interaction::Click,
                timeout_ms: Some(200),
            },
        )
    }

    #[tokio::test]
    async fn test_click_moves_page_to_next_screen() {
        let start = Locator::css("button").has_text("Start Game");
        let (page, session) = open(
            FakePage::new("title")
                .element("title", &start, vec![button("Start Game")])
                .on_click("title", &start, "game"),
        )
        .await;
        let limits = ExecutionLimits::strict();

        let result = InteractExecutor
            .execute(&click(&start).mandatory(), &env(&session, &limits))
            .await
            .unwrap();

        assert!(result.outcome.is_passed());
        assert_eq!(page.current_screen(), "game");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_clicks_first_visible_match() {
        let menu = Locator::role("button").named("Open game menu");
        let (page, session) = open(FakePage::new("game").element(
            "game",
            &menu,
            vec![button("Open game menu").hidden(), button("Open game menu")],
        ))
        .await;
        let limits = ExecutionLimits::strict();

        InteractExecutor
            .execute(&click(&menu), &env(&session, &limits))
            .await
            .unwrap();

        assert_eq!(page.clicks(), vec![menu.to_string()]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_optional_target_is_recorded_failure() {
        let new_game = Locator::text("New Game");
        let (page, session) = open(FakePage::new("game")).await;
        let limits = ExecutionLimits::strict();

        let result = InteractExecutor
            .execute(&click(&new_game), &env(&session, &limits))
            .await
            .unwrap();

        assert!(result.outcome.is_failed());
        assert!(page.clicks().is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_mandatory_target_aborts() {
        let start = Locator::css("button").has_text("Start Game");
        let (_page, session) = open(FakePage::new("title")).await;
        let limits = ExecutionLimits::strict();

        let err = InteractExecutor
            .execute(&click(&start).mandatory(), &env(&session, &limits))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ELEMENT_NOT_FOUND);
        session.close().await.unwrap();
    }
}
