use async_trait::async_trait;
use tracing::{info, instrument};

use super::{wrong_action, StepEnv, StepExecutor};
use crate::errors::HarnessError;
use crate::protocol::{Action, Step, StepResult};

/// Loads a URL and waits for the page to settle. Any failure is fatal: no
/// later step means anything on a page that never loaded.
pub struct NavigateExecutor;

#[async_trait]
impl StepExecutor for NavigateExecutor {
    fn can_handle(&self, action: &Action) -> bool {
        matches!(action, Action::Navigate { .. })
    }

    #[instrument(name = "navigate", skip_all, fields(step_id = %step.id))]
    async fn execute(&self, step: &Step, env: &StepEnv<'_>) -> Result<StepResult, HarnessError> {
        let Action::Navigate { url, timeout_ms } = &step.action else {
            return Err(wrong_action(step));
        };

        let timeout = match timeout_ms {
            Some(ms) => env.limits.clamp_wait(*ms),
            None => env.limits.navigation_timeout,
        };

        env.session.navigate(url, timeout).await?;
        info!(url = %url, "navigated");
        Ok(StepResult::passed(step))
    }
}
