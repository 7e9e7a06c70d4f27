//! # Scenario runner
//!
//! Drives one scenario through the run state machine:
//!
//! ```text
//! NotStarted ──first dispatch──▶ Running ──all steps consumed──▶ Completed
//!      │                            │
//!      └──session/preflight error───┴──Error-class result──────▶ Aborted
//! ```
//!
//! A failed preflight still opens the browser so the run leaves its error
//! screenshot; only a browser that never started leaves none.
//!
//! Steps run strictly in declared order on one session. Every executed step
//! appends exactly one [`StepResult`]. A `Failed` result lets the run go on;
//! an `Error` result is recorded and the remaining steps are not executed.
//!
//! [`run_scenario`] owns the whole lifecycle: preflight, session open,
//! execution, screenshot, session close. It always returns a report.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::assertions::{excerpt, MARKUP_EXCERPT_CHARS};
use crate::browser::{preflight, BrowserConfig, BrowserLauncher, Session};
use crate::context::Context;
use crate::errors::HarnessError;
use crate::executors::{default_executors, StepEnv, StepExecutor};
use crate::limits::ExecutionLimits;
use crate::protocol::{ReportBuilder, RunReport, RunState, Scenario, Step, StepResult};
use crate::report::ReportEmitter;

/// Where screenshots go when nothing else is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "verification";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub browser: BrowserConfig,
    pub limits: ExecutionLimits,
    pub output_dir: PathBuf,
    /// Probe the base URL over HTTP before launching the browser.
    pub preflight: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            limits: ExecutionLimits::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            preflight: true,
        }
    }
}

pub struct ScenarioRunner {
    executors: Vec<Box<dyn StepExecutor>>,
    limits: ExecutionLimits,
}

impl ScenarioRunner {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self::with_executors(limits, default_executors())
    }

    pub fn with_executors(limits: ExecutionLimits, executors: Vec<Box<dyn StepExecutor>>) -> Self {
        Self { executors, limits }
    }

    /// Executes every step of `scenario` on `session`, appending results to
    /// `report`. Leaves the report `Completed` or `Aborted`.
    #[instrument(name = "scenario", skip_all, fields(scenario_id = %scenario.id, steps = scenario.steps.len()))]
    pub async fn execute(&self, scenario: &Scenario, session: &Session, report: &mut ReportBuilder) {
        if let Err(err) = transition(report, RunState::Running) {
            error!(error = %err, "scenario cannot start");
            report.set_fatal(err.code().formatted(), err.to_string());
            return;
        }

        let context = Context::for_scenario(&scenario.config);
        let env = StepEnv {
            session,
            limits: &self.limits,
            default_timeout: Duration::from_millis(scenario.config.default_timeout_ms),
        };
        let deadline = Instant::now() + self.limits.max_execution_time;

        for step in &scenario.steps {
            let started = Instant::now();
            let dispatched = self.dispatch(step, &context, &env, deadline).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match dispatched {
                Ok(result) => {
                    info!(step_id = %step.id, status = result.outcome.label(), "step finished");
                    report.push(result.with_duration_ms(elapsed_ms));
                }
                Err(err) => {
                    error!(step_id = %step.id, code = %err.code(), error = %err, "step aborted the scenario");
                    let mut result = StepResult::new(step, err.to_outcome()).with_duration_ms(elapsed_ms);
                    if matches!(err, HarnessError::RequiredElementMissing { .. }) {
                        if let Some(dump) = page_dump(session).await {
                            result = result.with_diagnostic(dump);
                        }
                    }
                    report.push(result);
                    report.set_state(RunState::Aborted);
                    return;
                }
            }
        }

        if let Err(err) = transition(report, RunState::Completed) {
            error!(error = %err, "scenario could not complete");
            report.set_fatal(err.code().formatted(), err.to_string());
        }
    }

    async fn dispatch(
        &self,
        step: &Step,
        context: &Context,
        env: &StepEnv<'_>,
        deadline: Instant,
    ) -> Result<StepResult, HarnessError> {
        let step = context.interpolate_step(step)?;
        let executor = self
            .executors
            .iter()
            .find(|e| e.can_handle(&step.action))
            .ok_or_else(|| HarnessError::NoExecutor(step.action.name().to_string()))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, executor.execute(&step, env)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::BudgetExhausted {
                budget_secs: self.limits.max_execution_time.as_secs(),
            }),
        }
    }
}

fn transition(report: &mut ReportBuilder, next: RunState) -> Result<(), HarnessError> {
    let current = report.state();
    if !current.can_transition_to(next) {
        return Err(HarnessError::InvalidTransition {
            from: current,
            to: next,
        });
    }
    report.set_state(next);
    Ok(())
}

/// Truncated markup of the whole page, for steps that aborted the run.
async fn page_dump(session: &Session) -> Option<String> {
    match session.content().await {
        Ok(content) => Some(format!(
            "page content: {}",
            excerpt(&content, MARKUP_EXCERPT_CHARS * 4)
        )),
        Err(e) => {
            warn!(error = %e, "could not capture page content");
            None
        }
    }
}

fn abort_before_start(report: &mut ReportBuilder, err: &HarnessError) {
    error!(
        code = %err.code(),
        kind = err.code().description(),
        error = %err,
        "scenario aborted before its first step"
    );
    report.set_fatal(err.code().formatted(), err.to_string());
    if let Err(transition_err) = transition(report, RunState::Aborted) {
        warn!(error = %transition_err, "report already terminal");
    }
}

/// Runs one scenario end to end and returns its frozen report.
///
/// The session, once opened, is closed exactly once whatever happened, and a
/// single screenshot named after the outcome is captured before closing.
/// An unreachable base URL aborts with no steps executed but still opens the
/// session for that screenshot.
pub async fn run_scenario(
    launcher: &dyn BrowserLauncher,
    scenario: &Scenario,
    options: &RunOptions,
) -> RunReport {
    let mut report = RunReport::builder(scenario);
    info!(scenario_id = %scenario.id, base_url = %scenario.config.base_url, "scenario starting");

    let unreachable = if options.preflight {
        preflight::wait_until_reachable(&scenario.config.base_url, options.limits.navigation_timeout)
            .await
            .err()
    } else {
        None
    };

    let session = match Session::open(launcher, &options.browser).await {
        Ok(session) => session,
        Err(err) => {
            abort_before_start(&mut report, unreachable.as_ref().unwrap_or(&err));
            return report.finish();
        }
    };

    match &unreachable {
        // The page stays blank; the error screenshot below still records it.
        Some(err) => abort_before_start(&mut report, err),
        None => {
            ScenarioRunner::new(options.limits.clone())
                .execute(scenario, &session, &mut report)
                .await
        }
    }

    ReportEmitter::new(&options.output_dir)
        .capture(&session, &scenario.id, &mut report)
        .await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "session close reported an error");
    }

    let report = report.finish();
    info!(
        scenario_id = %report.scenario_id,
        state = %report.state,
        passed = report.passed(),
        "scenario finished"
    );
    report
}
