//! # Report emitter
//!
//! Two jobs:
//!
//! - [`ReportEmitter::capture`] saves the one screenshot a run leaves behind,
//!   named `<scenario>_<success|failure|error>.png`. Write failures are logged
//!   and never change the verdict.
//! - [`finalize`] renders a frozen [`RunReport`] as a plain-text transcript.
//!
//! The transcript contains no timings, timestamps or run ids, so two runs with
//! the same verdicts render byte-identical text:
//!
//! ```text
//! == menu_a11y: Menu button exposes its expanded state
//! [PASS ] open_app         navigate http://localhost:5173/
//! [FAIL ] items_decorated  expect role=menu >> role=menuitem every markup contains aria-hidden="true"
//!         [E3005] role=menu >> role=menuitem #1: markup does not contain "aria-hidden=\"true\""
//!         | <div role="menuitem">Quit</div>
//! Result: FAILED | state=completed | 9 passed, 1 failed, 0 errors | screenshot: verification/menu_a11y_failure.png
//! ```

use anyhow::{Context as _, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::browser::Session;
use crate::protocol::{Artifact, ArtifactOutcome, Outcome, ReportBuilder, RunReport};

const INDENT: &str = "        ";

pub struct ReportEmitter {
    output_dir: PathBuf,
}

impl ReportEmitter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn artifact_path(&self, scenario_id: &str, outcome: ArtifactOutcome) -> PathBuf {
        let safe_id: String = scenario_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{}_{}.png", safe_id, outcome))
    }

    /// Screenshots the page as the run left it and records the artifact.
    /// Returns the written path, or `None` when capture or write failed.
    pub async fn capture(
        &self,
        session: &Session,
        scenario_id: &str,
        report: &mut ReportBuilder,
    ) -> Option<PathBuf> {
        let outcome = report.artifact_outcome();
        let path = self.artifact_path(scenario_id, outcome);

        let bytes = match session.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(scenario_id, error = %e, "screenshot capture failed");
                return None;
            }
        };

        if let Err(e) = write_artifact(&path, &bytes).await {
            warn!(path = %path.display(), error = %e, "screenshot could not be written");
            return None;
        }

        info!(path = %path.display(), outcome = %outcome, "screenshot saved");
        report.add_artifact(Artifact {
            path: path.clone(),
            outcome,
            captured_at: Utc::now(),
        });
        Some(path)
    }
}

async fn write_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub text: String,
    pub passed: bool,
}

/// Renders the transcript of one run.
pub fn finalize(report: &RunReport) -> RenderedReport {
    let mut text = String::new();
    let width = report
        .steps
        .iter()
        .map(|s| s.step_id.chars().count())
        .max()
        .unwrap_or(0);

    let _ = writeln!(text, "== {}: {}", report.scenario_id, report.description);

    if let Some(fatal) = &report.fatal {
        let _ = writeln!(text, "FATAL [{}] {}", fatal.code, fatal.message);
    }

    for step in &report.steps {
        let _ = writeln!(
            text,
            "[{:<5}] {:<width$}  {}",
            step.outcome.label(),
            step.step_id,
            step.summary,
            width = width
        );
        match &step.outcome {
            Outcome::Passed => {}
            Outcome::Failed { code, reason } => {
                let _ = writeln!(text, "{}[{}] {}", INDENT, code, reason);
            }
            Outcome::Error { code, cause } => {
                let _ = writeln!(text, "{}[{}] {}", INDENT, code, cause);
            }
        }
        if let Some(diagnostic) = &step.diagnostic {
            for line in diagnostic.lines() {
                let _ = writeln!(text, "{}| {}", INDENT, line);
            }
        }
    }

    let skipped = report.not_executed();
    if skipped > 0 {
        let _ = writeln!(
            text,
            "-- {} of {} steps not executed: scenario aborted",
            skipped, report.declared_steps
        );
    }

    let passed = report.passed();
    let screenshot = report
        .artifacts
        .last()
        .map(|a| a.path.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(
        text,
        "Result: {} | state={} | {} passed, {} failed, {} errors | screenshot: {}",
        if passed { "PASSED" } else { "FAILED" },
        report.state,
        report.count(Outcome::is_passed),
        report.count(Outcome::is_failed),
        report.count(Outcome::is_error),
        screenshot
    );

    RenderedReport { text, passed }
}

/// Writes every report of an invocation as one JSON array.
pub fn write_json(reports: &[RunReport], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(reports).context("Failed to serialize run reports")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakePage};
    use crate::browser::BrowserConfig;
    use crate::errors::CheckFailure;
    use crate::protocol::{Action, RunState, Scenario, ScenarioConfig, Step, StepResult};
    use std::sync::Arc;

    fn scenario() -> Scenario {
        Scenario {
            id: "menu_a11y".to_string(),
            description: "menu".to_string(),
            config: ScenarioConfig::default(),
            steps: vec![
                Step::new("a", Action::Pause { duration_ms: 1 }),
                Step::new("longer_id", Action::Pause { duration_ms: 2 }),
                Step::new("c", Action::Pause { duration_ms: 3 }),
            ],
        }
    }

    #[test]
    fn test_transcript_lists_each_step_and_verdict() {
        let scenario = scenario();
        let mut builder = RunReport::builder(&scenario);
        builder.set_state(RunState::Running);
        builder.push(StepResult::passed(&scenario.steps[0]).with_duration_ms(12));
        let failure = CheckFailure::ElementNotFound {
            locator: "role=menu".to_string(),
        };
        builder.push(
            StepResult::new(&scenario.steps[1], failure.to_outcome()).with_diagnostic("<div>\n</div>"),
        );
        builder.set_state(RunState::Aborted);
        let report = builder.finish();

        let rendered = finalize(&report);
        let lines: Vec<&str> = rendered.text.lines().collect();

        assert!(!rendered.passed);
        assert_eq!(lines[0], "== menu_a11y: menu");
        assert_eq!(lines[1], "[PASS ] a          pause 1ms");
        assert_eq!(lines[2], "[FAIL ] longer_id  pause 2ms");
        assert_eq!(lines[3], "        [E3001] no element matches role=menu");
        assert_eq!(lines[4], "        | <div>");
        assert_eq!(lines[5], "        | </div>");
        assert_eq!(lines[6], "-- 1 of 3 steps not executed: scenario aborted");
        assert!(lines[7].starts_with("Result: FAILED | state=aborted | 1 passed, 1 failed, 0 errors"));
    }

    #[test]
    fn test_transcript_ignores_timings_and_run_ids() {
        let scenario = scenario();
        let render = |duration: u64| {
            let mut builder = RunReport::builder(&scenario);
            for step in &scenario.steps {
                builder.push(StepResult::passed(step).with_duration_ms(duration));
            }
            builder.set_state(RunState::Completed);
            finalize(&builder.finish())
        };

        let first = render(5);
        let second = render(500);
        assert_eq!(first, second);
        assert!(first.passed);
    }

    #[test]
    fn test_artifact_path_is_sanitized() {
        let emitter = ReportEmitter::new("verification");
        assert_eq!(
            emitter.artifact_path("menu/a11y", ArtifactOutcome::Error),
            PathBuf::from("verification/menu_a11y_error.png")
        );
    }

    #[tokio::test]
    async fn test_capture_writes_outcome_named_png() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested");
        let launcher = FakeLauncher::new(Arc::new(FakePage::new("home")));
        let session = Session::open(&launcher, &BrowserConfig::default()).await.unwrap();
        let scenario = scenario();
        let mut builder = RunReport::builder(&scenario);
        builder.set_state(RunState::Completed);

        let path = ReportEmitter::new(&output)
            .capture(&session, &scenario.id, &mut builder)
            .await
            .unwrap();

        assert_eq!(path, output.join("menu_a11y_success.png"));
        assert!(std::fs::read(&path).unwrap().starts_with(b"\x89PNG"));
        assert_eq!(builder.finish().artifacts.len(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(Arc::new(FakePage::new("home").screenshot_fails()));
        let session = Session::open(&launcher, &BrowserConfig::default()).await.unwrap();
        let scenario = scenario();
        let mut builder = RunReport::builder(&scenario);

        let path = ReportEmitter::new(dir.path())
            .capture(&session, &scenario.id, &mut builder)
            .await;

        assert!(path.is_none());
        assert!(builder.finish().artifacts.is_empty());
        session.close().await.unwrap();
    }

    #[test]
    fn test_write_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        let scenario = scenario();
        let mut builder = RunReport::builder(&scenario);
        builder.set_state(RunState::Running);
        builder.set_state(RunState::Completed);

        write_json(&[builder.finish()], &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["scenario_id"], "menu_a11y");
        assert_eq!(value[0]["state"], "completed");
    }
}
