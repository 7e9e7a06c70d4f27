//! # Scenario protocol
//!
//! Declarative data shared by every component: what a scenario is, the steps
//! it is made of, how elements are described, what is expected of them and
//! what a run leaves behind.
//!
//! Scenarios are plain data. They can be built in Rust (see `scenarios`) or
//! loaded from JSON files:
//!
//! ```json
//! {
//!   "id": "menu_a11y",
//!   "description": "Menu button exposes its state",
//!   "config": { "base_url": "http://localhost:5173/" },
//!   "steps": [
//!     { "id": "open_app", "action": "navigate", "url": "${base_url}" },
//!     {
//!       "id": "menu_button",
//!       "action": "wait_for",
//!       "mandatory": true,
//!       "locator": { "by": "role", "role": "button", "name": "Open menu" },
//!       "timeout_ms": 5000
//!     }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Where the application under test is served when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5173/";

/// Default timeout applied to interactions that do not carry their own.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SCENARIO
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub config: ScenarioConfig,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Used by `interact` steps without an explicit `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Values available to `${name}` placeholders inside steps.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_timeout_ms: default_timeout_ms(),
            variables: HashMap::new(),
        }
    }
}

// ============================================================================
// STEPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Step {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A mandatory step aborts the scenario when its target never resolves.
    #[serde(default)]
    pub mandatory: bool,
    #[serde(flatten)]
    pub action: Action,
}

impl Step {
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            description: None,
            mandatory: false,
            action,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Navigate {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Interact {
        locator: Locator,
        #[serde(default)]
        interaction: Interaction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    WaitFor {
        locator: Locator,
        #[serde(default)]
        state: WaitState,
        timeout_ms: u64,
    },
    Assert {
        locator: Locator,
        expectation: Expectation,
        /// When set, the expectation is re-evaluated until it holds or the
        /// timeout elapses. Without it the page is inspected exactly once.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Fixed delay, typically to let an animation finish.
    Pause { duration_ms: u64 },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Interact { .. } => "interact",
            Action::WaitFor { .. } => "wait_for",
            Action::Assert { .. } => "assert",
            Action::Pause { .. } => "pause",
        }
    }

    /// One-line, timing-free description used in transcripts.
    pub fn summary(&self) -> String {
        match self {
            Action::Navigate { url, .. } => format!("navigate {}", url),
            Action::Interact {
                locator,
                interaction,
                ..
            } => format!("{} {}", interaction, locator),
            Action::WaitFor {
                locator,
                state,
                timeout_ms,
            } => format!("wait {} {} ({}ms)", state, locator, timeout_ms),
            Action::Assert {
                locator,
                expectation,
                ..
            } => format!("expect {} {}", locator, expectation),
            Action::Pause { duration_ms } => format!("pause {}ms", duration_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    #[default]
    Click,
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interaction::Click => write!(f, "click"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// At least one match is rendered visibly.
    #[default]
    Visible,
    /// No match is rendered visibly (absent elements count as hidden).
    Hidden,
    /// At least one match exists in the DOM.
    Attached,
    /// No match exists in the DOM.
    Detached,
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        };
        f.write_str(label)
    }
}

// ============================================================================
// LOCATORS
// ============================================================================

/// Semantic description of the elements a step targets.
///
/// Locators never hold on to elements: they are resolved against the live DOM
/// every time they are used, so a step that runs after a click always sees
/// the page as the click left it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    /// ARIA role (explicit or implicit) plus an optional accessible name.
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        exact: bool,
    },
    /// Innermost elements whose text content matches.
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
    /// CSS selector, optionally filtered by contained text.
    Css {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_text: Option<String>,
    },
    /// `child` matches searched only inside the elements matched by `parent`.
    Within {
        parent: Box<Locator>,
        child: Box<Locator>,
    },
}

impl Locator {
    pub fn role(role: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: None,
            exact: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            exact: false,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
            has_text: None,
        }
    }

    pub fn within(parent: Locator, child: Locator) -> Self {
        Locator::Within {
            parent: Box::new(parent),
            child: Box::new(child),
        }
    }

    /// Sets the accessible name of a role locator. No-op for other kinds.
    pub fn named(self, accessible_name: impl Into<String>) -> Self {
        match self {
            Locator::Role { role, exact, .. } => Locator::Role {
                role,
                name: Some(accessible_name.into()),
                exact,
            },
            other => other,
        }
    }

    /// Sets the text filter of a CSS locator. No-op for other kinds.
    pub fn has_text(self, text: impl Into<String>) -> Self {
        match self {
            Locator::Css { selector, .. } => Locator::Css {
                selector,
                has_text: Some(text.into()),
            },
            other => other,
        }
    }

    pub fn exact(self) -> Self {
        match self {
            Locator::Role { role, name, .. } => Locator::Role {
                role,
                name,
                exact: true,
            },
            Locator::Text { text, .. } => Locator::Text { text, exact: true },
            other => other,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Role { role, name, exact } => {
                write!(f, "role={}", role)?;
                if let Some(name) = name {
                    let suffix = if *exact { "s" } else { "i" };
                    write!(f, "[name=\"{}\"{}]", name, suffix)?;
                }
                Ok(())
            }
            Locator::Text { text, exact } => {
                if *exact {
                    write!(f, "text=\"{}\"s", text)
                } else {
                    write!(f, "text=\"{}\"", text)
                }
            }
            Locator::Css { selector, has_text } => {
                write!(f, "css={}", selector)?;
                if let Some(text) = has_text {
                    write!(f, ":has-text(\"{}\")", text)?;
                }
                Ok(())
            }
            Locator::Within { parent, child } => write!(f, "{} >> {}", parent, child),
        }
    }
}

// ============================================================================
// EXPECTATIONS
// ============================================================================

/// Which elements of a matched set an expectation inspects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    First,
    Every,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    Visible,
    Hidden,
    AttributeEquals {
        attribute: String,
        value: String,
        #[serde(default)]
        scope: Scope,
    },
    AttributeContains {
        attribute: String,
        value: String,
        #[serde(default)]
        scope: Scope,
    },
    AttributeOneOf {
        attribute: String,
        values: Vec<String>,
        #[serde(default)]
        scope: Scope,
    },
    AttributeAbsent {
        attribute: String,
        #[serde(default)]
        scope: Scope,
    },
    CountEquals {
        count: usize,
    },
    CountAtLeast {
        min: usize,
    },
    /// Inner markup contains `needle` verbatim.
    MarkupContains {
        needle: String,
        #[serde(default)]
        scope: Scope,
    },
    TextContains {
        needle: String,
        #[serde(default)]
        scope: Scope,
    },
}

impl Expectation {
    pub fn attribute_equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Expectation::AttributeEquals {
            attribute: attribute.into(),
            value: value.into(),
            scope: Scope::First,
        }
    }

    pub fn attribute_one_of(attribute: impl Into<String>, values: &[&str]) -> Self {
        Expectation::AttributeOneOf {
            attribute: attribute.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
            scope: Scope::First,
        }
    }

    pub fn markup_contains(needle: impl Into<String>, scope: Scope) -> Self {
        Expectation::MarkupContains {
            needle: needle.into(),
            scope,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let every = |scope: &Scope| if *scope == Scope::Every { "every " } else { "" };
        match self {
            Expectation::Visible => write!(f, "visible"),
            Expectation::Hidden => write!(f, "hidden"),
            Expectation::AttributeEquals {
                attribute,
                value,
                scope,
            } => write!(f, "{}{}=\"{}\"", every(scope), attribute, value),
            Expectation::AttributeContains {
                attribute,
                value,
                scope,
            } => write!(f, "{}{}*=\"{}\"", every(scope), attribute, value),
            Expectation::AttributeOneOf {
                attribute,
                values,
                scope,
            } => write!(f, "{}{} in {:?}", every(scope), attribute, values),
            Expectation::AttributeAbsent { attribute, scope } => {
                write!(f, "{}no {}", every(scope), attribute)
            }
            Expectation::CountEquals { count } => write!(f, "count == {}", count),
            Expectation::CountAtLeast { min } => write!(f, "count >= {}", min),
            Expectation::MarkupContains { needle, scope } => {
                write!(f, "{}markup contains {}", every(scope), needle)
            }
            Expectation::TextContains { needle, scope } => {
                write!(f, "{}text contains \"{}\"", every(scope), needle)
            }
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed { code: String, reason: String },
    Error { code: String, cause: String },
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASS",
            Outcome::Failed { .. } => "FAIL",
            Outcome::Error { .. } => "ERROR",
        }
    }
}

/// Record of one executed step. Never modified after it is appended.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub action: String,
    pub summary: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Observed values or captured markup that explain the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn new(step: &Step, outcome: Outcome) -> Self {
        Self {
            step_id: step.id.clone(),
            action: step.action.name().to_string(),
            summary: step.action.summary(),
            outcome,
            diagnostic: None,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn passed(step: &Step) -> Self {
        Self::new(step, Outcome::Passed)
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::NotStarted, RunState::Running)
                | (RunState::NotStarted, RunState::Aborted)
                | (RunState::Running, RunState::Running)
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::NotStarted => "not_started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Run state at the moment a screenshot was taken. Also names the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOutcome {
    Success,
    Failure,
    Error,
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactOutcome::Success => "success",
            ArtifactOutcome::Failure => "failure",
            ArtifactOutcome::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
    pub captured_at: DateTime<Utc>,
}

/// Error that prevented the scenario from dispatching any step.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FatalError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario_id: String,
    pub description: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub declared_steps: usize,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalError>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl RunReport {
    pub fn builder(scenario: &Scenario) -> ReportBuilder {
        ReportBuilder {
            report: RunReport {
                run_id: Uuid::new_v4(),
                scenario_id: scenario.id.clone(),
                description: scenario.description.clone(),
                state: RunState::NotStarted,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                declared_steps: scenario.steps.len(),
                steps: Vec::new(),
                fatal: None,
                artifacts: Vec::new(),
            },
        }
    }

    /// Passed iff the run completed and no step failed or errored.
    pub fn passed(&self) -> bool {
        self.state == RunState::Completed
            && self.fatal.is_none()
            && self.steps.iter().all(|s| s.outcome.is_passed())
    }

    pub fn not_executed(&self) -> usize {
        self.declared_steps.saturating_sub(self.steps.len())
    }

    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.steps.iter().filter(|s| predicate(&s.outcome)).count()
    }
}

/// Append-only view of a report while its scenario is executing.
///
/// `finish` consumes the builder, so a finished report can no longer change.
#[derive(Debug)]
pub struct ReportBuilder {
    report: RunReport,
}

impl ReportBuilder {
    pub fn push(&mut self, result: StepResult) {
        self.report.steps.push(result);
    }

    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.report.artifacts.push(artifact);
    }

    pub fn set_state(&mut self, state: RunState) {
        self.report.state = state;
    }

    pub fn set_fatal(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.report.fatal = Some(FatalError {
            code: code.into(),
            message: message.into(),
        });
    }

    pub fn state(&self) -> RunState {
        self.report.state
    }

    pub fn results(&self) -> &[StepResult] {
        &self.report.steps
    }

    /// Label for the screenshot that reflects the run so far.
    pub fn artifact_outcome(&self) -> ArtifactOutcome {
        if self.report.state == RunState::Aborted || self.report.fatal.is_some() {
            ArtifactOutcome::Error
        } else if self.report.steps.iter().all(|s| s.outcome.is_passed()) {
            ArtifactOutcome::Success
        } else {
            ArtifactOutcome::Failure
        }
    }

    pub fn finish(mut self) -> RunReport {
        self.report.finished_at = Utc::now();
        self.report
    }
}
