//! # Assertions
//!
//! Evaluates an [`Expectation`] against a resolved [`ElementSet`].
//!
//! A failed expectation is data, not an error: [`evaluate`] always returns an
//! [`Evaluation`], and the caller decides what the failure means for the run.
//! Diagnostics echo what was actually observed (attribute values, matched
//! texts, offending markup) so a transcript explains itself.

use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::browser::{ElementSnapshot, Session};
use crate::errors::{CheckFailure, HarnessError};
use crate::locator::{self, ElementSet};
use crate::protocol::{Expectation, Locator, Scope};
use crate::retry::poll_until;

/// Markup quoted in a diagnostic is cut to this many characters.
pub const MARKUP_EXCERPT_CHARS: usize = 600;

/// Matched elements whose markup is quoted under a count mismatch.
const COUNT_MARKUP_ELEMENTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub failure: Option<CheckFailure>,
    pub diagnostic: Option<String>,
}

impl Evaluation {
    fn pass(diagnostic: Option<String>) -> Self {
        Self {
            failure: None,
            diagnostic,
        }
    }

    fn fail(failure: CheckFailure, diagnostic: Option<String>) -> Self {
        Self {
            failure: Some(failure),
            diagnostic,
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

pub fn excerpt(markup: &str, max_chars: usize) -> String {
    match markup.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &markup[..cut]),
        None => markup.to_string(),
    }
}

fn markup_of(element: &ElementSnapshot) -> Option<String> {
    Some(excerpt(&element.outer_html, MARKUP_EXCERPT_CHARS))
}

fn targets(set: &ElementSet, scope: Scope) -> Vec<(usize, &ElementSnapshot)> {
    match scope {
        Scope::First => set.first().map(|e| (0, e)).into_iter().collect(),
        Scope::Every => set.iter().enumerate().collect(),
    }
}

fn not_found(set: &ElementSet) -> Evaluation {
    Evaluation::fail(
        CheckFailure::ElementNotFound {
            locator: set.locator.clone(),
        },
        None,
    )
}

/// Evaluates `expectation` against the current contents of `set`.
pub fn evaluate(set: &ElementSet, expectation: &Expectation) -> Evaluation {
    match expectation {
        Expectation::Visible => {
            if set.is_empty() {
                return not_found(set);
            }
            if set.any_visible() {
                return Evaluation::pass(None);
            }
            Evaluation::fail(
                CheckFailure::VisibilityMismatch {
                    locator: set.locator.clone(),
                    expected: "visible".to_string(),
                    observed: "hidden".to_string(),
                },
                set.first().and_then(markup_of),
            )
        }

        Expectation::Hidden => match set.iter().find(|e| e.visible) {
            None => Evaluation::pass(None),
            Some(shown) => Evaluation::fail(
                CheckFailure::VisibilityMismatch {
                    locator: set.locator.clone(),
                    expected: "hidden".to_string(),
                    observed: "visible".to_string(),
                },
                markup_of(shown),
            ),
        },

        Expectation::AttributeEquals {
            attribute,
            value,
            scope,
        } => check_attribute(set, attribute, *scope, format!("{:?}", value), |observed| {
            observed == Some(value.as_str())
        }),

        Expectation::AttributeContains {
            attribute,
            value,
            scope,
        } => check_attribute(
            set,
            attribute,
            *scope,
            format!("containing {:?}", value),
            |observed| observed.is_some_and(|v| v.contains(value.as_str())),
        ),

        Expectation::AttributeOneOf {
            attribute,
            values,
            scope,
        } => check_attribute(set, attribute, *scope, format!("one of {:?}", values), |observed| {
            observed.is_some_and(|v| values.iter().any(|allowed| allowed == v))
        }),

        Expectation::AttributeAbsent { attribute, scope } => {
            check_attribute(set, attribute, *scope, "<absent>".to_string(), |observed| {
                observed.is_none()
            })
        }

        Expectation::CountEquals { count } => {
            check_count(set, set.len() == *count, count.to_string())
        }

        Expectation::CountAtLeast { min } => {
            check_count(set, set.len() >= *min, format!("at least {}", min))
        }

        Expectation::MarkupContains { needle, scope } => {
            check_content(set, *scope, "markup", needle, |e| e.inner_html.contains(needle.as_str()))
        }

        Expectation::TextContains { needle, scope } => {
            check_content(set, *scope, "text", needle, |e| e.text.contains(needle.as_str()))
        }
    }
}

fn check_attribute(
    set: &ElementSet,
    attribute: &str,
    scope: Scope,
    expected: String,
    holds: impl Fn(Option<&str>) -> bool,
) -> Evaluation {
    let checked = targets(set, scope);
    if checked.is_empty() {
        return not_found(set);
    }

    for (index, element) in &checked {
        let observed = element.attribute(attribute);
        if !holds(observed) {
            return Evaluation::fail(
                CheckFailure::AttributeMismatch {
                    locator: set.locator.clone(),
                    index: *index,
                    attribute: attribute.to_string(),
                    expected,
                    observed: observed.map(str::to_string),
                },
                markup_of(element),
            );
        }
    }

    let observed: Vec<String> = checked
        .iter()
        .map(|(_, e)| match e.attribute(attribute) {
            Some(v) => format!("{}={:?}", attribute, v),
            None => format!("{} absent", attribute),
        })
        .collect();
    Evaluation::pass(Some(observed.join(", ")))
}

fn check_count(set: &ElementSet, holds: bool, expected: String) -> Evaluation {
    let texts: Vec<&str> = set.iter().map(|e| e.text.as_str()).collect();
    let summary = if texts.is_empty() {
        None
    } else {
        Some(format!("{} matched: {}", texts.len(), texts.join(" | ")))
    };

    if holds {
        return Evaluation::pass(summary);
    }

    // Empty sets get their markup from the page in `verify`.
    let diagnostic = summary.map(|line| {
        let mut lines = vec![line];
        lines.extend(set.iter().take(COUNT_MARKUP_ELEMENTS).filter_map(markup_of));
        if set.len() > COUNT_MARKUP_ELEMENTS {
            lines.push(format!("… {} more", set.len() - COUNT_MARKUP_ELEMENTS));
        }
        lines.join("\n")
    });

    Evaluation::fail(
        CheckFailure::CountMismatch {
            locator: set.locator.clone(),
            expected,
            observed: set.len(),
        },
        diagnostic,
    )
}

fn check_content(
    set: &ElementSet,
    scope: Scope,
    content: &'static str,
    needle: &str,
    holds: impl Fn(&ElementSnapshot) -> bool,
) -> Evaluation {
    let checked = targets(set, scope);
    if checked.is_empty() {
        return not_found(set);
    }

    match checked.iter().find(|(_, e)| !holds(*e)) {
        Some((index, element)) => Evaluation::fail(
            CheckFailure::ContentMismatch {
                locator: set.locator.clone(),
                index: *index,
                content,
                needle: needle.to_string(),
            },
            markup_of(element),
        ),
        None => Evaluation::pass(Some(format!(
            "{} of {} element(s) checked",
            checked.len(),
            set.len()
        ))),
    }
}

/// Resolves `locator` and evaluates `expectation`, re-trying until it holds or
/// `timeout` elapses. A zero timeout inspects the page exactly once.
///
/// Returns the last evaluation, passed or not.
pub async fn verify(
    session: &Session,
    locator: &Locator,
    expectation: &Expectation,
    timeout: Duration,
) -> Result<Evaluation, HarnessError> {
    let last: Mutex<Option<Evaluation>> = Mutex::new(None);
    let last_ref = &last;

    let passed = poll_until(session.poll_policy(), timeout, move || async move {
        let set = locator::find(session, locator).await?;
        let evaluation = evaluate(&set, expectation);
        if evaluation.passed() {
            return Ok::<_, HarnessError>(Some(evaluation));
        }
        *last_ref.lock().unwrap_or_else(|p| p.into_inner()) = Some(evaluation);
        Ok(None)
    })
    .await?;

    if let Some(evaluation) = passed {
        return Ok(evaluation);
    }
    let evaluation = last.into_inner().unwrap_or_else(|p| p.into_inner());
    let mut evaluation = evaluation.unwrap_or_else(|| {
        Evaluation::fail(
            CheckFailure::ElementNotFound {
                locator: locator.to_string(),
            },
            None,
        )
    });
    if evaluation.diagnostic.is_none() {
        evaluation.diagnostic = surrounding_markup(session, locator).await;
    }
    Ok(evaluation)
}

/// Markup around an expectation that matched nothing: the first parent
/// element for a scoped locator, otherwise the whole page.
async fn surrounding_markup(session: &Session, locator: &Locator) -> Option<String> {
    if let Locator::Within { parent, .. } = locator {
        match locator::find(session, parent).await {
            Ok(set) => {
                if let Some(first) = set.first() {
                    return Some(format!(
                        "inside {}: {}",
                        set.locator,
                        excerpt(&first.outer_html, MARKUP_EXCERPT_CHARS)
                    ));
                }
            }
            Err(e) => warn!(locator = %parent, error = %e, "could not resolve parent for diagnostic"),
        }
    }

    match session.content().await {
        Ok(content) => Some(format!(
            "page content: {}",
            excerpt(&content, MARKUP_EXCERPT_CHARS)
        )),
        Err(e) => {
            warn!(error = %e, "could not capture page content for diagnostic");
            None
        }
    }
}
