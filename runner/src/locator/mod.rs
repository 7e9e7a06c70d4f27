//! # Element location
//!
//! Turns a [`Locator`] into the set of elements it matches right now, and
//! waits for a set to reach a [`WaitState`].
//!
//! "Visible" means at least one match is rendered visibly. Hidden matches
//! never satisfy a visibility wait, and an empty set is hidden.

use std::time::Duration;
use tracing::{debug, instrument};

use crate::browser::{ElementSnapshot, Session};
use crate::errors::HarnessError;
use crate::protocol::{Locator, WaitState};
use crate::retry::poll_until;

/// Elements matched by one locator, in document order.
#[derive(Debug, Clone)]
pub struct ElementSet {
    pub locator: String,
    pub elements: Vec<ElementSnapshot>,
}

impl ElementSet {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn first(&self) -> Option<&ElementSnapshot> {
        self.elements.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementSnapshot> {
        self.elements.iter()
    }

    pub fn first_visible_index(&self) -> Option<usize> {
        self.elements.iter().position(|e| e.visible)
    }

    pub fn any_visible(&self) -> bool {
        self.elements.iter().any(|e| e.visible)
    }

    /// Whether the set is currently in `state`.
    pub fn satisfies(&self, state: WaitState) -> bool {
        match state {
            WaitState::Visible => self.any_visible(),
            WaitState::Hidden => !self.any_visible(),
            WaitState::Attached => !self.is_empty(),
            WaitState::Detached => self.is_empty(),
        }
    }
}

/// Resolves `locator` once against the live page.
pub async fn find(session: &Session, locator: &Locator) -> Result<ElementSet, HarnessError> {
    let elements = session.query(locator).await?;
    debug!(locator = %locator, matches = elements.len(), "locator resolved");
    Ok(ElementSet {
        locator: locator.to_string(),
        elements,
    })
}

/// Polls until the matched set is in `state`. Returns the set that satisfied
/// the wait, or `None` when the timeout elapsed first.
#[instrument(skip(session), fields(locator = %locator, timeout_ms = timeout.as_millis() as u64))]
pub async fn wait_for(
    session: &Session,
    locator: &Locator,
    state: WaitState,
    timeout: Duration,
) -> Result<Option<ElementSet>, HarnessError> {
    poll_until(session.poll_policy(), timeout, move || async move {
        let set = find(session, locator).await?;
        Ok::<_, HarnessError>(set.satisfies(state).then_some(set))
    })
    .await
}

pub async fn wait_visible(
    session: &Session,
    locator: &Locator,
    timeout: Duration,
) -> Result<Option<ElementSet>, HarnessError> {
    wait_for(session, locator, WaitState::Visible, timeout).await
}
