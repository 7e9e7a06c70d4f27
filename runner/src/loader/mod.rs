//! # Scenario loading
//!
//! Reads scenario files from disk and resolves built-in scenario names.
//! Everything returns `anyhow::Result` with the path in the error context,
//! and the message starts with the error code so the CLI can print it as is.
//!
//! ## Scenario file format
//!
//! A scenario file is the JSON form of [`Scenario`]. Step fields sit next to
//! the `action` tag, and any string may use `${name}` placeholders. They
//! resolve from `config.variables` (plus `base_url`) when the step runs;
//! `${ENV_NAME}` reads the environment variable `NAME`:
//!
//! ```json
//! {
//!   "id": "title_smoke",
//!   "description": "Title screen offers a new game",
//!   "config": { "base_url": "http://localhost:5173/", "variables": { "start": "Start Game" } },
//!   "steps": [
//!     { "id": "open_app", "action": "navigate", "url": "${base_url}" },
//!     { "id": "start", "action": "interact", "mandatory": true,
//!       "locator": { "by": "css", "selector": "button", "has_text": "${start}" },
//!       "interaction": "click" }
//!   ]
//! }
//! ```
//!
//! ## Errors
//!
//! | Code  | When                                     |
//! |-------|------------------------------------------|
//! | E4003 | the file cannot be read                  |
//! | E1009 | the file is not a valid scenario         |
//! | E4005 | `--builtin` names no built-in scenario   |
//!
//! Loading does not validate. Callers run
//! [`validate_scenario`](crate::validation::validate_scenario) before
//! executing anything.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::errors::ErrorCode;
use crate::protocol::Scenario;
use crate::scenarios;

/// Loads one scenario from a JSON file.
pub fn load_scenario_from_file<P: AsRef<Path>>(path: P) -> Result<Scenario> {
    let path_ref = path.as_ref();

    let content = fs::read_to_string(path_ref).with_context(|| {
        format!(
            "[{}] Failed to read scenario file {:?}",
            ErrorCode::SCENARIO_FILE_NOT_FOUND,
            path_ref
        )
    })?;

    let scenario = serde_json::from_str(&content).with_context(|| {
        format!(
            "[{}] Failed to parse scenario JSON {:?}",
            ErrorCode::INVALID_SCENARIO_FORMAT,
            path_ref
        )
    })?;

    Ok(scenario)
}

pub fn load_builtin(name: &str) -> Result<Scenario> {
    scenarios::builtin(name).ok_or_else(|| {
        anyhow!(
            "[{}] Unknown built-in scenario '{}' (available: {})",
            ErrorCode::UNKNOWN_BUILTIN,
            name,
            scenarios::BUILTIN_NAMES.join(", ")
        )
    })
}

/// Applies command-line overrides on top of what the scenario declares.
///
/// `--var` values that parse as JSON keep their type (`--var retries=3`),
/// anything else is taken as a string.
pub fn apply_overrides(
    scenario: &mut Scenario,
    base_url: Option<&str>,
    vars: &[(String, String)],
) {
    if let Some(url) = base_url {
        scenario.config.base_url = url.to_string();
    }
    for (key, raw) in vars {
        let value = serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(raw.clone()));
        scenario.config.variables.insert(key.clone(), value);
    }
}

/// Parses a `key=value` pair as given to `--var`.
pub fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}
