// Module: Context
// Scenario variables and `${name}` interpolation inside steps.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::errors::ErrorCode;
use crate::protocol::{ScenarioConfig, Step};

static INTERPOLATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.:-]+)\}").expect("valid interpolation regex")
});

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("missing environment variable '{0}'")]
    MissingEnv(String),

    #[error("missing scenario variable '{0}'")]
    MissingVariable(String),

    #[error("step could not be re-encoded after interpolation: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ContextError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ContextError::MissingEnv(_) => ErrorCode::ENV_VAR_NOT_FOUND,
            ContextError::MissingVariable(_) => ErrorCode::CONTEXT_VAR_NOT_FOUND,
            ContextError::Encoding(_) => ErrorCode::SERIALIZATION_ERROR,
        }
    }
}

/// Variables visible to a scenario while it runs.
#[derive(Debug, Default, Clone)]
pub struct Context {
    pub variables: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }

    /// Seeds the context from a scenario: its variables plus `base_url`.
    pub fn for_scenario(config: &ScenarioConfig) -> Self {
        let mut context = Self::new();
        context.extend(&config.variables);
        context.set("base_url", Value::String(config.base_url.clone()));
        context
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn extend(&mut self, entries: &HashMap<String, Value>) {
        for (k, v) in entries {
            self.variables.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Replaces `${token}` placeholders in a string.
    pub fn interpolate_str(&self, input: &str) -> Result<String, ContextError> {
        let mut result = String::with_capacity(input.len());
        let mut last_index = 0;

        for capture in INTERPOLATION_RE.captures_iter(input) {
            let (Some(matched), Some(token)) = (capture.get(0), capture.get(1)) else {
                continue;
            };
            result.push_str(&input[last_index..matched.start()]);
            result.push_str(&self.resolve_token(token.as_str())?);
            last_index = matched.end();
        }

        result.push_str(&input[last_index..]);
        Ok(result)
    }

    /// Recursively interpolates strings inside JSON values.
    pub fn interpolate_value(&self, value: &Value) -> Result<Value, ContextError> {
        match value {
            Value::String(s) => Ok(Value::String(self.interpolate_str(s)?)),
            Value::Array(items) => {
                let mut result = Vec::with_capacity(items.len());
                for item in items {
                    result.push(self.interpolate_value(item)?);
                }
                Ok(Value::Array(result))
            }
            Value::Object(map) => {
                let mut new_map = Map::with_capacity(map.len());
                for (k, v) in map {
                    new_map.insert(k.clone(), self.interpolate_value(v)?);
                }
                Ok(Value::Object(new_map))
            }
            _ => Ok(value.clone()),
        }
    }

    /// Returns a copy of `step` with every string field interpolated.
    pub fn interpolate_step(&self, step: &Step) -> Result<Step, ContextError> {
        let encoded = serde_json::to_value(step)?;
        let resolved = self.interpolate_value(&encoded)?;
        Ok(serde_json::from_value(resolved)?)
    }

    fn resolve_token(&self, token: &str) -> Result<String, ContextError> {
        if let Some(rest) = token.strip_prefix("ENV_") {
            std::env::var(rest).map_err(|_| ContextError::MissingEnv(rest.to_string()))
        } else if let Some(value) = self.variables.get(token) {
            match value {
                Value::String(s) => Ok(s.clone()),
                primitive => Ok(primitive.to_string()),
            }
        } else {
            Err(ContextError::MissingVariable(token.to_string()))
        }
    }
}
