//! Application context: the raw key/value startup parameters.

use crate::errors::{ConfigurationError, InfraflowError};
use serde_json::{Map, Value};
use std::path::Path;

/// File the CLI reads context values from when none is given.
pub const DEFAULT_CONTEXT_FILE: &str = "cdk.json";

/// Key/value parameters supplied at startup.
///
/// Values come from a JSON document shaped like `cdk.json` and may be
/// overridden one key at a time with `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppContext {
    values: Map<String, Value>,
}

impl AppContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a context document.
    ///
    /// Accepts either a `cdk.json` style document (values under a top-level
    /// `"context"` object) or a bare object of values.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not JSON or is not an object.
    pub fn from_json_str(input: &str) -> Result<Self, InfraflowError> {
        let document: Value = serde_json::from_str(input)?;
        let Value::Object(mut root) = document else {
            return Err(ConfigurationError::new("Context document must be a JSON object").into());
        };

        let values = match root.remove("context") {
            Some(Value::Object(context)) => context,
            Some(_) => {
                return Err(ConfigurationError::new("'context' must be a JSON object").into());
            }
            None => root,
        };

        Ok(Self { values })
    }

    /// Reads and parses a context file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InfraflowError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Sets a value, replacing any existing one.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Sets a value, replacing any existing one.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Applies a `key=value` override.
    ///
    /// Values that parse as JSON are stored as JSON, anything else as a
    /// plain string, so `env=dev` and `dev={"infrastructureBranchName":"main"}`
    /// both work.
    ///
    /// # Errors
    ///
    /// Returns an error if the override has no `=` or an empty key.
    pub fn apply_override(&mut self, pair: &str) -> Result<(), ConfigurationError> {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            ConfigurationError::new(format!("Context override '{pair}' must be of the form key=value"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigurationError::new(format!(
                "Context override '{pair}' has an empty key"
            )));
        }

        let value = match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_) | Value::Bool(_) | Value::Number(_))) => {
                parsed
            }
            _ => Value::String(raw.to_string()),
        };
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn try_get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value stored under `key` if it is a string.
    #[must_use]
    pub fn try_get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Returns the number of top-level values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the context holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
