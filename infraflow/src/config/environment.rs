//! Deployment environments.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named deployment target.
///
/// The set is closed: any selector outside it is a fatal configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnvironment {
    /// Development environment.
    Dev,
    /// Production environment.
    Prod,
}

impl DeployEnvironment {
    /// Every known environment, in declaration order.
    pub const ALL: [Self; 2] = [Self::Dev, Self::Prod];

    /// Returns the selector string for this environment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    /// Parses an optional selector, treating `None` and `""` as missing.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the selector is absent or unknown.
    pub fn from_selector(selector: Option<&str>) -> Result<Self, ConfigurationError> {
        match selector {
            Some(value) if !value.is_empty() => value.parse(),
            _ => Err(ConfigurationError::invalid_environment(None)),
        }
    }
}

impl fmt::Display for DeployEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnvironment {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| ConfigurationError::invalid_environment(Some(s)))
    }
}
