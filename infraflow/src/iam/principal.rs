//! Service principals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A cloud service allowed to assume a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    /// Creates a principal for an arbitrary service.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    /// The build execution service.
    #[must_use]
    pub fn build_runner() -> Self {
        Self::new("codebuild.amazonaws.com")
    }

    /// The pipeline orchestration service.
    #[must_use]
    pub fn orchestrator() -> Self {
        Self::new("codepipeline.amazonaws.com")
    }

    /// Returns the service identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
