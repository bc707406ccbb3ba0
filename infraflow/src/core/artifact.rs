//! Artifacts passed between pipeline actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named artifact slot declared in the pipeline topology.
///
/// Declaring an artifact does not store anything: it names the output of one
/// action so later actions can consume it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact {
    name: String,
}

impl Artifact {
    /// Declares a new artifact.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Identifies one action within one stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRef {
    /// The stage name.
    pub stage: String,
    /// The action name.
    pub action: String,
}

impl ActionRef {
    /// Creates a new action reference.
    #[must_use]
    pub fn new(stage: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.action)
    }
}

/// A handle to an artifact that has been written to the artifact store.
///
/// Holds only the location and integrity data, never the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// The declared artifact this handle materializes.
    pub artifact: Artifact,
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
    /// Lowercase hex SHA-256 of the object content.
    pub digest: String,
    /// Object size in bytes.
    pub size_bytes: u64,
    /// The action that produced the artifact.
    pub produced_by: ActionRef,
    /// When the object was written (ISO 8601).
    pub created_at: String,
}

impl StoredArtifact {
    /// Returns the object location as an `s3://` URI.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
