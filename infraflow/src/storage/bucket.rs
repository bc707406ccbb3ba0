//! The artifact bucket definition.

use crate::errors::TopologyValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Logical id of the artifact bucket.
pub const ARTIFACT_BUCKET_LOGICAL_ID: &str = "ArtifactBucket";
/// Fixed owner tag prefixed to every bucket name.
pub const BUCKET_OWNER_TAG: &str = "kuriaks1";

/// What happens to a resource when its stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Delete the resource.
    Destroy,
    /// Leave the resource behind.
    Retain,
}

/// Deterministic bucket name for an environment.
#[must_use]
pub fn artifact_bucket_name(env_name: &str) -> String {
    format!("{BUCKET_OWNER_TAG}-{env_name}-codepipeline-artifact-bucket")
}

/// The durable bucket a pipeline stores its artifacts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBucket {
    /// Logical id within the stack.
    pub logical_id: String,
    /// Globally unique bucket name.
    pub bucket_name: String,
    /// Removal policy applied on stack deletion.
    pub removal_policy: RemovalPolicy,
    /// Whether objects are purged before the bucket is deleted.
    pub auto_delete_objects: bool,
}

impl ArtifactBucket {
    /// Provisions the artifact bucket for an environment.
    ///
    /// The bucket and every object in it are destroyed with the pipeline:
    /// this is a CI cache, not primary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived name is not a valid bucket name.
    pub fn provision(env_name: &str) -> Result<Self, TopologyValidationError> {
        let bucket_name = artifact_bucket_name(env_name);
        validate_bucket_name(&bucket_name)?;

        Ok(Self {
            logical_id: ARTIFACT_BUCKET_LOGICAL_ID.to_string(),
            bucket_name,
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: true,
        })
    }

    /// Returns true if deleting the stack also deletes the stored objects.
    #[must_use]
    pub fn purges_on_teardown(&self) -> bool {
        self.removal_policy == RemovalPolicy::Destroy && self.auto_delete_objects
    }
}

fn validate_bucket_name(name: &str) -> Result<(), TopologyValidationError> {
    let valid = Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").is_ok_and(|re| re.is_match(name));
    if valid && !name.contains("--") {
        Ok(())
    } else {
        Err(TopologyValidationError::new(format!(
            "'{name}' is not a valid bucket name"
        )))
    }
}
