//! Error types for the infraflow crate.
//!
//! Every failure carries a stable error code so operators can localize the
//! cause from logs or from the `to_dict()` rendering alone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for infraflow operations.
#[derive(Debug, Error)]
pub enum InfraflowError {
    /// The startup configuration could not be resolved.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The source stage could not fetch the repository.
    #[error("{0}")]
    SourceFetch(#[from] SourceFetchError),

    /// The build task exited with a non-zero status.
    #[error("{0}")]
    BuildFailure(#[from] BuildFailure),

    /// The execution role was not allowed to assume a target role.
    #[error("{0}")]
    PermissionDenied(#[from] PermissionDeniedError),

    /// The pipeline topology is malformed.
    #[error("{0}")]
    Validation(#[from] TopologyValidationError),

    /// The artifact store rejected an operation.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InfraflowError {
    /// Returns the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIG-001-ENV",
            Self::SourceFetch(_) => "SOURCE-001-FETCH",
            Self::BuildFailure(_) => "BUILD-001-EXIT",
            Self::PermissionDenied(_) => "IAM-001-DENIED",
            Self::Validation(err) => err.error_info.as_ref().map_or("TOPOLOGY-000", |i| i.code),
            Self::Storage(_) => "STORAGE-001",
            Self::Serialization(_) => "SERDE-001",
            Self::Io(_) => "IO-001",
        }
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "TOPOLOGY-002-UNPRODUCED").
    pub code: &'static str,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: &'static str, summary: impl Into<String>) -> Self {
        Self {
            code,
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        map
    }
}

/// Raised when the environment selector or a required parameter is missing
/// or invalid. Always fatal, always raised before any resource is defined.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The context key involved, when known.
    pub key: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
        }
    }

    /// Creates an error for a missing context key.
    #[must_use]
    pub fn missing_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Missing required context value '{key}'"),
            key: Some(key),
        }
    }

    /// Creates an error for the `env` selector.
    #[must_use]
    pub fn invalid_environment(selector: Option<&str>) -> Self {
        let message = match selector {
            Some(value) => format!(
                "Unknown environment '{value}'. Please supply the env context variable: --context env=dev/prod"
            ),
            None => "Please supply the env context variable: --context env=dev/prod".to_string(),
        };
        Self {
            message,
            key: Some("env".to_string()),
        }
    }
}

/// Raised when the source repository cannot be checked out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceFetchError {
    /// The hosting service could not be reached.
    #[error("Repository {repository} is unreachable: {reason}")]
    Unreachable {
        /// `owner/repo` of the repository.
        repository: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The watched branch does not exist.
    #[error("Branch '{branch}' not found in {repository}")]
    BranchNotFound {
        /// `owner/repo` of the repository.
        repository: String,
        /// The missing branch.
        branch: String,
    },

    /// The access token was rejected or could not be resolved.
    #[error("Access token '{secret}' rejected for {repository}")]
    InvalidToken {
        /// `owner/repo` of the repository.
        repository: String,
        /// Name of the secret holding the token.
        secret: String,
    },
}

/// The build task phase in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhaseName {
    /// Dependency installation.
    Install,
    /// Deployment command.
    Build,
}

impl std::fmt::Display for BuildPhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// Raised when a build task command exits non-zero.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Build task '{project}' failed in {phase} phase: `{command}` exited with code {exit_code}")]
pub struct BuildFailure {
    /// The build project name.
    pub project: String,
    /// The phase that failed.
    pub phase: BuildPhaseName,
    /// The command that failed.
    pub command: String,
    /// The exit code.
    pub exit_code: i32,
}

/// Raised when the execution role cannot assume a target role.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Role '{role}' is not allowed to perform {action} on '{resource}'")]
pub struct PermissionDeniedError {
    /// The identity that attempted the action.
    pub role: String,
    /// The IAM action (e.g., `sts:AssumeRole`).
    pub action: String,
    /// The resource ARN.
    pub resource: String,
}

/// Raised when a pipeline topology fails validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TopologyValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional error info.
    pub error_info: Option<ErrorInfo>,
}

impl TopologyValidationError {
    /// Creates a new topology validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("stages".to_string(), serde_json::json!(self.stages));
        if let Some(ref info) = self.error_info {
            let info_map: serde_json::Map<String, serde_json::Value> =
                info.to_dict().into_iter().collect();
            map.insert("error_info".to_string(), serde_json::Value::Object(info_map));
        }
        map
    }
}

/// Errors raised by an artifact store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The bucket does not exist or was already purged.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// The bucket name.
        bucket: String,
    },

    /// The store could not create or reach the bucket.
    #[error("Bucket unavailable: {bucket}: {reason}")]
    BucketUnavailable {
        /// The bucket name.
        bucket: String,
        /// Why the store gave up.
        reason: String,
    },

    /// No object is stored under the key.
    #[error("Object not found: s3://{bucket}/{key}")]
    ObjectNotFound {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
    },

    /// The stored object does not match the digest recorded at write time.
    #[error("Digest mismatch for s3://{bucket}/{key}: expected {expected}, found {actual}")]
    DigestMismatch {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
        /// Digest recorded in the artifact handle.
        expected: String,
        /// Digest of the stored bytes.
        actual: String,
    },

    /// An object already exists under the key; artifacts are written once.
    #[error("Object already exists: s3://{bucket}/{key}")]
    AlreadyExists {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
    },
}
