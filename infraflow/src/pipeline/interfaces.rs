//! External collaborators of a pipeline run.
//!
//! The runner never talks to a repository host or a build service directly.
//! It awaits these traits, so a run can be driven by real integrations or by
//! the scripted doubles in [`crate::testing`].

use super::SourceAction;
use crate::build::BuildProject;
use crate::core::{Artifact, StoredArtifact};
use crate::errors::{BuildPhaseName, InfraflowError, PermissionDeniedError, SourceFetchError, StorageError};
use crate::iam::ExecutionRole;
use crate::secrets::SecretValue;
use crate::storage::ArtifactStore;
use async_trait::async_trait;
use thiserror::Error;

/// A fetched revision of the watched branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCheckout {
    /// Revision identifier.
    pub commit_id: String,
    /// Opaque archive of the tree.
    pub content: Vec<u8>,
}

impl SourceCheckout {
    /// Creates a checkout.
    #[must_use]
    pub fn new(commit_id: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            commit_id: commit_id.into(),
            content: content.into(),
        }
    }
}

/// Fetches repository branches for source actions.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetches the head of the action's branch using the resolved token.
    async fn fetch(
        &self,
        action: &SourceAction,
        token: &SecretValue,
    ) -> Result<SourceCheckout, SourceFetchError>;
}

/// Everything a build runner gets for one build.
#[derive(Clone, Copy)]
pub struct BuildInvocation<'a> {
    /// The run this build belongs to.
    pub run_id: &'a str,
    /// The build definition.
    pub project: &'a BuildProject,
    /// The verified input artifact.
    pub input: &'a StoredArtifact,
    /// Store the input can be read from.
    pub store: &'a dyn ArtifactStore,
    /// Identity the build runs under.
    pub identity: &'a ExecutionRole,
}

impl std::fmt::Debug for BuildInvocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildInvocation")
            .field("run_id", &self.run_id)
            .field("project", &self.project.logical_id)
            .field("input", &self.input.uri())
            .field("identity", &self.identity.logical_id())
            .finish_non_exhaustive()
    }
}

/// How a build ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Every command exited zero.
    Succeeded,
    /// A command exited non-zero; later commands never ran.
    Failed {
        /// Phase of the failing command.
        phase: BuildPhaseName,
        /// The failing command.
        command: String,
        /// Its exit code.
        exit_code: i32,
    },
}

/// The result of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// How the build ended.
    pub status: BuildStatus,
    /// Captured build log lines.
    pub logs: Vec<String>,
    /// Output artifacts with their content.
    pub outputs: Vec<(Artifact, Vec<u8>)>,
}

impl BuildOutcome {
    /// A successful build with no outputs.
    #[must_use]
    pub fn succeeded(logs: Vec<String>) -> Self {
        Self {
            status: BuildStatus::Succeeded,
            logs,
            outputs: Vec::new(),
        }
    }

    /// A build whose command exited non-zero.
    #[must_use]
    pub fn failed(phase: BuildPhaseName, command: impl Into<String>, exit_code: i32, logs: Vec<String>) -> Self {
        Self {
            status: BuildStatus::Failed {
                phase,
                command: command.into(),
                exit_code,
            },
            logs,
            outputs: Vec::new(),
        }
    }

    /// Adds an output artifact.
    #[must_use]
    pub fn with_output(mut self, artifact: Artifact, content: impl Into<Vec<u8>>) -> Self {
        self.outputs.push((artifact, content.into()));
        self
    }
}

/// A build that ended outside its script.
///
/// Carries the log lines captured before the error so they reach the
/// failure record.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct BuildError {
    /// What went wrong.
    #[source]
    pub error: InfraflowError,
    /// Log lines captured before the error.
    pub logs: Vec<String>,
}

impl BuildError {
    /// Creates an error with no captured logs.
    #[must_use]
    pub fn new(error: impl Into<InfraflowError>) -> Self {
        Self {
            error: error.into(),
            logs: Vec::new(),
        }
    }

    /// Attaches the log lines captured so far.
    #[must_use]
    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

impl From<InfraflowError> for BuildError {
    fn from(error: InfraflowError) -> Self {
        Self::new(error)
    }
}

impl From<PermissionDeniedError> for BuildError {
    fn from(error: PermissionDeniedError) -> Self {
        Self::new(error)
    }
}

impl From<StorageError> for BuildError {
    fn from(error: StorageError) -> Self {
        Self::new(error)
    }
}

/// Executes build projects.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Runs the project's phases in order against the input artifact.
    ///
    /// A non-zero exit is reported through [`BuildStatus::Failed`]; errors
    /// are reserved for failures outside the script, such as a denied role
    /// assumption or an unreadable input, and carry the logs captured so far.
    async fn run(&self, invocation: BuildInvocation<'_>) -> Result<BuildOutcome, BuildError>;
}
