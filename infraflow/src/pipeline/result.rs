//! Records of a finished pipeline run.

use crate::core::{ActionRef, ExecutionStatus, PipelineState, StoredArtifact};
use crate::errors::InfraflowError;
use serde::Serialize;
use serde_json::Value;

/// Category of an action failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The repository could not be fetched.
    SourceFetch,
    /// A build command exited non-zero.
    BuildFailure,
    /// A role assumption was denied.
    PermissionDenied,
    /// An artifact was missing or corrupt.
    Storage,
    /// Anything else.
    Internal,
}

impl From<&InfraflowError> for FailureKind {
    fn from(err: &InfraflowError) -> Self {
        match err {
            InfraflowError::SourceFetch(_) => Self::SourceFetch,
            InfraflowError::BuildFailure(_) => Self::BuildFailure,
            InfraflowError::PermissionDenied(_) => Self::PermissionDenied,
            InfraflowError::Storage(_) => Self::Storage,
            InfraflowError::Configuration(_)
            | InfraflowError::Validation(_)
            | InfraflowError::Serialization(_)
            | InfraflowError::Io(_) => Self::Internal,
        }
    }
}

/// A failure attributed to exactly one stage and action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    /// The failing action.
    #[serde(flatten)]
    pub action: ActionRef,
    /// Failure category.
    pub kind: FailureKind,
    /// Stable error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Logs the action captured before failing.
    pub logs: Vec<String>,
}

impl ActionFailure {
    /// Wraps an error raised while running `action`.
    #[must_use]
    pub fn from_error(action: ActionRef, err: &InfraflowError, logs: Vec<String>) -> Self {
        Self {
            action,
            kind: FailureKind::from(err),
            code: err.code(),
            message: err.to_string(),
            logs,
        }
    }
}

/// The record of one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    /// The action.
    #[serde(flatten)]
    pub action: ActionRef,
    /// Final status.
    pub status: ExecutionStatus,
    /// Wall-clock duration.
    pub duration_ms: f64,
    /// Artifacts the action wrote.
    pub produced: Vec<StoredArtifact>,
    /// Artifacts the action read.
    pub consumed: Vec<StoredArtifact>,
    /// Captured log lines.
    pub logs: Vec<String>,
    /// The failure, if the action failed.
    pub failure: Option<ActionFailure>,
}

impl ActionRecord {
    /// Record for an action that never started.
    #[must_use]
    pub fn skipped(action: ActionRef) -> Self {
        Self {
            action,
            status: ExecutionStatus::Skipped,
            duration_ms: 0.0,
            produced: Vec::new(),
            consumed: Vec::new(),
            logs: Vec::new(),
            failure: None,
        }
    }
}

/// The record of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Final status.
    pub status: ExecutionStatus,
    /// Wall-clock duration.
    pub duration_ms: f64,
    /// Per-action records in declaration order.
    pub actions: Vec<ActionRecord>,
}

/// The outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRunResult {
    /// Unique run id.
    pub run_id: String,
    /// The pipeline that ran.
    pub pipeline_name: String,
    /// Terminal state.
    pub state: PipelineState,
    /// Per-stage records in declaration order, skipped stages included.
    pub stages: Vec<StageRecord>,
    /// Every action failure, in declaration order.
    pub failures: Vec<ActionFailure>,
    /// When the run started (ISO 8601).
    pub started_at: String,
    /// Wall-clock duration.
    pub duration_ms: f64,
}

impl PipelineRunResult {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Returns the first failure of the failing stage.
    #[must_use]
    pub fn failure(&self) -> Option<&ActionFailure> {
        self.failures.first()
    }

    /// Finds a stage record by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Finds an action record.
    #[must_use]
    pub fn action(&self, stage: &str, action: &str) -> Option<&ActionRecord> {
        self.stage(stage)
            .and_then(|s| s.actions.iter().find(|a| a.action.action == action))
    }

    /// Iterates over every artifact written during the run.
    pub fn artifacts_produced(&self) -> impl Iterator<Item = &StoredArtifact> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .flat_map(|a| a.produced.iter())
    }

    /// Iterates over every artifact read during the run.
    pub fn artifacts_consumed(&self) -> impl Iterator<Item = &StoredArtifact> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .flat_map(|a| a.consumed.iter())
    }

    /// Renders the result as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BuildFailure, BuildPhaseName, StorageError};

    #[test]
    fn test_failure_kind_from_error() {
        let err = InfraflowError::from(BuildFailure {
            project: "InfrastructureBuildProject".into(),
            phase: BuildPhaseName::Build,
            command: "cdk deploy --context env=dev".into(),
            exit_code: 1,
        });
        let failure = ActionFailure::from_error(
            ActionRef::new("Deploy", "DeployCdkInfrastructure"),
            &err,
            vec!["deploying".into()],
        );

        assert_eq!(failure.kind, FailureKind::BuildFailure);
        assert_eq!(failure.code, "BUILD-001-EXIT");
        assert!(failure.message.contains("exited with code 1"));
        assert_eq!(failure.logs, vec!["deploying"]);

        let storage = InfraflowError::from(StorageError::BucketNotFound { bucket: "b".into() });
        assert_eq!(FailureKind::from(&storage), FailureKind::Storage);
    }

    #[test]
    fn test_failure_serializes_flat() {
        let err = InfraflowError::from(StorageError::BucketNotFound { bucket: "b".into() });
        let failure = ActionFailure::from_error(ActionRef::new("Deploy", "Run"), &err, vec![]);
        let value = serde_json::to_value(&failure).unwrap();

        assert_eq!(value["stage"], "Deploy");
        assert_eq!(value["action"], "Run");
        assert_eq!(value["kind"], "storage");
    }
}
