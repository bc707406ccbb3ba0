//! Execution status and pipeline state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Currently running.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with a failure.
    Failed,
    /// Never started because an earlier stage failed.
    Skipped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// The state of one pipeline run.
///
/// Runs move strictly forward through the stages in declaration order:
/// `Pending -> InStage(first) -> ... -> InStage(last) -> Succeeded`, or to
/// `Failed` from whichever stage failed. There is no retry edge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// The run has not started.
    #[default]
    Pending,
    /// The named stage is executing.
    InStage {
        /// The executing stage.
        stage: String,
    },
    /// Every stage succeeded.
    Succeeded,
    /// A stage failed; later stages never start.
    Failed {
        /// The failing stage.
        stage: String,
    },
}

impl PipelineState {
    /// Returns true if the run has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }

    /// Starts a pending run in `first_stage`.
    ///
    /// A pipeline without stages succeeds immediately. Any other state is
    /// returned unchanged.
    #[must_use]
    pub fn begin(&self, first_stage: Option<&str>) -> Self {
        match (self, first_stage) {
            (Self::Pending, Some(stage)) => Self::InStage {
                stage: stage.to_string(),
            },
            (Self::Pending, None) => Self::Succeeded,
            _ => self.clone(),
        }
    }

    /// Returns the state after `stage` finishes.
    ///
    /// `next_stage` is the stage following `stage` in declaration order.
    /// Terminal states absorb every transition.
    #[must_use]
    pub fn after_stage(&self, stage: &str, succeeded: bool, next_stage: Option<&str>) -> Self {
        match self {
            Self::InStage { stage: current } if current == stage => {
                if !succeeded {
                    Self::Failed {
                        stage: stage.to_string(),
                    }
                } else if let Some(next) = next_stage {
                    Self::InStage {
                        stage: next.to_string(),
                    }
                } else {
                    Self::Succeeded
                }
            }
            _ => self.clone(),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InStage { stage } => write!(f, "{stage}"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed { stage } => write!(f, "Failed ({stage})"),
        }
    }
}
