//! Pipeline builder with topology validation.

use super::{Action, Stage};
use crate::errors::{ErrorInfo, TopologyValidationError};
use crate::iam::ExecutionRole;
use crate::storage::ArtifactBucket;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A validated, immutable pipeline topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    logical_id: String,
    name: String,
    role: Arc<ExecutionRole>,
    artifact_store: ArtifactBucket,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Returns the logical id.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pipeline role.
    #[must_use]
    pub fn role(&self) -> &Arc<ExecutionRole> {
        &self.role
    }

    /// Returns the single artifact store.
    #[must_use]
    pub fn artifact_store(&self) -> &ArtifactBucket {
        &self.artifact_store
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Finds a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns true if the pipeline and every action run under the same role
    /// instance.
    #[must_use]
    pub fn shares_one_role(&self) -> bool {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .all(|a| Arc::ptr_eq(a.role(), &self.role))
    }

    /// Renders the pipeline as a template resource.
    #[must_use]
    pub fn to_resource(&self) -> Value {
        json!({
            "Type": "AWS::CodePipeline::Pipeline",
            "Properties": {
                "Name": self.name,
                "RoleArn": {"Fn::GetAtt": [self.role.logical_id(), "Arn"]},
                "ArtifactStore": {
                    "Type": "S3",
                    "Location": {"Ref": self.artifact_store.logical_id},
                },
                "Stages": self.stages.iter().map(Stage::to_json).collect::<Vec<_>>(),
            },
            "DependsOn": [self.role.logical_id()],
        })
    }
}

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    logical_id: String,
    name: String,
    role: Arc<ExecutionRole>,
    artifact_store: ArtifactBucket,
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(
        logical_id: impl Into<String>,
        name: impl Into<String>,
        role: Arc<ExecutionRole>,
        artifact_store: ArtifactBucket,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            name: name.into(),
            role,
            artifact_store,
            stages: Vec::new(),
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>, actions: Vec<Action>) -> Self {
        self.stages.push(Stage::new(name, actions));
        self
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the topology and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline or a stage is empty, a stage or action
    /// name repeats, an artifact is produced twice or consumed before an
    /// earlier stage produced it, or source actions appear outside the first
    /// stage.
    pub fn build(self) -> Result<Pipeline, TopologyValidationError> {
        if self.name.trim().is_empty() {
            return Err(TopologyValidationError::new("Pipeline name cannot be empty"));
        }
        if self.stages.is_empty() {
            return Err(TopologyValidationError::new("Pipeline has no stages").with_error_info(
                ErrorInfo::new("TOPOLOGY-001-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            ));
        }

        let mut stage_names = HashSet::new();
        let mut action_names = HashSet::new();
        // artifact name -> producing stage
        let mut produced: HashMap<&str, &str> = HashMap::new();

        for (index, stage) in self.stages.iter().enumerate() {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(duplicate("stage", &stage.name, "TOPOLOGY-002-DUPLICATE_STAGE")
                    .with_stages(vec![stage.name.clone()]));
            }
            if stage.actions.is_empty() {
                return Err(TopologyValidationError::new(format!(
                    "Stage '{}' has no actions",
                    stage.name
                ))
                .with_stages(vec![stage.name.clone()])
                .with_error_info(ErrorInfo::new("TOPOLOGY-007-EMPTY_STAGE", "Stage has no actions")));
            }

            let mut stage_outputs = Vec::new();
            for action in &stage.actions {
                if !action_names.insert(action.name()) {
                    return Err(duplicate("action", action.name(), "TOPOLOGY-003-DUPLICATE_ACTION")
                        .with_stages(vec![stage.name.clone()]));
                }
                check_source_placement(index, stage, action)?;

                for input in action.inputs() {
                    if !produced.contains_key(input.name()) {
                        return Err(TopologyValidationError::new(format!(
                            "Action '{}' in stage '{}' consumes '{}', which no earlier stage produces",
                            action.name(),
                            stage.name,
                            input
                        ))
                        .with_stages(vec![stage.name.clone()])
                        .with_error_info(
                            ErrorInfo::new("TOPOLOGY-004-UNPRODUCED", format!("Artifact '{input}' is never produced upstream"))
                                .with_fix_hint("Produce the artifact in a stage that runs before its consumer."),
                        ));
                    }
                }
                stage_outputs.extend(action.outputs());
            }

            // Outputs become visible to later stages only.
            for output in stage_outputs {
                if let Some(previous) = produced.insert(output.name(), stage.name.as_str()) {
                    return Err(duplicate("artifact", output.name(), "TOPOLOGY-005-DUPLICATE_ARTIFACT")
                        .with_stages(vec![previous.to_string(), stage.name.clone()]));
                }
            }
        }

        Ok(Pipeline {
            logical_id: self.logical_id,
            name: self.name,
            role: self.role,
            artifact_store: self.artifact_store,
            stages: self.stages,
        })
    }
}

fn duplicate(what: &str, name: &str, code: &'static str) -> TopologyValidationError {
    TopologyValidationError::new(format!("Duplicate {what} name '{name}'"))
        .with_error_info(ErrorInfo::new(code, format!("{what} names must be unique")))
}

fn check_source_placement(
    index: usize,
    stage: &Stage,
    action: &Action,
) -> Result<(), TopologyValidationError> {
    let misplaced = if index == 0 {
        !action.is_source()
    } else {
        action.is_source()
    };
    if misplaced {
        return Err(TopologyValidationError::new(format!(
            "Action '{}' is misplaced: the first stage must contain only source actions and later stages none",
            action.name()
        ))
        .with_stages(vec![stage.name.clone()])
        .with_error_info(ErrorInfo::new(
            "TOPOLOGY-006-SOURCE_PLACEMENT",
            "Source actions belong in the first stage only",
        )));
    }
    Ok(())
}
