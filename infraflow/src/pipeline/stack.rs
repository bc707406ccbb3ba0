//! One-shot synthesis of the pipeline stack.
//!
//! [`synthesize`] is a pure function from a resolved configuration to an
//! immutable object graph. Nothing in the graph changes after it is built;
//! runs read it, teardown deletes it.

use super::{Action, BuildAction, Pipeline, PipelineBuilder, SourceAction};
use crate::build::BuildProject;
use crate::config::EnvironmentConfig;
use crate::core::Artifact;
use crate::errors::{InfraflowError, StorageError, TopologyValidationError};
use crate::iam::{ExecutionRole, DEFAULT_PARTITION};
use crate::secrets::{SecretRef, REPOSITORY_TOKEN_SECRET};
use crate::storage::{ArtifactBucket, ArtifactStore};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Logical id of the pipeline.
pub const PIPELINE_LOGICAL_ID: &str = "CIPipeline";
/// Name of the first stage.
pub const SOURCE_STAGE: &str = "Source";
/// Name of the second stage.
pub const DEPLOY_STAGE: &str = "Deploy";
/// Name of the source action.
pub const SOURCE_ACTION: &str = "InfrastructureSource";
/// Name of the deploy action.
pub const DEPLOY_ACTION: &str = "DeployCdkInfrastructure";
/// Name of the checkout artifact.
pub const SOURCE_OUTPUT: &str = "InfrastructureSourceOutput";

/// Pipeline name for an environment.
#[must_use]
pub fn pipeline_name(env_name: &str) -> String {
    format!("{env_name}-CI-Pipeline")
}

/// The complete synthesized stack.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStack {
    stack_id: String,
    description: String,
    config: EnvironmentConfig,
    role: Arc<ExecutionRole>,
    artifact_bucket: ArtifactBucket,
    build_project: Arc<BuildProject>,
    pipeline: Pipeline,
}

/// Synthesizes the stack in the default partition.
///
/// # Errors
///
/// Returns an error if the derived topology is invalid.
pub fn synthesize(config: &EnvironmentConfig) -> Result<PipelineStack, TopologyValidationError> {
    synthesize_in_partition(config, DEFAULT_PARTITION)
}

/// Synthesizes the stack for a specific partition.
///
/// # Errors
///
/// Returns an error if the derived bucket name or topology is invalid.
pub fn synthesize_in_partition(
    config: &EnvironmentConfig,
    partition: &str,
) -> Result<PipelineStack, TopologyValidationError> {
    let role = Arc::new(ExecutionRole::provision(partition));
    let artifact_bucket = ArtifactBucket::provision(&config.env_name)?;
    let source_output = Artifact::new(SOURCE_OUTPUT);
    let build_project = Arc::new(BuildProject::provision(config, Arc::clone(&role)));

    let source = Action::Source(SourceAction {
        name: SOURCE_ACTION.to_string(),
        owner: config.repository_owner.clone(),
        repo: config.infrastructure_repo_name.clone(),
        branch: config.infrastructure_branch_name.clone(),
        oauth_token: SecretRef::new(REPOSITORY_TOKEN_SECRET),
        output: source_output.clone(),
        role: Arc::clone(&role),
    });
    let deploy = Action::Build(BuildAction {
        name: DEPLOY_ACTION.to_string(),
        project: Arc::clone(&build_project),
        input: source_output,
        outputs: Vec::new(),
        role: Arc::clone(&role),
    });

    let pipeline = PipelineBuilder::new(
        PIPELINE_LOGICAL_ID,
        pipeline_name(&config.env_name),
        Arc::clone(&role),
        artifact_bucket.clone(),
    )
    .stage(SOURCE_STAGE, vec![source])
    .stage(DEPLOY_STAGE, vec![deploy])
    .build()?;

    tracing::info!(
        stack = %config.stack_id(),
        pipeline = pipeline.name(),
        bucket = %artifact_bucket.bucket_name,
        "Synthesized pipeline stack"
    );

    Ok(PipelineStack {
        stack_id: config.stack_id(),
        description: config.description.clone(),
        config: config.clone(),
        role,
        artifact_bucket,
        build_project,
        pipeline,
    })
}

impl PipelineStack {
    /// Returns the stack id.
    #[must_use]
    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    /// Returns the stack description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the configuration the stack was synthesized from.
    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Returns the shared execution role.
    #[must_use]
    pub fn role(&self) -> &Arc<ExecutionRole> {
        &self.role
    }

    /// Returns the artifact bucket.
    #[must_use]
    pub fn artifact_bucket(&self) -> &ArtifactBucket {
        &self.artifact_bucket
    }

    /// Returns the build project.
    #[must_use]
    pub fn build_project(&self) -> &Arc<BuildProject> {
        &self.build_project
    }

    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Renders the declarative resource template.
    #[must_use]
    pub fn to_template(&self) -> Value {
        let mut resources = Map::new();

        let policies: Vec<Value> = self
            .role
            .inline_policies()
            .iter()
            .map(|(name, doc)| json!({"PolicyName": name, "PolicyDocument": doc.to_json()}))
            .collect();
        resources.insert(
            self.role.logical_id().to_string(),
            json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "AssumeRolePolicyDocument": self.role.assume_role_policy_document(),
                    "Policies": policies,
                },
            }),
        );

        let deletion = if self.artifact_bucket.purges_on_teardown() {
            "Delete"
        } else {
            "Retain"
        };
        let mut tags = Vec::new();
        if self.artifact_bucket.auto_delete_objects {
            tags.push(json!({"Key": "aws-cdk:auto-delete-objects", "Value": "true"}));
        }
        resources.insert(
            self.artifact_bucket.logical_id.clone(),
            json!({
                "Type": "AWS::S3::Bucket",
                "Properties": {
                    "BucketName": self.artifact_bucket.bucket_name,
                    "Tags": tags,
                },
                "UpdateReplacePolicy": deletion,
                "DeletionPolicy": deletion,
            }),
        );

        resources.insert(self.build_project.logical_id.clone(), self.build_project.to_resource());
        resources.insert(self.pipeline.logical_id().to_string(), self.pipeline.to_resource());

        json!({
            "Description": self.description,
            "Resources": resources,
        })
    }

    /// Lists the teardown steps in execution order.
    ///
    /// Objects are purged first so the bucket can be deleted without a
    /// manual emptying step; dependents go before the role they use.
    #[must_use]
    pub fn teardown_plan(&self) -> Vec<TeardownStep> {
        let mut steps = Vec::new();
        if self.artifact_bucket.purges_on_teardown() {
            steps.push(TeardownStep::PurgeObjects {
                bucket: self.artifact_bucket.bucket_name.clone(),
            });
        }
        steps.push(TeardownStep::delete(self.pipeline.logical_id(), "AWS::CodePipeline::Pipeline"));
        steps.push(TeardownStep::delete(&self.build_project.logical_id, "AWS::CodeBuild::Project"));
        if self.artifact_bucket.purges_on_teardown() {
            steps.push(TeardownStep::delete(&self.artifact_bucket.logical_id, "AWS::S3::Bucket"));
        } else {
            steps.push(TeardownStep::Retain {
                logical_id: self.artifact_bucket.logical_id.clone(),
            });
        }
        steps.push(TeardownStep::delete(self.role.logical_id(), "AWS::IAM::Role"));
        steps
    }

    /// Tears the stack down against an artifact store.
    ///
    /// A bucket that was never created counts as already empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails for any other reason.
    pub async fn teardown(&self, store: &dyn ArtifactStore) -> Result<TeardownReport, InfraflowError> {
        let steps = self.teardown_plan();
        let mut objects_deleted = 0;

        for step in &steps {
            match step {
                TeardownStep::PurgeObjects { bucket } => match store.purge(bucket).await {
                    Ok(count) => objects_deleted = count,
                    Err(StorageError::BucketNotFound { .. }) => {}
                    Err(err) => return Err(err.into()),
                },
                TeardownStep::Delete { logical_id, .. } => {
                    tracing::info!(stack = %self.stack_id, resource = %logical_id, "Deleting resource");
                }
                TeardownStep::Retain { logical_id } => {
                    tracing::warn!(stack = %self.stack_id, resource = %logical_id, "Retaining resource");
                }
            }
        }

        tracing::info!(stack = %self.stack_id, objects_deleted, "Stack torn down");
        Ok(TeardownReport {
            stack_id: self.stack_id.clone(),
            objects_deleted,
            steps,
        })
    }
}

/// One step of stack teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TeardownStep {
    /// Delete every object in a bucket.
    PurgeObjects {
        /// The bucket.
        bucket: String,
    },
    /// Delete a resource.
    Delete {
        /// Logical id of the resource.
        logical_id: String,
        /// Resource type.
        resource_type: String,
    },
    /// Leave a resource in place.
    Retain {
        /// Logical id of the resource.
        logical_id: String,
    },
}

impl TeardownStep {
    fn delete(logical_id: &str, resource_type: &str) -> Self {
        Self::Delete {
            logical_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
        }
    }
}

/// What a teardown did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// The stack id.
    pub stack_id: String,
    /// Number of artifact objects purged.
    pub objects_deleted: usize,
    /// The executed steps.
    pub steps: Vec<TeardownStep>,
}
