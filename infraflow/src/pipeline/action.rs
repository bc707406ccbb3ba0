//! Pipeline actions.

use crate::build::BuildProject;
use crate::core::Artifact;
use crate::iam::ExecutionRole;
use crate::secrets::SecretRef;
use serde_json::{json, Value};
use std::sync::Arc;

/// Checks out a repository branch and emits it as an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAction {
    /// Action name, unique within the pipeline.
    pub name: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Watched branch.
    pub branch: String,
    /// Access token, by reference.
    pub oauth_token: SecretRef,
    /// The checkout artifact this action produces.
    pub output: Artifact,
    /// Identity the action runs under.
    pub role: Arc<ExecutionRole>,
}

impl SourceAction {
    /// `owner/repo@branch` of the watched source.
    #[must_use]
    pub fn watched(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.branch)
    }

    /// `owner/repo` of the watched source.
    #[must_use]
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Runs a build task against one input artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildAction {
    /// Action name, unique within the pipeline.
    pub name: String,
    /// The build task definition.
    pub project: Arc<BuildProject>,
    /// The artifact the build reads.
    pub input: Artifact,
    /// Artifacts the build writes, if any.
    pub outputs: Vec<Artifact>,
    /// Identity the action runs under.
    pub role: Arc<ExecutionRole>,
}

/// A unit of work within a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Produces one artifact from an external repository branch.
    Source(SourceAction),
    /// Consumes one artifact and runs a build task.
    Build(BuildAction),
}

impl Action {
    /// Returns the action name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Source(action) => &action.name,
            Self::Build(action) => &action.name,
        }
    }

    /// Returns the action category as rendered in the template.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Source(_) => "Source",
            Self::Build(_) => "Build",
        }
    }

    /// Returns the artifacts this action reads.
    #[must_use]
    pub fn inputs(&self) -> Vec<&Artifact> {
        match self {
            Self::Source(_) => Vec::new(),
            Self::Build(action) => vec![&action.input],
        }
    }

    /// Returns the artifacts this action writes.
    #[must_use]
    pub fn outputs(&self) -> Vec<&Artifact> {
        match self {
            Self::Source(action) => vec![&action.output],
            Self::Build(action) => action.outputs.iter().collect(),
        }
    }

    /// Returns the identity the action runs under.
    #[must_use]
    pub fn role(&self) -> &Arc<ExecutionRole> {
        match self {
            Self::Source(action) => &action.role,
            Self::Build(action) => &action.role,
        }
    }

    /// Returns true for source actions.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Renders the action declaration for the pipeline resource.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let artifacts = |list: Vec<&Artifact>| -> Vec<Value> {
            list.into_iter().map(|a| json!({"Name": a.name()})).collect()
        };

        let configuration = match self {
            Self::Source(action) => json!({
                "Owner": action.owner,
                "Repo": action.repo,
                "Branch": action.branch,
                "OAuthToken": action.oauth_token.dynamic_reference(),
                "PollForSourceChanges": false,
            }),
            Self::Build(action) => json!({
                "ProjectName": {"Ref": action.project.logical_id},
            }),
        };
        let provider = match self {
            Self::Source(_) => ("ThirdParty", "GitHub"),
            Self::Build(_) => ("AWS", "CodeBuild"),
        };

        json!({
            "Name": self.name(),
            "ActionTypeId": {
                "Category": self.category(),
                "Owner": provider.0,
                "Provider": provider.1,
                "Version": "1",
            },
            "Configuration": configuration,
            "InputArtifacts": artifacts(self.inputs()),
            "OutputArtifacts": artifacts(self.outputs()),
            "RoleArn": {"Fn::GetAtt": [self.role().logical_id(), "Arn"]},
            "RunOrder": 1,
        })
    }
}

/// A sequential phase of the pipeline.
///
/// Actions within a stage may run concurrently; a stage finishes completely
/// before the next one starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Stage name, unique within the pipeline.
    pub name: String,
    /// The actions.
    pub actions: Vec<Action>,
}

impl Stage {
    /// Creates a stage.
    #[must_use]
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }

    /// Finds an action by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name() == name)
    }

    /// Renders the stage declaration.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "Name": self.name,
            "Actions": self.actions.iter().map(Action::to_json).collect::<Vec<_>>(),
        })
    }
}
