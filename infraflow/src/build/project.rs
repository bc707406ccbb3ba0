//! The infrastructure build project.

use super::{BuildPhase, BuildSpec};
use crate::config::EnvironmentConfig;
use crate::iam::ExecutionRole;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Logical id of the build project.
pub const BUILD_PROJECT_LOGICAL_ID: &str = "InfrastructureBuildProject";
/// Build image the task runs in.
pub const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:5.0";
/// Environment variable carrying the environment name.
pub const DEPLOY_ENVIRONMENT_VAR: &str = "DEPLOY_ENVIRONMENT";
/// Directory of the infrastructure project inside the checkout.
pub const INFRASTRUCTURE_DIR: &str = "infrastructure";

/// A sandboxed build definition run by the deploy action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildProject {
    /// Logical id within the stack.
    pub logical_id: String,
    /// Build image.
    pub image: String,
    /// Environment variables injected into every command.
    pub environment_variables: BTreeMap<String, String>,
    /// The phased script.
    pub buildspec: BuildSpec,
    /// Identity the build runs under.
    #[serde(skip)]
    pub role: Arc<ExecutionRole>,
}

impl BuildProject {
    /// Defines the infrastructure deployment build for an environment.
    ///
    /// Install pins Node.js 20, installs the CDK CLI, enters the nested
    /// infrastructure project and installs its dependencies; build deploys
    /// it with the environment name as context.
    #[must_use]
    pub fn provision(config: &EnvironmentConfig, role: Arc<ExecutionRole>) -> Self {
        let install = BuildPhase::new([
            "npm install -g aws-cdk".to_string(),
            format!("cd {INFRASTRUCTURE_DIR}"),
            "npm install".to_string(),
        ])
        .with_runtime("nodejs", "20.x");
        let build = BuildPhase::new([format!("cdk deploy --context env={}", config.env_name)]);

        let mut environment_variables = BTreeMap::new();
        environment_variables.insert(DEPLOY_ENVIRONMENT_VAR.to_string(), config.env_name.clone());

        Self {
            logical_id: BUILD_PROJECT_LOGICAL_ID.to_string(),
            image: BUILD_IMAGE.to_string(),
            environment_variables,
            buildspec: BuildSpec::new(install, build),
            role,
        }
    }

    /// Renders the project as a template resource.
    #[must_use]
    pub fn to_resource(&self) -> Value {
        let env_vars: Vec<Value> = self
            .environment_variables
            .iter()
            .map(|(name, value)| json!({"Name": name, "Type": "PLAINTEXT", "Value": value}))
            .collect();

        json!({
            "Type": "AWS::CodeBuild::Project",
            "Properties": {
                "Artifacts": {"Type": "CODEPIPELINE"},
                "Environment": {
                    "ComputeType": "BUILD_GENERAL1_SMALL",
                    "Image": self.image,
                    "Type": "LINUX_CONTAINER",
                    "EnvironmentVariables": env_vars,
                },
                "ServiceRole": {"Fn::GetAtt": [self.role.logical_id(), "Arn"]},
                "Source": {
                    "Type": "CODEPIPELINE",
                    "BuildSpec": self.buildspec.to_json().to_string(),
                },
            },
        })
    }
}
