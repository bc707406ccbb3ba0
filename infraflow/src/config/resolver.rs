//! Environment configuration resolver.

use super::{AppContext, DeployEnvironment};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context key holding the environment selector.
pub const ENV_SELECTOR_KEY: &str = "env";
/// Context key holding the repository owner.
pub const REPOSITORY_OWNER_KEY: &str = "repositoryOwner";
/// Context key holding the infrastructure repository name.
pub const REPOSITORY_NAME_KEY: &str = "infrastructureRepoName";
/// Key inside an environment block holding the environment name.
pub const ENV_NAME_KEY: &str = "envName";
/// Key inside an environment block holding the watched branch.
pub const BRANCH_KEY: &str = "infrastructureBranchName";

/// The per-environment block of the context (e.g. the value under `"dev"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentBlock {
    /// Environment name; defaults to the selector when omitted.
    #[serde(default)]
    pub env_name: Option<String>,
    /// Branch the source stage watches.
    #[serde(default)]
    pub infrastructure_branch_name: Option<String>,
    /// Any other keys, carried through to the stack properties.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The merged, immutable configuration for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// The selected environment.
    #[serde(skip)]
    pub environment: DeployEnvironment,
    /// Environment name used in resource names.
    pub env_name: String,
    /// Owner of the infrastructure repository.
    pub repository_owner: String,
    /// Name of the infrastructure repository.
    pub infrastructure_repo_name: String,
    /// Branch the source stage watches.
    pub infrastructure_branch_name: String,
    /// Human-readable stack description.
    pub description: String,
    /// Extra keys from the environment block.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnvironmentConfig {
    /// Identifier of the stack that owns the pipeline.
    #[must_use]
    pub fn stack_id(&self) -> String {
        format!("{}-CI-Pipeline-Stack", self.env_name)
    }

    /// `owner/repo` of the watched repository.
    #[must_use]
    pub fn repository(&self) -> String {
        format!("{}/{}", self.repository_owner, self.infrastructure_repo_name)
    }

    /// Renders the configuration as stack properties.
    #[must_use]
    pub fn to_props(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Builds the stack description for an environment.
#[must_use]
pub fn describe(env: DeployEnvironment) -> String {
    format!(
        "Stack for the {env} CI pipeline deployed using the CDK. If you need to delete this stack, delete the {env} CDK infrastructure stack first."
    )
}

/// Resolves the environment configuration from the application context.
///
/// Must run before any other component is constructed: every failure here
/// is fatal and no resource has been defined yet.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the `env` selector is missing or not
/// one of `dev`/`prod`, if the selected block is missing or malformed, or if
/// a required parameter is missing or empty.
pub fn resolve(ctx: &AppContext) -> Result<EnvironmentConfig, ConfigurationError> {
    let environment = DeployEnvironment::from_selector(ctx.try_get_str(ENV_SELECTOR_KEY))?;
    let selector = environment.as_str();

    let block_value = ctx
        .try_get(selector)
        .cloned()
        .ok_or_else(|| ConfigurationError::missing_key(selector))?;
    let block: EnvironmentBlock = serde_json::from_value(block_value).map_err(|err| {
        ConfigurationError::new(format!("Environment block '{selector}' is malformed: {err}"))
    })?;

    let env_name = match block.env_name {
        Some(name) if name != selector => {
            return Err(ConfigurationError {
                message: format!(
                    "Environment block '{selector}' declares envName '{name}'; it must match the selector"
                ),
                key: Some(format!("{selector}.{ENV_NAME_KEY}")),
            });
        }
        _ => selector.to_string(),
    };

    let infrastructure_branch_name = non_empty(
        block.infrastructure_branch_name.as_deref(),
        &format!("{selector}.{BRANCH_KEY}"),
    )?;
    let repository_owner = non_empty(ctx.try_get_str(REPOSITORY_OWNER_KEY), REPOSITORY_OWNER_KEY)?;
    let infrastructure_repo_name =
        non_empty(ctx.try_get_str(REPOSITORY_NAME_KEY), REPOSITORY_NAME_KEY)?;

    let config = EnvironmentConfig {
        environment,
        env_name,
        repository_owner,
        infrastructure_repo_name,
        infrastructure_branch_name,
        description: describe(environment),
        extra: block.extra,
    };

    tracing::debug!(props = %config.to_props(), stack = %config.stack_id(), "Resolved environment configuration");
    Ok(config)
}

fn non_empty(value: Option<&str>, key: &str) -> Result<String, ConfigurationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(ConfigurationError::missing_key(key)),
    }
}
