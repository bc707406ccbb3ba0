//! Configuration and stack fixtures.

use crate::config::{
    describe, AppContext, DeployEnvironment, EnvironmentConfig, BRANCH_KEY, ENV_NAME_KEY, ENV_SELECTOR_KEY,
    REPOSITORY_NAME_KEY, REPOSITORY_OWNER_KEY,
};
use crate::errors::TopologyValidationError;
use crate::pipeline::{synthesize, PipelineStack};
use serde_json::{json, Map};

/// Builds a resolved configuration without going through a context.
#[must_use]
pub fn environment_config(
    environment: DeployEnvironment,
    owner: &str,
    repo: &str,
    branch: &str,
) -> EnvironmentConfig {
    EnvironmentConfig {
        environment,
        env_name: environment.as_str().to_string(),
        repository_owner: owner.to_string(),
        infrastructure_repo_name: repo.to_string(),
        infrastructure_branch_name: branch.to_string(),
        description: describe(environment),
        extra: Map::new(),
    }
}

/// Builds a context with both environment blocks, selecting `selector`.
///
/// Both blocks watch `branch`.
#[must_use]
pub fn app_context(selector: &str, owner: &str, repo: &str, branch: &str) -> AppContext {
    let mut ctx = AppContext::new()
        .with_value(ENV_SELECTOR_KEY, json!(selector))
        .with_value(REPOSITORY_OWNER_KEY, json!(owner))
        .with_value(REPOSITORY_NAME_KEY, json!(repo));
    for env in DeployEnvironment::ALL {
        ctx.set(
            env.as_str(),
            json!({ENV_NAME_KEY: env.as_str(), BRANCH_KEY: branch}),
        );
    }
    ctx
}

/// Synthesizes the `dev` stack watching `acme/infra@main`.
///
/// # Errors
///
/// Returns an error if synthesis fails.
pub fn dev_stack() -> Result<PipelineStack, TopologyValidationError> {
    synthesize(&environment_config(DeployEnvironment::Dev, "acme", "infra", "main"))
}
