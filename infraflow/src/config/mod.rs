//! Startup configuration.
//!
//! This module provides:
//! - The enumerated set of deployment environments
//! - An application context holding the raw startup parameters
//! - The resolver that turns an `env` selector into an [`EnvironmentConfig`]

mod context;
mod environment;
mod resolver;

pub use context::{AppContext, DEFAULT_CONTEXT_FILE};
pub use environment::DeployEnvironment;
pub use resolver::{
    describe, resolve, EnvironmentBlock, EnvironmentConfig, BRANCH_KEY, ENV_NAME_KEY, ENV_SELECTOR_KEY,
    REPOSITORY_NAME_KEY, REPOSITORY_OWNER_KEY,
};
