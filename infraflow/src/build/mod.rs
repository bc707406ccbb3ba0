//! Build task definition.
//!
//! A build task is a sandboxed command sequence: an install phase followed by
//! a build phase, run under the execution role with a fixed set of
//! environment variables and one input artifact.

mod project;
mod spec;

pub use project::{
    BuildProject, BUILD_IMAGE, BUILD_PROJECT_LOGICAL_ID, DEPLOY_ENVIRONMENT_VAR,
    INFRASTRUCTURE_DIR,
};
pub use spec::{BuildPhase, BuildSpec, BUILDSPEC_VERSION};
