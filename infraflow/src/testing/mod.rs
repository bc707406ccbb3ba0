//! Testing utilities for infraflow pipelines.
//!
//! This module provides:
//! - Fixtures for configurations, contexts and synthesized stacks
//! - Scripted source providers, build runners and secret resolvers
//! - Assertions for pipeline run results

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_failure_attributed, assert_run_failed_in, assert_run_succeeded};
pub use fixtures::{app_context, dev_stack, environment_config};
pub use mocks::{RecordedBuild, ScriptedBuildRunner, ScriptedSourceProvider, StaticSecretResolver};
