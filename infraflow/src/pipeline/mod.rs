//! Pipeline topology and execution.
//!
//! This module provides:
//! - Actions and stages
//! - Pipeline builder with topology validation
//! - One-shot synthesis of the Source -> Deploy stack
//! - The runner that drives a pipeline through its stages

mod action;
mod builder;
mod interfaces;
mod orchestrator;
mod result;
mod stack;

#[cfg(test)]
mod integration_tests;

pub use action::{Action, BuildAction, SourceAction, Stage};
pub use builder::{Pipeline, PipelineBuilder};
pub use interfaces::{
    BuildError, BuildInvocation, BuildOutcome, BuildRunner, BuildStatus, SourceCheckout, SourceProvider,
};
pub use orchestrator::{artifact_key, PipelineRunner};
pub use result::{ActionFailure, ActionRecord, FailureKind, PipelineRunResult, StageRecord};
pub use stack::{
    pipeline_name, synthesize, synthesize_in_partition, PipelineStack, TeardownReport, TeardownStep, DEPLOY_ACTION,
    DEPLOY_STAGE, PIPELINE_LOGICAL_ID, SOURCE_ACTION, SOURCE_OUTPUT, SOURCE_STAGE,
};
