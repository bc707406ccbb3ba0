//! # Infraflow
//!
//! A two-stage continuous-delivery pipeline for infrastructure code.
//!
//! Infraflow models, synthesizes and runs a `Source -> Deploy` pipeline:
//!
//! - **Environment resolution**: pick `dev` or `prod` from the application
//!   context and merge in the repository parameters
//! - **One-shot synthesis**: build the execution role, artifact bucket,
//!   build project and pipeline as one immutable object graph
//! - **Policy evaluation**: check what the shared execution role may assume
//! - **Run orchestration**: drive stages in order, pass artifacts through a
//!   digest-checked store and emit sequence-numbered events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use infraflow::prelude::*;
//!
//! let ctx = AppContext::from_file("cdk.json")?;
//! let config = resolve(&ctx)?;
//! let stack = synthesize(&config)?;
//!
//! let runner = PipelineRunner::new(store, secrets, source, builder);
//! let result = runner.run(stack.pipeline()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod build;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod iam;
pub mod observability;
pub mod pipeline;
pub mod secrets;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::build::{BuildProject, BuildSpec};
    pub use crate::config::{resolve, AppContext, DeployEnvironment, EnvironmentConfig};
    pub use crate::core::{ActionRef, Artifact, ExecutionStatus, PipelineState, StoredArtifact};
    pub use crate::errors::{
        BuildFailure, ConfigurationError, ErrorInfo, InfraflowError, PermissionDeniedError, SourceFetchError,
        StorageError, TopologyValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::iam::{Decision, ExecutionRole, PolicyDocument};
    pub use crate::pipeline::{
        synthesize, Action, BuildError, BuildOutcome, BuildRunner, Pipeline, PipelineBuilder, PipelineRunResult,
        PipelineRunner, PipelineStack, SourceCheckout, SourceProvider, Stage,
    };
    pub use crate::secrets::{SecretRef, SecretResolver, SecretValue};
    pub use crate::storage::{ArtifactBucket, ArtifactStore, InMemoryArtifactStore};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
