//! Core domain model types for infraflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Execution status and pipeline state enums
//! - Declared artifacts and the storage-backed handles produced at run time

mod artifact;
mod status;

pub use artifact::{ActionRef, Artifact, StoredArtifact};
pub use status::{ExecutionStatus, PipelineState};
