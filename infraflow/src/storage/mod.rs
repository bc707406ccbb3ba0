//! Artifact storage.
//!
//! This module provides:
//! - The bucket definition (name, removal policy) owned by a pipeline
//! - The [`ArtifactStore`] trait the orchestrator reads and writes through
//! - An in-memory store for local runs and tests

mod bucket;
mod memory;

pub use bucket::{artifact_bucket_name, ArtifactBucket, RemovalPolicy, ARTIFACT_BUCKET_LOGICAL_ID, BUCKET_OWNER_TAG};
pub use memory::InMemoryArtifactStore;

use crate::core::{ActionRef, Artifact, StoredArtifact};
use crate::errors::StorageError;
use async_trait::async_trait;

/// A durable object store holding inter-stage artifacts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Creates the bucket if it does not exist.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Writes an artifact object once and returns its handle.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        artifact: &Artifact,
        producer: &ActionRef,
        content: Vec<u8>,
    ) -> Result<StoredArtifact, StorageError>;

    /// Verifies that the object behind a handle is present and complete.
    async fn head(&self, handle: &StoredArtifact) -> Result<(), StorageError>;

    /// Reads the object behind a handle, verifying its digest.
    async fn get(&self, handle: &StoredArtifact) -> Result<Vec<u8>, StorageError>;

    /// Lists the object keys in a bucket.
    async fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError>;

    /// Deletes every object in a bucket and the bucket itself.
    ///
    /// Returns the number of objects deleted.
    async fn purge(&self, bucket: &str) -> Result<usize, StorageError>;
}
