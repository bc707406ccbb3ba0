//! In-memory artifact store.

use super::ArtifactStore;
use crate::core::{ActionRef, Artifact, StoredArtifact};
use crate::errors::StorageError;
use crate::utils::{iso_timestamp, sha256_hex};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// An [`ArtifactStore`] backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    buckets: DashMap<String, BTreeMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the bucket exists.
    #[must_use]
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Returns the number of objects in a bucket (0 if missing).
    #[must_use]
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map_or(0, |objects| objects.len())
    }

    /// Replaces the bytes of an existing object without updating any handle.
    ///
    /// Returns false if the object does not exist.
    pub fn overwrite_unchecked(&self, bucket: &str, key: &str, content: Vec<u8>) -> bool {
        self.buckets
            .get_mut(bucket)
            .and_then(|mut objects| objects.get_mut(key).map(|slot| *slot = content))
            .is_some()
    }

    fn read(&self, handle: &StoredArtifact) -> Result<Vec<u8>, StorageError> {
        let objects = self
            .buckets
            .get(&handle.bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: handle.bucket.clone(),
            })?;
        let content = objects
            .get(&handle.key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: handle.bucket.clone(),
                key: handle.key.clone(),
            })?;

        let actual = sha256_hex(content);
        if actual != handle.digest {
            return Err(StorageError::DigestMismatch {
                bucket: handle.bucket.clone(),
                key: handle.key.clone(),
                expected: handle.digest.clone(),
                actual,
            });
        }
        Ok(content.clone())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        artifact: &Artifact,
        producer: &ActionRef,
        content: Vec<u8>,
    ) -> Result<StoredArtifact, StorageError> {
        let mut objects = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let handle = StoredArtifact {
            artifact: artifact.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            digest: sha256_hex(&content),
            size_bytes: content.len() as u64,
            produced_by: producer.clone(),
            created_at: iso_timestamp(),
        };
        objects.insert(key.to_string(), content);
        Ok(handle)
    }

    async fn head(&self, handle: &StoredArtifact) -> Result<(), StorageError> {
        self.read(handle).map(|_| ())
    }

    async fn get(&self, handle: &StoredArtifact) -> Result<Vec<u8>, StorageError> {
        self.read(handle)
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        self.buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })
    }

    async fn purge(&self, bucket: &str) -> Result<usize, StorageError> {
        self.buckets
            .remove(bucket)
            .map(|(_, objects)| objects.len())
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })
    }
}
