//! Utility functions for timestamps and hashing.

pub mod timestamps;

pub use timestamps::{iso_timestamp, Timestamp};

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
