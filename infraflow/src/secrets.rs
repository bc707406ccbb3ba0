//! Secret references.
//!
//! The topology only ever holds a [`SecretRef`]; the plaintext is fetched by
//! a [`SecretResolver`] at the moment an action needs it and dropped right
//! after.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the secret holding the repository access token.
pub const REPOSITORY_TOKEN_SECRET: &str = "github-token";

/// A reference to a secret held by an external secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    name: String,
}

impl SecretRef {
    /// Creates a reference to a named secret.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the secret name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the reference as a template dynamic reference.
    #[must_use]
    pub fn dynamic_reference(&self) -> String {
        format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", self.name)
    }
}

/// A resolved secret value. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps a plaintext value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the plaintext.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

/// Why a secret could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Secret '{name}' could not be resolved: {reason}")]
pub struct SecretResolutionError {
    /// The secret name.
    pub name: String,
    /// Store-specific reason.
    pub reason: String,
}

/// An external secret store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolves a secret reference to its current value.
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue, SecretResolutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_reference() {
        let secret = SecretRef::new(REPOSITORY_TOKEN_SECRET);
        assert_eq!(
            secret.dynamic_reference(),
            "{{resolve:secretsmanager:github-token:SecretString:::}}"
        );
    }

    #[test]
    fn test_secret_value_debug_is_redacted() {
        let value = SecretValue::new("ghp_supersecret");
        assert_eq!(format!("{value:?}"), "SecretValue(***)");
        assert_eq!(value.expose(), "ghp_supersecret");
    }

    #[tokio::test]
    async fn test_mock_resolver() {
        let mut resolver = MockSecretResolver::new();
        resolver
            .expect_resolve()
            .withf(|r| r.name() == REPOSITORY_TOKEN_SECRET)
            .times(1)
            .returning(|_| Ok(SecretValue::new("token")));

        let value = resolver
            .resolve(&SecretRef::new(REPOSITORY_TOKEN_SECRET))
            .await
            .unwrap();
        assert_eq!(value.expose(), "token");
    }
}
