//! Scripted collaborators for driving pipeline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::Artifact;
use crate::errors::{BuildPhaseName, SourceFetchError};
use crate::pipeline::{
    BuildError, BuildInvocation, BuildOutcome, BuildRunner, SourceAction, SourceCheckout, SourceProvider,
};
use crate::secrets::{SecretRef, SecretResolutionError, SecretResolver, SecretValue};

/// A source provider that returns a configured checkout or error.
#[derive(Debug)]
pub struct ScriptedSourceProvider {
    result: Mutex<Result<SourceCheckout, SourceFetchError>>,
    failing_actions: HashMap<String, SourceFetchError>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSourceProvider {
    /// A provider that always returns `checkout`.
    #[must_use]
    pub fn returning(checkout: SourceCheckout) -> Self {
        Self {
            result: Mutex::new(Ok(checkout)),
            failing_actions: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A provider that always fails with `error`.
    #[must_use]
    pub fn failing(error: SourceFetchError) -> Self {
        Self {
            result: Mutex::new(Err(error)),
            failing_actions: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails fetches for the named action with `error`; others keep the
    /// configured result.
    #[must_use]
    pub fn failing_action(mut self, action: impl Into<String>, error: SourceFetchError) -> Self {
        self.failing_actions.insert(action.into(), error);
        self
    }

    /// Returns the number of fetches.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns `owner/repo@branch` of every fetch.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Default for ScriptedSourceProvider {
    fn default() -> Self {
        Self::returning(SourceCheckout::new("0000000", b"checkout".to_vec()))
    }
}

#[async_trait]
impl SourceProvider for ScriptedSourceProvider {
    async fn fetch(
        &self,
        action: &SourceAction,
        _token: &SecretValue,
    ) -> Result<SourceCheckout, SourceFetchError> {
        self.calls.lock().push(action.watched());
        if let Some(error) = self.failing_actions.get(&action.name) {
            return Err(error.clone());
        }
        self.result.lock().clone()
    }
}

/// What a [`ScriptedBuildRunner`] observed for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuild {
    /// Run id of the invocation.
    pub run_id: String,
    /// Project logical id.
    pub project: String,
    /// Environment variables the build saw.
    pub environment: HashMap<String, String>,
    /// Input artifact URI.
    pub input_uri: String,
    /// Input artifact content.
    pub input: Vec<u8>,
}

/// A build runner that replays a configured outcome.
///
/// Reads the input artifact from the store, optionally assumes a target
/// role with the invocation's identity, then reports the configured
/// outcome. A script failure is reported at the first command of the
/// configured phase.
#[derive(Debug, Default)]
pub struct ScriptedBuildRunner {
    failure: Option<(BuildPhaseName, i32)>,
    assume_role: Option<String>,
    outputs: Vec<(Artifact, Vec<u8>)>,
    builds: Mutex<Vec<RecordedBuild>>,
}

impl ScriptedBuildRunner {
    /// A runner whose builds succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first command of `phase` with `exit_code`.
    #[must_use]
    pub fn failing_in(mut self, phase: BuildPhaseName, exit_code: i32) -> Self {
        self.failure = Some((phase, exit_code));
        self
    }

    /// Assumes `role_arn` before running the script.
    #[must_use]
    pub fn assuming(mut self, role_arn: impl Into<String>) -> Self {
        self.assume_role = Some(role_arn.into());
        self
    }

    /// Writes an output artifact on success.
    #[must_use]
    pub fn with_output(mut self, artifact: Artifact, content: impl Into<Vec<u8>>) -> Self {
        self.outputs.push((artifact, content.into()));
        self
    }

    /// Returns the number of builds started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.builds.lock().len()
    }

    /// Returns every recorded build.
    #[must_use]
    pub fn builds(&self) -> Vec<RecordedBuild> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn run(&self, invocation: BuildInvocation<'_>) -> Result<BuildOutcome, BuildError> {
        let input = invocation.store.get(invocation.input).await?;
        self.builds.lock().push(RecordedBuild {
            run_id: invocation.run_id.to_string(),
            project: invocation.project.logical_id.clone(),
            environment: invocation
                .project
                .environment_variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_uri: invocation.input.uri(),
            input,
        });

        let mut logs = vec![format!("Downloaded {}", invocation.input.uri())];
        if let Some(target) = &self.assume_role {
            logs.push(format!("Assuming {target}"));
            let session = invocation
                .identity
                .assume(target)
                .map_err(|err| BuildError::new(err).with_logs(logs.clone()))?;
            logs.push(format!("Assumed {} as {}", session.role_arn, session.session_name));
        }

        for (phase, command) in invocation.project.buildspec.script() {
            if let Some((failing_phase, exit_code)) = self.failure {
                if phase == failing_phase {
                    logs.push(format!("[{phase}] {command}"));
                    logs.push(format!("Command exited with code {exit_code}"));
                    return Ok(BuildOutcome::failed(phase, command, exit_code, logs));
                }
            }
            logs.push(format!("[{phase}] {command}"));
        }

        let outcome = self
            .outputs
            .iter()
            .cloned()
            .fold(BuildOutcome::succeeded(logs), |outcome, (artifact, content)| {
                outcome.with_output(artifact, content)
            });
        Ok(outcome)
    }
}

/// A secret resolver backed by a fixed map.
#[derive(Debug, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, String>,
}

impl StaticSecretResolver {
    /// Creates an empty resolver; every lookup fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(&self, reference: &SecretRef) -> Result<SecretValue, SecretResolutionError> {
        self.secrets
            .get(reference.name())
            .map(SecretValue::new)
            .ok_or_else(|| SecretResolutionError {
                name: reference.name().to_string(),
                reason: "secret does not exist".to_string(),
            })
    }
}
