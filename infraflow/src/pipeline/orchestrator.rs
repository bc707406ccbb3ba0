//! Pipeline run orchestration.
//!
//! A run walks the stages in declaration order. Actions of one stage run
//! concurrently; a stage's outputs become visible only once the whole stage
//! has finished, and the first failing stage ends the run. Stages after it
//! are recorded as skipped and never start.

use super::interfaces::{BuildError, BuildInvocation, BuildRunner, BuildStatus, SourceProvider};
use super::result::{ActionFailure, ActionRecord, PipelineRunResult, StageRecord};
use super::{Action, BuildAction, Pipeline, SourceAction, Stage};
use crate::core::{ActionRef, ExecutionStatus, PipelineState, StoredArtifact};
use crate::errors::{
    BuildFailure, ErrorInfo, InfraflowError, SourceFetchError, StorageError, TopologyValidationError,
};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::{ActionSpanAttributes, SpanTimer};
use crate::secrets::SecretResolver;
use crate::storage::ArtifactStore;
use crate::utils::iso_timestamp;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Object key of an artifact written during a run.
#[must_use]
pub fn artifact_key(pipeline_name: &str, run_id: &str, artifact_name: &str) -> String {
    format!("{pipeline_name}/{run_id}/{artifact_name}")
}

/// Runs pipelines against a store and a set of external collaborators.
#[derive(Clone)]
pub struct PipelineRunner {
    store: Arc<dyn ArtifactStore>,
    secrets: Arc<dyn SecretResolver>,
    source: Arc<dyn SourceProvider>,
    builder: Arc<dyn BuildRunner>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner").finish_non_exhaustive()
    }
}

/// Per-run state shared by the actions of a run.
struct RunContext<'a> {
    pipeline: &'a Pipeline,
    run_id: String,
    sequence: Mutex<u64>,
    sink: &'a dyn EventSink,
}

impl RunContext<'_> {
    fn emit(&self, event_type: &str, data: Value) {
        // sequence assignment and delivery happen under one lock
        let mut sequence = self.sequence.lock();
        self.sink
            .try_emit(PipelineEvent::new(*sequence, event_type, self.run_id.clone(), data));
        *sequence += 1;
    }

    fn bucket(&self) -> &str {
        &self.pipeline.artifact_store().bucket_name
    }

    fn key_for(&self, artifact_name: &str) -> String {
        artifact_key(self.pipeline.name(), &self.run_id, artifact_name)
    }
}

impl PipelineRunner {
    /// Creates a runner that discards events.
    #[must_use]
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        secrets: Arc<dyn SecretResolver>,
        source: Arc<dyn SourceProvider>,
        builder: Arc<dyn BuildRunner>,
    ) -> Self {
        Self {
            store,
            secrets,
            source,
            builder,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the sink run events are delivered to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Runs the pipeline once, to a terminal state.
    ///
    /// Every failure is captured in the returned result; nothing is retried
    /// and nothing is rolled back.
    pub async fn run(&self, pipeline: &Pipeline) -> PipelineRunResult {
        let ctx = RunContext {
            pipeline,
            run_id: Uuid::new_v4().to_string(),
            sequence: Mutex::new(0),
            sink: self.event_sink.as_ref(),
        };
        let started_at = iso_timestamp();
        let timer = SpanTimer::start(pipeline.name());

        info!(pipeline = pipeline.name(), run_id = %ctx.run_id, "Pipeline run started");
        ctx.emit(
            "pipeline.started",
            json!({"pipeline": pipeline.name(), "stages": pipeline.stage_names()}),
        );

        // a store that cannot provide the bucket fails the first stage before it starts
        let mut setup_error = match self.store.ensure_bucket(ctx.bucket()).await {
            Ok(()) => None,
            Err(err) => {
                warn!(bucket = ctx.bucket(), error = %err, "Artifact bucket unavailable");
                Some(InfraflowError::from(err))
            }
        };

        let stages = pipeline.stages();
        let mut state = PipelineState::Pending.begin(stages.first().map(|s| s.name.as_str()));
        let mut available: HashMap<String, StoredArtifact> = HashMap::new();
        let mut records = Vec::with_capacity(stages.len());
        let mut failures = Vec::new();

        for (index, stage) in stages.iter().enumerate() {
            if state.is_terminal() {
                ctx.emit("stage.skipped", json!({"stage": stage.name}));
                records.push(StageRecord {
                    name: stage.name.clone(),
                    status: ExecutionStatus::Skipped,
                    duration_ms: 0.0,
                    actions: stage
                        .actions
                        .iter()
                        .map(|a| ActionRecord::skipped(ActionRef::new(&stage.name, a.name())))
                        .collect(),
                });
                continue;
            }

            let record = match setup_error.take() {
                Some(err) => fail_stage(&ctx, stage, &err),
                None => self.run_stage(&ctx, stage, &available).await,
            };
            let succeeded = record.status == ExecutionStatus::Succeeded;

            // outputs of this stage become inputs for later ones
            for handle in record.actions.iter().flat_map(|a| a.produced.iter()) {
                available.insert(handle.artifact.name().to_string(), handle.clone());
            }
            failures.extend(record.actions.iter().filter_map(|a| a.failure.clone()));

            let next = stages.get(index + 1).map(|s| s.name.as_str());
            state = state.after_stage(&stage.name, succeeded, next);
            records.push(record);
        }

        let duration_ms = timer.finish();
        match &state {
            PipelineState::Failed { stage } => {
                warn!(pipeline = pipeline.name(), run_id = %ctx.run_id, stage = %stage, duration_ms, "Pipeline run failed");
                ctx.emit(
                    "pipeline.failed",
                    json!({"pipeline": pipeline.name(), "stage": stage, "duration_ms": duration_ms}),
                );
            }
            _ => {
                info!(pipeline = pipeline.name(), run_id = %ctx.run_id, duration_ms, "Pipeline run succeeded");
                ctx.emit(
                    "pipeline.succeeded",
                    json!({"pipeline": pipeline.name(), "duration_ms": duration_ms}),
                );
            }
        }

        PipelineRunResult {
            run_id: ctx.run_id,
            pipeline_name: pipeline.name().to_string(),
            state,
            stages: records,
            failures,
            started_at,
            duration_ms,
        }
    }

    async fn run_stage(
        &self,
        ctx: &RunContext<'_>,
        stage: &Stage,
        available: &HashMap<String, StoredArtifact>,
    ) -> StageRecord {
        let timer = SpanTimer::start(&stage.name);
        info!(stage = %stage.name, actions = stage.actions.len(), "Stage started");
        ctx.emit(
            "stage.started",
            json!({"stage": stage.name, "status": ExecutionStatus::Running}),
        );

        let actions = join_all(
            stage
                .actions
                .iter()
                .map(|action| self.run_action(ctx, stage, action, available)),
        )
        .await;

        let failed = actions.iter().any(|a| a.status == ExecutionStatus::Failed);
        let duration_ms = timer.finish();
        if failed {
            warn!(stage = %stage.name, duration_ms, "Stage failed");
            ctx.emit("stage.failed", json!({"stage": stage.name, "duration_ms": duration_ms}));
        } else {
            info!(stage = %stage.name, duration_ms, "Stage completed");
            ctx.emit("stage.completed", json!({"stage": stage.name, "duration_ms": duration_ms}));
        }

        StageRecord {
            name: stage.name.clone(),
            status: if failed {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Succeeded
            },
            duration_ms,
            actions,
        }
    }

    async fn run_action(
        &self,
        ctx: &RunContext<'_>,
        stage: &Stage,
        action: &Action,
        available: &HashMap<String, StoredArtifact>,
    ) -> ActionRecord {
        let action_ref = ActionRef::new(&stage.name, action.name());
        let timer = SpanTimer::start(action_ref.to_string());
        ctx.emit(
            "action.started",
            json!({
                "stage": stage.name,
                "action": action.name(),
                "category": action.category(),
                "status": ExecutionStatus::Running,
            }),
        );

        let mut logs = Vec::new();
        let mut consumed = Vec::new();
        let outcome = match action {
            Action::Source(source) => self.run_source(ctx, &action_ref, source, &mut logs).await,
            Action::Build(build) => {
                self.run_build(ctx, &action_ref, build, available, &mut consumed, &mut logs)
                    .await
            }
        };

        let duration_ms = timer.finish();
        let attributes = ActionSpanAttributes::new(ctx.pipeline.name(), &ctx.run_id)
            .with_action(&stage.name, action.name())
            .with_duration_ms(duration_ms);

        match outcome {
            Ok(produced) => {
                let attributes = attributes.with_status(ExecutionStatus::Succeeded.to_string());
                info!(attributes = ?attributes.to_attributes(), "Action succeeded");
                ctx.emit(
                    "action.succeeded",
                    json!({"stage": stage.name, "action": action.name(), "duration_ms": duration_ms}),
                );
                ActionRecord {
                    action: action_ref,
                    status: ExecutionStatus::Succeeded,
                    duration_ms,
                    produced,
                    consumed,
                    logs,
                    failure: None,
                }
            }
            Err(err) => {
                let attributes = attributes
                    .with_status(ExecutionStatus::Failed.to_string())
                    .with_error_code(err.code());
                warn!(attributes = ?attributes.to_attributes(), error = %err, "Action failed");
                let failure = ActionFailure::from_error(action_ref.clone(), &err, logs.clone());
                ctx.emit(
                    "action.failed",
                    json!({
                        "stage": stage.name,
                        "action": action.name(),
                        "code": failure.code,
                        "kind": failure.kind,
                        "message": failure.message,
                        "duration_ms": duration_ms,
                    }),
                );
                ActionRecord {
                    action: action_ref,
                    status: ExecutionStatus::Failed,
                    duration_ms,
                    produced: Vec::new(),
                    consumed,
                    logs,
                    failure: Some(failure),
                }
            }
        }
    }

    async fn run_source(
        &self,
        ctx: &RunContext<'_>,
        action_ref: &ActionRef,
        action: &SourceAction,
        logs: &mut Vec<String>,
    ) -> Result<Vec<StoredArtifact>, InfraflowError> {
        let token = self.secrets.resolve(&action.oauth_token).await.map_err(|err| {
            warn!(secret = %err.name, reason = %err.reason, "Token resolution failed");
            SourceFetchError::InvalidToken {
                repository: action.repository(),
                secret: action.oauth_token.name().to_string(),
            }
        })?;

        logs.push(format!("Fetching {}", action.watched()));
        let checkout = self.source.fetch(action, &token).await?;
        logs.push(format!("Fetched revision {}", checkout.commit_id));

        let key = ctx.key_for(action.output.name());
        let handle = self
            .store
            .put(ctx.bucket(), &key, &action.output, action_ref, checkout.content)
            .await?;
        ctx.emit(
            "artifact.produced",
            json!({
                "artifact": handle.artifact,
                "uri": handle.uri(),
                "digest": handle.digest,
                "size_bytes": handle.size_bytes,
                "commit_id": checkout.commit_id,
                "producer": action_ref.to_string(),
            }),
        );
        Ok(vec![handle])
    }

    async fn run_build(
        &self,
        ctx: &RunContext<'_>,
        action_ref: &ActionRef,
        action: &BuildAction,
        available: &HashMap<String, StoredArtifact>,
        consumed: &mut Vec<StoredArtifact>,
        logs: &mut Vec<String>,
    ) -> Result<Vec<StoredArtifact>, InfraflowError> {
        let input = available
            .get(action.input.name())
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: ctx.bucket().to_string(),
                key: ctx.key_for(action.input.name()),
            })?;
        self.store.head(input).await?;
        consumed.push(input.clone());
        ctx.emit(
            "artifact.consumed",
            json!({
                "artifact": input.artifact,
                "uri": input.uri(),
                "digest": input.digest,
                "consumer": action_ref.to_string(),
            }),
        );

        let outcome = match self
            .builder
            .run(BuildInvocation {
                run_id: &ctx.run_id,
                project: &action.project,
                input,
                store: self.store.as_ref(),
                identity: &action.role,
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(BuildError { error, logs: captured }) => {
                logs.extend(captured);
                return Err(error);
            }
        };
        logs.extend(outcome.logs);

        if let BuildStatus::Failed {
            phase,
            command,
            exit_code,
        } = outcome.status
        {
            return Err(BuildFailure {
                project: action.project.logical_id.clone(),
                phase,
                command,
                exit_code,
            }
            .into());
        }

        // nothing is written unless every output is declared
        if let Some((artifact, _)) = outcome.outputs.iter().find(|(a, _)| !action.outputs.contains(a)) {
            return Err(TopologyValidationError::new(format!(
                "Action '{}' wrote undeclared artifact '{artifact}'",
                action.name
            ))
            .with_stages(vec![action_ref.stage.clone()])
            .with_error_info(ErrorInfo::new(
                "TOPOLOGY-008-UNDECLARED_OUTPUT",
                "Build wrote an artifact it does not declare",
            ))
            .into());
        }

        let mut produced = Vec::with_capacity(outcome.outputs.len());
        for (artifact, content) in outcome.outputs {
            let handle = self
                .store
                .put(ctx.bucket(), &ctx.key_for(artifact.name()), &artifact, action_ref, content)
                .await?;
            ctx.emit(
                "artifact.produced",
                json!({
                    "artifact": handle.artifact,
                    "uri": handle.uri(),
                    "digest": handle.digest,
                    "size_bytes": handle.size_bytes,
                    "producer": action_ref.to_string(),
                }),
            );
            produced.push(handle);
        }
        Ok(produced)
    }
}

/// Records every action of `stage` as failed with `err` without running it.
fn fail_stage(ctx: &RunContext<'_>, stage: &Stage, err: &InfraflowError) -> StageRecord {
    let actions = stage
        .actions
        .iter()
        .map(|action| {
            let action_ref = ActionRef::new(&stage.name, action.name());
            let logs = vec![format!("Artifact store unavailable: {err}")];
            ActionRecord {
                failure: Some(ActionFailure::from_error(action_ref.clone(), err, logs.clone())),
                action: action_ref,
                status: ExecutionStatus::Failed,
                duration_ms: 0.0,
                produced: Vec::new(),
                consumed: Vec::new(),
                logs,
            }
        })
        .collect();
    ctx.emit(
        "stage.failed",
        json!({"stage": stage.name, "code": err.code(), "duration_ms": 0.0}),
    );
    StageRecord {
        name: stage.name.clone(),
        status: ExecutionStatus::Failed,
        duration_ms: 0.0,
        actions,
    }
}
