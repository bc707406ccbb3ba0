//! End-to-end tests: resolve, synthesize, run and tear down.

use crate::config::resolve;
use crate::core::{Artifact, ExecutionStatus, PipelineState};
use crate::errors::{BuildPhaseName, SourceFetchError, StorageError};
use crate::events::CollectingEventSink;
use crate::pipeline::{
    artifact_key, synthesize, Action, BuildAction, FailureKind, Pipeline, PipelineBuilder, PipelineRunResult,
    PipelineRunner, PipelineStack, SourceAction, SourceCheckout, DEPLOY_ACTION, DEPLOY_STAGE, PIPELINE_LOGICAL_ID,
    SOURCE_ACTION, SOURCE_OUTPUT, SOURCE_STAGE,
};
use crate::secrets::{MockSecretResolver, SecretRef, SecretValue, REPOSITORY_TOKEN_SECRET};
use crate::storage::{InMemoryArtifactStore, MockArtifactStore};
use crate::testing::{
    app_context, assert_failure_attributed, assert_run_failed_in, assert_run_succeeded, dev_stack,
    ScriptedBuildRunner, ScriptedSourceProvider, StaticSecretResolver,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const CDK_ROLE: &str = "arn:aws:iam::123456789012:role/cdk-hnb659fds-deploy-role-123456789012-eu-west-1";

struct Harness {
    runner: PipelineRunner,
    store: Arc<InMemoryArtifactStore>,
    source: Arc<ScriptedSourceProvider>,
    builder: Arc<ScriptedBuildRunner>,
    events: Arc<CollectingEventSink>,
}

impl Harness {
    fn new(source: ScriptedSourceProvider, builder: ScriptedBuildRunner) -> Self {
        let secrets = StaticSecretResolver::new().with_secret(REPOSITORY_TOKEN_SECRET, "ghp_token");
        Self::with_secrets(source, builder, secrets)
    }

    fn with_secrets(
        source: ScriptedSourceProvider,
        builder: ScriptedBuildRunner,
        secrets: StaticSecretResolver,
    ) -> Self {
        let store = Arc::new(InMemoryArtifactStore::new());
        let source = Arc::new(source);
        let builder = Arc::new(builder);
        let events = Arc::new(CollectingEventSink::new());
        let runner = PipelineRunner::new(store.clone(), Arc::new(secrets), source.clone(), builder.clone())
            .with_event_sink(events.clone());
        Self {
            runner,
            store,
            source,
            builder,
            events,
        }
    }

    async fn run(&self, stack: &PipelineStack) -> PipelineRunResult {
        self.runner.run(stack.pipeline()).await
    }

    async fn run_pipeline(&self, pipeline: &Pipeline) -> PipelineRunResult {
        self.runner.run(pipeline).await
    }

    fn stage_started_at(&self, stage: &str) -> Option<usize> {
        self.events
            .events()
            .iter()
            .position(|e| e.event_type == "stage.started" && e.data["stage"] == stage)
    }
}

fn checkout() -> ScriptedSourceProvider {
    ScriptedSourceProvider::returning(SourceCheckout::new("4f2a9c1", b"infrastructure/bin/app.ts".to_vec()))
}

/// A source action on the stack's role whose output is `<name>Output`.
fn source_action(stack: &PipelineStack, name: &str, repo: &str) -> Action {
    Action::Source(SourceAction {
        name: name.to_string(),
        owner: "acme".into(),
        repo: repo.into(),
        branch: "main".into(),
        oauth_token: SecretRef::new(REPOSITORY_TOKEN_SECRET),
        output: Artifact::new(format!("{name}Output")),
        role: Arc::clone(stack.role()),
    })
}

fn deploy_action(stack: &PipelineStack, outputs: Vec<Artifact>) -> Action {
    Action::Build(BuildAction {
        name: DEPLOY_ACTION.to_string(),
        project: Arc::clone(stack.build_project()),
        input: Artifact::new(SOURCE_OUTPUT),
        outputs,
        role: Arc::clone(stack.role()),
    })
}

fn custom_pipeline(stack: &PipelineStack, sources: Vec<Action>, deploy: Action) -> Pipeline {
    PipelineBuilder::new(
        PIPELINE_LOGICAL_ID,
        stack.pipeline().name(),
        Arc::clone(stack.role()),
        stack.artifact_bucket().clone(),
    )
    .stage(SOURCE_STAGE, sources)
    .stage(DEPLOY_STAGE, vec![deploy])
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_source_then_deploy_succeeds() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new());

    let result = harness.run(&stack).await;

    assert_run_succeeded(&result);
    assert_eq!(result.pipeline_name, "dev-CI-Pipeline");
    assert_eq!(harness.source.fetched(), vec!["acme/infra@main"]);

    let produced: Vec<_> = result.artifacts_produced().collect();
    let consumed: Vec<_> = result.artifacts_consumed().collect();
    assert_eq!(produced.len(), 1);
    assert_eq!(consumed.len(), 1);
    assert_eq!(produced[0], consumed[0]);
    assert_eq!(produced[0].key, artifact_key("dev-CI-Pipeline", &result.run_id, SOURCE_OUTPUT));
    assert_eq!(produced[0].produced_by.to_string(), "Source/InfrastructureSource");

    let builds = harness.builder.builds();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].input, b"infrastructure/bin/app.ts".to_vec());
    assert_eq!(builds[0].environment.get("DEPLOY_ENVIRONMENT").map(String::as_str), Some("dev"));
    assert_eq!(builds[0].run_id, result.run_id);

    let deploy = result.action(DEPLOY_STAGE, DEPLOY_ACTION).unwrap();
    assert!(deploy.logs.iter().any(|l| l.ends_with("cdk deploy --context env=dev")));
    assert_eq!(harness.store.object_count(&stack.artifact_bucket().bucket_name), 1);
}

#[tokio::test]
async fn test_fetch_error_halts_before_deploy() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(
        ScriptedSourceProvider::failing(SourceFetchError::BranchNotFound {
            repository: "acme/infra".into(),
            branch: "main".into(),
        }),
        ScriptedBuildRunner::new(),
    );

    let result = harness.run(&stack).await;

    assert_run_failed_in(&result, SOURCE_STAGE);
    assert_failure_attributed(&result, SOURCE_STAGE, SOURCE_ACTION, FailureKind::SourceFetch);
    assert_eq!(harness.builder.call_count(), 0);
    assert_eq!(result.stage(DEPLOY_STAGE).unwrap().status, ExecutionStatus::Skipped);
    assert_eq!(
        result.action(DEPLOY_STAGE, DEPLOY_ACTION).unwrap().status,
        ExecutionStatus::Skipped
    );
    assert_eq!(harness.stage_started_at(DEPLOY_STAGE), None);
    assert_eq!(result.artifacts_produced().count(), 0);
    assert_eq!(result.failure().unwrap().code, "SOURCE-001-FETCH");
}

#[tokio::test]
async fn test_deploy_starts_after_artifact_produced() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new());

    harness.run(&stack).await;

    let produced = harness.events.position_of("artifact.produced").unwrap();
    let consumed = harness.events.position_of("artifact.consumed").unwrap();
    let source_done = harness.events.position_of("stage.completed").unwrap();
    let deploy_started = harness.stage_started_at(DEPLOY_STAGE).unwrap();

    assert!(produced < source_done);
    assert!(source_done < deploy_started);
    assert!(deploy_started < consumed);

    let types = harness.events.event_types();
    assert_eq!(types.first().map(String::as_str), Some("pipeline.started"));
    assert_eq!(types.last().map(String::as_str), Some("pipeline.succeeded"));

    let sequences: Vec<u64> = harness.events.events().iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (0..sequences.len() as u64).collect();
    assert_eq!(sequences, expected);
}

#[tokio::test]
async fn test_build_exit_code_fails_deploy() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new().failing_in(BuildPhaseName::Build, 1));

    let result = harness.run(&stack).await;

    assert_run_failed_in(&result, DEPLOY_STAGE);
    assert_failure_attributed(&result, DEPLOY_STAGE, DEPLOY_ACTION, FailureKind::BuildFailure);
    let failure = result.failure().unwrap();
    assert_eq!(failure.code, "BUILD-001-EXIT");
    assert!(failure.message.contains("build phase"));
    assert!(failure.logs.iter().any(|l| l.contains("exited with code 1")));
    // the artifact was still consumed before the build failed
    assert_eq!(result.artifacts_consumed().count(), 1);
}

#[tokio::test]
async fn test_install_failure_stops_before_deploy_command() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new().failing_in(BuildPhaseName::Install, 127));

    let result = harness.run(&stack).await;

    let failure = result.failure().unwrap();
    assert!(failure.message.contains("`npm install -g aws-cdk` exited with code 127"));
    assert!(!failure.logs.iter().any(|l| l.contains("cdk deploy")));
}

#[tokio::test]
async fn test_build_assumes_deployment_role() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new().assuming(CDK_ROLE));

    let result = harness.run(&stack).await;

    assert_run_succeeded(&result);
    let deploy = result.action(DEPLOY_STAGE, DEPLOY_ACTION).unwrap();
    assert!(deploy.logs.iter().any(|l| l.starts_with(&format!("Assumed {CDK_ROLE}"))));
}

#[tokio::test]
async fn test_denied_role_fails_deploy() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(
        checkout(),
        ScriptedBuildRunner::new().assuming("arn:aws:iam::123456789012:role/admin"),
    );

    let result = harness.run(&stack).await;

    assert_run_failed_in(&result, DEPLOY_STAGE);
    assert_failure_attributed(&result, DEPLOY_STAGE, DEPLOY_ACTION, FailureKind::PermissionDenied);
    let failure = result.failure().unwrap();
    assert_eq!(failure.code, "IAM-001-DENIED");

    // logs captured before the denial survive into the failure record
    assert!(failure.logs.iter().any(|l| l.starts_with("Downloaded s3://")));
    assert_eq!(
        failure.logs.last().map(String::as_str),
        Some("Assuming arn:aws:iam::123456789012:role/admin")
    );
    assert!(!failure.logs.iter().any(|l| l.starts_with("Assumed")));
    assert_eq!(result.action(DEPLOY_STAGE, DEPLOY_ACTION).unwrap().logs, failure.logs);
}

#[tokio::test]
async fn test_missing_token_fails_source_without_fetching() {
    let stack = dev_stack().unwrap();
    let harness = Harness::with_secrets(checkout(), ScriptedBuildRunner::new(), StaticSecretResolver::new());

    let result = harness.run(&stack).await;

    assert_failure_attributed(&result, SOURCE_STAGE, SOURCE_ACTION, FailureKind::SourceFetch);
    assert!(result.failure().unwrap().message.contains("github-token"));
    assert_eq!(harness.source.call_count(), 0);
    assert_eq!(harness.builder.call_count(), 0);
}

#[tokio::test]
async fn test_token_resolved_once_per_run() {
    let stack = dev_stack().unwrap();
    let mut secrets = MockSecretResolver::new();
    secrets
        .expect_resolve()
        .withf(|r| r.name() == REPOSITORY_TOKEN_SECRET)
        .times(1)
        .returning(|_| Ok(SecretValue::new("ghp_token")));

    let source = Arc::new(checkout());
    let runner = PipelineRunner::new(
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(secrets),
        source.clone(),
        Arc::new(ScriptedBuildRunner::new()),
    );

    let result = runner.run(stack.pipeline()).await;
    assert_run_succeeded(&result);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test]
async fn test_undeclared_build_output_fails() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(
        checkout(),
        ScriptedBuildRunner::new().with_output(crate::core::Artifact::new("DeployOutput"), b"{}".to_vec()),
    );

    let result = harness.run(&stack).await;

    assert_failure_attributed(&result, DEPLOY_STAGE, DEPLOY_ACTION, FailureKind::Internal);
    assert_eq!(result.failure().unwrap().code, "TOPOLOGY-008-UNDECLARED_OUTPUT");
}

#[tokio::test]
async fn test_runs_write_under_distinct_keys() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new());

    let first = harness.run(&stack).await;
    let second = harness.run(&stack).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(harness.store.object_count(&stack.artifact_bucket().bucket_name), 2);
}

#[tokio::test]
async fn test_prod_context_end_to_end() {
    let config = resolve(&app_context("prod", "acme", "infra", "release")).unwrap();
    let stack = synthesize(&config).unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new());

    let result = harness.run(&stack).await;

    assert_run_succeeded(&result);
    assert_eq!(result.pipeline_name, "prod-CI-Pipeline");
    assert_eq!(harness.source.fetched(), vec!["acme/infra@release"]);
    assert_eq!(
        harness.builder.builds()[0].input_uri,
        format!(
            "s3://kuriaks1-prod-codepipeline-artifact-bucket/prod-CI-Pipeline/{}/{SOURCE_OUTPUT}",
            result.run_id
        )
    );
}

#[tokio::test]
async fn test_environments_do_not_share_buckets() {
    let dev = synthesize(&resolve(&app_context("dev", "acme", "infra", "main")).unwrap()).unwrap();
    let prod = synthesize(&resolve(&app_context("prod", "acme", "infra", "main")).unwrap()).unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new());

    harness.run(&dev).await;
    harness.run(&prod).await;

    assert_eq!(harness.store.object_count(&dev.artifact_bucket().bucket_name), 1);
    assert_eq!(harness.store.object_count(&prod.artifact_bucket().bucket_name), 1);

    let report = dev.teardown(harness.store.as_ref()).await.unwrap();
    assert_eq!(report.objects_deleted, 1);
    assert!(!harness.store.has_bucket(&dev.artifact_bucket().bucket_name));
    assert!(harness.store.has_bucket(&prod.artifact_bucket().bucket_name));
}

#[tokio::test]
async fn test_failed_run_state_is_terminal() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new().failing_in(BuildPhaseName::Build, 2));

    let result = harness.run(&stack).await;

    assert!(result.state.is_terminal());
    assert_eq!(
        result.state,
        PipelineState::Failed {
            stage: DEPLOY_STAGE.to_string()
        }
    );
    assert_eq!(harness.events.events_of_type("pipeline.failed").len(), 1);
    assert_eq!(result.to_json()["state"]["state"], "failed");
}

#[tokio::test]
async fn test_stage_with_several_actions_records_each() {
    let stack = dev_stack().unwrap();
    let pipeline = custom_pipeline(
        &stack,
        vec![
            source_action(&stack, SOURCE_ACTION, "infra"),
            source_action(&stack, "ModulesSource", "modules"),
            source_action(&stack, "PoliciesSource", "policies"),
        ],
        deploy_action(&stack, Vec::new()),
    );
    let harness = Harness::new(
        checkout()
            .failing_action(
                "PoliciesSource",
                SourceFetchError::BranchNotFound {
                    repository: "acme/policies".into(),
                    branch: "main".into(),
                },
            )
            .failing_action(
                SOURCE_ACTION,
                SourceFetchError::BranchNotFound {
                    repository: "acme/infra".into(),
                    branch: "main".into(),
                },
            ),
        ScriptedBuildRunner::new(),
    );

    let result = harness.run_pipeline(&pipeline).await;

    assert_run_failed_in(&result, SOURCE_STAGE);
    assert_eq!(harness.source.call_count(), 3);

    let source = result.stage(SOURCE_STAGE).unwrap();
    assert_eq!(source.status, ExecutionStatus::Failed);
    let statuses: Vec<_> = source.actions.iter().map(|a| (a.action.action.as_str(), a.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (SOURCE_ACTION, ExecutionStatus::Failed),
            ("ModulesSource", ExecutionStatus::Succeeded),
            ("PoliciesSource", ExecutionStatus::Failed),
        ]
    );

    // failures follow declaration order, not completion order
    let failed: Vec<_> = result.failures.iter().map(|f| f.action.action.as_str()).collect();
    assert_eq!(failed, vec![SOURCE_ACTION, "PoliciesSource"]);
    assert_eq!(result.failure().unwrap().action.action, SOURCE_ACTION);

    // the sibling that succeeded still wrote its artifact
    let produced: Vec<_> = result.artifacts_produced().map(|h| h.artifact.name().to_string()).collect();
    assert_eq!(produced, vec!["ModulesSourceOutput"]);

    assert_eq!(result.stage(DEPLOY_STAGE).unwrap().status, ExecutionStatus::Skipped);
    assert_eq!(harness.builder.call_count(), 0);
    assert_eq!(harness.stage_started_at(DEPLOY_STAGE), None);
}

#[tokio::test]
async fn test_undeclared_output_writes_nothing() {
    let stack = dev_stack().unwrap();
    let manifest = Artifact::new("DeployManifest");
    let pipeline = custom_pipeline(
        &stack,
        vec![source_action(&stack, SOURCE_ACTION, "infra")],
        deploy_action(&stack, vec![manifest.clone()]),
    );
    let harness = Harness::new(
        checkout(),
        ScriptedBuildRunner::new()
            .with_output(manifest, b"{}".to_vec())
            .with_output(Artifact::new("StrayOutput"), b"{}".to_vec()),
    );

    let result = harness.run_pipeline(&pipeline).await;

    assert_failure_attributed(&result, DEPLOY_STAGE, DEPLOY_ACTION, FailureKind::Internal);
    assert_eq!(result.failure().unwrap().code, "TOPOLOGY-008-UNDECLARED_OUTPUT");
    // only the source checkout is stored; the declared manifest was never written
    assert_eq!(harness.store.object_count(&stack.artifact_bucket().bucket_name), 1);
    assert_eq!(harness.events.events_of_type("artifact.produced").len(), 1);
}

#[tokio::test]
async fn test_declared_build_output_is_stored() {
    let stack = dev_stack().unwrap();
    let manifest = Artifact::new("DeployManifest");
    let pipeline = custom_pipeline(
        &stack,
        vec![source_action(&stack, SOURCE_ACTION, "infra")],
        deploy_action(&stack, vec![manifest.clone()]),
    );
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new().with_output(manifest, b"{}".to_vec()));

    let result = harness.run_pipeline(&pipeline).await;

    assert_run_succeeded(&result);
    let deploy = result.action(DEPLOY_STAGE, DEPLOY_ACTION).unwrap();
    assert_eq!(deploy.produced.len(), 1);
    assert_eq!(deploy.produced[0].key, artifact_key("dev-CI-Pipeline", &result.run_id, "DeployManifest"));
    assert_eq!(harness.store.object_count(&stack.artifact_bucket().bucket_name), 2);
}

#[tokio::test]
async fn test_unavailable_bucket_fails_before_source() {
    let stack = dev_stack().unwrap();
    let mut store = MockArtifactStore::new();
    store.expect_ensure_bucket().times(1).returning(|bucket| {
        Err(StorageError::BucketUnavailable {
            bucket: bucket.to_string(),
            reason: "access denied".into(),
        })
    });
    store.expect_put().never();

    let source = Arc::new(checkout());
    let builder = Arc::new(ScriptedBuildRunner::new());
    let events = Arc::new(CollectingEventSink::new());
    let secrets = StaticSecretResolver::new().with_secret(REPOSITORY_TOKEN_SECRET, "ghp_token");
    let runner = PipelineRunner::new(Arc::new(store), Arc::new(secrets), source.clone(), builder.clone())
        .with_event_sink(events.clone());

    let result = runner.run(stack.pipeline()).await;

    assert_run_failed_in(&result, SOURCE_STAGE);
    assert_failure_attributed(&result, SOURCE_STAGE, SOURCE_ACTION, FailureKind::Storage);
    let failure = result.failure().unwrap();
    assert_eq!(failure.code, "STORAGE-001");
    assert!(failure.message.contains("access denied"));
    assert_eq!(source.call_count(), 0);
    assert_eq!(builder.call_count(), 0);
    assert_eq!(result.stage(DEPLOY_STAGE).unwrap().status, ExecutionStatus::Skipped);
    assert!(events.events_of_type("stage.started").is_empty());
    assert_eq!(events.events_of_type("stage.failed").len(), 1);
}

#[tokio::test]
async fn test_started_events_report_running() {
    let stack = dev_stack().unwrap();
    let harness = Harness::new(checkout(), ScriptedBuildRunner::new());

    harness.run(&stack).await;

    let started = harness.events.events_of_type("action.started");
    assert_eq!(started.len(), 2);
    assert!(started.iter().all(|e| e.data["status"] == "running"));
    assert!(harness
        .events
        .events_of_type("stage.started")
        .iter()
        .all(|e| e.data["status"] == "running"));
}
