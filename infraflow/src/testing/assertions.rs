//! Test assertions for pipeline runs.

use crate::core::PipelineState;
use crate::pipeline::{FailureKind, PipelineRunResult};

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(result: &PipelineRunResult) {
    assert!(
        result.succeeded(),
        "Expected success, got state: {} (failures: {:?})",
        result.state,
        result.failures
    );
}

/// Asserts that the run failed in `stage`.
pub fn assert_run_failed_in(result: &PipelineRunResult, stage: &str) {
    assert_eq!(
        result.state,
        PipelineState::Failed {
            stage: stage.to_string()
        },
        "Expected failure in stage '{}', got state: {}",
        stage,
        result.state
    );
}

/// Asserts that the first failure is of `kind` and attributed to
/// `stage/action`.
pub fn assert_failure_attributed(result: &PipelineRunResult, stage: &str, action: &str, kind: FailureKind) {
    let failure = result
        .failure()
        .unwrap_or_else(|| panic!("Expected a failure, got state: {}", result.state));
    assert_eq!(
        (failure.action.stage.as_str(), failure.action.action.as_str(), failure.kind),
        (stage, action, kind),
        "Unexpected failure attribution: {failure:?}"
    );
}
