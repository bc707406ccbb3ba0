//! Tracing setup and span helpers for pipeline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "infraflow=info";

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. With `json` set, every
/// record is written as one JSON object per line.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    }
}

/// Span attributes for one action of a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionSpanAttributes {
    /// Pipeline name.
    pub pipeline_name: Option<String>,
    /// Pipeline run ID.
    pub run_id: Option<String>,
    /// Stage name.
    pub stage: Option<String>,
    /// Action name.
    pub action: Option<String>,
    /// Final status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error code if failed.
    pub error_code: Option<String>,
}

impl ActionSpanAttributes {
    /// Creates attributes for an action of a run.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            pipeline_name: Some(pipeline_name.into()),
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    /// Sets the stage and action.
    #[must_use]
    pub fn with_action(mut self, stage: impl Into<String>, action: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self.action = Some(action.into());
        self
    }

    /// Sets the final status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Flattens to dotted attribute names.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        if let Some(ref v) = self.pipeline_name {
            attrs.insert("pipeline.name".to_string(), v.clone());
        }
        if let Some(ref v) = self.run_id {
            attrs.insert("pipeline.run_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.stage {
            attrs.insert("stage.name".to_string(), v.clone());
        }
        if let Some(ref v) = self.action {
            attrs.insert("action.name".to_string(), v.clone());
        }
        if let Some(ref v) = self.status {
            attrs.insert("action.status".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("action.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error_code {
            attrs.insert("action.error_code".to_string(), v.clone());
        }

        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_attributes() {
        let attrs = ActionSpanAttributes::new("dev-CI-Pipeline", "run-1")
            .with_action("Deploy", "DeployCdkInfrastructure")
            .with_status("failed")
            .with_error_code("BUILD-001-EXIT")
            .to_attributes();

        assert_eq!(attrs.get("pipeline.name"), Some(&"dev-CI-Pipeline".to_string()));
        assert_eq!(attrs.get("action.name"), Some(&"DeployCdkInfrastructure".to_string()));
        assert_eq!(attrs.get("action.error_code"), Some(&"BUILD-001-EXIT".to_string()));
        assert!(!attrs.contains_key("action.duration_ms"));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("Source");
        assert_eq!(timer.name(), "Source");
        assert!(timer.finish() >= 0.0);
    }
}
