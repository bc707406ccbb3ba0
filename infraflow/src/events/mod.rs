//! Pipeline run events.
//!
//! Every run emits an ordered stream of [`PipelineEvent`]s. Sequence numbers
//! are assigned by the runner and strictly increase within a run, so the
//! event log alone shows that a stage never started before its inputs were
//! produced.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Position of the event within its run, starting at 0.
    pub sequence: u64,
    /// Dotted event type (e.g. `stage.started`).
    pub event_type: String,
    /// The run this event belongs to.
    pub run_id: String,
    /// When the event was emitted (ISO 8601).
    pub timestamp: String,
    /// Event payload.
    pub data: Value,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(sequence: u64, event_type: impl Into<String>, run_id: impl Into<String>, data: Value) -> Self {
        Self {
            sequence,
            event_type: event_type.into(),
            run_id: run_id.into(),
            timestamp: iso_timestamp(),
            data,
        }
    }
}
