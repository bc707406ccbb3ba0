//! Observability utilities.

mod tracing;

pub use tracing::{init_tracing, ActionSpanAttributes, SpanTimer, DEFAULT_LOG_FILTER};
