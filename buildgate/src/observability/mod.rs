//! Logging setup and operation spans.

mod subscriber;

pub use subscriber::{init_tracing, operation_span, LogFormat, DEFAULT_FILTER};
