//! `tracing-subscriber` installation.

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "buildgate=info";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Installs the global subscriber.
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Returns false if
/// a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };
    installed.is_ok()
}

/// Span wrapping one public operation on a pipeline.
#[must_use]
pub fn operation_span(operation: &'static str, pipeline_id: &str, build_id: Option<&str>) -> Span {
    tracing::info_span!(
        "buildgate",
        operation,
        pipeline_id = %pipeline_id,
        build_id = build_id.unwrap_or_default()
    )
}
