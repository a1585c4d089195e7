//! Telemetry: structured logging, dispatch tracing, request metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{describe_metrics, MetricsAggregator, MetricsSnapshot};
pub use spans::{BatchSpan, SpanExt};
