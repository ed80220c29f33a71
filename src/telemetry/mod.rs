//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{AssignmentMetrics, MetricsState, NoopMetrics, PrometheusMetrics};
pub use self::tracing::init_telemetry;
