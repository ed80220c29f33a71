//! Application metrics using the metrics crate.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::warn;

use crate::models::AssignmentSource;

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let handle = PROMETHEUS_HANDLE.get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| warn!(error = %e, "Failed to install Prometheus recorder"))
                .ok()
        });

        Self {
            handle: handle.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

/// Sink for assignment workflow outcomes. Called only after a commit.
pub trait AssignmentMetrics: Send + Sync {
    fn team_created(&self, members: usize);
    fn pull_request_created(&self, reviewers: usize);
    fn pull_request_merged(&self);
    fn reviewer_reassigned(&self, source: AssignmentSource);
    /// A reviewer was removed and nobody took the seat.
    fn reviewer_unassigned(&self, source: AssignmentSource);
    fn users_deactivated(&self, count: usize);
}

/// Forwards to the process-wide `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl AssignmentMetrics for PrometheusMetrics {
    fn team_created(&self, members: usize) {
        counter!("teams_created_total").increment(1);
        counter!("users_processed_total").increment(members as u64);
    }

    fn pull_request_created(&self, reviewers: usize) {
        counter!("pull_requests_created_total").increment(1);
        histogram!("reviewers_assigned_per_pull_request").record(reviewers as f64);
    }

    fn pull_request_merged(&self) {
        counter!("pull_requests_merged_total").increment(1);
    }

    fn reviewer_reassigned(&self, source: AssignmentSource) {
        counter!(
            "reviewer_reassignments_total",
            "source" => source.as_str()
        )
        .increment(1);
    }

    fn reviewer_unassigned(&self, source: AssignmentSource) {
        counter!(
            "reviewer_unassignments_total",
            "source" => source.as_str()
        )
        .increment(1);
    }

    fn users_deactivated(&self, count: usize) {
        counter!("users_deactivated_total").increment(count as u64);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl AssignmentMetrics for NoopMetrics {
    fn team_created(&self, _members: usize) {}
    fn pull_request_created(&self, _reviewers: usize) {}
    fn pull_request_merged(&self) {}
    fn reviewer_reassigned(&self, _source: AssignmentSource) {}
    fn reviewer_unassigned(&self, _source: AssignmentSource) {}
    fn users_deactivated(&self, _count: usize) {}
}

pub fn record_request_latency(
    method: &str,
    path: &str,
    status: u16,
    duration: std::time::Duration,
) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_state_disabled() {
        let state = MetricsState::disabled();
        assert!(!state.is_enabled());
        assert!(state.render().is_none());
    }

    #[test]
    fn test_metrics_state_not_enabled_when_flag_off() {
        let state = MetricsState::new(false);
        assert!(!state.is_enabled());
    }

    #[test]
    fn test_prometheus_metrics_without_recorder_is_harmless() {
        let sink = PrometheusMetrics;
        sink.team_created(3);
        sink.pull_request_created(2);
        sink.reviewer_reassigned(AssignmentSource::ManualReassign);
        sink.reviewer_unassigned(AssignmentSource::TeamDeactivation);
    }
}
