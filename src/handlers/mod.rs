//! HTTP request handlers.

pub mod health;
pub mod pull_requests;
pub mod stats;
pub mod teams;
pub mod users;

use tracing::{error, Span};

use crate::engine::{Deadline, EngineError, ReviewService};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Runs one engine workflow on the blocking pool.
///
/// The caller's span is re-entered on the worker thread so the engine's
/// instrumented spans stay nested under the request.
pub(crate) async fn run_engine<T, F>(state: &AppState, deadline: Deadline, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ReviewService, Deadline) -> Result<T, EngineError> + Send + 'static,
{
    let service = state.service.clone();
    let span = Span::current();

    tokio::task::spawn_blocking(move || span.in_scope(|| work(&*service, deadline)))
        .await
        .map_err(|e| {
            error!(error = %e, "Engine task failed");
            ApiError::internal("INTERNAL_ERROR", "internal server error")
        })?
        .map_err(ApiError::from_engine)
}
