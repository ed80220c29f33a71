use axum::{extract::State, Json};

use super::run_engine;
use crate::error::{ApiError, ApiResult};
use crate::models::AssignmentStats;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/stats/assignments",
    tag = "Stats",
    responses(
        (status = 200, description = "Assignment counts per user and per pull request", body = AssignmentStats),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn assignment_stats(State(state): State<AppState>) -> ApiResult<Json<AssignmentStats>> {
    let stats = run_engine(&state, state.deadline(), |service, deadline| {
        service.assignment_stats(deadline)
    })
    .await?;
    Ok(Json(stats))
}
