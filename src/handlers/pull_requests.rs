//! Pull request handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::run_engine;
use crate::engine::Reassignment;
use crate::error::{ApiError, ApiResult};
use crate::models::{AssignmentEvent, PullRequest};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePullRequestRequest {
    #[serde(default)]
    #[schema(example = "pr-1001")]
    pub pull_request_id: String,
    #[serde(default)]
    #[schema(example = "Add search")]
    pub pull_request_name: String,
    #[serde(default)]
    #[schema(example = "u1")]
    pub author_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergePullRequestRequest {
    #[serde(default)]
    #[schema(example = "pr-1001")]
    pub pull_request_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReassignRequest {
    #[serde(default)]
    #[schema(example = "pr-1001")]
    pub pull_request_id: String,
    #[serde(default, alias = "old_reviewer_id")]
    #[schema(example = "u2")]
    pub old_user_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    #[serde(default)]
    pub pull_request_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub pull_request_id: String,
    pub events: Vec<AssignmentEvent>,
}

/// Creates a pull request and seats up to two active teammates of the author.
#[utoipa::path(
    post,
    path = "/pullRequest/create",
    tag = "Pull Requests",
    request_body = CreatePullRequestRequest,
    responses(
        (status = 201, description = "Pull request created", body = PullRequestResponse),
        (status = 404, description = "Author or team not found", body = ApiError),
        (status = 409, description = "Pull request already exists", body = ApiError)
    )
)]
pub async fn create_pull_request(
    State(state): State<AppState>,
    Json(payload): Json<CreatePullRequestRequest>,
) -> ApiResult<(StatusCode, Json<PullRequestResponse>)> {
    let pr = run_engine(&state, state.deadline(), move |service, deadline| {
        service.create_pull_request(
            &payload.pull_request_id,
            &payload.pull_request_name,
            &payload.author_id,
            deadline,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

/// Idempotent: merging a merged pull request returns it unchanged.
#[utoipa::path(
    post,
    path = "/pullRequest/merge",
    tag = "Pull Requests",
    request_body = MergePullRequestRequest,
    responses(
        (status = 200, description = "Pull request merged", body = PullRequestResponse),
        (status = 404, description = "Pull request not found", body = ApiError)
    )
)]
pub async fn merge_pull_request(
    State(state): State<AppState>,
    Json(payload): Json<MergePullRequestRequest>,
) -> ApiResult<Json<PullRequestResponse>> {
    let pr = run_engine(&state, state.deadline(), move |service, deadline| {
        service.merge_pull_request(&payload.pull_request_id, deadline)
    })
    .await?;

    Ok(Json(PullRequestResponse { pr }))
}

#[utoipa::path(
    post,
    path = "/pullRequest/reassign",
    tag = "Pull Requests",
    request_body = ReassignRequest,
    responses(
        (status = 200, description = "Reviewer replaced", body = Reassignment),
        (status = 404, description = "Pull request or user not found", body = ApiError),
        (status = 409, description = "Merged, not assigned, or no candidate", body = ApiError)
    )
)]
pub async fn reassign_reviewer(
    State(state): State<AppState>,
    Json(payload): Json<ReassignRequest>,
) -> ApiResult<Json<Reassignment>> {
    let reassignment = run_engine(&state, state.deadline(), move |service, deadline| {
        service.reassign_reviewer(&payload.pull_request_id, &payload.old_user_id, deadline)
    })
    .await?;

    Ok(Json(reassignment))
}

/// Audit trail of reviewer assignments, oldest first.
#[utoipa::path(
    get,
    path = "/pullRequest/history",
    tag = "Pull Requests",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Assignment events", body = HistoryResponse),
        (status = 404, description = "Pull request not found", body = ApiError)
    )
)]
pub async fn assignment_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let pull_request_id = query.pull_request_id.clone();
    let events = run_engine(&state, state.deadline(), move |service, deadline| {
        service.assignment_history(&query.pull_request_id, deadline)
    })
    .await?;

    Ok(Json(HistoryResponse {
        pull_request_id,
        events,
    }))
}
