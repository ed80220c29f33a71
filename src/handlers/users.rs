//! User handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::run_engine;
use crate::error::{ApiError, ApiResult};
use crate::models::{PullRequestShort, User};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetIsActiveRequest {
    #[serde(default)]
    #[schema(example = "u2")]
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReviewQuery {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewAssignmentsResponse {
    pub user_id: String,
    pub pull_requests: Vec<PullRequestShort>,
}

#[utoipa::path(
    post,
    path = "/users/setIsActive",
    tag = "Users",
    request_body = SetIsActiveRequest,
    responses(
        (status = 200, description = "Activity flag updated", body = UserResponse),
        (status = 404, description = "User not found", body = ApiError)
    )
)]
pub async fn set_is_active(
    State(state): State<AppState>,
    Json(payload): Json<SetIsActiveRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = run_engine(&state, state.deadline(), move |service, deadline| {
        service.set_user_activity(&payload.user_id, payload.is_active, deadline)
    })
    .await?;

    Ok(Json(UserResponse { user }))
}

/// Pull requests where the user currently holds a reviewer seat.
#[utoipa::path(
    get,
    path = "/users/getReview",
    tag = "Users",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Assigned pull requests", body = ReviewAssignmentsResponse),
        (status = 404, description = "User not found", body = ApiError)
    )
)]
pub async fn get_review(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> ApiResult<Json<ReviewAssignmentsResponse>> {
    let user_id = query.user_id.clone();
    let pull_requests = run_engine(&state, state.deadline(), move |service, deadline| {
        service.review_assignments(&query.user_id, deadline)
    })
    .await?;

    Ok(Json(ReviewAssignmentsResponse {
        user_id,
        pull_requests,
    }))
}
