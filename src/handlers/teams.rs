//! Team handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::run_engine;
use crate::engine::MassDeactivation;
use crate::error::{ApiError, ApiResult};
use crate::models::{Team, TeamMember};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTeamRequest {
    #[serde(default)]
    #[schema(example = "backend")]
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamQuery {
    #[serde(default)]
    pub team_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeactivateTeamRequest {
    #[serde(default)]
    #[schema(example = "backend")]
    pub team_name: String,
    /// Members to deactivate; empty means every active member.
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/team/add",
    tag = "Teams",
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team created", body = TeamResponse),
        (status = 400, description = "Team exists or invalid input", body = ApiError)
    )
)]
pub async fn create_team(
    State(state): State<AppState>,
    Json(payload): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<TeamResponse>)> {
    let team = run_engine(&state, state.deadline(), move |service, deadline| {
        service.create_team(&payload.team_name, &payload.members, deadline)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

#[utoipa::path(
    get,
    path = "/team/get",
    tag = "Teams",
    params(TeamQuery),
    responses(
        (status = 200, description = "Team with its members", body = Team),
        (status = 404, description = "Team not found", body = ApiError)
    )
)]
pub async fn get_team(
    State(state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> ApiResult<Json<Team>> {
    let team = run_engine(&state, state.deadline(), move |service, deadline| {
        service.get_team(&query.team_name, deadline)
    })
    .await?;

    Ok(Json(team))
}

#[utoipa::path(
    post,
    path = "/team/deactivate",
    tag = "Teams",
    request_body = DeactivateTeamRequest,
    responses(
        (status = 200, description = "Members deactivated and their reviews redistributed", body = MassDeactivation),
        (status = 404, description = "Team or user not found", body = ApiError),
        (status = 504, description = "Deadline exceeded, nothing applied", body = ApiError)
    )
)]
pub async fn deactivate_team(
    State(state): State<AppState>,
    Json(payload): Json<DeactivateTeamRequest>,
) -> ApiResult<Json<MassDeactivation>> {
    let result = run_engine(&state, state.long_deadline(), move |service, deadline| {
        service.mass_deactivate(&payload.team_name, &payload.user_ids, deadline)
    })
    .await?;

    Ok(Json(result))
}
