//! OpenAPI documentation configuration.
//!
//! Served as JSON at `/api-docs/openapi.json` and browsable through Swagger UI.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::engine::{MassDeactivation, Reassignment};
use crate::error::{ApiError, ErrorBody};
use crate::handlers::{health, pull_requests, teams, users};
use crate::models::{
    AssignmentEvent, AssignmentEventType, AssignmentSource, AssignmentStats, PullRequest,
    PullRequestAssignmentStat, PullRequestShort, PullRequestStatus, Team, TeamMember, User,
    UserAssignmentStat,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rota API",
        version = "1.0.0",
        description = "Pull request reviewer assignment service.\n\n\
        ## Assignment rules\n\
        - A new pull request gets up to two active teammates of its author\n\
        - Reviewers can be replaced while the pull request is open\n\
        - Deactivating team members moves their open reviews to active teammates\n\
        - Every reviewer change is recorded in an audit trail\n\n\
        ## Errors\n\
        Failures return `{\"error\": {\"code\": \"...\", \"message\": \"...\"}}`.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Teams", description = "Team creation and bulk deactivation"),
        (name = "Users", description = "User activity and review queues"),
        (name = "Pull Requests", description = "Pull request lifecycle and reviewer changes"),
        (name = "Stats", description = "Assignment statistics")
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::teams::create_team,
        crate::handlers::teams::get_team,
        crate::handlers::teams::deactivate_team,

        crate::handlers::users::set_is_active,
        crate::handlers::users::get_review,

        crate::handlers::pull_requests::create_pull_request,
        crate::handlers::pull_requests::merge_pull_request,
        crate::handlers::pull_requests::reassign_reviewer,
        crate::handlers::pull_requests::assignment_history,

        crate::handlers::stats::assignment_stats,
    ),
    components(
        schemas(
            ApiError,
            ErrorBody,

            health::HealthResponse,
            health::ReadinessResponse,
            health::ReadinessChecks,
            health::ComponentStatus,

            Team,
            TeamMember,
            User,
            teams::CreateTeamRequest,
            teams::TeamResponse,
            teams::DeactivateTeamRequest,
            MassDeactivation,

            users::SetIsActiveRequest,
            users::UserResponse,
            users::ReviewAssignmentsResponse,

            PullRequest,
            PullRequestShort,
            PullRequestStatus,
            Reassignment,
            pull_requests::CreatePullRequestRequest,
            pull_requests::MergePullRequestRequest,
            pull_requests::ReassignRequest,
            pull_requests::PullRequestResponse,
            pull_requests::HistoryResponse,

            AssignmentEvent,
            AssignmentEventType,
            AssignmentSource,
            AssignmentStats,
            UserAssignmentStat,
            PullRequestAssignmentStat,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Rota API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_documents_every_route() {
        let spec = ApiDoc::openapi();
        for path in [
            "/health",
            "/team/add",
            "/team/get",
            "/team/deactivate",
            "/users/setIsActive",
            "/users/getReview",
            "/pullRequest/create",
            "/pullRequest/merge",
            "/pullRequest/reassign",
            "/pullRequest/history",
            "/stats/assignments",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn test_openapi_has_tags() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.unwrap();
        assert!(tags.iter().any(|t| t.name == "Pull Requests"));
        assert!(tags.iter().any(|t| t.name == "Health"));
    }

    #[test]
    fn test_error_schema_registered() {
        let spec = ApiDoc::openapi();
        let components = spec.components.unwrap();
        assert!(components.schemas.contains_key("ApiError"));
        assert!(components.schemas.contains_key("MassDeactivation"));
    }
}
