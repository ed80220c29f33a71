//! HTTP error body and the mapping from engine errors onto it.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::engine::EngineError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "NOT_FOUND")]
    pub code: String,
    #[schema(example = "pull request not found")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request(
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(code, message)))
    }

    pub fn not_found(
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(code, message)))
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(code, message)))
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::GATEWAY_TIMEOUT, Json(Self::new(code, message)))
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(code, message)),
        )
    }

    /// Storage details are logged here and never returned to the client.
    pub fn from_engine(err: EngineError) -> (StatusCode, Json<Self>) {
        let message = err.to_string();
        match err {
            EngineError::TeamAlreadyExists => Self::bad_request("TEAM_EXISTS", message),
            EngineError::TeamNotFound
            | EngineError::UserNotFound
            | EngineError::PullRequestNotFound => Self::not_found("NOT_FOUND", message),
            EngineError::PullRequestAlreadyExists => Self::conflict("PR_EXISTS", message),
            EngineError::PullRequestAlreadyMerged => Self::conflict("PR_MERGED", message),
            EngineError::ReviewerNotAssigned => Self::conflict("NOT_ASSIGNED", message),
            EngineError::NoCandidateAvailable => Self::conflict("NO_CANDIDATE", message),
            EngineError::Validation(_) => Self::bad_request("VALIDATION_ERROR", message),
            EngineError::DeadlineExceeded => Self::timeout("TIMEOUT", message),
            EngineError::Storage(source) => {
                error!(error = %source, "Storage failure");
                Self::internal("INTERNAL_ERROR", "internal server error")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;
