//! Error kinds produced by the assignment engine.

use std::fmt;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
}

/// Opaque infrastructure failure: pool, connection, query or integrity.
pub struct StorageError(Box<dyn std::error::Error + Send + Sync>);

impl StorageError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

impl fmt::Debug for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorageError").field(&self.0).finish()
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("team already exists")]
    TeamAlreadyExists,
    #[error("team not found")]
    TeamNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("pull request already exists")]
    PullRequestAlreadyExists,
    #[error("pull request not found")]
    PullRequestNotFound,
    #[error("pull request already merged")]
    PullRequestAlreadyMerged,
    #[error("reviewer is not assigned to this pull request")]
    ReviewerNotAssigned,
    #[error("no active replacement candidate in team")]
    NoCandidateAvailable,
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// True for outcomes the caller caused, as opposed to infrastructure faults.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::DeadlineExceeded)
    }

    /// Message safe to hand to a caller; storage detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Maps a unique violation to `conflict`, everything else through `From`.
    pub(crate) fn from_insert(err: DieselError, conflict: EngineError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => conflict,
            other => other.into(),
        }
    }
}

impl From<DieselError> for EngineError {
    fn from(err: DieselError) -> Self {
        match &err {
            // Postgres cancels a statement with SQLSTATE 57014 once `statement_timeout` elapses.
            DieselError::DatabaseError(_, info) if info.message().contains("statement timeout") => {
                Self::DeadlineExceeded
            }
            _ => Self::Storage(StorageError::new(err)),
        }
    }
}

impl From<diesel::r2d2::PoolError> for EngineError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Storage(StorageError::new(err))
    }
}
