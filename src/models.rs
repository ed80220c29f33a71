use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Varchar};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(Self::Open),
            "MERGED" => Some(Self::Merged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentEventType {
    Assigned,
    Unassigned,
}

impl AssignmentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "ASSIGNED",
            Self::Unassigned => "UNASSIGNED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ASSIGNED" => Some(Self::Assigned),
            "UNASSIGNED" => Some(Self::Unassigned),
            _ => None,
        }
    }
}

/// Which workflow produced a reviewer link mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentSource {
    AutoAssign,
    ManualReassign,
    TeamDeactivation,
}

impl AssignmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoAssign => "AUTO_ASSIGN",
            Self::ManualReassign => "MANUAL_REASSIGN",
            Self::TeamDeactivation => "TEAM_DEACTIVATION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AUTO_ASSIGN" => Some(Self::AutoAssign),
            "MANUAL_REASSIGN" => Some(Self::ManualReassign),
            "TEAM_DEACTIVATION" => Some(Self::TeamDeactivation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    #[schema(example = "u1")]
    pub user_id: String,
    #[schema(example = "Alice")]
    pub username: String,
    #[schema(example = "backend")]
    pub team_name: String,
    pub is_active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub team_name: &'a str,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A member as submitted when a team is created.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamMember {
    #[schema(example = "u1")]
    pub user_id: String,
    #[schema(example = "Alice")]
    pub username: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Team {
    #[schema(example = "backend")]
    pub team_name: String,
    pub members: Vec<User>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PullRequest {
    #[schema(example = "pr-1001")]
    pub pull_request_id: String,
    #[schema(example = "Add search")]
    pub pull_request_name: String,
    #[schema(example = "u1")]
    pub author_id: String,
    pub status: PullRequestStatus,
    pub assigned_reviewers: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none", default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::pull_requests)]
pub struct PullRequestRow {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestRow {
    /// Attaches the current reviewer set, reported sorted by id.
    pub fn into_pull_request(self, mut reviewers: Vec<String>) -> Result<PullRequest, StorageError> {
        let status = PullRequestStatus::parse(&self.status).ok_or_else(|| {
            StorageError::msg(format!("unknown pull request status '{}'", self.status))
        })?;
        reviewers.sort();
        reviewers.dedup();

        Ok(PullRequest {
            pull_request_id: self.pull_request_id,
            pull_request_name: self.pull_request_name,
            author_id: self.author_id,
            status,
            assigned_reviewers: reviewers,
            created_at: self.created_at,
            merged_at: self.merged_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::pull_requests)]
pub struct NewPullRequest<'a> {
    pub pull_request_id: &'a str,
    pub pull_request_name: &'a str,
    pub author_id: &'a str,
    pub status: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::pull_request_reviewers)]
pub struct NewReviewerLink<'a> {
    pub pull_request_id: &'a str,
    pub reviewer_id: &'a str,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PullRequestShort {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PullRequestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssignmentEvent {
    pub id: i64,
    pub pull_request_id: String,
    pub reviewer_id: String,
    pub event_type: AssignmentEventType,
    pub source: AssignmentSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::review_assignment_events)]
pub struct AssignmentEventRow {
    pub id: i64,
    pub pull_request_id: String,
    pub reviewer_id: String,
    pub event_type: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AssignmentEventRow> for AssignmentEvent {
    type Error = StorageError;

    fn try_from(row: AssignmentEventRow) -> Result<Self, Self::Error> {
        let event_type = AssignmentEventType::parse(&row.event_type).ok_or_else(|| {
            StorageError::msg(format!("unknown assignment event type '{}'", row.event_type))
        })?;
        let source = AssignmentSource::parse(&row.source).ok_or_else(|| {
            StorageError::msg(format!("unknown assignment source '{}'", row.source))
        })?;

        Ok(Self {
            id: row.id,
            pull_request_id: row.pull_request_id,
            reviewer_id: row.reviewer_id,
            event_type,
            source,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::review_assignment_events)]
pub struct NewAssignmentEvent<'a> {
    pub pull_request_id: &'a str,
    pub reviewer_id: &'a str,
    pub event_type: &'a str,
    pub source: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, QueryableByName, Serialize, Deserialize, ToSchema)]
pub struct UserAssignmentStat {
    #[diesel(sql_type = Varchar)]
    pub user_id: String,
    #[diesel(sql_type = Varchar)]
    pub username: String,
    #[diesel(sql_type = Varchar)]
    pub team_name: String,
    #[diesel(sql_type = BigInt)]
    pub assigned_total: i64,
    #[diesel(sql_type = BigInt)]
    pub active_pull_requests: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, QueryableByName, Serialize, Deserialize, ToSchema)]
pub struct PullRequestAssignmentStat {
    #[diesel(sql_type = Varchar)]
    pub pull_request_id: String,
    #[diesel(sql_type = BigInt)]
    pub reviewer_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssignmentStats {
    pub per_user: Vec<UserAssignmentStat>,
    pub per_pull_request: Vec<PullRequestAssignmentStat>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trips_through_storage_text() {
        for status in [PullRequestStatus::Open, PullRequestStatus::Merged] {
            assert_eq!(PullRequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PullRequestStatus::parse("open"), None);
    }

    #[test]
    fn test_pull_request_serializes_wire_names() {
        let created = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let pr = PullRequest {
            pull_request_id: "pr-1".to_string(),
            pull_request_name: "Fix".to_string(),
            author_id: "u1".to_string(),
            status: PullRequestStatus::Open,
            assigned_reviewers: vec!["u2".to_string()],
            created_at: created,
            merged_at: None,
        };

        let json = serde_json::to_value(&pr).unwrap();
        assert_eq!(json["status"], "OPEN");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("mergedAt").is_none());
    }

    #[test]
    fn test_row_conversion_sorts_reviewers() {
        let row = PullRequestRow {
            pull_request_id: "pr-1".to_string(),
            pull_request_name: "Fix".to_string(),
            author_id: "u1".to_string(),
            status: "MERGED".to_string(),
            created_at: Utc::now(),
            merged_at: Some(Utc::now()),
        };

        let pr = row
            .into_pull_request(vec!["u3".to_string(), "u2".to_string()])
            .unwrap();
        assert_eq!(pr.status, PullRequestStatus::Merged);
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);
    }

    #[test]
    fn test_unknown_event_source_is_storage_error() {
        let row = AssignmentEventRow {
            id: 1,
            pull_request_id: "pr-1".to_string(),
            reviewer_id: "u2".to_string(),
            event_type: "ASSIGNED".to_string(),
            source: "SOMETHING_ELSE".to_string(),
            created_at: Utc::now(),
        };

        assert!(AssignmentEvent::try_from(row).is_err());
    }
}
