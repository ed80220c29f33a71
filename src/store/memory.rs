//! In-process store used by tests and `STORAGE_BACKEND=memory`.
//!
//! Every transaction works on a private copy of the relations and swaps it in
//! on success. A failed or panicking unit of work leaves the committed copy
//! untouched. Transactions are serialised by a single mutex, which also
//! stands in for row locks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::{ReviewStore, StoreTx, Work};
use crate::engine::{Deadline, EngineError, StorageError};
use crate::models::{
    AssignmentEvent, AssignmentEventType, AssignmentSource, AssignmentStats, NewPullRequest,
    PullRequest, PullRequestAssignmentStat, PullRequestShort, PullRequestStatus,
    UserAssignmentStat, User,
};

#[derive(Debug, Clone)]
struct PullRequestRecord {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    status: PullRequestStatus,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct Relations {
    teams: BTreeMap<String, DateTime<Utc>>,
    users: BTreeMap<String, User>,
    pull_requests: BTreeMap<String, PullRequestRecord>,
    /// (pull request id, reviewer id) -> assigned at
    reviewer_links: BTreeMap<(String, String), DateTime<Utc>>,
    events: Vec<AssignmentEvent>,
    next_event_id: i64,
}

impl Relations {
    fn reviewers_of(&self, pull_request_id: &str) -> Vec<String> {
        self.reviewer_links
            .keys()
            .filter(|(pr, _)| pr == pull_request_id)
            .map(|(_, reviewer)| reviewer.clone())
            .collect()
    }

    fn record_event(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        event_type: AssignmentEventType,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) {
        self.next_event_id += 1;
        self.events.push(AssignmentEvent {
            id: self.next_event_id,
            pull_request_id: pull_request_id.to_string(),
            reviewer_id: reviewer_id.to_string(),
            event_type,
            source,
            created_at: now,
        });
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Relations>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for MemoryStore {
    fn run_atomically(&self, deadline: &Deadline, work: &mut Work<'_>) -> Result<(), EngineError> {
        deadline.check()?;

        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = committed.clone();

        work(&mut MemoryTx {
            relations: &mut working,
        })?;

        deadline.check()?;
        *committed = working;
        Ok(())
    }

    fn ping(&self) -> Result<(), EngineError> {
        drop(self.committed.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTx<'a> {
    relations: &'a mut Relations,
}

impl StoreTx for MemoryTx<'_> {
    fn insert_team(&mut self, team_name: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.relations.teams.contains_key(team_name) {
            return Err(EngineError::TeamAlreadyExists);
        }
        self.relations.teams.insert(team_name.to_string(), now);
        Ok(())
    }

    fn team_exists(&mut self, team_name: &str) -> Result<bool, EngineError> {
        Ok(self.relations.teams.contains_key(team_name))
    }

    fn team_members(&mut self, team_name: &str) -> Result<Vec<User>, EngineError> {
        let mut members: Vec<User> = self
            .relations
            .users
            .values()
            .filter(|u| u.team_name == team_name)
            .cloned()
            .collect();
        members.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(members)
    }

    fn upsert_user(&mut self, user: &User, _now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.relations.teams.contains_key(&user.team_name) {
            return Err(StorageError::msg(format!(
                "user '{}' references missing team '{}'",
                user.user_id, user.team_name
            ))
            .into());
        }
        self.relations
            .users
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    fn find_user(&mut self, user_id: &str) -> Result<Option<User>, EngineError> {
        Ok(self.relations.users.get(user_id).cloned())
    }

    fn set_user_activity(
        &mut self,
        user_id: &str,
        is_active: bool,
        _now: DateTime<Utc>,
    ) -> Result<Option<User>, EngineError> {
        Ok(self.relations.users.get_mut(user_id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    fn deactivate_users(
        &mut self,
        user_ids: &[String],
        _now: DateTime<Utc>,
    ) -> Result<Vec<User>, EngineError> {
        let mut deactivated = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(user) = self.relations.users.get_mut(user_id) {
                user.is_active = false;
                deactivated.push(user.clone());
            }
        }
        Ok(deactivated)
    }

    fn active_team_members(
        &mut self,
        team_name: &str,
        exclude: &BTreeSet<String>,
    ) -> Result<Vec<User>, EngineError> {
        Ok(self
            .relations
            .users
            .values()
            .filter(|u| u.team_name == team_name && u.is_active && !exclude.contains(&u.user_id))
            .cloned()
            .collect())
    }

    fn insert_pull_request(
        &mut self,
        pull_request: &NewPullRequest<'_>,
    ) -> Result<(), EngineError> {
        if self
            .relations
            .pull_requests
            .contains_key(pull_request.pull_request_id)
        {
            return Err(EngineError::PullRequestAlreadyExists);
        }
        if !self.relations.users.contains_key(pull_request.author_id) {
            return Err(StorageError::msg(format!(
                "pull request author '{}' does not exist",
                pull_request.author_id
            ))
            .into());
        }
        let status = PullRequestStatus::parse(pull_request.status).ok_or_else(|| {
            StorageError::msg(format!("unknown pull request status '{}'", pull_request.status))
        })?;

        self.relations.pull_requests.insert(
            pull_request.pull_request_id.to_string(),
            PullRequestRecord {
                pull_request_id: pull_request.pull_request_id.to_string(),
                pull_request_name: pull_request.pull_request_name.to_string(),
                author_id: pull_request.author_id.to_string(),
                status,
                created_at: pull_request.created_at,
                merged_at: None,
            },
        );
        Ok(())
    }

    fn pull_request_exists(&mut self, pull_request_id: &str) -> Result<bool, EngineError> {
        Ok(self.relations.pull_requests.contains_key(pull_request_id))
    }

    fn find_pull_request(
        &mut self,
        pull_request_id: &str,
        _lock: bool,
    ) -> Result<Option<PullRequest>, EngineError> {
        let Some(record) = self.relations.pull_requests.get(pull_request_id) else {
            return Ok(None);
        };

        Ok(Some(PullRequest {
            pull_request_id: record.pull_request_id.clone(),
            pull_request_name: record.pull_request_name.clone(),
            author_id: record.author_id.clone(),
            status: record.status,
            assigned_reviewers: self.relations.reviewers_of(pull_request_id),
            created_at: record.created_at,
            merged_at: record.merged_at,
        }))
    }

    fn mark_merged(
        &mut self,
        pull_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let record = self
            .relations
            .pull_requests
            .get_mut(pull_request_id)
            .ok_or(EngineError::PullRequestNotFound)?;
        record.status = PullRequestStatus::Merged;
        record.merged_at.get_or_insert(now);
        Ok(())
    }

    fn assign_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self.relations.pull_requests.contains_key(pull_request_id)
            || !self.relations.users.contains_key(reviewer_id)
        {
            return Err(StorageError::msg(format!(
                "reviewer link ({pull_request_id}, {reviewer_id}) references missing rows"
            ))
            .into());
        }

        let key = (pull_request_id.to_string(), reviewer_id.to_string());
        if self.relations.reviewer_links.contains_key(&key) {
            return Err(StorageError::msg(format!(
                "reviewer '{reviewer_id}' already assigned to '{pull_request_id}'"
            ))
            .into());
        }
        self.relations.reviewer_links.insert(key, now);
        self.relations.record_event(
            pull_request_id,
            reviewer_id,
            AssignmentEventType::Assigned,
            source,
            now,
        );
        Ok(())
    }

    fn unassign_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let key = (pull_request_id.to_string(), reviewer_id.to_string());
        if self.relations.reviewer_links.remove(&key).is_none() {
            return Err(EngineError::ReviewerNotAssigned);
        }
        self.relations.record_event(
            pull_request_id,
            reviewer_id,
            AssignmentEventType::Unassigned,
            source,
            now,
        );
        Ok(())
    }

    fn open_pull_requests_by_reviewer(
        &mut self,
        reviewer_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        let wanted: BTreeSet<&String> = reviewer_ids.iter().collect();
        let mut by_reviewer: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (pull_request_id, reviewer_id) in self.relations.reviewer_links.keys() {
            if !wanted.contains(reviewer_id) {
                continue;
            }
            let open = self
                .relations
                .pull_requests
                .get(pull_request_id)
                .is_some_and(|pr| pr.status == PullRequestStatus::Open);
            if open {
                by_reviewer
                    .entry(reviewer_id.clone())
                    .or_default()
                    .push(pull_request_id.clone());
            }
        }

        for ids in by_reviewer.values_mut() {
            ids.sort();
        }
        Ok(by_reviewer)
    }

    fn review_assignments(&mut self, user_id: &str) -> Result<Vec<PullRequestShort>, EngineError> {
        let mut records: Vec<&PullRequestRecord> = self
            .relations
            .reviewer_links
            .keys()
            .filter(|(_, reviewer)| reviewer == user_id)
            .filter_map(|(pr, _)| self.relations.pull_requests.get(pr))
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.pull_request_id.cmp(&b.pull_request_id))
        });

        Ok(records
            .into_iter()
            .map(|pr| PullRequestShort {
                pull_request_id: pr.pull_request_id.clone(),
                pull_request_name: pr.pull_request_name.clone(),
                author_id: pr.author_id.clone(),
                status: pr.status,
            })
            .collect())
    }

    fn assignment_stats(&mut self) -> Result<AssignmentStats, EngineError> {
        let mut per_user: Vec<UserAssignmentStat> = self
            .relations
            .users
            .values()
            .map(|user| {
                let mut assigned_total = 0;
                let mut active_pull_requests = 0;
                for (pr, _) in self
                    .relations
                    .reviewer_links
                    .keys()
                    .filter(|(_, reviewer)| reviewer == &user.user_id)
                {
                    assigned_total += 1;
                    let open = self
                        .relations
                        .pull_requests
                        .get(pr)
                        .is_some_and(|p| p.status == PullRequestStatus::Open);
                    if open {
                        active_pull_requests += 1;
                    }
                }
                UserAssignmentStat {
                    user_id: user.user_id.clone(),
                    username: user.username.clone(),
                    team_name: user.team_name.clone(),
                    assigned_total,
                    active_pull_requests,
                }
            })
            .collect();
        per_user.sort_by(|a, b| {
            b.assigned_total
                .cmp(&a.assigned_total)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let mut per_pull_request: Vec<PullRequestAssignmentStat> = self
            .relations
            .pull_requests
            .keys()
            .map(|id| PullRequestAssignmentStat {
                pull_request_id: id.clone(),
                reviewer_count: self.relations.reviewers_of(id).len() as i64,
            })
            .collect();
        per_pull_request.sort_by(|a, b| {
            b.reviewer_count
                .cmp(&a.reviewer_count)
                .then_with(|| a.pull_request_id.cmp(&b.pull_request_id))
        });

        Ok(AssignmentStats {
            per_user,
            per_pull_request,
        })
    }

    fn assignment_events(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Vec<AssignmentEvent>, EngineError> {
        Ok(self
            .relations
            .events
            .iter()
            .filter(|e| e.pull_request_id == pull_request_id)
            .cloned()
            .collect())
    }

    fn savepoint(&mut self, work: &mut Work<'_>) -> Result<(), EngineError> {
        let snapshot = self.relations.clone();
        let result = work(self);
        if result.is_err() {
            *self.relations = snapshot;
        }
        result
    }
}
