//! Assignment workflows.
//!
//! Every public operation validates its input, then runs as exactly one unit
//! of work against the store. Domain failures are raised inside the unit of
//! work so the store rolls back before the caller sees them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use super::clock::{Clock, SystemClock};
use super::deadline::Deadline;
use super::error::EngineError;
use super::selector::{CandidateSelector, RandomShuffler, Shuffler};
use super::validation;
use crate::models::{
    AssignmentEvent, AssignmentSource, AssignmentStats, NewPullRequest, PullRequest,
    PullRequestShort, PullRequestStatus, Team, TeamMember, User,
};
use crate::store::{ReviewStore, ReviewStoreExt, StoreTx, StoreTxExt};
use crate::telemetry::{AssignmentMetrics, NoopMetrics};

/// Reviewers requested for a new pull request.
pub const MAX_REVIEWERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Upper bound for single-entity workflows and reads.
    pub operation: Duration,
    /// Upper bound for mass deactivation.
    pub long_operation: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(30),
            long_operation: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Reassignment {
    #[serde(rename = "pr")]
    pub pull_request: PullRequest,
    pub replaced_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct MassDeactivation {
    pub deactivated: Vec<User>,
    /// Pull request ids moved away from each deactivated reviewer.
    #[serde(rename = "reassignments")]
    pub reassigned: BTreeMap<String, Vec<String>>,
    /// First failure reason per reviewer.
    pub skipped: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Operation,
    LongOperation,
}

/// What to do when no replacement reviewer is eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vacancy {
    Reject,
    Allow,
}

pub struct ReviewServiceBuilder {
    store: Arc<dyn ReviewStore>,
    shuffler: Option<Arc<dyn Shuffler>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<dyn AssignmentMetrics>>,
    timeouts: OperationTimeouts,
}

impl ReviewServiceBuilder {
    pub fn shuffler(mut self, shuffler: Arc<dyn Shuffler>) -> Self {
        self.shuffler = Some(shuffler);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn AssignmentMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn build(self) -> ReviewService {
        let shuffler = self
            .shuffler
            .unwrap_or_else(|| Arc::new(RandomShuffler::new()));

        ReviewService {
            store: self.store,
            selector: CandidateSelector::new(shuffler),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            timeouts: self.timeouts,
        }
    }
}

pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    selector: CandidateSelector,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn AssignmentMetrics>,
    timeouts: OperationTimeouts,
}

impl ReviewService {
    pub fn builder(store: Arc<dyn ReviewStore>) -> ReviewServiceBuilder {
        ReviewServiceBuilder {
            store,
            shuffler: None,
            clock: None,
            metrics: None,
            timeouts: OperationTimeouts::default(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn timeouts(&self) -> OperationTimeouts {
        self.timeouts
    }

    fn bound(&self, deadline: Deadline, budget: Budget) -> Deadline {
        let limit = match budget {
            Budget::Operation => self.timeouts.operation,
            Budget::LongOperation => self.timeouts.long_operation,
        };
        deadline.earliest(Deadline::within(limit))
    }

    #[instrument(skip(self, members, deadline), fields(members = members.len()))]
    pub fn create_team(
        &self,
        team_name: &str,
        members: &[TeamMember],
        deadline: Deadline,
    ) -> Result<Team, EngineError> {
        let team_name = validation::team_name(team_name)?;
        let mut users = Vec::with_capacity(members.len());
        for member in members {
            users.push(User {
                user_id: validation::user_id(&member.user_id)?.to_string(),
                username: validation::username(&member.username)?.to_string(),
                team_name: team_name.to_string(),
                is_active: member.is_active,
            });
        }

        let deadline = self.bound(deadline, Budget::Operation);
        let now = self.clock.now();

        let team = self.store.atomically(&deadline, |tx| {
            tx.insert_team(team_name, now)?;
            for user in &users {
                tx.upsert_user(user, now)?;
            }
            load_team(tx, team_name)
        })?;

        self.metrics.team_created(members.len());
        info!(members = team.members.len(), "Team created");
        Ok(team)
    }

    #[instrument(skip(self, deadline))]
    pub fn get_team(&self, team_name: &str, deadline: Deadline) -> Result<Team, EngineError> {
        let team_name = validation::team_name(team_name)?;
        let deadline = self.bound(deadline, Budget::Operation);

        self.store
            .atomically(&deadline, |tx| load_team(tx, team_name))
    }

    #[instrument(skip(self, deadline))]
    pub fn set_user_activity(
        &self,
        user_id: &str,
        is_active: bool,
        deadline: Deadline,
    ) -> Result<User, EngineError> {
        let user_id = validation::user_id(user_id)?;
        let deadline = self.bound(deadline, Budget::Operation);
        let now = self.clock.now();

        let user = self.store.atomically(&deadline, |tx| {
            tx.set_user_activity(user_id, is_active, now)?
                .ok_or(EngineError::UserNotFound)
        })?;

        info!(team_name = %user.team_name, "User activity updated");
        Ok(user)
    }

    /// Opens a pull request and auto-assigns up to [`MAX_REVIEWERS`] active
    /// teammates of the author.
    #[instrument(skip(self, pull_request_name, deadline))]
    pub fn create_pull_request(
        &self,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
        deadline: Deadline,
    ) -> Result<PullRequest, EngineError> {
        let pull_request_id = validation::pull_request_id(pull_request_id)?;
        let pull_request_name = validation::pull_request_name(pull_request_name)?;
        let author_id = validation::user_id(author_id)?;

        let deadline = self.bound(deadline, Budget::Operation);
        let now = self.clock.now();

        let pull_request = self.store.atomically(&deadline, |tx| {
            if tx.pull_request_exists(pull_request_id)? {
                return Err(EngineError::PullRequestAlreadyExists);
            }
            let author = tx
                .find_user(author_id)?
                .ok_or(EngineError::UserNotFound)?;

            let exclude = BTreeSet::from([author.user_id.clone()]);
            let candidates = self.selector.eligible(tx, &author.team_name, &exclude)?;
            let reviewers = self.selector.pick(&candidates, MAX_REVIEWERS);
            deadline.check()?;

            tx.insert_pull_request(&NewPullRequest {
                pull_request_id,
                pull_request_name,
                author_id,
                status: PullRequestStatus::Open.as_str(),
                created_at: now,
            })?;
            for reviewer_id in &reviewers {
                tx.assign_reviewer(pull_request_id, reviewer_id, AssignmentSource::AutoAssign, now)?;
            }

            load_pull_request(tx, pull_request_id, false)
        })?;

        self.metrics
            .pull_request_created(pull_request.assigned_reviewers.len());
        info!(
            reviewers = ?pull_request.assigned_reviewers,
            "Pull request created"
        );
        Ok(pull_request)
    }

    /// Replaces `old_reviewer_id` with a random active teammate of theirs.
    /// Nothing changes when no teammate is eligible.
    #[instrument(skip(self, deadline))]
    pub fn reassign_reviewer(
        &self,
        pull_request_id: &str,
        old_reviewer_id: &str,
        deadline: Deadline,
    ) -> Result<Reassignment, EngineError> {
        let pull_request_id = validation::pull_request_id(pull_request_id)?;
        let old_reviewer_id = validation::user_id(old_reviewer_id)?;

        let deadline = self.bound(deadline, Budget::Operation);
        let now = self.clock.now();

        let result = self.store.atomically(&deadline, |tx| {
            let pull_request = load_pull_request(tx, pull_request_id, true)?;
            ensure_reviewer_mutable(&pull_request, old_reviewer_id)?;
            let outgoing = tx
                .find_user(old_reviewer_id)?
                .ok_or(EngineError::UserNotFound)?;

            let replaced_by = self
                .replace_reviewer(
                    tx,
                    &pull_request,
                    &outgoing,
                    AssignmentSource::ManualReassign,
                    now,
                    Vacancy::Reject,
                    &deadline,
                )?
                .ok_or(EngineError::NoCandidateAvailable)?;

            Ok(Reassignment {
                pull_request: load_pull_request(tx, pull_request_id, false)?,
                replaced_by,
            })
        });

        match &result {
            Ok(reassignment) => {
                self.metrics
                    .reviewer_reassigned(AssignmentSource::ManualReassign);
                info!(replaced_by = %reassignment.replaced_by, "Reviewer reassigned");
            }
            Err(err) if err.is_domain() => info!(error = %err, "Reassignment rejected"),
            Err(err) => warn!(error = %err, "Reassignment failed"),
        }
        result
    }

    /// OPEN -> MERGED. Merging an already merged pull request returns it
    /// unchanged.
    #[instrument(skip(self, deadline))]
    pub fn merge_pull_request(
        &self,
        pull_request_id: &str,
        deadline: Deadline,
    ) -> Result<PullRequest, EngineError> {
        let pull_request_id = validation::pull_request_id(pull_request_id)?;

        let deadline = self.bound(deadline, Budget::Operation);
        let now = self.clock.now();

        let (pull_request, transitioned) = self.store.atomically(&deadline, |tx| {
            let current = load_pull_request(tx, pull_request_id, true)?;
            if current.status == PullRequestStatus::Merged && current.merged_at.is_some() {
                return Ok((current, false));
            }
            tx.mark_merged(pull_request_id, now)?;
            Ok((load_pull_request(tx, pull_request_id, false)?, true))
        })?;

        if transitioned {
            self.metrics.pull_request_merged();
            info!("Pull request merged");
        } else {
            debug!("Pull request already merged");
        }
        Ok(pull_request)
    }

    /// Deactivates `user_ids` (every active member when empty) and moves each
    /// of their open reviews to an active teammate.
    ///
    /// Deactivation is all-or-nothing. Each pull request is handed over under
    /// its own savepoint: a failure there is recorded in `skipped` and only
    /// that pull request's writes are undone. An expired deadline aborts the
    /// whole operation.
    #[instrument(skip(self, user_ids, deadline), fields(requested = user_ids.len()))]
    pub fn mass_deactivate(
        &self,
        team_name: &str,
        user_ids: &[String],
        deadline: Deadline,
    ) -> Result<MassDeactivation, EngineError> {
        let team_name = validation::team_name(team_name)?;
        let user_ids = user_ids
            .iter()
            .map(|user_id| validation::user_id(user_id).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        let deadline = self.bound(deadline, Budget::LongOperation);

        let team = self
            .store
            .atomically(&deadline, |tx| load_team(tx, team_name))?;
        let targets = resolve_targets(&team, &user_ids)?;
        if targets.is_empty() {
            info!("No active members to deactivate");
            return Ok(MassDeactivation::default());
        }

        let now = self.clock.now();

        let (outcome, replaced, vacated) = self.store.atomically(&deadline, |tx| {
            let deactivated = tx.deactivate_users(&targets, now)?;
            let open = tx.open_pull_requests_by_reviewer(&targets)?;

            let mut reassigned: BTreeMap<String, Vec<String>> = BTreeMap::new();
            let mut skipped: BTreeMap<String, String> = BTreeMap::new();
            let mut replaced = 0usize;
            let mut vacated = 0usize;

            for outgoing in &deactivated {
                let Some(pull_request_ids) = open.get(&outgoing.user_id) else {
                    continue;
                };

                for pull_request_id in pull_request_ids {
                    deadline.check()?;

                    let attempt = tx.nested(|tx| {
                        let pull_request = load_pull_request(tx, pull_request_id, true)?;
                        ensure_reviewer_mutable(&pull_request, &outgoing.user_id)?;
                        self.replace_reviewer(
                            tx,
                            &pull_request,
                            outgoing,
                            AssignmentSource::TeamDeactivation,
                            now,
                            Vacancy::Allow,
                            &deadline,
                        )
                    });

                    match attempt {
                        Ok(Some(replacement)) => {
                            replaced += 1;
                            debug!(
                                user_id = %outgoing.user_id,
                                pull_request_id = %pull_request_id,
                                replaced_by = %replacement,
                                "Review handed over"
                            );
                        }
                        Ok(None) => {
                            vacated += 1;
                            warn!(
                                user_id = %outgoing.user_id,
                                pull_request_id = %pull_request_id,
                                "No active teammate left, reviewer slot vacated"
                            );
                        }
                        Err(EngineError::DeadlineExceeded) => {
                            return Err(EngineError::DeadlineExceeded)
                        }
                        Err(err) => {
                            warn!(
                                user_id = %outgoing.user_id,
                                pull_request_id = %pull_request_id,
                                error = %err,
                                "Skipping pull request during deactivation"
                            );
                            skipped
                                .entry(outgoing.user_id.clone())
                                .or_insert_with(|| err.public_message());
                            continue;
                        }
                    }

                    reassigned
                        .entry(outgoing.user_id.clone())
                        .or_default()
                        .push(pull_request_id.clone());
                }
            }

            Ok((
                MassDeactivation {
                    deactivated,
                    reassigned,
                    skipped,
                },
                replaced,
                vacated,
            ))
        })?;

        self.metrics.users_deactivated(outcome.deactivated.len());
        for _ in 0..replaced {
            self.metrics
                .reviewer_reassigned(AssignmentSource::TeamDeactivation);
        }
        for _ in 0..vacated {
            self.metrics
                .reviewer_unassigned(AssignmentSource::TeamDeactivation);
        }
        info!(
            deactivated = outcome.deactivated.len(),
            replaced,
            vacated,
            skipped = outcome.skipped.len(),
            "Team members deactivated"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, deadline))]
    pub fn review_assignments(
        &self,
        user_id: &str,
        deadline: Deadline,
    ) -> Result<Vec<PullRequestShort>, EngineError> {
        let user_id = validation::user_id(user_id)?;
        let deadline = self.bound(deadline, Budget::Operation);

        self.store.atomically(&deadline, |tx| {
            if tx.find_user(user_id)?.is_none() {
                return Err(EngineError::UserNotFound);
            }
            tx.review_assignments(user_id)
        })
    }

    #[instrument(skip(self, deadline))]
    pub fn assignment_stats(&self, deadline: Deadline) -> Result<AssignmentStats, EngineError> {
        let deadline = self.bound(deadline, Budget::Operation);
        self.store
            .atomically(&deadline, |tx| tx.assignment_stats())
    }

    #[instrument(skip(self, deadline))]
    pub fn assignment_history(
        &self,
        pull_request_id: &str,
        deadline: Deadline,
    ) -> Result<Vec<AssignmentEvent>, EngineError> {
        let pull_request_id = validation::pull_request_id(pull_request_id)?;
        let deadline = self.bound(deadline, Budget::Operation);

        self.store.atomically(&deadline, |tx| {
            if !tx.pull_request_exists(pull_request_id)? {
                return Err(EngineError::PullRequestNotFound);
            }
            tx.assignment_events(pull_request_id)
        })
    }

    pub fn health_check(&self) -> Result<(), EngineError> {
        self.store.ping()
    }

    /// Removes `outgoing` from `pull_request` and seats one eligible teammate
    /// in their place. Returns the new reviewer, or `None` when the seat was
    /// left empty under [`Vacancy::Allow`].
    #[allow(clippy::too_many_arguments)]
    fn replace_reviewer(
        &self,
        tx: &mut dyn StoreTx,
        pull_request: &PullRequest,
        outgoing: &User,
        source: AssignmentSource,
        now: DateTime<Utc>,
        vacancy: Vacancy,
        deadline: &Deadline,
    ) -> Result<Option<String>, EngineError> {
        let mut exclude: BTreeSet<String> = pull_request.assigned_reviewers.iter().cloned().collect();
        exclude.insert(outgoing.user_id.clone());
        exclude.insert(pull_request.author_id.clone());

        let candidates = self.selector.eligible(tx, &outgoing.team_name, &exclude)?;
        let replacement = self.selector.pick(&candidates, 1).into_iter().next();
        if replacement.is_none() && vacancy == Vacancy::Reject {
            return Err(EngineError::NoCandidateAvailable);
        }
        deadline.check()?;

        tx.unassign_reviewer(&pull_request.pull_request_id, &outgoing.user_id, source, now)?;
        if let Some(new_reviewer) = &replacement {
            tx.assign_reviewer(&pull_request.pull_request_id, new_reviewer, source, now)?;
        }
        Ok(replacement)
    }
}

fn load_team(tx: &mut dyn StoreTx, team_name: &str) -> Result<Team, EngineError> {
    let members = tx.team_members(team_name)?;
    if members.is_empty() && !tx.team_exists(team_name)? {
        return Err(EngineError::TeamNotFound);
    }
    Ok(Team {
        team_name: team_name.to_string(),
        members,
    })
}

fn load_pull_request(
    tx: &mut dyn StoreTx,
    pull_request_id: &str,
    lock: bool,
) -> Result<PullRequest, EngineError> {
    tx.find_pull_request(pull_request_id, lock)?
        .ok_or(EngineError::PullRequestNotFound)
}

fn ensure_reviewer_mutable(pull_request: &PullRequest, reviewer_id: &str) -> Result<(), EngineError> {
    if pull_request.status == PullRequestStatus::Merged {
        return Err(EngineError::PullRequestAlreadyMerged);
    }
    if !pull_request
        .assigned_reviewers
        .iter()
        .any(|id| id == reviewer_id)
    {
        return Err(EngineError::ReviewerNotAssigned);
    }
    Ok(())
}

/// Active members to deactivate, in request order with duplicates dropped.
fn resolve_targets(team: &Team, requested: &[String]) -> Result<Vec<String>, EngineError> {
    if requested.is_empty() {
        return Ok(team
            .members
            .iter()
            .filter(|m| m.is_active)
            .map(|m| m.user_id.clone())
            .collect());
    }

    let mut seen = BTreeSet::new();
    let mut targets = Vec::new();
    for user_id in requested {
        if !seen.insert(user_id.as_str()) {
            continue;
        }
        let member = team
            .members
            .iter()
            .find(|m| &m.user_id == user_id)
            .ok_or(EngineError::UserNotFound)?;
        if member.is_active {
            targets.push(user_id.clone());
        }
    }
    Ok(targets)
}
