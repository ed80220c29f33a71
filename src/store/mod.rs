//! Persistence boundary for teams, users, pull requests, reviewer links and
//! the assignment audit log.
//!
//! A [`ReviewStore`] runs one unit of work inside one transaction. The work
//! receives a [`StoreTx`] scoped to that transaction; returning `Err` (or
//! panicking) discards every write it made.

pub mod memory;
pub mod postgres;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::engine::{Deadline, EngineError, StorageError};
use crate::models::{
    AssignmentEvent, AssignmentSource, AssignmentStats, NewPullRequest, PullRequest,
    PullRequestShort, User,
};

pub use memory::MemoryStore;
pub use postgres::{DbPool, PgStore};

/// A unit of work run against a transaction.
pub type Work<'w> = dyn FnMut(&mut dyn StoreTx) -> Result<(), EngineError> + 'w;

pub trait ReviewStore: Send + Sync {
    /// Runs `work` in a fresh transaction, committing only when it returns
    /// `Ok` and `deadline` has not passed.
    fn run_atomically(&self, deadline: &Deadline, work: &mut Work<'_>) -> Result<(), EngineError>;

    fn ping(&self) -> Result<(), EngineError>;

    fn backend(&self) -> &'static str;
}

/// Operations available inside a transaction.
pub trait StoreTx {
    fn insert_team(&mut self, team_name: &str, now: DateTime<Utc>) -> Result<(), EngineError>;

    fn team_exists(&mut self, team_name: &str) -> Result<bool, EngineError>;

    /// All members regardless of activity, ordered by username.
    fn team_members(&mut self, team_name: &str) -> Result<Vec<User>, EngineError>;

    /// Inserts or updates username, team and activity.
    fn upsert_user(&mut self, user: &User, now: DateTime<Utc>) -> Result<(), EngineError>;

    fn find_user(&mut self, user_id: &str) -> Result<Option<User>, EngineError>;

    fn set_user_activity(
        &mut self,
        user_id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, EngineError>;

    /// Deactivates every listed user, returned in the order given.
    fn deactivate_users(
        &mut self,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<User>, EngineError>;

    /// Active members of a team minus `exclude`, ordered by id.
    fn active_team_members(
        &mut self,
        team_name: &str,
        exclude: &BTreeSet<String>,
    ) -> Result<Vec<User>, EngineError>;

    /// Fails with `PullRequestAlreadyExists` on a duplicate id.
    fn insert_pull_request(&mut self, pull_request: &NewPullRequest<'_>)
        -> Result<(), EngineError>;

    fn pull_request_exists(&mut self, pull_request_id: &str) -> Result<bool, EngineError>;

    /// Loads a pull request with its reviewers. `lock` takes a row lock held
    /// until the transaction ends.
    fn find_pull_request(
        &mut self,
        pull_request_id: &str,
        lock: bool,
    ) -> Result<Option<PullRequest>, EngineError>;

    /// Sets status MERGED; an existing merge time is kept.
    fn mark_merged(&mut self, pull_request_id: &str, now: DateTime<Utc>)
        -> Result<(), EngineError>;

    /// Inserts the reviewer link together with its ASSIGNED event.
    fn assign_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    /// Deletes the reviewer link together with an UNASSIGNED event. Fails with
    /// `ReviewerNotAssigned` when there is no such link.
    fn unassign_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    /// OPEN pull requests per reviewer, ids ascending.
    fn open_pull_requests_by_reviewer(
        &mut self,
        reviewer_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, EngineError>;

    /// Pull requests the user currently reviews, newest first.
    fn review_assignments(&mut self, user_id: &str) -> Result<Vec<PullRequestShort>, EngineError>;

    fn assignment_stats(&mut self) -> Result<AssignmentStats, EngineError>;

    /// Audit events of a pull request in sequence order.
    fn assignment_events(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Vec<AssignmentEvent>, EngineError>;

    /// Runs `work` in a nested scope; on `Err` only its writes are undone.
    fn savepoint(&mut self, work: &mut Work<'_>) -> Result<(), EngineError>;
}

/// Value-returning wrappers over the object-safe callbacks.
pub trait ReviewStoreExt: ReviewStore {
    fn atomically<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, EngineError>,
    {
        let mut work = Some(work);
        let mut output = None;
        self.run_atomically(deadline, &mut |tx: &mut dyn StoreTx| {
            let work = work
                .take()
                .ok_or_else(|| StorageError::msg("unit of work invoked twice"))?;
            output = Some(work(tx)?);
            Ok(())
        })?;
        output.ok_or_else(|| StorageError::msg("unit of work produced no result").into())
    }
}

impl<S: ReviewStore + ?Sized> ReviewStoreExt for S {}

pub trait StoreTxExt: StoreTx {
    fn nested<T, F>(&mut self, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, EngineError>,
    {
        let mut work = Some(work);
        let mut output = None;
        self.savepoint(&mut |tx: &mut dyn StoreTx| {
            let work = work
                .take()
                .ok_or_else(|| StorageError::msg("savepoint work invoked twice"))?;
            output = Some(work(tx)?);
            Ok(())
        })?;
        output.ok_or_else(|| StorageError::msg("savepoint produced no result").into())
    }
}

impl<T: StoreTx + ?Sized> StoreTxExt for T {}
