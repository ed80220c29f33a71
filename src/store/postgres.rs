//! PostgreSQL store on top of diesel and an r2d2 pool.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::upsert::excluded;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{Timestamptz, Varchar};
use tracing::{debug, instrument};

use super::{ReviewStore, StoreTx, Work};
use crate::engine::{Deadline, EngineError, StorageError};
use crate::models::{
    AssignmentEvent, AssignmentEventRow, AssignmentEventType, AssignmentSource, AssignmentStats,
    NewAssignmentEvent, NewPullRequest, NewReviewerLink, NewUser, PullRequest,
    PullRequestAssignmentStat, PullRequestRow, PullRequestShort, PullRequestStatus, User,
    UserAssignmentStat,
};
use crate::schema::{pull_request_reviewers, pull_requests, review_assignment_events, teams, users};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

const USER_STATS_QUERY: &str = "\
    SELECT u.user_id, u.username, u.team_name, \
           COUNT(r.pull_request_id) AS assigned_total, \
           COALESCE(SUM(CASE WHEN p.status = 'OPEN' THEN 1 ELSE 0 END), 0) AS active_pull_requests \
    FROM users u \
    LEFT JOIN pull_request_reviewers r ON r.reviewer_id = u.user_id \
    LEFT JOIN pull_requests p ON p.pull_request_id = r.pull_request_id \
    GROUP BY u.user_id, u.username, u.team_name \
    ORDER BY assigned_total DESC, u.user_id ASC";

const PULL_REQUEST_STATS_QUERY: &str = "\
    SELECT p.pull_request_id, COUNT(r.reviewer_id) AS reviewer_count \
    FROM pull_requests p \
    LEFT JOIN pull_request_reviewers r ON r.pull_request_id = p.pull_request_id \
    GROUP BY p.pull_request_id \
    ORDER BY reviewer_count DESC, p.pull_request_id ASC";

/// Readiness probes give up on the pool after this long.
const PING_TIMEOUT: Duration = Duration::from_secs(2);

const MARK_MERGED_QUERY: &str = "\
    UPDATE pull_requests \
    SET status = 'MERGED', merged_at = COALESCE(merged_at, $2) \
    WHERE pull_request_id = $1";

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn connection(
        &self,
        deadline: &Deadline,
    ) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, EngineError> {
        let conn = match deadline.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining.max(Duration::from_millis(1))),
            None => self.pool.get(),
        };
        conn.map_err(|e| {
            if deadline.is_expired() {
                EngineError::DeadlineExceeded
            } else {
                EngineError::from(e)
            }
        })
    }
}

impl ReviewStore for PgStore {
    fn run_atomically(&self, deadline: &Deadline, work: &mut Work<'_>) -> Result<(), EngineError> {
        deadline.check()?;
        let mut pooled = self.connection(deadline)?;
        let conn: &mut PgConnection = &mut pooled;

        conn.transaction::<_, EngineError, _>(|conn| {
            if let Some(remaining) = deadline.remaining() {
                let millis = remaining.as_millis().max(1);
                diesel::sql_query(format!("SET LOCAL statement_timeout = {millis}"))
                    .execute(conn)?;
            }

            work(&mut PgTx { conn })?;

            deadline.check()
        })
    }

    fn ping(&self) -> Result<(), EngineError> {
        let mut conn = self.pool.get_timeout(PING_TIMEOUT)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgTx<'c> {
    conn: &'c mut PgConnection,
}

impl PgTx<'_> {
    fn reviewers_of(&mut self, pull_request_id: &str) -> Result<Vec<String>, EngineError> {
        Ok(pull_request_reviewers::table
            .filter(pull_request_reviewers::pull_request_id.eq(pull_request_id))
            .select(pull_request_reviewers::reviewer_id)
            .order(pull_request_reviewers::reviewer_id.asc())
            .load::<String>(self.conn)?)
    }

    fn record_event(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        event_type: AssignmentEventType,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        diesel::insert_into(review_assignment_events::table)
            .values(&NewAssignmentEvent {
                pull_request_id,
                reviewer_id,
                event_type: event_type.as_str(),
                source: source.as_str(),
                created_at: now,
            })
            .execute(self.conn)?;
        Ok(())
    }
}

impl StoreTx for PgTx<'_> {
    fn insert_team(&mut self, team_name: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        diesel::insert_into(teams::table)
            .values((teams::team_name.eq(team_name), teams::created_at.eq(now)))
            .execute(self.conn)
            .map_err(|e| EngineError::from_insert(e, EngineError::TeamAlreadyExists))?;
        Ok(())
    }

    fn team_exists(&mut self, team_name: &str) -> Result<bool, EngineError> {
        Ok(
            diesel::select(exists(teams::table.filter(teams::team_name.eq(team_name))))
                .get_result(self.conn)?,
        )
    }

    fn team_members(&mut self, team_name: &str) -> Result<Vec<User>, EngineError> {
        Ok(users::table
            .filter(users::team_name.eq(team_name))
            .order((users::username.asc(), users::user_id.asc()))
            .select(User::as_select())
            .load(self.conn)?)
    }

    fn upsert_user(&mut self, user: &User, now: DateTime<Utc>) -> Result<(), EngineError> {
        diesel::insert_into(users::table)
            .values(&NewUser {
                user_id: &user.user_id,
                username: &user.username,
                team_name: &user.team_name,
                is_active: user.is_active,
                created_at: now,
                updated_at: now,
            })
            .on_conflict(users::user_id)
            .do_update()
            .set((
                users::username.eq(excluded(users::username)),
                users::team_name.eq(excluded(users::team_name)),
                users::is_active.eq(excluded(users::is_active)),
                users::updated_at.eq(excluded(users::updated_at)),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_user(&mut self, user_id: &str) -> Result<Option<User>, EngineError> {
        Ok(users::table
            .find(user_id)
            .select(User::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn set_user_activity(
        &mut self,
        user_id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, EngineError> {
        Ok(diesel::update(users::table.find(user_id))
            .set((users::is_active.eq(is_active), users::updated_at.eq(now)))
            .returning(User::as_returning())
            .get_result(self.conn)
            .optional()?)
    }

    fn deactivate_users(
        &mut self,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<User>, EngineError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Lock in id order, the same order candidate reads take their share locks.
        users::table
            .filter(users::user_id.eq_any(user_ids))
            .order(users::user_id.asc())
            .select(users::user_id)
            .for_no_key_update()
            .load::<String>(self.conn)?;

        let mut updated: Vec<User> = diesel::update(users::table.filter(users::user_id.eq_any(user_ids)))
            .set((users::is_active.eq(false), users::updated_at.eq(now)))
            .returning(User::as_returning())
            .get_results(self.conn)?;

        updated.sort_by_key(|u| user_ids.iter().position(|id| id == &u.user_id));
        Ok(updated)
    }

    fn active_team_members(
        &mut self,
        team_name: &str,
        exclude: &BTreeSet<String>,
    ) -> Result<Vec<User>, EngineError> {
        let excluded_ids: Vec<&str> = exclude.iter().map(String::as_str).collect();

        Ok(users::table
            .filter(users::team_name.eq(team_name))
            .filter(users::is_active.eq(true))
            .filter(users::user_id.ne_all(excluded_ids))
            .order(users::user_id.asc())
            .select(User::as_select())
            .for_share()
            .load(self.conn)?)
    }

    fn insert_pull_request(
        &mut self,
        pull_request: &NewPullRequest<'_>,
    ) -> Result<(), EngineError> {
        diesel::insert_into(pull_requests::table)
            .values(pull_request)
            .execute(self.conn)
            .map_err(|e| EngineError::from_insert(e, EngineError::PullRequestAlreadyExists))?;
        Ok(())
    }

    fn pull_request_exists(&mut self, pull_request_id: &str) -> Result<bool, EngineError> {
        Ok(diesel::select(exists(
            pull_requests::table.filter(pull_requests::pull_request_id.eq(pull_request_id)),
        ))
        .get_result(self.conn)?)
    }

    fn find_pull_request(
        &mut self,
        pull_request_id: &str,
        lock: bool,
    ) -> Result<Option<PullRequest>, EngineError> {
        let query = pull_requests::table
            .find(pull_request_id)
            .select(PullRequestRow::as_select());
        let row = if lock {
            query.for_update().first(self.conn).optional()?
        } else {
            query.first(self.conn).optional()?
        };

        let Some(row) = row else {
            return Ok(None);
        };
        let reviewers = self.reviewers_of(pull_request_id)?;
        Ok(Some(row.into_pull_request(reviewers)?))
    }

    fn mark_merged(
        &mut self,
        pull_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let updated = diesel::sql_query(MARK_MERGED_QUERY)
            .bind::<Varchar, _>(pull_request_id)
            .bind::<Timestamptz, _>(now)
            .execute(self.conn)?;
        if updated == 0 {
            return Err(EngineError::PullRequestNotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, now), fields(source = source.as_str()))]
    fn assign_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        diesel::insert_into(pull_request_reviewers::table)
            .values(&NewReviewerLink {
                pull_request_id,
                reviewer_id,
                assigned_at: now,
            })
            .execute(self.conn)?;
        self.record_event(
            pull_request_id,
            reviewer_id,
            AssignmentEventType::Assigned,
            source,
            now,
        )?;
        debug!("Reviewer link inserted");
        Ok(())
    }

    #[instrument(skip(self, now), fields(source = source.as_str()))]
    fn unassign_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
        source: AssignmentSource,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let removed = diesel::delete(
            pull_request_reviewers::table
                .filter(pull_request_reviewers::pull_request_id.eq(pull_request_id))
                .filter(pull_request_reviewers::reviewer_id.eq(reviewer_id)),
        )
        .execute(self.conn)?;
        if removed == 0 {
            return Err(EngineError::ReviewerNotAssigned);
        }
        self.record_event(
            pull_request_id,
            reviewer_id,
            AssignmentEventType::Unassigned,
            source,
            now,
        )?;
        debug!("Reviewer link removed");
        Ok(())
    }

    fn open_pull_requests_by_reviewer(
        &mut self,
        reviewer_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        if reviewer_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let rows: Vec<(String, String)> = pull_request_reviewers::table
            .inner_join(pull_requests::table)
            .filter(pull_request_reviewers::reviewer_id.eq_any(reviewer_ids))
            .filter(pull_requests::status.eq(PullRequestStatus::Open.as_str()))
            .select((
                pull_request_reviewers::reviewer_id,
                pull_request_reviewers::pull_request_id,
            ))
            .order((
                pull_request_reviewers::reviewer_id.asc(),
                pull_request_reviewers::pull_request_id.asc(),
            ))
            .load(self.conn)?;

        let mut by_reviewer: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (reviewer_id, pull_request_id) in rows {
            by_reviewer.entry(reviewer_id).or_default().push(pull_request_id);
        }
        Ok(by_reviewer)
    }

    fn review_assignments(&mut self, user_id: &str) -> Result<Vec<PullRequestShort>, EngineError> {
        let rows: Vec<(String, String, String, String)> = pull_request_reviewers::table
            .inner_join(pull_requests::table)
            .filter(pull_request_reviewers::reviewer_id.eq(user_id))
            .order((
                pull_requests::created_at.desc(),
                pull_requests::pull_request_id.asc(),
            ))
            .select((
                pull_requests::pull_request_id,
                pull_requests::pull_request_name,
                pull_requests::author_id,
                pull_requests::status,
            ))
            .load(self.conn)?;

        rows.into_iter().map(short_from_row).collect()
    }

    fn assignment_stats(&mut self) -> Result<AssignmentStats, EngineError> {
        let per_user = diesel::sql_query(USER_STATS_QUERY).load::<UserAssignmentStat>(self.conn)?;
        let per_pull_request =
            diesel::sql_query(PULL_REQUEST_STATS_QUERY).load::<PullRequestAssignmentStat>(self.conn)?;

        Ok(AssignmentStats {
            per_user,
            per_pull_request,
        })
    }

    fn assignment_events(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Vec<AssignmentEvent>, EngineError> {
        let rows = review_assignment_events::table
            .filter(review_assignment_events::pull_request_id.eq(pull_request_id))
            .order(review_assignment_events::id.asc())
            .select(AssignmentEventRow::as_select())
            .load(self.conn)?;

        rows.into_iter()
            .map(|row| AssignmentEvent::try_from(row).map_err(EngineError::from))
            .collect()
    }

    fn savepoint(&mut self, work: &mut Work<'_>) -> Result<(), EngineError> {
        // A nested diesel transaction is issued as SAVEPOINT / ROLLBACK TO SAVEPOINT.
        self.conn
            .transaction::<_, EngineError, _>(|conn| work(&mut PgTx { conn }))
    }
}

fn short_from_row(
    (pull_request_id, pull_request_name, author_id, status): (String, String, String, String),
) -> Result<PullRequestShort, EngineError> {
    let status = PullRequestStatus::parse(&status)
        .ok_or_else(|| StorageError::msg(format!("unknown pull request status '{status}'")))?;
    Ok(PullRequestShort {
        pull_request_id,
        pull_request_name,
        author_id,
        status,
    })
}
