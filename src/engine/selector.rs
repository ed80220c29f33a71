//! Reviewer candidate selection: eligibility filtering plus uniform random
//! choice without replacement.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::EngineError;
use crate::models::User;
use crate::store::StoreTx;

/// Source of fair in-place permutations.
pub trait Shuffler: Send + Sync {
    fn shuffle(&self, ids: &mut [String]);
}

/// One `StdRng` shared by every request, serialised behind a mutex.
pub struct RandomShuffler {
    rng: Mutex<StdRng>,
}

impl RandomShuffler {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomShuffler {
    fn default() -> Self {
        Self::new()
    }
}

impl Shuffler for RandomShuffler {
    fn shuffle(&self, ids: &mut [String]) {
        if ids.len() < 2 {
            return;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        ids.shuffle(&mut *rng);
    }
}

#[derive(Clone)]
pub struct CandidateSelector {
    shuffler: Arc<dyn Shuffler>,
}

impl CandidateSelector {
    pub fn new(shuffler: Arc<dyn Shuffler>) -> Self {
        Self { shuffler }
    }

    /// Active members of `team_name` whose id is not in `exclude`.
    pub fn eligible(
        &self,
        tx: &mut dyn StoreTx,
        team_name: &str,
        exclude: &BTreeSet<String>,
    ) -> Result<Vec<User>, EngineError> {
        let members = tx.active_team_members(team_name, exclude)?;

        Ok(members
            .into_iter()
            .filter(|user| {
                user.is_active && user.team_name == team_name && !exclude.contains(&user.user_id)
            })
            .collect())
    }

    /// Up to `limit` distinct ids drawn uniformly at random.
    pub fn pick(&self, candidates: &[User], limit: usize) -> Vec<String> {
        if candidates.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut ids: Vec<String> = candidates.iter().map(|u| u.user_id.clone()).collect();
        ids.sort();
        ids.dedup();

        self.shuffler.shuffle(&mut ids);
        ids.truncate(limit);
        ids
    }
}
