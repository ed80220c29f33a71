use std::time::{Duration, Instant};

use super::error::EngineError;

/// Point in time after which a workflow must stop and roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn within(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// The tighter of the two deadlines.
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.at, other.at) {
            (Some(a), Some(b)) => Self { at: Some(a.min(b)) },
            (Some(a), None) | (None, Some(a)) => Self { at: Some(a) },
            (None, None) => Self::none(),
        }
    }

    /// `None` when unbounded; zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_expired() {
            Err(EngineError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_expires() {
        let deadline = Deadline::none();
        assert!(deadline.remaining().is_none());
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn test_past_deadline_is_expired() {
        let deadline = Deadline::within(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(matches!(
            deadline.check(),
            Err(EngineError::DeadlineExceeded)
        ));
    }

    #[test]
    fn test_earliest_picks_tighter_bound() {
        let near = Deadline::within(Duration::from_secs(1));
        let far = Deadline::within(Duration::from_secs(60));

        assert_eq!(near.earliest(far), near);
        assert_eq!(far.earliest(near), near);
        assert_eq!(Deadline::none().earliest(far), far);
        assert_eq!(Deadline::none().earliest(Deadline::none()), Deadline::none());
    }

    #[test]
    fn test_remaining_is_bounded_by_budget() {
        let deadline = Deadline::within(Duration::from_secs(30));
        let left = deadline.remaining().unwrap();
        assert!(left <= Duration::from_secs(30));
        assert!(left > Duration::from_secs(25));
    }
}
