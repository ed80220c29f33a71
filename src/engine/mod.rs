//! Reviewer assignment engine: selection policy, consistency rules and the
//! transactional workflows that mutate pull request, reviewer and audit
//! state together.

pub mod clock;
pub mod deadline;
pub mod error;
pub mod selector;
pub mod service;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use deadline::Deadline;
pub use error::{EngineError, StorageError, ValidationError};
pub use selector::{CandidateSelector, RandomShuffler, Shuffler};
pub use service::{
    MassDeactivation, OperationTimeouts, Reassignment, ReviewService, ReviewServiceBuilder,
    MAX_REVIEWERS,
};
