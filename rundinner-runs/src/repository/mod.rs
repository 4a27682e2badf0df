//! Storage for runs and their assignments.
//!
//! Every state change is a compare-and-set on the run's status: a transition
//! only happens when the run is in the expected state, so two callers can
//! never both move the same run, and two active runs can never exist for one
//! event.

mod memory;
#[cfg(feature = "store-sqlite")]
mod sqlite;

use std::time::Duration;

use chrono::{DateTime, Utc};
use rundinner_core::TeamAssignment;
use thiserror::Error;

use crate::run::{EventId, OptimizationRun, RunFailure, RunId, RunStatus, RunSummary};

pub use memory::MemoryRunRepository;
#[cfg(feature = "store-sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "store-sqlite")))]
pub use sqlite::SqliteRunRepository;

/// Errors raised by [`RunRepository`] implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The event already has a pending or running run.
    #[error("event {event} already has active run {active}")]
    Conflict {
        /// The event.
        event: EventId,
        /// The run blocking new ones.
        active: RunId,
    },
    /// No run has this id.
    #[error("run {run} does not exist")]
    NotFound {
        /// The missing run.
        run: RunId,
    },
    /// The run is not in a state that allows the transition.
    #[error("run {run} is {actual}, expected {expected}")]
    InvalidTransition {
        /// The run.
        run: RunId,
        /// State the transition requires.
        expected: &'static str,
        /// State the run is in.
        actual: RunStatus,
    },
    /// A previous holder of the repository lock panicked.
    #[error("run repository lock poisoned")]
    Poisoned,
    /// An identifier does not fit the storage's integer type.
    #[error("identifier {value} is out of range for storage")]
    IdOutOfRange {
        /// The identifier.
        value: u64,
    },
    /// A stored row could not be decoded.
    #[error("stored run {run} is corrupt: {message}")]
    Corrupt {
        /// The affected run.
        run: RunId,
        /// What failed to decode.
        message: String,
    },
    /// SQLite rejected an operation.
    #[cfg(feature = "store-sqlite")]
    #[error("sqlite error during {operation}: {source}")]
    Sqlite {
        /// Operation being attempted.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: rusqlite::Error,
    },
}

/// Persistence for optimisation runs.
///
/// Implementations must make [`create_run`](Self::create_run) and every
/// transition atomic with respect to concurrent callers, including callers
/// in other processes when the storage is shared.
pub trait RunRepository: Send + Sync {
    /// Create a pending run for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] when the event already has an
    /// active run.
    fn create_run(
        &self,
        event: EventId,
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError>;

    /// Move a pending run to running.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] unless the run is
    /// pending.
    fn try_start(&self, run: RunId, now: DateTime<Utc>) -> Result<OptimizationRun, RepositoryError>;

    /// Store the assignments and mark a running run completed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] unless the run is
    /// running; nothing is stored in that case.
    fn complete(
        &self,
        run: RunId,
        summary: &RunSummary,
        assignments: &[TeamAssignment],
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError>;

    /// Mark an active run failed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] when the run is already
    /// terminal.
    fn fail(
        &self,
        run: RunId,
        failure: &RunFailure,
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError>;

    /// Look up a run.
    ///
    /// # Errors
    ///
    /// Returns a storage error; a missing run is `Ok(None)`.
    fn get(&self, run: RunId) -> Result<Option<OptimizationRun>, RepositoryError>;

    /// Stored assignments of a run, ordered by team id. Empty unless the run
    /// completed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] for unknown runs.
    fn assignments(&self, run: RunId) -> Result<Vec<TeamAssignment>, RepositoryError>;

    /// Every run of an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn runs_for_event(&self, event: EventId) -> Result<Vec<OptimizationRun>, RepositoryError>;

    /// Fail active runs whose last transition is older than `threshold`.
    ///
    /// Running runs are measured from `started_at`, pending runs from
    /// `created_at`. Returns the ids of the runs that were failed.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn reconcile_stale(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<RunId>, RepositoryError>;
}

/// The instant before which an active run counts as stale.
pub(crate) fn stale_cutoff(threshold: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    chrono::Duration::from_std(threshold)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The failure recorded for runs found stale.
pub(crate) fn stale_failure(threshold: Duration) -> RunFailure {
    RunFailure::new(
        crate::run::FailureKind::Stale,
        format!(
            "run was still active after {}s; its worker is presumed lost",
            threshold.as_secs()
        ),
    )
}
