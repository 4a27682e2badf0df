//! The rotation solver contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConstraintModel, CourseId, Rotation, RouteError, TeamAssignment};

/// Default iteration budget for one solve.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1_000;

/// Default wall-clock budget for one solve.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(300);

/// Limits on how long a solver may search.
///
/// The search stops at whichever limit is reached first. Results are
/// reproducible for a fixed `seed` as long as the iteration budget, not the
/// wall clock, ends the search.
///
/// # Examples
///
/// ```
/// use rundinner_core::SolveBudget;
///
/// let budget = SolveBudget::default().with_max_iterations(250).with_seed(7);
/// assert_eq!(budget.max_iterations, 250);
/// assert_eq!(budget.seed, 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveBudget {
    /// Maximum improvement iterations.
    pub max_iterations: u64,
    /// Wall-clock limit.
    pub time_limit: Option<Duration>,
    /// Stop after this many iterations without a new best score.
    pub max_stale_iterations: Option<u64>,
    /// Seed for the solver's random number generator.
    pub seed: u64,
}

impl Default for SolveBudget {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            time_limit: Some(DEFAULT_TIME_LIMIT),
            max_stale_iterations: None,
            seed: 0,
        }
    }
}

impl SolveBudget {
    /// Override the iteration budget.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Override the wall-clock budget.
    #[must_use]
    pub const fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    /// Stop early after `iterations` without improvement.
    #[must_use]
    pub const fn with_max_stale_iterations(mut self, iterations: u64) -> Self {
        self.max_stale_iterations = Some(iterations);
        self
    }

    /// Override the seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Cooperative cancellation flag shared between a run and its controller.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The iteration budget was spent.
    IterationBudget,
    /// The wall-clock budget was spent.
    TimeBudget,
    /// No improvement for the configured number of iterations.
    Stagnation,
    /// The first feasible rotation already scored zero.
    Optimal,
}

/// Components of a rotation's score; lower totals are better.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Sum of guest-to-host walking distances in metres.
    pub travel_m: f64,
    /// Team pairs meeting more than once, counted per extra meeting.
    pub repeat_encounters: usize,
    /// Groups outside the size bounds.
    pub size_violations: usize,
    /// Guest placements breaking a tag rule.
    pub tag_violations: usize,
    /// Hosts serving a course other than the one they prefer.
    pub preference_misses: usize,
    /// Longest total walk of any single team.
    pub max_team_travel_m: f64,
    /// Weighted total.
    pub total: f64,
}

/// A successful solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// The best rotation found.
    pub rotation: Rotation,
    /// Per-team itineraries for the rotation.
    pub assignments: Vec<TeamAssignment>,
    /// Score of the rotation.
    pub score: ScoreBreakdown,
    /// Improvement iterations performed.
    pub iterations: u64,
    /// Why the search ended.
    pub stop_reason: StopReason,
}

/// Why no rotation can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfeasibleReason {
    /// Too few teams can host.
    #[error("insufficient host capacity: {eligible} eligible hosts, {required} required")]
    InsufficientHostCapacity {
        /// Teams able to host.
        eligible: usize,
        /// Hosting slots that must be filled.
        required: usize,
    },
    /// More teams can host than the size bounds leave tables for; every
    /// eligible team must host exactly one course.
    #[error(
        "excess host capacity: {eligible} eligible hosts, but the group sizes allow at most \
         {maximum} tables"
    )]
    ExcessHostCapacity {
        /// Teams able to host.
        eligible: usize,
        /// Tables the size bounds allow across all courses.
        maximum: usize,
    },
    /// No number of groups per course respects the size bounds.
    #[error("{teams} teams cannot be split into groups of {min} to {max}")]
    GroupSizeUnsatisfiable {
        /// Team count.
        teams: usize,
        /// Minimum group size.
        min: usize,
        /// Maximum group size.
        max: usize,
    },
    /// Hosting slots for a course cannot be matched to eligible teams.
    #[error("not enough teams can host course {course}")]
    HostEligibility {
        /// The course left without hosts.
        course: CourseId,
    },
    /// Strict mode: each team needs more distinct table partners than exist.
    #[error(
        "no repeat-free rotation exists: each team needs {required} distinct partners but only \
         {available} other teams take part"
    )]
    EncounterCapacity {
        /// Partners each team must meet.
        required: usize,
        /// Other teams available.
        available: usize,
    },
    /// Strict mode: a table of one course is larger than the table count of
    /// another, so two of its members must also share a table there.
    #[error(
        "no repeat-free rotation exists: course {course} seats {table_size} teams at one table \
         but another course has only {tables} tables"
    )]
    TableOverlap {
        /// Course with the oversized table.
        course: CourseId,
        /// Largest table at that course.
        table_size: usize,
        /// Fewest tables at any other course.
        tables: usize,
    },
    /// Strict mode: the search ended with repeat encounters remaining.
    #[error("no repeat-free rotation found; best candidate has {repeats} repeat encounters")]
    RepeatEncountersRemain {
        /// Repeat encounters in the best rotation found.
        repeats: usize,
    },
}

/// Errors returned by [`RotationSolver::solve`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// The model admits no feasible rotation.
    #[error("infeasible: {0}")]
    Infeasible(#[from] InfeasibleReason),
    /// The caller cancelled the search.
    #[error("solve was cancelled")]
    Cancelled,
    /// Distances could not be obtained.
    #[error("distance lookup failed: {0}")]
    Distance(#[from] RouteError),
}

/// Produce a rotation for a constraint model.
///
/// Implementations must check `cancel` regularly and return
/// [`SolveError::Cancelled`] once it is set. Solvers must be `Send + Sync`
/// so runs can execute on worker threads.
pub trait RotationSolver: Send + Sync {
    /// Solve `model` within `budget`.
    fn solve(
        &self,
        model: &ConstraintModel,
        budget: &SolveBudget,
        cancel: &CancellationToken,
    ) -> Result<SolveOutcome, SolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[rstest]
    fn infeasibility_message_names_host_capacity() {
        let err = SolveError::from(InfeasibleReason::InsufficientHostCapacity {
            eligible: 2,
            required: 3,
        });
        assert!(err.to_string().contains("insufficient host capacity"));
    }
}
