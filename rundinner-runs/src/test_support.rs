//! Test doubles for exercising the orchestrator without a real solver.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rundinner_core::test_support::grid_teams;
use rundinner_core::{
    CancellationToken, ConstraintModel, CourseRotation, GroupSizeBounds, Rotation, RotationGroup,
    RotationSolver, ScoreBreakdown, SolveBudget, SolveError, SolveOutcome, StopReason, TeamId,
    classic_menu,
};

use crate::event::{EventSource, EventSourceError};
use crate::run::EventId;

/// Distance reported for every guest walk in [`sample_outcome`].
pub const SAMPLE_WALK_M: f64 = 500.0;

/// Nine grid teams eating the classic three-course menu.
///
/// # Panics
///
/// Panics if the fixed model fails validation.
#[must_use]
pub fn sample_model() -> ConstraintModel {
    ConstraintModel::new(classic_menu(), grid_teams(9), GroupSizeBounds::default())
        .unwrap_or_else(|err| panic!("sample model is valid: {err}"))
}

/// A hand-built outcome for `model`.
///
/// Course `n` is hosted by the `n`-th team with everyone else as guests. The
/// rotation ignores group bounds; it only needs to be storable.
#[must_use]
pub fn sample_outcome(model: &ConstraintModel) -> SolveOutcome {
    let ids: Vec<TeamId> = model.teams().iter().map(|team| team.id).collect();
    let courses = model
        .courses()
        .iter()
        .zip(&ids)
        .map(|(course, &host)| CourseRotation {
            course: course.id,
            groups: vec![RotationGroup {
                host,
                guests: ids.iter().copied().filter(|&id| id != host).collect(),
            }],
        })
        .collect();
    let rotation = Rotation { courses };
    let assignments = rotation.assignments(&ids, |_, _| SAMPLE_WALK_M);
    let travel_m = assignments
        .iter()
        .map(rundinner_core::TeamAssignment::total_distance_m)
        .sum();
    SolveOutcome {
        rotation,
        assignments,
        score: ScoreBreakdown {
            travel_m,
            total: travel_m,
            ..ScoreBreakdown::default()
        },
        iterations: 3,
        stop_reason: StopReason::IterationBudget,
    }
}

/// An [`EventSource`] serving fixed models.
#[derive(Debug, Clone, Default)]
pub struct StaticEventSource {
    models: BTreeMap<EventId, ConstraintModel>,
}

impl StaticEventSource {
    /// A source with no events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an event.
    #[must_use]
    pub fn with_event(mut self, event: EventId, model: ConstraintModel) -> Self {
        self.models.insert(event, model);
        self
    }
}

impl EventSource for StaticEventSource {
    fn load_model(&self, event: EventId) -> Result<ConstraintModel, EventSourceError> {
        self.models
            .get(&event)
            .cloned()
            .ok_or(EventSourceError::UnknownEvent { event })
    }
}

#[derive(Debug)]
struct FakeState {
    error: Option<SolveError>,
    gated: bool,
    open: Mutex<bool>,
    released: Condvar,
    entered: Mutex<usize>,
    entering: Condvar,
    calls: AtomicUsize,
}

/// A scripted [`RotationSolver`].
///
/// The solver returns [`sample_outcome`] or a fixed error. A gated solver
/// blocks inside `solve` until [`release`](Self::release) is called or the
/// run is cancelled, which lets tests observe a run while it is running.
/// Clones share their state.
///
/// # Examples
///
/// ```
/// use rundinner_core::{CancellationToken, RotationSolver, SolveBudget};
/// use rundinner_runs::test_support::{FakeSolver, sample_model};
///
/// let solver = FakeSolver::succeeding();
/// let outcome = solver
///     .solve(&sample_model(), &SolveBudget::default(), &CancellationToken::new())
///     .expect("scripted success");
/// assert_eq!(outcome.assignments.len(), 9);
/// assert_eq!(solver.calls(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FakeSolver {
    state: Arc<FakeState>,
}

impl FakeSolver {
    fn with(error: Option<SolveError>, gated: bool) -> Self {
        Self {
            state: Arc::new(FakeState {
                error,
                gated,
                open: Mutex::new(false),
                released: Condvar::new(),
                entered: Mutex::new(0),
                entering: Condvar::new(),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Always succeed with [`sample_outcome`].
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with(None, false)
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: SolveError) -> Self {
        Self::with(Some(error), false)
    }

    /// Succeed, but only once released.
    #[must_use]
    pub fn gated() -> Self {
        Self::with(None, true)
    }

    /// Let blocked and future solves finish.
    pub fn release(&self) {
        let mut open = self
            .state
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.state.released.notify_all();
    }

    /// Wait until a solve has begun. Returns `false` on timeout.
    #[must_use]
    pub fn wait_until_solving(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut entered = self
            .state
            .entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *entered == 0 {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            entered = self
                .state
                .entering
                .wait_timeout(entered, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Number of `solve` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn announce(&self) {
        let mut entered = self
            .state
            .entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *entered += 1;
        self.state.entering.notify_all();
    }

    fn wait_for_release(&self, cancel: &CancellationToken) {
        let mut open = self
            .state
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*open && !cancel.is_cancelled() {
            open = self
                .state
                .released
                .wait_timeout(open, Duration::from_millis(5))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl RotationSolver for FakeSolver {
    fn solve(
        &self,
        model: &ConstraintModel,
        _budget: &SolveBudget,
        cancel: &CancellationToken,
    ) -> Result<SolveOutcome, SolveError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.announce();
        if self.state.gated {
            self.wait_for_release(cancel);
        }
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        match &self.state.error {
            Some(error) => Err(error.clone()),
            None => Ok(sample_outcome(model)),
        }
    }
}
