//! The optimisation run lifecycle.
//!
//! [`Orchestrator::trigger`] creates a pending run, refusing a second active
//! run for the same event. [`Orchestrator::execute`] then claims the run,
//! loads the event, solves it and records either the assignments or the
//! failure. Callers choose between the synchronous
//! [`Orchestrator::run_blocking`] and the threaded [`Orchestrator::spawn`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};
use rundinner_core::{
    CancellationToken, Clock, RotationSolver, SolveBudget, SolveError, SystemClock,
    TeamAssignment,
};
use thiserror::Error;

use crate::event::EventSource;
use crate::repository::{RepositoryError, RunRepository};
use crate::run::{EventId, FailureKind, OptimizationRun, RunFailure, RunId, RunSummary};

/// How long a run may stay active before startup reconciliation fails it.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Errors returned when requesting a run.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The event already has a pending or running run.
    ///
    /// This is an expected outcome rather than a fault: the in-flight run is
    /// left untouched and its id is reported.
    #[error("event {event} already has active run {active}")]
    AlreadyActive {
        /// The event.
        event: EventId,
        /// The run in progress.
        active: RunId,
    },
    /// The run could not be recorded.
    #[error("failed to record run: {0}")]
    Repository(#[source] RepositoryError),
    /// The worker thread could not be started.
    #[error("failed to spawn run worker: {0}")]
    Spawn(#[source] std::io::Error),
    /// The run was recorded but could not be carried out.
    #[error(transparent)]
    Run(#[from] RunError),
}

impl From<RepositoryError> for TriggerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { event, active } => Self::AlreadyActive { event, active },
            other => Self::Repository(other),
        }
    }
}

/// Errors that prevent a run from being carried out or recorded.
///
/// Solver outcomes such as infeasibility or cancellation are not errors at
/// this level; they end the run in the failed state.
#[derive(Debug, Error)]
pub enum RunError {
    /// Run storage failed.
    #[error("run storage failed: {0}")]
    Repository(#[from] RepositoryError),
    /// The worker thread panicked.
    #[error("run worker panicked")]
    WorkerPanicked,
}

/// A run executing on its own thread.
#[derive(Debug)]
pub struct RunHandle {
    run: RunId,
    thread: JoinHandle<Result<OptimizationRun, RunError>>,
}

impl RunHandle {
    /// The run being executed.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run
    }

    /// Whether the worker has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the worker's [`RunError`], or [`RunError::WorkerPanicked`].
    pub fn join(self) -> Result<OptimizationRun, RunError> {
        self.thread.join().map_err(|_| RunError::WorkerPanicked)?
    }
}

/// Owns the lifecycle of optimisation runs.
///
/// The orchestrator is `Send + Sync`; share it behind an [`Arc`] to
/// [`spawn`](Self::spawn) runs or to cancel them from another thread.
pub struct Orchestrator {
    repository: Arc<dyn RunRepository>,
    events: Arc<dyn EventSource>,
    solver: Arc<dyn RotationSolver>,
    clock: Arc<dyn Clock>,
    budget: SolveBudget,
    tokens: DashMap<RunId, CancellationToken>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("budget", &self.budget)
            .field("active_tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// An orchestrator using the system clock and the default budget.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RunRepository>,
        events: Arc<dyn EventSource>,
        solver: Arc<dyn RotationSolver>,
    ) -> Self {
        Self {
            repository,
            events,
            solver,
            clock: Arc::new(SystemClock),
            budget: SolveBudget::default(),
            tokens: DashMap::new(),
        }
    }

    /// Replace the clock used for run timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the solve budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: SolveBudget) -> Self {
        self.budget = budget;
        self
    }

    /// The solve budget handed to the solver.
    #[must_use]
    pub const fn budget(&self) -> &SolveBudget {
        &self.budget
    }

    /// Create a pending run for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::AlreadyActive`] when the event already has a
    /// pending or running run.
    pub fn trigger(&self, event: EventId) -> Result<RunId, TriggerError> {
        let run = self
            .repository
            .create_run(event, self.clock.utc_now())
            .map_err(TriggerError::from)
            .inspect_err(|err| {
                if let TriggerError::AlreadyActive { active, .. } = err {
                    info!("trigger for event {event} rejected: run {active} is still active");
                }
            })?;
        self.tokens.insert(run.id, CancellationToken::new());
        info!("run {} created for event {event}", run.id);
        Ok(run.id)
    }

    /// Claim, solve and record a pending run.
    ///
    /// Returns the run in its terminal state; a failed run carries its
    /// [`RunFailure`].
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Repository`] when the run is not pending or
    /// storage fails.
    pub fn execute(&self, run: RunId) -> Result<OptimizationRun, RunError> {
        let token = self.tokens.entry(run).or_default().clone();
        let result = self.execute_with(run, &token);
        self.tokens.remove(&run);
        result
    }

    fn execute_with(
        &self,
        run: RunId,
        token: &CancellationToken,
    ) -> Result<OptimizationRun, RunError> {
        let started = self.repository.try_start(run, self.clock.utc_now())?;
        info!("run {run} for event {} started", started.event);

        let model = match self.events.load_model(started.event) {
            Ok(model) => model,
            Err(err) => {
                return self.record_failure(
                    run,
                    &RunFailure::new(FailureKind::InvalidModel, err.to_string()),
                );
            }
        };

        if token.is_cancelled() {
            return self.record_failure(run, &RunFailure::from(&SolveError::Cancelled));
        }

        match self.solver.solve(&model, &self.budget, token) {
            Ok(outcome) => {
                let summary = RunSummary {
                    score: outcome.score,
                    iterations: outcome.iterations,
                    stop_reason: outcome.stop_reason,
                };
                self.record_success(run, &summary, &outcome.assignments)
            }
            Err(err) => self.record_failure(run, &RunFailure::from(&err)),
        }
    }

    fn record_success(
        &self,
        run: RunId,
        summary: &RunSummary,
        assignments: &[TeamAssignment],
    ) -> Result<OptimizationRun, RunError> {
        match self
            .repository
            .complete(run, summary, assignments, self.clock.utc_now())
        {
            Ok(done) => {
                info!(
                    "run {run} completed: score {:.1} after {} iterations",
                    summary.score.total, summary.iterations
                );
                Ok(done)
            }
            Err(err @ RepositoryError::InvalidTransition { .. }) => Err(err.into()),
            Err(err) => {
                let failure = RunFailure::new(FailureKind::Storage, err.to_string());
                self.record_failure(run, &failure).map_err(|_| err.into())
            }
        }
    }

    fn record_failure(
        &self,
        run: RunId,
        failure: &RunFailure,
    ) -> Result<OptimizationRun, RunError> {
        warn!("run {run} failed ({}): {}", failure.kind, failure.message);
        Ok(self.repository.fail(run, failure, self.clock.utc_now())?)
    }

    /// Trigger and execute a run on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::AlreadyActive`] for a busy event, or the
    /// storage error that stopped the run.
    pub fn run_blocking(&self, event: EventId) -> Result<OptimizationRun, TriggerError> {
        let run = self.trigger(event)?;
        Ok(self.execute(run)?)
    }

    /// Trigger a run and execute it on a new thread.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::AlreadyActive`] for a busy event, or
    /// [`TriggerError::Spawn`] when no thread could be started; the run is
    /// failed in that case so the event is not left blocked.
    pub fn spawn(self: &Arc<Self>, event: EventId) -> Result<RunHandle, TriggerError> {
        let run = self.trigger(event)?;
        let orchestrator = Arc::clone(self);
        match thread::Builder::new()
            .name(format!("rundinner-run-{run}"))
            .spawn(move || orchestrator.execute(run))
        {
            Ok(thread) => Ok(RunHandle { run, thread }),
            Err(err) => {
                self.tokens.remove(&run);
                let failure = RunFailure::new(
                    FailureKind::Stale,
                    format!("run worker could not be started: {err}"),
                );
                if let Err(fail_err) = self.repository.fail(run, &failure, self.clock.utc_now()) {
                    warn!("run {run} could not be marked failed: {fail_err}");
                }
                Err(TriggerError::Spawn(err))
            }
        }
    }

    /// Ask an active run to stop.
    ///
    /// Returns `false` when the run is not active in this process. The run
    /// ends as failed with [`FailureKind::Cancelled`] and stores nothing.
    #[must_use = "an unknown run id means nothing was cancelled"]
    pub fn cancel(&self, run: RunId) -> bool {
        self.tokens.get(&run).is_some_and(|token| {
            token.cancel();
            info!("cancellation requested for run {run}");
            true
        })
    }

    /// Current record of a run.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub fn status(&self, run: RunId) -> Result<Option<OptimizationRun>, RepositoryError> {
        self.repository.get(run)
    }

    /// Stored assignments of a completed run.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] for unknown runs.
    pub fn assignments(&self, run: RunId) -> Result<Vec<TeamAssignment>, RepositoryError> {
        self.repository.assignments(run)
    }

    /// Every run of an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub fn runs_for_event(&self, event: EventId) -> Result<Vec<OptimizationRun>, RepositoryError> {
        self.repository.runs_for_event(event)
    }

    /// Fail runs left active for longer than `threshold`. Call at startup.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub fn reconcile_stale(&self, threshold: Duration) -> Result<Vec<RunId>, RepositoryError> {
        let reconciled = self
            .repository
            .reconcile_stale(threshold, self.clock.utc_now())?;
        for run in &reconciled {
            if let Some((_, token)) = self.tokens.remove(run) {
                token.cancel();
            }
            warn!("run {run} was still active after {threshold:?}; marked failed");
        }
        Ok(reconciled)
    }
}
