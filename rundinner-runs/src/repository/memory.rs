//! In-process run repository.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rundinner_core::TeamAssignment;

use super::{RepositoryError, RunRepository, stale_cutoff, stale_failure};
use crate::run::{EventId, OptimizationRun, RunFailure, RunId, RunStatus, RunSummary};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    runs: BTreeMap<RunId, OptimizationRun>,
    assignments: BTreeMap<RunId, Vec<TeamAssignment>>,
}

impl State {
    fn run_mut(&mut self, run: RunId) -> Result<&mut OptimizationRun, RepositoryError> {
        self.runs
            .get_mut(&run)
            .ok_or(RepositoryError::NotFound { run })
    }
}

/// Run repository holding everything behind one mutex.
///
/// Suitable for tests and single-process deployments that do not need runs
/// to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryRunRepository {
    state: Mutex<State>,
}

impl MemoryRunRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

fn transition(
    run: &mut OptimizationRun,
    allowed: &[RunStatus],
    expected: &'static str,
) -> Result<(), RepositoryError> {
    if allowed.contains(&run.status) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition {
            run: run.id,
            expected,
            actual: run.status,
        })
    }
}

impl RunRepository for MemoryRunRepository {
    fn create_run(
        &self,
        event: EventId,
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError> {
        let mut state = self.lock()?;
        if let Some(active) = state
            .runs
            .values()
            .find(|run| run.event == event && run.status.is_active())
        {
            return Err(RepositoryError::Conflict {
                event,
                active: active.id,
            });
        }
        state.next_id += 1;
        let id = RunId(state.next_id);
        let run = OptimizationRun::pending(id, event, now);
        state.runs.insert(id, run.clone());
        Ok(run)
    }

    fn try_start(&self, run: RunId, now: DateTime<Utc>) -> Result<OptimizationRun, RepositoryError> {
        let mut state = self.lock()?;
        let record = state.run_mut(run)?;
        transition(record, &[RunStatus::Pending], "pending")?;
        record.status = RunStatus::Running;
        record.started_at = Some(now);
        Ok(record.clone())
    }

    fn complete(
        &self,
        run: RunId,
        summary: &RunSummary,
        assignments: &[TeamAssignment],
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError> {
        let mut state = self.lock()?;
        let record = state.run_mut(run)?;
        transition(record, &[RunStatus::Running], "running")?;
        record.status = RunStatus::Completed;
        record.completed_at = Some(now);
        record.summary = Some(summary.clone());
        let stored = record.clone();
        let mut sorted = assignments.to_vec();
        sorted.sort_by_key(|assignment| assignment.team);
        state.assignments.insert(run, sorted);
        Ok(stored)
    }

    fn fail(
        &self,
        run: RunId,
        failure: &RunFailure,
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError> {
        let mut state = self.lock()?;
        let record = state.run_mut(run)?;
        transition(record, &[RunStatus::Pending, RunStatus::Running], "active")?;
        record.status = RunStatus::Failed;
        record.completed_at = Some(now);
        record.failure = Some(failure.clone());
        Ok(record.clone())
    }

    fn get(&self, run: RunId) -> Result<Option<OptimizationRun>, RepositoryError> {
        Ok(self.lock()?.runs.get(&run).cloned())
    }

    fn assignments(&self, run: RunId) -> Result<Vec<TeamAssignment>, RepositoryError> {
        let state = self.lock()?;
        if !state.runs.contains_key(&run) {
            return Err(RepositoryError::NotFound { run });
        }
        Ok(state.assignments.get(&run).cloned().unwrap_or_default())
    }

    fn runs_for_event(&self, event: EventId) -> Result<Vec<OptimizationRun>, RepositoryError> {
        Ok(self
            .lock()?
            .runs
            .values()
            .filter(|run| run.event == event)
            .cloned()
            .collect())
    }

    fn reconcile_stale(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<RunId>, RepositoryError> {
        let cutoff = stale_cutoff(threshold, now);
        let failure = stale_failure(threshold);
        let mut state = self.lock()?;
        let mut reconciled = Vec::new();
        for run in state.runs.values_mut() {
            let since = match run.status {
                RunStatus::Pending => run.created_at,
                RunStatus::Running => run.started_at.unwrap_or(run.created_at),
                RunStatus::Completed | RunStatus::Failed => continue,
            };
            if since < cutoff {
                run.status = RunStatus::Failed;
                run.completed_at = Some(now);
                run.failure = Some(failure.clone());
                reconciled.push(run.id);
            }
        }
        Ok(reconciled)
    }
}
