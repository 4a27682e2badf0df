//! Optimisation run records.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rundinner_core::{ScoreBreakdown, SolveError, StopReason};
use serde::{Deserialize, Serialize};

/// Identifier of an optimisation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Identifier of the event a run optimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a run.
///
/// Runs move `Pending → Running → {Completed, Failed}`; a pending run may
/// also fail directly. Terminal runs never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, waiting to start.
    Pending,
    /// The solver is working on it.
    Running,
    /// A rotation was stored.
    Completed,
    /// The run ended without a rotation.
    Failed,
}

impl RunStatus {
    /// Whether the run still blocks new runs for its event.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Whether the run can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Stable lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status `{other}`")),
        }
    }
}

/// Category of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The constraints admit no rotation.
    Infeasible,
    /// The run was cancelled by a caller.
    Cancelled,
    /// The event data could not be turned into a model.
    InvalidModel,
    /// Distances could not be obtained at all.
    Distance,
    /// The run was left running by a process that went away.
    Stale,
    /// The result could not be stored.
    Storage,
}

impl FailureKind {
    /// Stable lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Infeasible => "infeasible",
            Self::Cancelled => "cancelled",
            Self::InvalidModel => "invalid_model",
            Self::Distance => "distance",
            Self::Stale => "stale",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "infeasible" => Ok(Self::Infeasible),
            "cancelled" => Ok(Self::Cancelled),
            "invalid_model" => Ok(Self::InvalidModel),
            "distance" => Ok(Self::Distance),
            "stale" => Ok(Self::Stale),
            "storage" => Ok(Self::Storage),
            other => Err(format!("unknown failure kind `{other}`")),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable reason.
    pub message: String,
}

impl RunFailure {
    /// Build a failure record.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&SolveError> for RunFailure {
    fn from(err: &SolveError) -> Self {
        let kind = match err {
            SolveError::Infeasible(_) => FailureKind::Infeasible,
            SolveError::Cancelled => FailureKind::Cancelled,
            SolveError::Distance(_) => FailureKind::Distance,
        };
        Self::new(kind, err.to_string())
    }
}

/// What a completed run records besides its assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Score of the stored rotation.
    pub score: ScoreBreakdown,
    /// Improvement iterations performed.
    pub iterations: u64,
    /// Why the search stopped.
    pub stop_reason: StopReason,
}

/// One optimisation attempt for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    /// Run identifier.
    pub id: RunId,
    /// Event being optimised.
    pub event: EventId,
    /// Lifecycle state.
    pub status: RunStatus,
    /// When the run was requested.
    pub created_at: DateTime<Utc>,
    /// When the solver started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result summary for completed runs.
    pub summary: Option<RunSummary>,
    /// Failure reason for failed runs.
    pub failure: Option<RunFailure>,
}

impl OptimizationRun {
    /// A fresh pending run.
    #[must_use]
    pub const fn pending(id: RunId, event: EventId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            event,
            status: RunStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            summary: None,
            failure: None,
        }
    }

    /// Wall-clock time between start and completion, when both are known.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        (completed - started).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rundinner_core::InfeasibleReason;

    #[rstest]
    #[case(RunStatus::Pending, true)]
    #[case(RunStatus::Running, true)]
    #[case(RunStatus::Completed, false)]
    #[case(RunStatus::Failed, false)]
    fn active_statuses_block_new_runs(#[case] status: RunStatus, #[case] active: bool) {
        assert_eq!(status.is_active(), active);
        assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
    }

    #[rstest]
    fn cancellation_is_distinguished_from_infeasibility() {
        let cancelled = RunFailure::from(&SolveError::Cancelled);
        let infeasible = RunFailure::from(&SolveError::Infeasible(
            InfeasibleReason::InsufficientHostCapacity {
                eligible: 2,
                required: 3,
            },
        ));
        assert_eq!(cancelled.kind, FailureKind::Cancelled);
        assert_eq!(infeasible.kind, FailureKind::Infeasible);
        assert!(infeasible.message.contains("insufficient host capacity"));
    }

    #[rstest]
    fn failure_kinds_parse_their_storage_names() {
        for kind in [
            FailureKind::Infeasible,
            FailureKind::Cancelled,
            FailureKind::InvalidModel,
            FailureKind::Distance,
            FailureKind::Stale,
            FailureKind::Storage,
        ] {
            assert_eq!(kind.as_str().parse::<FailureKind>(), Ok(kind));
        }
        assert!("exploded".parse::<FailureKind>().is_err());
    }

    #[rstest]
    fn duration_needs_both_timestamps() {
        let created = DateTime::<Utc>::UNIX_EPOCH;
        let mut run = OptimizationRun::pending(RunId(1), EventId(7), created);
        assert_eq!(run.duration(), None);
        run.started_at = Some(created);
        run.completed_at = Some(created + chrono::Duration::seconds(42));
        assert_eq!(run.duration(), Some(Duration::from_secs(42)));
    }
}
