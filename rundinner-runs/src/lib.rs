//! Optimisation run lifecycle for the Running Dinner engine.
//!
//! A run optimises one event. It is created pending, claimed by exactly one
//! worker, and ends either completed with stored team assignments or failed
//! with a reason. An event never has more than one pending or running run;
//! asking for another is answered with the id of the run already in flight.
//!
//! The [`Orchestrator`] drives runs through a [`RunRepository`], reads event
//! data through an [`EventSource`], and solves with any
//! [`RotationSolver`](rundinner_core::RotationSolver).
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use rundinner_runs::test_support::{FakeSolver, StaticEventSource, sample_model};
//! use rundinner_runs::{EventId, MemoryRunRepository, Orchestrator, RunStatus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let events = StaticEventSource::new().with_event(EventId(1), sample_model());
//! let orchestrator = Orchestrator::new(
//!     Arc::new(MemoryRunRepository::new()),
//!     Arc::new(events),
//!     Arc::new(FakeSolver::succeeding()),
//! );
//! let run = orchestrator.run_blocking(EventId(1))?;
//! assert_eq!(run.status, RunStatus::Completed);
//! assert_eq!(orchestrator.assignments(run.id)?.len(), 9);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod event;
mod orchestrator;
mod repository;
mod run;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use event::{EventSource, EventSourceError};
pub use orchestrator::{
    DEFAULT_STALE_THRESHOLD, Orchestrator, RunError, RunHandle, TriggerError,
};
#[cfg(feature = "store-sqlite")]
pub use repository::SqliteRunRepository;
pub use repository::{MemoryRunRepository, RepositoryError, RunRepository};
pub use run::{
    EventId, FailureKind, OptimizationRun, RunFailure, RunId, RunStatus, RunSummary,
};
