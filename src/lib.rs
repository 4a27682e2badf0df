//! Facade crate for the Running Dinner rotation engine.
//!
//! This crate re-exports the core domain types and exposes the routing
//! backends, the local search solver and the run orchestrator behind feature
//! flags.

#![forbid(unsafe_code)]

pub use rundinner_core::{
    CacheEntry, CacheError, CacheKey, CacheStats, CancellationToken, Clock, ConstraintModel,
    Coordinate, CoordinateError, Course, CourseId, CourseRotation, CourseStop, Distance,
    DistanceBackend, DistanceMatrix, DistanceMatrixProvider, EncounterPolicy, GroupSizeBounds,
    HaversineEstimator, InfeasibleReason, KeyMode, MemoryRouteCache, ModelError, QuotaConfig,
    RateLimiter, Rotation, RotationGroup, RotationSolver, RouteCache, RouteError, RouteResolver,
    SolveBudget, SolveError, SolveOutcome, StopReason, SystemClock, TagRule, Team,
    TeamAssignment, TeamId, classic_menu,
};

#[cfg(feature = "store-sqlite")]
pub use rundinner_core::SqliteRouteCache;

#[cfg(feature = "routing")]
pub use rundinner_routing::{HttpBackendConfig, OpenRouteServiceBackend, OsrmBackend};

#[cfg(feature = "solver")]
pub use rundinner_solver::{LocalSearchSolver, SolverConfig};

#[cfg(feature = "runs")]
pub use rundinner_runs::{
    EventId, EventSource, MemoryRunRepository, OptimizationRun, Orchestrator, RunId,
    RunRepository, RunStatus,
};

#[cfg(all(feature = "runs", feature = "store-sqlite"))]
pub use rundinner_runs::SqliteRunRepository;
