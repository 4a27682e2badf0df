//! Core domain types for the Running Dinner rotation engine.
//!
//! The crate defines the event model handed to solvers, the walking-distance
//! contract and its offline estimator, per-backend rate limiting, the route
//! cache, and the [`RouteResolver`] that ties them together.

#![forbid(unsafe_code)]

pub mod cache;
mod clock;
mod coordinate;
mod model;
mod rate_limit;
pub mod resolver;
mod routing;
mod solver;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(feature = "store-sqlite")]
pub use cache::SqliteRouteCache;
pub use cache::{
    CacheEntry, CacheError, CacheKey, CacheStats, KeyMode, MemoryRouteCache, PutOutcome,
    RouteCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinate::{COORDINATE_PRECISION, Coordinate, CoordinateError};
pub use model::{
    ConstraintModel, Course, CourseId, CourseRotation, CourseStop, EncounterPolicy,
    GroupSizeBounds, MIN_GROUP_SIZE, ModelError, Participation, Rotation, RotationGroup, TagRule,
    Team, TeamAssignment, TeamId, classic_menu,
};
pub use rate_limit::{QuotaConfig, RateDecision, RateLimiter};
pub use resolver::{
    BackendSlot, Resolution, ResolutionOrigin, ResolverBuildError, ResolverConfig,
    ResolverStats, RouteResolver, RouteResolverBuilder,
};
pub use routing::{
    DEFAULT_DETOUR_FACTOR, Distance, DistanceBackend, DistanceMatrix, DistanceMatrixProvider,
    HaversineEstimator, RouteError,
};
pub use solver::{
    CancellationToken, DEFAULT_MAX_ITERATIONS, DEFAULT_TIME_LIMIT, InfeasibleReason,
    RotationSolver, ScoreBreakdown, SolveBudget, SolveError, SolveOutcome, StopReason,
};
