//! Local-search rotation solver for running dinners.
//!
//! This crate provides [`LocalSearchSolver`], the default implementation of the
//! [`RotationSolver`](rundinner_core::RotationSolver) trait. A solve runs in
//! three phases:
//!
//! 1. a precheck derives the table count per course, matches hosting slots to
//!    eligible teams, and decides whether repeat encounters are forbidden;
//! 2. a constructive pass seats guests using round-robin slots, which is
//!    repeat-free whenever the table count is prime and at least the course
//!    count;
//! 3. simulated annealing swaps and moves guests and hosts until the budget,
//!    stagnation limit, or cancellation ends the search.
//!
//! Distances come from any
//! [`DistanceMatrixProvider`](rundinner_core::DistanceMatrixProvider), fetched
//! once per solve. Results are deterministic for a fixed seed and iteration
//! budget.
//!
//! # Examples
//!
//! ```
//! use rundinner_core::test_support::grid_teams;
//! use rundinner_core::{
//!     CancellationToken, ConstraintModel, GroupSizeBounds, HaversineEstimator, RotationSolver,
//!     SolveBudget, classic_menu,
//! };
//! use rundinner_solver::LocalSearchSolver;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ConstraintModel::new(classic_menu(), grid_teams(9), GroupSizeBounds::default())?;
//! let solver = LocalSearchSolver::new(HaversineEstimator::default());
//! let budget = SolveBudget::default().with_max_iterations(100).with_seed(1);
//! let outcome = solver.solve(&model, &budget, &CancellationToken::new())?;
//! assert_eq!(outcome.rotation.repeat_encounters(), 0);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod construct;
mod precheck;
mod schedule;
mod score;
mod search;
mod solver;
mod travel;

pub use config::SolverConfig;
pub use solver::LocalSearchSolver;
