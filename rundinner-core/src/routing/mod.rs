//! Walking-distance sources.
//!
//! [`DistanceBackend`] resolves a single origin/destination pair and is
//! implemented by the network routing services and by the offline
//! [`HaversineEstimator`]. [`DistanceMatrixProvider`] produces the pairwise
//! matrix a solver works from.

mod backend;
mod error;
mod estimator;
mod matrix;

pub use backend::{Distance, DistanceBackend};
pub use error::RouteError;
pub use estimator::{DEFAULT_DETOUR_FACTOR, HaversineEstimator};
pub use matrix::{DistanceMatrix, DistanceMatrixProvider};
