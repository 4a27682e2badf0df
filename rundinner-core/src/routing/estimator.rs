//! Offline straight-line estimator: the backend of last resort.

use geo::{Distance as _, Haversine};

use super::backend::{Distance, DistanceBackend};
use super::error::RouteError;
use super::matrix::{DistanceMatrix, DistanceMatrixProvider};
use crate::Coordinate;

/// Ratio between typical walking distance and great-circle distance in a
/// street grid.
pub const DEFAULT_DETOUR_FACTOR: f64 = 1.4;

/// Great-circle distance scaled by a detour factor.
///
/// Never fails and never touches the network, so it terminates every backend
/// chain.
///
/// # Examples
///
/// ```
/// use rundinner_core::{Coordinate, HaversineEstimator};
///
/// # fn main() -> Result<(), rundinner_core::CoordinateError> {
/// let estimator = HaversineEstimator::default();
/// let a = Coordinate::new(48.1371, 11.5754)?;
/// let b = Coordinate::new(48.1500, 11.5800)?;
/// let d = estimator.estimate(a, b).meters;
/// assert_eq!(d, estimator.estimate(b, a).meters);
/// assert!(d > 1_000.0 && d < 3_000.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaversineEstimator {
    detour_factor: f64,
}

impl HaversineEstimator {
    /// Backend name reported for estimated distances.
    pub const NAME: &'static str = "haversine";

    /// Estimator with a custom detour factor. Non-finite or non-positive
    /// factors fall back to [`DEFAULT_DETOUR_FACTOR`].
    #[must_use]
    pub fn new(detour_factor: f64) -> Self {
        let detour_factor = if detour_factor.is_finite() && detour_factor > 0.0 {
            detour_factor
        } else {
            DEFAULT_DETOUR_FACTOR
        };
        Self { detour_factor }
    }

    /// Configured detour factor.
    #[must_use]
    pub const fn detour_factor(&self) -> f64 {
        self.detour_factor
    }

    /// Estimated walking distance between two points.
    #[must_use]
    pub fn estimate(&self, origin: Coordinate, destination: Coordinate) -> Distance {
        let (a, b) = ordered(origin, destination);
        let great_circle = Haversine.distance(a.to_point(), b.to_point());
        Distance::from_meters(great_circle * self.detour_factor)
    }
}

// Evaluating in a fixed argument order keeps the result bit-for-bit symmetric.
fn ordered(a: Coordinate, b: Coordinate) -> (Coordinate, Coordinate) {
    if a.quantised() <= b.quantised() {
        (a, b)
    } else {
        (b, a)
    }
}

impl Default for HaversineEstimator {
    fn default() -> Self {
        Self {
            detour_factor: DEFAULT_DETOUR_FACTOR,
        }
    }
}

impl DistanceBackend for HaversineEstimator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn distance(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Distance, RouteError> {
        Ok(self.estimate(origin, destination))
    }
}

impl DistanceMatrixProvider for HaversineEstimator {
    fn distance_matrix(&self, points: &[Coordinate]) -> Result<DistanceMatrix, RouteError> {
        Ok(DistanceMatrix::symmetric_from_fn(points.len(), |i, j| {
            match (points.get(i), points.get(j)) {
                (Some(a), Some(b)) => self.estimate(*a, *b).meters,
                _ => 0.0,
            }
        }))
    }
}
