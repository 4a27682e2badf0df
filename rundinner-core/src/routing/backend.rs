//! The contract every distance source implements.

use serde::{Deserialize, Serialize};

use super::error::RouteError;
use crate::Coordinate;

/// A resolved walking distance.
///
/// `geometry` carries the route polyline when the backend supplied one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    /// Walking distance in metres.
    pub meters: f64,
    /// Route polyline from origin to destination, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<Coordinate>>,
}

impl Distance {
    /// A distance without geometry.
    #[must_use]
    pub const fn from_meters(meters: f64) -> Self {
        Self {
            meters,
            geometry: None,
        }
    }

    /// Zero distance, used when origin and destination coincide.
    #[must_use]
    pub const fn zero() -> Self {
        Self::from_meters(0.0)
    }

    /// Whether the value can be trusted: finite and not negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.meters.is_finite() && self.meters >= 0.0
    }
}

/// Resolve the walking distance between two points.
///
/// Implementations must be cheap to share across threads; the resolver calls
/// them from a worker pool.
///
/// # Examples
///
/// ```rust
/// use rundinner_core::{Coordinate, Distance, DistanceBackend, RouteError};
///
/// struct Flat;
///
/// impl DistanceBackend for Flat {
///     fn name(&self) -> &str {
///         "flat"
///     }
///
///     fn distance(&self, _: Coordinate, _: Coordinate) -> Result<Distance, RouteError> {
///         Ok(Distance::from_meters(250.0))
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let a = Coordinate::new(0.0, 0.0)?;
/// assert_eq!(Flat.distance(a, a)?.meters, 250.0);
/// # Ok(())
/// # }
/// ```
pub trait DistanceBackend: Send + Sync {
    /// Stable name recorded as the cache entry source.
    fn name(&self) -> &str;

    /// Distance from `origin` to `destination`.
    fn distance(&self, origin: Coordinate, destination: Coordinate)
    -> Result<Distance, RouteError>;
}
