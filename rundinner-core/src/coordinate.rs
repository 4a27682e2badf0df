//! Validated WGS84 coordinates.

use geo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places kept when coordinates are quantised for cache
/// keys and equality checks. Five places is roughly one metre.
pub const COORDINATE_PRECISION: i32 = 5;

/// A latitude/longitude pair in decimal degrees.
///
/// Values are validated on construction, including deserialisation, so a
/// `Coordinate` is always finite and within range.
///
/// # Examples
///
/// ```
/// use rundinner_core::Coordinate;
///
/// # fn main() -> Result<(), rundinner_core::CoordinateError> {
/// let munich = Coordinate::new(48.1371, 11.5754)?;
/// assert_eq!(munich.latitude(), 48.1371);
/// assert!(Coordinate::new(91.0, 0.0).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

/// Errors returned by [`Coordinate::new`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude or longitude was NaN or infinite.
    #[error("coordinate components must be finite")]
    NotFinite,
    /// Latitude was outside `-90..=90`.
    #[error("latitude {latitude} is outside -90..=90")]
    LatitudeOutOfRange {
        /// The rejected latitude.
        latitude: f64,
    },
    /// Longitude was outside `-180..=180`.
    #[error("longitude {longitude} is outside -180..=180")]
    LongitudeOutOfRange {
        /// The rejected longitude.
        longitude: f64,
    },
}

impl Coordinate {
    /// Validates and constructs a [`Coordinate`].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange { latitude });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange { longitude });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub const fn latitude(self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub const fn longitude(self) -> f64 {
        self.longitude
    }

    /// Convert to a `geo` point (`x` is longitude, `y` is latitude).
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Latitude and longitude scaled by 10^[`COORDINATE_PRECISION`] and
    /// rounded to integers.
    ///
    /// Two coordinates with the same quantised value are treated as the same
    /// place by the resolver and the cache.
    #[must_use]
    pub fn quantised(self) -> (i64, i64) {
        let scale = 10_f64.powi(COORDINATE_PRECISION);
        // Both products are bounded by 180 * 10^5, well inside i64.
        (
            (self.latitude * scale).round() as i64,
            (self.longitude * scale).round() as i64,
        )
    }

    /// Whether two coordinates quantise to the same point.
    #[must_use]
    pub fn same_place(self, other: Self) -> bool {
        self.quantised() == other.quantised()
    }
}

#[derive(Serialize, Deserialize)]
struct RawCoordinate {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lng)
    }
}

impl From<Coordinate> for RawCoordinate {
    fn from(value: Coordinate) -> Self {
        Self {
            lat: value.latitude,
            lng: value.longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(f64::NAN, 0.0, CoordinateError::NotFinite)]
    #[case(0.0, f64::INFINITY, CoordinateError::NotFinite)]
    #[case(90.5, 0.0, CoordinateError::LatitudeOutOfRange { latitude: 90.5 })]
    #[case(0.0, -180.5, CoordinateError::LongitudeOutOfRange { longitude: -180.5 })]
    fn rejects_malformed_input(
        #[case] latitude: f64,
        #[case] longitude: f64,
        #[case] expected: CoordinateError,
    ) {
        let err = Coordinate::new(latitude, longitude).expect_err("coordinate must be rejected");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn deserialisation_validates() {
        let err = serde_json::from_str::<Coordinate>(r#"{"lat": 120.0, "lng": 3.0}"#);
        assert!(err.is_err());
        let ok: Coordinate =
            serde_json::from_str(r#"{"lat": 52.52, "lng": 13.405}"#).expect("valid coordinate");
        assert_eq!(ok.longitude(), 13.405);
    }

    #[rstest]
    fn nearby_points_share_a_quantised_place() {
        let a = Coordinate::new(48.137_100_1, 11.575_400_2).expect("valid");
        let b = Coordinate::new(48.137_100_4, 11.575_399_9).expect("valid");
        let c = Coordinate::new(48.137_2, 11.575_4).expect("valid");
        assert!(a.same_place(b));
        assert!(!a.same_place(c));
    }

    #[rstest]
    fn point_uses_longitude_as_x() {
        let coordinate = Coordinate::new(10.0, 20.0).expect("valid");
        let point = coordinate.to_point();
        assert_eq!(point.x(), 20.0);
        assert_eq!(point.y(), 10.0);
    }
}
