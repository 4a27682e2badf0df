//! GeoJSON line geometry as returned by both routing services.

use rundinner_core::Coordinate;
use serde::Deserialize;

/// A `LineString` geometry: positions are `[longitude, latitude]`.
#[derive(Debug, Deserialize)]
pub(crate) struct LineGeometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

impl LineGeometry {
    /// Convert positions to validated coordinates.
    ///
    /// Returns the first invalid position as an error message.
    pub(crate) fn to_coordinates(&self) -> Result<Vec<Coordinate>, String> {
        self.coordinates
            .iter()
            .map(|&[lng, lat]| {
                Coordinate::new(lat, lng).map_err(|err| format!("invalid route position: {err}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn swaps_longitude_first_positions() {
        let geometry: LineGeometry =
            serde_json::from_str(r#"{"type":"LineString","coordinates":[[11.57,48.13],[11.58,48.14]]}"#)
                .expect("geometry parses");
        let coords = geometry.to_coordinates().expect("valid positions");
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0].latitude(), 48.13);
        assert_eq!(coords[0].longitude(), 11.57);
    }

    #[rstest]
    fn rejects_out_of_range_positions() {
        let geometry = LineGeometry {
            coordinates: vec![[11.57, 123.0]],
        };
        assert!(geometry.to_coordinates().is_err());
    }
}
