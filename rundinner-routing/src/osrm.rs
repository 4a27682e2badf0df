//! OSRM route service backend.
//!
//! Queries the Route API for the walking distance of the fastest route
//! between two points.
//!
//! See: <http://project-osrm.org/docs/v5.24.0/api/#route-service>

use log::{debug, warn};
use rundinner_core::{Coordinate, Distance, DistanceBackend, RouteError};
use serde::Deserialize;

use crate::geojson::LineGeometry;
use crate::http::{HttpBackendConfig, HttpTransport, ProviderBuildError};

/// Public OSRM demo server.
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// OSRM walking profile.
pub const DEFAULT_OSRM_PROFILE: &str = "foot";

/// OSRM Route API response.
///
/// The response contains routes on success or an error message on failure.
/// The `code` field indicates the response status.
#[derive(Debug, Deserialize)]
struct RouteResponse {
    /// Status code from OSRM.
    ///
    /// Common values:
    /// - `"Ok"` - Request was successful
    /// - `"NoRoute"` - No route found between the points
    /// - `"InvalidQuery"` - Invalid query parameters
    code: String,
    message: Option<String>,
    routes: Option<Vec<Route>>,
}

impl RouteResponse {
    fn is_ok(&self) -> bool {
        self.code == "Ok"
    }
}

#[derive(Debug, Deserialize)]
struct Route {
    /// Route length in metres.
    distance: f64,
    geometry: Option<LineGeometry>,
}

/// Walking distances from an OSRM server.
///
/// # Example
///
/// ```no_run
/// use rundinner_core::{Coordinate, DistanceBackend};
/// use rundinner_routing::{HttpBackendConfig, OsrmBackend};
///
/// let backend = OsrmBackend::new(HttpBackendConfig::new("http://localhost:5000", "foot"))?;
/// let origin = Coordinate::new(48.1371, 11.5754)?;
/// let destination = Coordinate::new(48.1450, 11.5820)?;
/// let distance = backend.distance(origin, destination)?;
/// println!("{} m", distance.meters);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct OsrmBackend {
    transport: HttpTransport,
}

impl OsrmBackend {
    /// Backend name reported in cache entries and logs.
    pub const NAME: &'static str = "osrm";

    /// Create a backend for the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the base URL does not parse or the
    /// HTTP client or runtime cannot be built.
    pub fn new(config: HttpBackendConfig) -> Result<Self, ProviderBuildError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }

    /// A backend for the public demo server.
    ///
    /// # Errors
    ///
    /// See [`OsrmBackend::new`].
    pub fn public() -> Result<Self, ProviderBuildError> {
        Self::new(HttpBackendConfig::new(DEFAULT_OSRM_URL, DEFAULT_OSRM_PROFILE))
    }

    fn route_path(&self, origin: Coordinate, destination: Coordinate) -> String {
        let config = self.transport.config();
        let overview = if config.include_geometry {
            "overview=full&geometries=geojson"
        } else {
            "overview=false"
        };
        format!(
            "route/v1/{}/{},{};{},{}?{overview}",
            config.profile,
            origin.longitude(),
            origin.latitude(),
            destination.longitude(),
            destination.latitude(),
        )
    }

    async fn fetch(&self, url: &str) -> Result<Distance, RouteError> {
        let response = self
            .transport
            .client()
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport.convert_error(Self::NAME, &e))?;

        let status = response.status();
        // OSRM reports routing failures such as NoRoute with 400 and a JSON
        // body; only throttling and server faults are treated as HTTP errors.
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(RouteError::Http {
                backend: Self::NAME.to_owned(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_owned(),
            });
        }

        let body: RouteResponse = response
            .json()
            .await
            .map_err(|e| self.transport.convert_error(Self::NAME, &e))?;
        interpret(body)
    }
}

fn interpret(body: RouteResponse) -> Result<Distance, RouteError> {
    if body.code == "NoRoute" {
        return Err(RouteError::NoRoute {
            backend: OsrmBackend::NAME.to_owned(),
        });
    }
    if !body.is_ok() {
        return Err(RouteError::Service {
            backend: OsrmBackend::NAME.to_owned(),
            message: body.message.unwrap_or_else(|| "unknown error".to_owned()),
            code: body.code,
        });
    }

    let route = body
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or_else(|| RouteError::NoRoute {
            backend: OsrmBackend::NAME.to_owned(),
        })?;

    let geometry = route
        .geometry
        .map(|line| line.to_coordinates())
        .transpose()
        .map_err(|message| RouteError::Parse {
            backend: OsrmBackend::NAME.to_owned(),
            message,
        })?;

    Ok(Distance {
        meters: route.distance,
        geometry,
    })
}

impl DistanceBackend for OsrmBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn distance(&self, origin: Coordinate, destination: Coordinate) -> Result<Distance, RouteError> {
        let url = self.transport.url(&self.route_path(origin, destination));
        debug!("osrm route request {url}");
        let result = self.transport.block_on(self.fetch(&url));
        if let Err(err) = &result {
            warn!("osrm request failed: {err}");
        }
        result
    }
}
