//! OpenRouteService directions backend.
//!
//! The precision backend: an authenticated, quota-limited service queried
//! through the GeoJSON directions endpoint.

use log::{debug, warn};
use reqwest::header::AUTHORIZATION;
use rundinner_core::{Coordinate, Distance, DistanceBackend, QuotaConfig, RouteError};
use serde::{Deserialize, Serialize};

use crate::geojson::LineGeometry;
use crate::http::{HttpBackendConfig, HttpTransport, ProviderBuildError};

/// Hosted OpenRouteService API.
pub const DEFAULT_ORS_URL: &str = "https://api.openrouteservice.org";

/// Pedestrian profile.
pub const DEFAULT_ORS_PROFILE: &str = "foot-walking";

/// Free-tier directions quota: 40 requests per minute, 2000 per day.
pub const DEFAULT_ORS_QUOTA: QuotaConfig = QuotaConfig::per_minute(40).with_per_day(2000);

/// "Route could not be found" error code.
const ERROR_ROUTE_NOT_FOUND: i64 = 2009;
/// "Point not found" (no routable road near a point) error code.
const ERROR_POINT_NOT_FOUND: i64 = 2010;

#[derive(Debug, Serialize)]
struct DirectionsRequest {
    /// `[longitude, latitude]` positions.
    coordinates: [[f64; 2]; 2],
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
    geometry: Option<LineGeometry>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    summary: Summary,
}

/// Route summary. Zero-length routes come back with an empty object.
#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { code: i64, message: String },
    Text(String),
}

/// Walking distances from OpenRouteService.
pub struct OpenRouteServiceBackend {
    transport: HttpTransport,
    api_key: String,
}

impl std::fmt::Debug for OpenRouteServiceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouteServiceBackend")
            .field("transport", &self.transport)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenRouteServiceBackend {
    /// Backend name reported in cache entries and logs.
    pub const NAME: &'static str = "openrouteservice";

    /// Create a backend authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the base URL does not parse or the
    /// HTTP client or runtime cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        config: HttpBackendConfig,
    ) -> Result<Self, ProviderBuildError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
            api_key: api_key.into(),
        })
    }

    /// A backend for the hosted API, or `None` when `api_key` is absent or
    /// blank.
    ///
    /// # Errors
    ///
    /// See [`OpenRouteServiceBackend::new`].
    pub fn hosted(api_key: Option<&str>) -> Result<Option<Self>, ProviderBuildError> {
        match api_key.map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => Self::new(
                key,
                HttpBackendConfig::new(DEFAULT_ORS_URL, DEFAULT_ORS_PROFILE),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        self.transport.url(&format!(
            "v2/directions/{}/geojson",
            self.transport.config().profile
        ))
    }

    async fn fetch(&self, request: &DirectionsRequest) -> Result<Distance, RouteError> {
        let response = self
            .transport
            .client()
            .post(self.endpoint())
            .header(AUTHORIZATION, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport.convert_error(Self::NAME, &e))?;

        let status = response.status();
        if status.is_success() {
            let body: DirectionsResponse = response
                .json()
                .await
                .map_err(|e| self.transport.convert_error(Self::NAME, &e))?;
            return interpret(body, self.transport.config().include_geometry);
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &text))
    }
}

fn classify_failure(status: u16, text: &str) -> RouteError {
    let parsed = serde_json::from_str::<ErrorResponse>(text).ok();
    match parsed.map(|body| body.error) {
        Some(ErrorBody::Detailed { code, .. })
            if code == ERROR_ROUTE_NOT_FOUND || code == ERROR_POINT_NOT_FOUND =>
        {
            RouteError::NoRoute {
                backend: OpenRouteServiceBackend::NAME.to_owned(),
            }
        }
        Some(ErrorBody::Detailed { code, message }) if status < 500 && status != 429 => {
            RouteError::Service {
                backend: OpenRouteServiceBackend::NAME.to_owned(),
                code: code.to_string(),
                message,
            }
        }
        Some(ErrorBody::Detailed { message, .. } | ErrorBody::Text(message)) => RouteError::Http {
            backend: OpenRouteServiceBackend::NAME.to_owned(),
            status,
            message,
        },
        None => RouteError::Http {
            backend: OpenRouteServiceBackend::NAME.to_owned(),
            status,
            message: text.chars().take(200).collect(),
        },
    }
}

fn interpret(body: DirectionsResponse, include_geometry: bool) -> Result<Distance, RouteError> {
    let feature = body
        .features
        .into_iter()
        .next()
        .ok_or_else(|| RouteError::NoRoute {
            backend: OpenRouteServiceBackend::NAME.to_owned(),
        })?;

    let geometry = if include_geometry {
        feature
            .geometry
            .map(|line| line.to_coordinates())
            .transpose()
            .map_err(|message| RouteError::Parse {
                backend: OpenRouteServiceBackend::NAME.to_owned(),
                message,
            })?
    } else {
        None
    };

    Ok(Distance {
        meters: feature.properties.summary.distance,
        geometry,
    })
}

impl DistanceBackend for OpenRouteServiceBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn distance(&self, origin: Coordinate, destination: Coordinate) -> Result<Distance, RouteError> {
        let request = DirectionsRequest {
            coordinates: [
                [origin.longitude(), origin.latitude()],
                [destination.longitude(), destination.latitude()],
            ],
        };
        debug!("openrouteservice directions request {origin:?} -> {destination:?}");
        let result = self.transport.block_on(self.fetch(&request));
        if let Err(err) = &result {
            warn!("openrouteservice request failed: {err}");
        }
        result
    }
}
