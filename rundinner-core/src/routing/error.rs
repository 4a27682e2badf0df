use thiserror::Error;

/// Errors from [`crate::DistanceBackend::distance`].
///
/// The resolver absorbs these: a failing backend is retried once when
/// [`RouteError::is_retryable`] holds and otherwise skipped in favour of the
/// next backend in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The request did not complete within the configured timeout.
    #[error("{backend} request timed out after {timeout_secs}s")]
    Timeout {
        /// Backend name.
        backend: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The service answered with a non-success HTTP status.
    #[error("{backend} returned HTTP {status}: {message}")]
    Http {
        /// Backend name.
        backend: String,
        /// HTTP status code.
        status: u16,
        /// Response text or reason phrase.
        message: String,
    },
    /// The connection could not be established or was interrupted.
    #[error("{backend} network error: {message}")]
    Network {
        /// Backend name.
        backend: String,
        /// Underlying error description.
        message: String,
    },
    /// The response body could not be decoded or held an invalid distance.
    #[error("{backend} response could not be parsed: {message}")]
    Parse {
        /// Backend name.
        backend: String,
        /// Decoder message.
        message: String,
    },
    /// The service reported an application-level error.
    #[error("{backend} service error {code}: {message}")]
    Service {
        /// Backend name.
        backend: String,
        /// Service error code.
        code: String,
        /// Service error message.
        message: String,
    },
    /// The service found no walkable route between the points.
    #[error("{backend} found no route")]
    NoRoute {
        /// Backend name.
        backend: String,
    },
}

impl RouteError {
    /// Whether an immediate retry may succeed.
    ///
    /// Timeouts, network failures, throttling (HTTP 429) and server errors
    /// are transient; everything else is not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::Service { .. } | Self::NoRoute { .. } => false,
        }
    }
}
