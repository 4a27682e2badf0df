//! Shared HTTP plumbing for the routing backends.
//!
//! [`rundinner_core::DistanceBackend`] is synchronous so the resolver can
//! call it from plain worker threads. Each backend owns an [`HttpTransport`]
//! that bridges async `reqwest` calls onto that interface by blocking on a
//! Tokio runtime it owns.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use rundinner_core::RouteError;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

/// Default user agent for routing requests.
pub const DEFAULT_USER_AGENT: &str = "rundinner-routing/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// IO threads in each transport's runtime; batch resolution issues several
/// requests at once.
const RUNTIME_WORKER_THREADS: usize = 2;

/// Error type for backend construction failures.
#[derive(Debug)]
pub enum ProviderBuildError {
    /// The base URL could not be parsed.
    InvalidBaseUrl(url::ParseError),
    /// Failed to build the HTTP client.
    HttpClient(reqwest::Error),
    /// Failed to build the Tokio runtime.
    Runtime(std::io::Error),
}

impl std::fmt::Display for ProviderBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl(err) => write!(f, "invalid routing base URL: {err}"),
            Self::HttpClient(err) => write!(f, "failed to build HTTP client: {err}"),
            Self::Runtime(err) => write!(f, "failed to build Tokio runtime: {err}"),
        }
    }
}

impl std::error::Error for ProviderBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidBaseUrl(err) => Some(err),
            Self::HttpClient(err) => Some(err),
            Self::Runtime(err) => Some(err),
        }
    }
}

/// Connection settings common to the HTTP backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    /// Base URL of the service, e.g. `"https://router.project-osrm.org"`.
    pub base_url: String,
    /// Routing profile, e.g. `"foot"` or `"foot-walking"`.
    pub profile: String,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Whether to request the route polyline.
    pub include_geometry: bool,
}

impl HttpBackendConfig {
    /// Configuration for `base_url` and `profile` with default timeout and
    /// user agent.
    #[must_use]
    pub fn new(base_url: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            profile: profile.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            include_geometry: false,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Request route geometry alongside the distance.
    #[must_use]
    pub fn with_geometry(mut self, include_geometry: bool) -> Self {
        self.include_geometry = include_geometry;
        self
    }
}

/// An HTTP client plus the runtime it is driven on.
///
/// When called from outside any Tokio runtime, requests run on the
/// transport's own runtime. When called from within a multi-threaded Tokio
/// runtime, the transport blocks on that runtime's handle with
/// [`tokio::task::block_in_place`] to avoid nested runtime panics.
pub(crate) struct HttpTransport {
    client: Client,
    runtime: Runtime,
    base_url: Url,
    config: HttpBackendConfig,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpTransport {
    pub(crate) fn new(config: HttpBackendConfig) -> Result<Self, ProviderBuildError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(ProviderBuildError::InvalidBaseUrl)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(RUNTIME_WORKER_THREADS)
            .thread_name("rundinner-routing-io")
            .enable_all()
            .build()
            .map_err(ProviderBuildError::Runtime)?;
        Ok(Self {
            client,
            runtime,
            base_url,
            config,
        })
    }

    pub(crate) const fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) const fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    /// Base URL followed by `path`, without doubled slashes.
    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            // No runtime detected, or current_thread runtime: use our own runtime.
            _ => self.runtime.block_on(future),
        }
    }

    /// Convert a reqwest error into a [`RouteError`].
    pub(crate) fn convert_error(&self, backend: &str, error: &reqwest::Error) -> RouteError {
        if error.is_timeout() {
            return RouteError::Timeout {
                backend: backend.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return RouteError::Http {
                backend: backend.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        if error.is_decode() {
            return RouteError::Parse {
                backend: backend.to_owned(),
                message: error.to_string(),
            };
        }

        RouteError::Network {
            backend: backend.to_owned(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn url_joins_without_double_slashes() {
        let transport = HttpTransport::new(HttpBackendConfig::new("http://osrm.example.com/", "foot"))
            .expect("transport builds");
        assert_eq!(
            transport.url("/route/v1/foot/1,2;3,4"),
            "http://osrm.example.com/route/v1/foot/1,2;3,4"
        );
    }

    #[rstest]
    fn rejects_unparseable_base_url() {
        let err = HttpTransport::new(HttpBackendConfig::new("not a url", "foot"))
            .expect_err("invalid URL");
        assert!(matches!(err, ProviderBuildError::InvalidBaseUrl(_)));
    }

    #[rstest]
    fn config_builder_pattern() {
        let config = HttpBackendConfig::new("http://example.com", "foot")
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("test-agent/1.0")
            .with_geometry(true);

        assert_eq!(config.base_url, "http://example.com");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert!(config.include_geometry);
    }
}
