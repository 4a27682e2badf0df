//! HTTP routing backends for walking distances.
//!
//! Provides [`OpenRouteServiceBackend`] (authenticated, quota-limited) and
//! [`OsrmBackend`] (free), both implementing
//! [`rundinner_core::DistanceBackend`]. The synchronous trait is implemented
//! by blocking on async HTTP calls internally, keeping the resolver usable
//! from plain worker threads.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rundinner_core::{BackendSlot, MemoryRouteCache, RateLimiter, RouteResolver, SystemClock};
//! use rundinner_routing::{
//!     DEFAULT_ORS_QUOTA, HttpBackendConfig, OpenRouteServiceBackend, OsrmBackend,
//! };
//!
//! let clock = Arc::new(SystemClock);
//! let mut builder = RouteResolver::builder(Arc::new(MemoryRouteCache::new()));
//! if let Some(ors) = OpenRouteServiceBackend::hosted(std::env::var("ORS_API_KEY").ok().as_deref())? {
//!     builder = builder.backend(
//!         BackendSlot::new(ors).with_limiter(RateLimiter::new(DEFAULT_ORS_QUOTA, clock)),
//!     );
//! }
//! let osrm = OsrmBackend::new(
//!     HttpBackendConfig::new("http://localhost:5000", "foot").with_timeout(Duration::from_secs(5)),
//! )?;
//! let resolver = builder.backend(BackendSlot::new(osrm)).build()?;
//! # let _ = resolver;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]

mod geojson;
mod http;
mod openroute;
mod osrm;

#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod test_support;

pub use http::{DEFAULT_USER_AGENT, HttpBackendConfig, ProviderBuildError};
pub use openroute::{
    DEFAULT_ORS_PROFILE, DEFAULT_ORS_QUOTA, DEFAULT_ORS_URL, OpenRouteServiceBackend,
};
pub use osrm::{DEFAULT_OSRM_PROFILE, DEFAULT_OSRM_URL, OsrmBackend};
