//! Resolve walking distances through cache, backend chain and estimator.
//!
//! A [`RouteResolver`] answers every request. It first short-circuits
//! coincident points, then consults the [`RouteCache`], then walks its
//! backends in priority order. A backend is skipped when its quota is
//! exhausted and retried once after a transient error. When every backend
//! has failed, the resolver falls back to the [`HaversineEstimator`]. Only
//! backend results are cached; estimates are not.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::cache::{CacheEntry, CacheKey, KeyMode, PutOutcome, RouteCache};
use crate::clock::{Clock, SystemClock};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::routing::{
    Distance, DistanceBackend, DistanceMatrix, DistanceMatrixProvider, HaversineEstimator,
    RouteError,
};
use crate::Coordinate;

/// Source recorded for zero-length requests.
pub const IDENTITY_SOURCE: &str = "identity";

/// Default pause before retrying a transient backend failure.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default number of pairs resolved in parallel.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Tuning knobs for [`RouteResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Pause before the single retry of a transient failure.
    pub retry_backoff: Duration,
    /// Cache key normalisation.
    pub key_mode: KeyMode,
    /// Worker threads used by batch resolution.
    pub max_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            key_mode: KeyMode::Symmetric,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ResolverConfig {
    /// Override the retry pause.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Override the key mode.
    #[must_use]
    pub const fn with_key_mode(mut self, mode: KeyMode) -> Self {
        self.key_mode = mode;
        self
    }

    /// Override the worker count. Zero is treated as one.
    #[must_use]
    pub const fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = if workers == 0 { 1 } else { workers };
        self
    }
}

/// A backend together with its own quota.
pub struct BackendSlot {
    backend: Box<dyn DistanceBackend>,
    limiter: Option<RateLimiter>,
    calls: AtomicU64,
}

impl std::fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSlot")
            .field("backend", &self.backend.name())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl BackendSlot {
    /// Wrap a backend without a quota.
    pub fn new(backend: impl DistanceBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    /// Wrap an already boxed backend without a quota.
    #[must_use]
    pub fn from_boxed(backend: Box<dyn DistanceBackend>) -> Self {
        Self {
            backend,
            limiter: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Attach a rate limiter.
    #[must_use]
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Backend name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    fn acquire(&self) -> RateDecision {
        self.limiter
            .as_ref()
            .map_or(RateDecision::Allowed, RateLimiter::try_acquire)
    }
}

/// Which stage produced a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrigin {
    /// Origin and destination coincide.
    Degenerate,
    /// Served from the route cache.
    Cache,
    /// Resolved by a backend and written to the cache.
    Backend,
    /// Every backend failed; the estimator answered.
    Fallback,
}

/// A resolved distance and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The distance.
    pub distance: Distance,
    /// Name of the backend that originally produced the value.
    pub source: String,
    /// Stage that answered this request.
    pub origin: ResolutionOrigin,
}

/// Counters describing resolver activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Requests for coincident points.
    pub degenerate: u64,
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Requests answered by a backend.
    pub backend_hits: u64,
    /// Requests answered by the estimator.
    pub fallbacks: u64,
    /// Calls issued to each backend, retries included.
    pub backend_calls: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    degenerate: AtomicU64,
    cache_hits: AtomicU64,
    backend_hits: AtomicU64,
    fallbacks: AtomicU64,
}

/// Errors raised while building a [`RouteResolver`].
#[derive(Debug, Error)]
pub enum ResolverBuildError {
    /// The batch worker pool could not be created.
    #[error("failed to build resolver worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Builder for [`RouteResolver`].
pub struct RouteResolverBuilder {
    cache: Arc<dyn RouteCache>,
    chain: Vec<BackendSlot>,
    estimator: HaversineEstimator,
    config: ResolverConfig,
    clock: Arc<dyn Clock>,
}

impl RouteResolverBuilder {
    /// Append a backend; earlier backends take priority.
    #[must_use]
    pub fn backend(mut self, slot: BackendSlot) -> Self {
        self.chain.push(slot);
        self
    }

    /// Replace the terminal estimator.
    #[must_use]
    pub const fn estimator(mut self, estimator: HaversineEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub const fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the clock used for cache timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the resolver and its worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverBuildError::WorkerPool`] when the thread pool cannot
    /// be spawned.
    pub fn build(self) -> Result<RouteResolver, ResolverBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrency.max(1))
            .thread_name(|index| format!("route-resolver-{index}"))
            .build()?;
        Ok(RouteResolver {
            chain: self.chain,
            estimator: self.estimator,
            cache: self.cache,
            config: self.config,
            clock: self.clock,
            pool,
            counters: Counters::default(),
        })
    }
}

/// Resolve distances with caching, quotas, retries and a guaranteed fallback.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rundinner_core::{Coordinate, MemoryRouteCache, ResolutionOrigin, RouteResolver};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // No network backends: every request is estimated.
/// let resolver = RouteResolver::builder(Arc::new(MemoryRouteCache::new())).build()?;
/// let a = Coordinate::new(48.1371, 11.5754)?;
/// let b = Coordinate::new(48.1500, 11.5800)?;
/// let resolution = resolver.resolve(a, b);
/// assert_eq!(resolution.origin, ResolutionOrigin::Fallback);
/// assert_eq!(resolver.resolve(a, a).distance.meters, 0.0);
/// # Ok(())
/// # }
/// ```
pub struct RouteResolver {
    chain: Vec<BackendSlot>,
    estimator: HaversineEstimator,
    cache: Arc<dyn RouteCache>,
    config: ResolverConfig,
    clock: Arc<dyn Clock>,
    pool: rayon::ThreadPool,
    counters: Counters,
}

impl std::fmt::Debug for RouteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteResolver")
            .field("chain", &self.chain)
            .field("estimator", &self.estimator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RouteResolver {
    /// Start building a resolver over `cache`.
    pub fn builder(cache: Arc<dyn RouteCache>) -> RouteResolverBuilder {
        RouteResolverBuilder {
            cache,
            chain: Vec::new(),
            estimator: HaversineEstimator::default(),
            config: ResolverConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Names of the configured backends in priority order.
    #[must_use]
    pub fn backend_names(&self) -> Vec<&str> {
        self.chain.iter().map(BackendSlot::name).collect()
    }

    /// The terminal estimator.
    #[must_use]
    pub const fn estimator(&self) -> &HaversineEstimator {
        &self.estimator
    }

    /// Resolve one origin/destination pair.
    pub fn resolve(&self, origin: Coordinate, destination: Coordinate) -> Resolution {
        if origin.same_place(destination) {
            self.counters.degenerate.fetch_add(1, Ordering::Relaxed);
            return Resolution {
                distance: Distance::zero(),
                source: IDENTITY_SOURCE.to_owned(),
                origin: ResolutionOrigin::Degenerate,
            };
        }

        let key = CacheKey::new(origin, destination, self.config.key_mode);
        match self.cache.get(&key) {
            Ok(Some(entry)) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Resolution {
                    distance: entry.distance,
                    source: entry.source,
                    origin: ResolutionOrigin::Cache,
                };
            }
            Ok(None) => {}
            Err(err) => warn!("route cache lookup for {key} failed, treating as a miss: {err}"),
        }

        for slot in &self.chain {
            if let Some(distance) = self.call_backend(slot, origin, destination) {
                let stored = self.remember(key, distance, slot.name());
                self.counters.backend_hits.fetch_add(1, Ordering::Relaxed);
                return Resolution {
                    distance: stored.distance,
                    source: stored.source,
                    origin: ResolutionOrigin::Backend,
                };
            }
        }

        if !self.chain.is_empty() {
            warn!("all routing backends failed for {key}; using straight-line estimate");
        }
        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        Resolution {
            distance: self.estimator.estimate(origin, destination),
            source: HaversineEstimator::NAME.to_owned(),
            origin: ResolutionOrigin::Fallback,
        }
    }

    /// Resolve independent pairs concurrently on the worker pool.
    ///
    /// Results are returned in input order.
    pub fn resolve_many(&self, pairs: &[(Coordinate, Coordinate)]) -> Vec<Resolution> {
        self.pool.install(|| {
            pairs
                .par_iter()
                .map(|&(origin, destination)| self.resolve(origin, destination))
                .collect()
        })
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            degenerate: self.counters.degenerate.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            backend_hits: self.counters.backend_hits.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            backend_calls: self
                .chain
                .iter()
                .map(|slot| (slot.name().to_owned(), slot.calls.load(Ordering::Relaxed)))
                .collect(),
        }
    }

    fn call_backend(
        &self,
        slot: &BackendSlot,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Option<Distance> {
        for attempt in 0..2 {
            if let RateDecision::Limited { retry_after } = slot.acquire() {
                debug!(
                    "{} quota exhausted, skipping (next slot in {retry_after:?})",
                    slot.name()
                );
                return None;
            }
            slot.calls.fetch_add(1, Ordering::Relaxed);
            match slot.backend.distance(origin, destination) {
                Ok(distance) if distance.is_valid() => return Some(distance),
                Ok(distance) => {
                    warn!(
                        "{} returned unusable distance {}; skipping",
                        slot.name(),
                        distance.meters
                    );
                    return None;
                }
                Err(err) if attempt == 0 && err.is_retryable() => {
                    debug!("{} failed transiently, retrying once: {err}", slot.name());
                    if !self.config.retry_backoff.is_zero() {
                        thread::sleep(self.config.retry_backoff);
                    }
                }
                Err(err) => {
                    warn!("{} failed, falling through: {err}", slot.name());
                    return None;
                }
            }
        }
        None
    }

    /// Store a backend result and return the entry the cache now holds.
    ///
    /// When a concurrent resolution stored the key first, its entry wins so
    /// every caller sees the same distance.
    fn remember(&self, key: CacheKey, distance: Distance, source: &str) -> CacheEntry {
        let entry = CacheEntry {
            key,
            distance,
            source: source.to_owned(),
            resolved_at: self.clock.utc_now(),
        };
        match self.cache.put(entry.clone()) {
            Ok(PutOutcome::Inserted) => entry,
            Ok(PutOutcome::AlreadyPresent) => match self.cache.get(&key) {
                Ok(Some(stored)) => {
                    debug!("route {key} was cached concurrently; keeping the stored entry");
                    stored
                }
                Ok(None) => entry,
                Err(err) => {
                    warn!("failed to re-read cached route {key}: {err}");
                    entry
                }
            },
            Err(err) => {
                warn!("failed to cache route {key}: {err}");
                entry
            }
        }
    }
}

impl DistanceMatrixProvider for RouteResolver {
    fn distance_matrix(&self, points: &[Coordinate]) -> Result<DistanceMatrix, RouteError> {
        let size = points.len();
        let symmetric = self.config.key_mode == KeyMode::Symmetric;
        let mut indices = Vec::new();
        let mut pairs = Vec::new();
        for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate() {
                if i == j || (symmetric && j < i) {
                    continue;
                }
                indices.push((i, j));
                pairs.push((*a, *b));
            }
        }

        let resolved = self.resolve_many(&pairs);
        let mut matrix = DistanceMatrix::zeros(size);
        for ((i, j), resolution) in indices.into_iter().zip(resolved) {
            let meters = resolution.distance.meters;
            matrix.set(i, j, meters);
            if symmetric {
                matrix.set(j, i, meters);
            }
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRouteCache;
    use crate::test_support::{ScriptedBackend, UnavailableRouteCache, coordinate};
    use rstest::{fixture, rstest};
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    /// Holds each call until two are in flight, then answers 1000 m to the
    /// first and 1001 m to every later call.
    struct GatedBackend {
        gate: Barrier,
        calls: AtomicUsize,
    }

    impl DistanceBackend for GatedBackend {
        fn name(&self) -> &str {
            "gated"
        }

        fn distance(&self, _: Coordinate, _: Coordinate) -> Result<Distance, RouteError> {
            self.gate.wait();
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let meters = if call == 0 { 1_000.0 } else { 1_001.0 };
            Ok(Distance::from_meters(meters))
        }
    }

    #[fixture]
    fn config() -> ResolverConfig {
        ResolverConfig::default().with_retry_backoff(Duration::ZERO)
    }

    fn resolver_with(
        cache: Arc<dyn RouteCache>,
        backends: &[&ScriptedBackend],
        config: ResolverConfig,
    ) -> RouteResolver {
        backends
            .iter()
            .fold(RouteResolver::builder(cache).config(config), |builder, backend| {
                builder.backend(BackendSlot::new((*backend).clone()))
            })
            .build()
            .expect("resolver builds")
    }

    #[rstest]
    fn unavailable_cache_is_a_miss(config: ResolverConfig) {
        let backend = ScriptedBackend::fixed("osrm", 700.0);
        let resolver = resolver_with(Arc::new(UnavailableRouteCache), &[&backend], config);
        let a = coordinate(1.0, 1.0);
        let b = coordinate(1.01, 1.0);
        assert_eq!(resolver.resolve(a, b).distance.meters, 700.0);
        assert_eq!(resolver.resolve(a, b).origin, ResolutionOrigin::Backend);
        assert_eq!(backend.calls(), 2);
    }

    #[rstest]
    fn invalid_distances_fall_through(config: ResolverConfig) {
        let broken = ScriptedBackend::fixed("broken", -5.0);
        let good = ScriptedBackend::fixed("osrm", 800.0);
        let resolver = resolver_with(Arc::new(MemoryRouteCache::new()), &[&broken, &good], config);
        let resolution = resolver.resolve(coordinate(1.0, 1.0), coordinate(1.0, 1.01));
        assert_eq!(resolution.source, "osrm");
        assert_eq!(broken.calls(), 1);
    }

    #[rstest]
    fn transient_failure_is_retried_once(config: ResolverConfig) {
        let flaky = ScriptedBackend::fixed("osrm", 640.0).then_err(RouteError::Timeout {
            backend: "osrm".into(),
            timeout_secs: 10,
        });
        let resolver = resolver_with(Arc::new(MemoryRouteCache::new()), &[&flaky], config);
        let resolution = resolver.resolve(coordinate(2.0, 2.0), coordinate(2.0, 2.01));
        assert_eq!(resolution.distance.meters, 640.0);
        assert_eq!(flaky.calls(), 2);
    }

    #[rstest]
    fn matrix_is_symmetric_and_batched(config: ResolverConfig) {
        let backend = ScriptedBackend::fixed("osrm", 1_000.0);
        let cache = Arc::new(MemoryRouteCache::new());
        let resolver = resolver_with(cache.clone(), &[&backend], config);
        let points = [
            coordinate(48.0, 11.0),
            coordinate(48.01, 11.0),
            coordinate(48.02, 11.0),
        ];
        let matrix = resolver.distance_matrix(&points).expect("matrix");
        assert_eq!(matrix.get(0, 2), Some(1_000.0));
        assert_eq!(matrix.get(2, 0), Some(1_000.0));
        assert_eq!(matrix.get(1, 1), Some(0.0));
        // Three unordered pairs, each resolved exactly once.
        assert_eq!(backend.calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[rstest]
    fn directional_mode_resolves_both_directions(config: ResolverConfig) {
        let backend = ScriptedBackend::fixed("osrm", 1_000.0);
        let resolver = resolver_with(
            Arc::new(MemoryRouteCache::new()),
            &[&backend],
            config.with_key_mode(KeyMode::Directional),
        );
        let points = [coordinate(48.0, 11.0), coordinate(48.01, 11.0)];
        resolver.distance_matrix(&points).expect("matrix");
        assert_eq!(backend.calls(), 2);
    }

    #[rstest]
    fn resolve_many_preserves_order_and_counts(config: ResolverConfig) {
        let backend = ScriptedBackend::fixed("osrm", 1_000.0);
        let resolver = resolver_with(Arc::new(MemoryRouteCache::new()), &[&backend], config);
        let a = coordinate(48.0, 11.0);
        let b = coordinate(48.01, 11.0);
        let results = resolver.resolve_many(&[(a, a), (a, b)]);
        let origins: Vec<ResolutionOrigin> = results.iter().map(|r| r.origin).collect();
        assert_eq!(
            origins,
            vec![ResolutionOrigin::Degenerate, ResolutionOrigin::Backend]
        );
        let stats = resolver.stats();
        assert_eq!(stats.degenerate, 1);
        assert_eq!(stats.backend_hits, 1);
        assert_eq!(stats.backend_calls.get("osrm"), Some(&1));
    }

    #[rstest]
    fn concurrent_misses_agree_on_the_cached_distance(config: ResolverConfig) {
        let cache = Arc::new(MemoryRouteCache::new());
        let resolver = RouteResolver::builder(cache.clone())
            .config(config)
            .backend(BackendSlot::new(GatedBackend {
                gate: Barrier::new(2),
                calls: AtomicUsize::new(0),
            }))
            .build()
            .expect("resolver builds");
        let a = coordinate(48.0, 11.0);
        let b = coordinate(48.01, 11.0);

        // Both directions share one symmetric key and miss the cache together.
        let results = resolver.resolve_many(&[(a, b), (b, a)]);
        let [first, second] = results.as_slice() else {
            panic!("two resolutions expected");
        };
        assert_eq!(first.distance, second.distance);
        assert_eq!(first.source, second.source);
        let stored = cache
            .get(&CacheKey::new(a, b, KeyMode::Symmetric))
            .expect("cache readable")
            .expect("entry stored");
        assert_eq!(stored.distance, first.distance);
        assert_eq!(cache.len(), 1);
    }
}
