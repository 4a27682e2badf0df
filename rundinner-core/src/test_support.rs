//! Test doubles shared by unit and behaviour tests across the workspace.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::{CacheEntry, CacheError, CacheKey, CacheStats, PutOutcome, RouteCache};
use crate::{Coordinate, Distance, DistanceBackend, RouteError, Team, TeamId};

/// Build a coordinate, panicking on invalid input.
///
/// # Panics
///
/// Panics when the values are out of range.
#[must_use]
pub fn coordinate(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::new(latitude, longitude)
        .unwrap_or_else(|err| panic!("invalid test coordinate ({latitude}, {longitude}): {err}"))
}

/// A host-capable team located at the given point.
#[must_use]
pub fn team_at(id: TeamId, latitude: f64, longitude: f64) -> Team {
    Team::new(id, format!("team {id}")).with_location(coordinate(latitude, longitude))
}

/// `count` teams spread on a small grid around central Munich, roughly 300 m
/// apart.
#[must_use]
pub fn grid_teams(count: u64) -> Vec<Team> {
    (0..count)
        .map(|index| {
            let row = f64::from(u32::try_from(index / 4).unwrap_or(0));
            let column = f64::from(u32::try_from(index % 4).unwrap_or(0));
            team_at(index + 1, 48.13 + row * 0.003, 11.57 + column * 0.004)
        })
        .collect()
}

#[derive(Debug)]
struct ScriptState {
    scripted: Mutex<VecDeque<Result<Distance, RouteError>>>,
    fallback: Result<Distance, RouteError>,
    calls: AtomicUsize,
}

/// A [`DistanceBackend`] replaying scripted responses.
///
/// Scripted responses are consumed in order; once exhausted the backend keeps
/// returning its fallback. Clones share the script and the call counter, so a
/// test can keep a handle after moving the backend into a resolver.
///
/// # Examples
///
/// ```
/// use rundinner_core::test_support::{coordinate, ScriptedBackend};
/// use rundinner_core::{DistanceBackend, RouteError};
///
/// let backend = ScriptedBackend::fixed("osrm", 900.0).then_err(RouteError::NoRoute {
///     backend: "osrm".into(),
/// });
/// let a = coordinate(0.0, 0.0);
/// assert!(backend.distance(a, a).is_err());
/// assert_eq!(backend.distance(a, a).map(|d| d.meters), Ok(900.0));
/// assert_eq!(backend.calls(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    name: String,
    state: Arc<ScriptState>,
}

impl ScriptedBackend {
    /// A backend always answering `meters`.
    #[must_use]
    pub fn fixed(name: &str, meters: f64) -> Self {
        Self::with_fallback(name, Ok(Distance::from_meters(meters)))
    }

    /// A backend always failing with `error`.
    #[must_use]
    pub fn failing(name: &str, error: RouteError) -> Self {
        Self::with_fallback(name, Err(error))
    }

    /// A backend that answers HTTP 429 to every call.
    #[must_use]
    pub fn throttled(name: &str) -> Self {
        Self::failing(
            name,
            RouteError::Http {
                backend: name.to_owned(),
                status: 429,
                message: "Too Many Requests".to_owned(),
            },
        )
    }

    fn with_fallback(name: &str, fallback: Result<Distance, RouteError>) -> Self {
        Self {
            name: name.to_owned(),
            state: Arc::new(ScriptState {
                scripted: Mutex::new(VecDeque::new()),
                fallback,
                calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue a successful response.
    #[must_use]
    pub fn then_ok(self, meters: f64) -> Self {
        self.push(Ok(Distance::from_meters(meters)));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn then_err(self, error: RouteError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, response: Result<Distance, RouteError>) {
        self.state
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl DistanceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn distance(&self, _: Coordinate, _: Coordinate) -> Result<Distance, RouteError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .state
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| self.state.fallback.clone())
    }
}

/// A cache whose every operation fails, standing in for an unavailable store.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRouteCache;

impl UnavailableRouteCache {
    fn error(key: &CacheKey) -> CacheError {
        CacheError::Corrupt {
            key: key.storage_key(),
            message: "cache unavailable".to_owned(),
        }
    }
}

impl RouteCache for UnavailableRouteCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Err(Self::error(key))
    }

    fn put(&self, entry: CacheEntry) -> Result<PutOutcome, CacheError> {
        Err(Self::error(&entry.key))
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        Err(CacheError::Corrupt {
            key: String::new(),
            message: "cache unavailable".to_owned(),
        })
    }
}
