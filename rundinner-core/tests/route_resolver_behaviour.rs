//! Behavioural tests for [`RouteResolver`] backend fallback and caching.
//!
//! Backends are [`ScriptedBackend`] doubles so no routing service is needed.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use rundinner_core::test_support::{ScriptedBackend, coordinate};
use rundinner_core::{
    BackendSlot, Coordinate, HaversineEstimator, ManualClock, MemoryRouteCache, QuotaConfig,
    RateLimiter, Resolution, ResolutionOrigin, ResolverConfig, RouteError, RouteResolver,
};

const PRECISION: &str = "openrouteservice";
const FREE: &str = "osrm";

#[derive(Default)]
struct World {
    precision: Option<ScriptedBackend>,
    precision_quota: Option<QuotaConfig>,
    free: Option<ScriptedBackend>,
    cache: Arc<MemoryRouteCache>,
    resolver: Option<RouteResolver>,
    results: Vec<Resolution>,
}

impl World {
    fn resolver(&mut self) -> &RouteResolver {
        let cache = Arc::clone(&self.cache);
        let precision = self.precision.clone();
        let quota = self.precision_quota;
        let free = self.free.clone();
        self.resolver.get_or_insert_with(|| {
            let clock = Arc::new(ManualClock::new());
            let mut builder = RouteResolver::builder(cache)
                .config(ResolverConfig::default().with_retry_backoff(Duration::ZERO));
            if let Some(backend) = precision {
                let mut slot = BackendSlot::new(backend);
                if let Some(quota) = quota {
                    slot = slot.with_limiter(RateLimiter::new(quota, clock));
                }
                builder = builder.backend(slot);
            }
            if let Some(backend) = free {
                builder = builder.backend(BackendSlot::new(backend));
            }
            builder.build().expect("resolver builds")
        })
    }

    fn precision_calls(&self) -> usize {
        self.precision.as_ref().map_or(0, ScriptedBackend::calls)
    }

    fn free_calls(&self) -> usize {
        self.free.as_ref().map_or(0, ScriptedBackend::calls)
    }
}

#[fixture]
fn world() -> RefCell<World> {
    RefCell::new(World::default())
}

fn home_a() -> Coordinate {
    coordinate(48.1371, 11.5754)
}

fn home_b() -> Coordinate {
    coordinate(48.1450, 11.5820)
}

// --- Given steps ---

#[given("a precision backend returning 1200 metres")]
fn precision_ok(#[from(world)] world: &RefCell<World>) {
    world.borrow_mut().precision = Some(ScriptedBackend::fixed(PRECISION, 1_200.0));
}

#[given("a throttled precision backend")]
fn precision_throttled(#[from(world)] world: &RefCell<World>) {
    world.borrow_mut().precision = Some(ScriptedBackend::throttled(PRECISION));
}

#[given("a precision backend returning 1200 metres limited to one request per minute")]
fn precision_limited(#[from(world)] world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    world.precision = Some(ScriptedBackend::fixed(PRECISION, 1_200.0));
    world.precision_quota = Some(QuotaConfig::per_minute(1));
}

#[given("a free backend returning 1500 metres")]
fn free_ok(#[from(world)] world: &RefCell<World>) {
    world.borrow_mut().free = Some(ScriptedBackend::fixed(FREE, 1_500.0));
}

#[given("a free backend that finds no route")]
fn free_no_route(#[from(world)] world: &RefCell<World>) {
    world.borrow_mut().free = Some(ScriptedBackend::failing(
        FREE,
        RouteError::NoRoute {
            backend: FREE.to_owned(),
        },
    ));
}

// --- When steps ---

#[when("I resolve the distance between two team homes")]
fn resolve_pair(#[from(world)] world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let resolution = world.resolver().resolve(home_a(), home_b());
    world.results.push(resolution);
}

#[when("I resolve the same distance in reverse")]
fn resolve_reverse(#[from(world)] world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let resolution = world.resolver().resolve(home_b(), home_a());
    world.results.push(resolution);
}

#[when("I resolve distances for three different pairs")]
fn resolve_three(#[from(world)] world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let pairs = [
        (home_a(), home_b()),
        (home_a(), coordinate(48.1500, 11.5900)),
        (home_b(), coordinate(48.1300, 11.5600)),
    ];
    let resolutions: Vec<Resolution> = pairs
        .iter()
        .map(|&(origin, destination)| world.resolver().resolve(origin, destination))
        .collect();
    world.results.extend(resolutions);
}

#[when("I resolve the distance from a team home to itself")]
fn resolve_self(#[from(world)] world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let resolution = world.resolver().resolve(home_a(), home_a());
    world.results.push(resolution);
}

// --- Then steps ---

#[then("the distance is 1200 metres from the precision backend")]
fn from_precision(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    let result = world.results.last().expect("a resolution");
    assert_eq!(result.distance.meters, 1_200.0);
    assert_eq!(result.source, PRECISION);
    assert_eq!(result.origin, ResolutionOrigin::Backend);
}

#[then("the distance is 1500 metres from the free backend")]
fn from_free(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    let result = world.results.last().expect("a resolution");
    assert_eq!(result.distance.meters, 1_500.0);
    assert_eq!(result.source, FREE);
}

#[then("the distance is the straight-line estimate")]
fn from_estimator(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    let result = world.results.last().expect("a resolution");
    let expected = HaversineEstimator::default().estimate(home_a(), home_b());
    assert_eq!(result.origin, ResolutionOrigin::Fallback);
    assert_eq!(result.distance.meters, expected.meters);
    assert_eq!(result.source, HaversineEstimator::NAME);
}

#[then("the cache is empty")]
fn cache_empty(#[from(world)] world: &RefCell<World>) {
    assert!(world.borrow().cache.is_empty());
}

#[then("the second answer came from the cache with the same distance")]
fn second_from_cache(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    let [first, second] = world.results.as_slice() else {
        panic!("expected two resolutions, got {}", world.results.len());
    };
    assert_eq!(second.origin, ResolutionOrigin::Cache);
    assert_eq!(first.distance, second.distance);
    assert_eq!(second.source, PRECISION);
}

#[then("the free backend was not called")]
fn free_not_called(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().free_calls(), 0);
}

#[then("the free backend was called twice")]
fn free_called_twice(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().free_calls(), 2);
}

#[then("the precision backend was called twice")]
fn precision_called_twice(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().precision_calls(), 2);
}

#[then("the precision backend was called once")]
fn precision_called_once(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().precision_calls(), 1);
}

#[then("the precision backend was not called")]
fn precision_not_called(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().precision_calls(), 0);
}

#[then("the distance is zero")]
fn distance_zero(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    let result = world.results.last().expect("a resolution");
    assert_eq!(result.distance.meters, 0.0);
    assert_eq!(result.origin, ResolutionOrigin::Degenerate);
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/route_resolver.feature", name = $title)]
        fn $fn_name(world: RefCell<World>) {
            let _ = world;
        }
    };
}

register_scenario!(precision_answers_first, "the precision backend answers first");
register_scenario!(
    throttled_precision_falls_through,
    "a throttled precision backend falls through to the free backend"
);
register_scenario!(
    all_backends_failing,
    "every backend failing yields the straight-line estimate"
);
register_scenario!(warm_cache, "a warm cache answers without network calls");
register_scenario!(
    exhausted_quota,
    "an exhausted quota skips the precision backend"
);
register_scenario!(coincident_homes, "coincident homes need no lookup");
