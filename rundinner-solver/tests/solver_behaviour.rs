//! Behavioural tests for [`LocalSearchSolver`] using rstest-bdd.

use std::cell::RefCell;
use std::collections::BTreeMap;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use rundinner_core::test_support::grid_teams;
use rundinner_core::{
    CancellationToken, ConstraintModel, EncounterPolicy, GroupSizeBounds, HaversineEstimator,
    InfeasibleReason, Participation, RotationSolver, SolveBudget, SolveError, SolveOutcome, Team,
    classic_menu,
};
use rundinner_solver::LocalSearchSolver;

#[derive(Default)]
struct World {
    teams: Vec<Team>,
    policy: EncounterPolicy,
    bounds: GroupSizeBounds,
    cancel: CancellationToken,
    outcome: Option<Result<SolveOutcome, SolveError>>,
}

impl World {
    #[expect(
        clippy::expect_used,
        reason = "behaviour tests use expect for readable failures"
    )]
    fn outcome(&self) -> &SolveOutcome {
        self.outcome
            .as_ref()
            .expect("the solver should have run")
            .as_ref()
            .expect("expected a rotation")
    }

    #[expect(
        clippy::expect_used,
        reason = "behaviour tests use expect for readable failures"
    )]
    fn error(&self) -> &SolveError {
        self.outcome
            .as_ref()
            .expect("the solver should have run")
            .as_ref()
            .expect_err("expected a solve error")
    }
}

#[fixture]
fn world() -> RefCell<World> {
    RefCell::new(World::default())
}

// --- Given steps ---

#[given("{count} teams on a walking grid")]
fn teams_on_grid(#[from(world)] world: &RefCell<World>, count: u64) {
    world.borrow_mut().teams = grid_teams(count);
}

#[given("repeat encounters are forbidden")]
fn strict_encounters(#[from(world)] world: &RefCell<World>) {
    world.borrow_mut().policy = EncounterPolicy::Strict;
}

#[given("groups of {min} to {max} teams")]
fn group_bounds(#[from(world)] world: &RefCell<World>, min: usize, max: usize) {
    world.borrow_mut().bounds = GroupSizeBounds::new(min, max).expect("valid bounds");
}

#[given("only {hosts} teams can host")]
fn limited_hosts(#[from(world)] world: &RefCell<World>, hosts: usize) {
    let mut world = world.borrow_mut();
    let teams = std::mem::take(&mut world.teams);
    world.teams = teams
        .into_iter()
        .enumerate()
        .map(|(index, team)| {
            if index < hosts {
                team
            } else {
                team.with_participation(Participation::GuestOnly)
            }
        })
        .collect();
}

#[given("the run has been cancelled")]
fn cancelled(#[from(world)] world: &RefCell<World>) {
    world.borrow().cancel.cancel();
}

#[given("team {id} has no address")]
fn without_address(#[from(world)] world: &RefCell<World>, id: u64) {
    let mut world = world.borrow_mut();
    for team in &mut world.teams {
        if team.id == id {
            team.location = None;
        }
    }
}

// --- When steps ---

#[when("the solver runs")]
fn solver_runs(#[from(world)] world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let model = ConstraintModel::new(
        classic_menu(),
        world.teams.clone(),
        world.bounds,
    )
    .expect("valid model")
    .with_encounter_policy(world.policy);
    let solver = LocalSearchSolver::new(HaversineEstimator::default());
    let budget = SolveBudget::default()
        .with_max_iterations(200)
        .with_time_limit(None)
        .with_seed(9);
    world.outcome = Some(solver.solve(&model, &budget, &world.cancel));
}

// --- Then steps ---

#[then("every team hosts exactly one course")]
fn everyone_hosts(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    let rotation = &world.outcome().rotation;
    let mut hosted: BTreeMap<u64, usize> = BTreeMap::new();
    for course in &rotation.courses {
        for group in &course.groups {
            *hosted.entry(group.host).or_default() += 1;
        }
    }
    assert_eq!(hosted.len(), world.teams.len());
    assert!(hosted.values().all(|&count| count == 1));
}

#[then("every team attends every course exactly once")]
fn everyone_attends(#[from(world)] world: &RefCell<World>) {
    let world = world.borrow();
    for course in &world.outcome().rotation.courses {
        let mut seen: Vec<u64> = course
            .groups
            .iter()
            .flat_map(|group| std::iter::once(group.host).chain(group.guests.iter().copied()))
            .collect();
        seen.sort_unstable();
        let expected: Vec<u64> = world.teams.iter().map(|team| team.id).collect();
        assert_eq!(seen, expected);
    }
}

#[then("no two teams meet more than once")]
fn no_repeats(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().outcome().rotation.repeat_encounters(), 0);
}

#[then("every group has between {min} and {max} teams")]
fn group_sizes(#[from(world)] world: &RefCell<World>, min: usize, max: usize) {
    let world = world.borrow();
    for course in &world.outcome().rotation.courses {
        for group in &course.groups {
            let size = group.guests.len() + 1;
            assert!((min..=max).contains(&size), "group of {size}");
        }
    }
}

#[then("every course has {count} groups")]
fn groups_per_course(#[from(world)] world: &RefCell<World>, count: usize) {
    let world = world.borrow();
    for course in &world.outcome().rotation.courses {
        assert_eq!(course.groups.len(), count);
    }
}

#[then("some pair of teams meets more than once")]
fn unavoidable_repeats(#[from(world)] world: &RefCell<World>) {
    assert!(world.borrow().outcome().rotation.repeat_encounters() > 0);
}

#[then("the solve is infeasible because {eligible} hosts exceed {maximum} tables")]
fn excess_hosts(#[from(world)] world: &RefCell<World>, eligible: usize, maximum: usize) {
    assert_eq!(
        world.borrow().error(),
        &SolveError::Infeasible(InfeasibleReason::ExcessHostCapacity { eligible, maximum })
    );
}

#[then("the solve is infeasible because partners run out")]
fn partners_run_out(#[from(world)] world: &RefCell<World>) {
    assert_eq!(
        world.borrow().error(),
        &SolveError::Infeasible(InfeasibleReason::EncounterCapacity {
            required: 6,
            available: 5,
        })
    );
}

#[then("the solve is infeasible for lack of hosts")]
fn lack_of_hosts(#[from(world)] world: &RefCell<World>) {
    assert!(matches!(
        world.borrow().error(),
        SolveError::Infeasible(InfeasibleReason::InsufficientHostCapacity { eligible: 2, .. })
    ));
}

#[then("the solve reports cancellation")]
fn reports_cancellation(#[from(world)] world: &RefCell<World>) {
    assert_eq!(world.borrow().error(), &SolveError::Cancelled);
}

#[then("team {id} walks the fallback distance to every course it does not host")]
fn fallback_distance(#[from(world)] world: &RefCell<World>, id: u64) {
    let world = world.borrow();
    let assignment = world
        .outcome()
        .assignments
        .iter()
        .find(|assignment| assignment.team == id)
        .expect("an itinerary for the team");
    for stop in assignment.stops.iter().filter(|stop| stop.host != id) {
        assert!((stop.distance_m - 3_000.0).abs() < f64::EPSILON);
    }
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/solver.feature", name = $title)]
        fn $fn_name(world: RefCell<World>) {
            let _ = world;
        }
    };
}

register_scenario!(nine_teams, "nine teams meet nobody twice");
register_scenario!(
    six_teams,
    "six teams are seated even though repeats are unavoidable"
);
register_scenario!(
    six_teams_in_threes,
    "six teams sit in two tables of three at every course"
);
register_scenario!(
    too_many_kitchens,
    "more kitchens than tables make the event infeasible"
);
register_scenario!(strict_six_teams, "strict encounters reject six teams");
register_scenario!(
    too_few_kitchens,
    "too few kitchens make the event infeasible"
);
register_scenario!(cancelled_run, "a cancelled run stops");
register_scenario!(
    missing_address,
    "a team without an address still gets an itinerary"
);
