//! `LocalSearchSolver`: construction followed by simulated annealing.

use std::time::Instant;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rundinner_core::{
    CancellationToken, ConstraintModel, DistanceMatrixProvider, EncounterPolicy, InfeasibleReason,
    RotationSolver, SolveBudget, SolveError, SolveOutcome, StopReason,
};

use crate::config::SolverConfig;
use crate::construct::construct;
use crate::precheck::precheck;
use crate::score::Evaluator;
use crate::search::{MoveSpace, SearchContext, SearchState};
use crate::travel::TravelTable;

/// Rotation solver that seats teams greedily and then improves the seating
/// with simulated annealing.
///
/// The solver is generic over the distance source: any
/// [`DistanceMatrixProvider`] works, from the offline
/// [`HaversineEstimator`](rundinner_core::HaversineEstimator) to a
/// [`RouteResolver`](rundinner_core::RouteResolver) with live backends.
#[derive(Debug, Clone)]
pub struct LocalSearchSolver<P>
where
    P: DistanceMatrixProvider,
{
    provider: P,
    config: SolverConfig,
}

impl<P> LocalSearchSolver<P>
where
    P: DistanceMatrixProvider,
{
    /// Construct a solver using default configuration.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, SolverConfig::default())
    }

    /// Construct a solver with explicit configuration.
    #[must_use]
    pub const fn with_config(provider: P, config: SolverConfig) -> Self {
        Self { provider, config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The distance source.
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> RotationSolver for LocalSearchSolver<P>
where
    P: DistanceMatrixProvider,
{
    fn solve(
        &self,
        model: &ConstraintModel,
        budget: &SolveBudget,
        cancel: &CancellationToken,
    ) -> Result<SolveOutcome, SolveError> {
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        let started_at = Instant::now();
        let layout = precheck(model)?;
        let travel = TravelTable::build(model, &self.provider, self.config.unknown_distance_m)?;

        let ctx = SearchContext {
            evaluator: Evaluator::new(model, &travel, &self.config),
            space: MoveSpace {
                eligible: &layout.eligible,
                bounds: model.group_size(),
            },
            hard_encounters: layout.hard_encounters,
            sample_size: self.config.sample_size,
            cooling_rate: self.config.cooling_rate,
        };
        let initial = construct(&layout, &travel, model.teams().len());
        let initial_score = ctx.evaluator.evaluate(&initial);
        info!(
            "initial rotation: total {:.1}, travel {:.1} m, {} repeat encounters",
            initial_score.total, initial_score.travel_m, initial_score.repeat_encounters
        );

        let mut state = SearchState::new(initial, initial_score, self.config.initial_temperature);
        let mut rng = ChaCha8Rng::seed_from_u64(budget.seed);
        let stop_reason = loop {
            if cancel.is_cancelled() {
                info!("solve cancelled after {} iterations", state.iteration());
                return Err(SolveError::Cancelled);
            }
            if state.best_score().total <= 0.0 {
                break StopReason::Optimal;
            }
            if state.iteration() >= budget.max_iterations {
                break StopReason::IterationBudget;
            }
            if budget
                .time_limit
                .is_some_and(|limit| started_at.elapsed() >= limit)
            {
                break StopReason::TimeBudget;
            }
            if budget
                .max_stale_iterations
                .is_some_and(|limit| state.stale() >= limit)
            {
                break StopReason::Stagnation;
            }
            state.step(&ctx, &mut rng);
            if state.stale() == 0 {
                debug!(
                    "iteration {}: new best {:.1}",
                    state.iteration(),
                    state.best_score().total
                );
            }
        };

        let iterations = state.iteration();
        let (best, score) = state.into_best();
        if score.repeat_encounters > 0 {
            if model.encounter_policy() == EncounterPolicy::Strict {
                return Err(InfeasibleReason::RepeatEncountersRemain {
                    repeats: score.repeat_encounters,
                }
                .into());
            }
            warn!(
                "best rotation still has {} repeat encounters",
                score.repeat_encounters
            );
        }

        let rotation = best.to_rotation(model);
        let ids: Vec<_> = model.teams().iter().map(|team| team.id).collect();
        let unknown = self.config.unknown_distance_m;
        let assignments = rotation.assignments(&ids, |guest, host| {
            match (model.team_index(guest), model.team_index(host)) {
                (Some(from), Some(to)) => travel.get(from, to),
                _ => unknown,
            }
        });
        info!(
            "solve finished after {iterations} iterations ({stop_reason:?}): total {:.1}, \
             travel {:.1} m",
            score.total, score.travel_m
        );

        Ok(SolveOutcome {
            rotation,
            assignments,
            score,
            iterations,
            stop_reason,
        })
    }
}
