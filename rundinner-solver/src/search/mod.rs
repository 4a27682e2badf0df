//! Simulated-annealing improvement over a constructed schedule.
//!
//! [`SearchState`] is explicit so a step can be driven and inspected in
//! isolation: [`SearchState::propose`] evaluates a batch of sampled moves
//! without touching the state and [`SearchState::accept`] decides whether the
//! best of them replaces the current schedule.

mod moves;

use std::cmp::Ordering;

use rand::Rng;
use rundinner_core::ScoreBreakdown;

use crate::schedule::{Move, Schedule};
use crate::score::Evaluator;

pub(crate) use moves::MoveSpace;

/// Everything a step needs besides the state itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchContext<'a> {
    pub evaluator: Evaluator<'a>,
    pub space: MoveSpace<'a>,
    /// Reject candidates with more repeat encounters than the current
    /// schedule.
    pub hard_encounters: bool,
    pub sample_size: usize,
    pub cooling_rate: f64,
}

/// A scored neighbour of the current schedule.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub mv: Move,
    pub schedule: Schedule,
    pub score: ScoreBreakdown,
}

impl Candidate {
    /// Score first, then the longest single-team walk, then the lowest team.
    fn rank(a: &Self, b: &Self) -> Ordering {
        a.score
            .total
            .total_cmp(&b.score.total)
            .then(a.score.max_team_travel_m.total_cmp(&b.score.max_team_travel_m))
            .then(a.mv.lowest_team().cmp(&b.mv.lowest_team()))
    }
}

/// Current and best schedules plus annealing bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct SearchState {
    current: Schedule,
    current_score: ScoreBreakdown,
    best: Schedule,
    best_score: ScoreBreakdown,
    iteration: u64,
    temperature: f64,
    stale: u64,
}

impl SearchState {
    pub(crate) fn new(schedule: Schedule, score: ScoreBreakdown, temperature: f64) -> Self {
        Self {
            best: schedule.clone(),
            best_score: score.clone(),
            current: schedule,
            current_score: score,
            iteration: 0,
            temperature: temperature.max(0.0),
            stale: 0,
        }
    }

    pub(crate) const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Iterations since the best score last improved.
    pub(crate) const fn stale(&self) -> u64 {
        self.stale
    }

    pub(crate) const fn best_score(&self) -> &ScoreBreakdown {
        &self.best_score
    }

    pub(crate) fn into_best(self) -> (Schedule, ScoreBreakdown) {
        (self.best, self.best_score)
    }

    /// Sample and score a batch of moves; return the best admissible one.
    pub(crate) fn propose<R: Rng>(&self, ctx: &SearchContext<'_>, rng: &mut R) -> Option<Candidate> {
        (0..ctx.sample_size)
            .filter_map(|_| ctx.space.sample(&self.current, rng))
            .filter_map(|mv| {
                let mut schedule = self.current.clone();
                schedule.apply(mv);
                let score = ctx.evaluator.evaluate(&schedule);
                let adds_repeats =
                    score.repeat_encounters > self.current_score.repeat_encounters;
                (!(ctx.hard_encounters && adds_repeats)).then_some(Candidate {
                    mv,
                    schedule,
                    score,
                })
            })
            .min_by(Candidate::rank)
    }

    /// Take `candidate` if it improves, or with the annealing probability if
    /// it does not; then cool down. Returns whether the move was taken.
    #[expect(
        clippy::float_arithmetic,
        reason = "annealing acceptance works on score differences"
    )]
    pub(crate) fn accept<R: Rng>(
        &mut self,
        candidate: Option<Candidate>,
        ctx: &SearchContext<'_>,
        rng: &mut R,
    ) -> bool {
        self.iteration += 1;
        let taken = candidate.is_some_and(|next| {
            let delta = next.score.total - self.current_score.total;
            let take = delta < 0.0
                || (self.temperature > 0.0
                    && rng.r#gen::<f64>() < (-delta / self.temperature).exp());
            if take {
                self.current = next.schedule;
                self.current_score = next.score;
            }
            take
        });

        if self.current_score.total < self.best_score.total {
            self.best = self.current.clone();
            self.best_score = self.current_score.clone();
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        self.temperature *= ctx.cooling_rate;
        taken
    }

    /// One full propose/accept round.
    pub(crate) fn step<R: Rng>(&mut self, ctx: &SearchContext<'_>, rng: &mut R) -> bool {
        let candidate = self.propose(ctx, rng);
        self.accept(candidate, ctx, rng)
    }
}
