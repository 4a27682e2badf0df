//! Tuning knobs for [`crate::LocalSearchSolver`].

/// Weights and annealing parameters for the local search.
///
/// Penalties are expressed in metres so they add directly to travel
/// distance. The defaults make every hard-ish violation dominate any
/// realistic walking distance within a city.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Cost of each meeting between two teams beyond their first.
    pub repeat_penalty_m: f64,
    /// Cost of each table whose size falls outside the bounds.
    pub size_penalty_m: f64,
    /// Cost of each guest/host pairing that breaks a tag rule.
    pub tag_penalty_m: f64,
    /// Cost of each host serving a course other than its preferred one.
    pub preference_penalty_m: f64,
    /// Distance assumed for any pair involving a team without coordinates.
    pub unknown_distance_m: f64,
    /// Starting annealing temperature, in metres of score.
    pub initial_temperature: f64,
    /// Geometric cooling factor applied after every iteration.
    pub cooling_rate: f64,
    /// Candidate moves evaluated per iteration.
    pub sample_size: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            repeat_penalty_m: 50_000.0,
            size_penalty_m: 100_000.0,
            tag_penalty_m: 10_000.0,
            preference_penalty_m: 500.0,
            unknown_distance_m: 3_000.0,
            initial_temperature: 1_000.0,
            cooling_rate: 0.995,
            sample_size: 8,
        }
    }
}

impl SolverConfig {
    /// Set the repeat-encounter penalty.
    #[must_use]
    pub const fn with_repeat_penalty(mut self, metres: f64) -> Self {
        self.repeat_penalty_m = metres;
        self
    }

    /// Set the tag-rule penalty.
    #[must_use]
    pub const fn with_tag_penalty(mut self, metres: f64) -> Self {
        self.tag_penalty_m = metres;
        self
    }

    /// Set the hosting-preference penalty.
    #[must_use]
    pub const fn with_preference_penalty(mut self, metres: f64) -> Self {
        self.preference_penalty_m = metres;
        self
    }

    /// Set the distance used for teams without coordinates.
    #[must_use]
    pub const fn with_unknown_distance(mut self, metres: f64) -> Self {
        self.unknown_distance_m = metres;
        self
    }

    /// Set the starting temperature; zero turns the search into pure
    /// hill-climbing.
    #[must_use]
    pub const fn with_initial_temperature(mut self, temperature: f64) -> Self {
        self.initial_temperature = temperature;
        self
    }

    /// Set the cooling factor.
    #[must_use]
    pub const fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate;
        self
    }

    /// Set the number of candidate moves per iteration (at least one).
    #[must_use]
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }
}
