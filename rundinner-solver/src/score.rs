//! Rotation scoring.

use rundinner_core::{ConstraintModel, ScoreBreakdown};

use crate::config::SolverConfig;
use crate::schedule::Schedule;
use crate::travel::TravelTable;

/// Scores schedules for one model; lower totals are better.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Evaluator<'a> {
    model: &'a ConstraintModel,
    travel: &'a TravelTable,
    config: &'a SolverConfig,
}

impl<'a> Evaluator<'a> {
    pub(crate) const fn new(
        model: &'a ConstraintModel,
        travel: &'a TravelTable,
        config: &'a SolverConfig,
    ) -> Self {
        Self {
            model,
            travel,
            config,
        }
    }

    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "score combines metre distances with penalty weights"
    )]
    pub(crate) fn evaluate(&self, schedule: &Schedule) -> ScoreBreakdown {
        let teams = self.model.teams();
        let bounds = self.model.group_size();
        let mut per_team = vec![0.0_f64; schedule.teams()];
        let mut travel_m = 0.0;
        let mut size_violations = 0;
        let mut tag_violations = 0;
        let mut pairs = Vec::new();

        for table in schedule.all_tables() {
            if !bounds.contains(table.size()) {
                size_violations += 1;
            }
            let host = teams.get(table.host);
            for &guest in &table.guests {
                let distance = self.travel.get(guest, table.host);
                travel_m += distance;
                if let Some(total) = per_team.get_mut(guest) {
                    *total += distance;
                }
                if let (Some(guest_team), Some(host_team)) = (teams.get(guest), host) {
                    tag_violations += self
                        .model
                        .tag_rules()
                        .iter()
                        .filter(|rule| rule.violated_by(guest_team, host_team))
                        .count();
                }
            }
            let members: Vec<usize> = table.members().collect();
            for (position, &a) in members.iter().enumerate() {
                for &b in members.iter().skip(position + 1) {
                    pairs.push((a.min(b), a.max(b)));
                }
            }
        }

        let repeat_encounters = count_repeats(pairs);
        let preference_misses = schedule
            .hosts()
            .filter(|&(team, course)| {
                let preferred = teams.get(team).and_then(|t| t.preferred_course);
                let hosted = self.model.courses().get(course).map(|c| c.id);
                preferred.is_some() && preferred != hosted
            })
            .count();
        let max_team_travel_m = per_team.iter().copied().fold(0.0, f64::max);

        let total = travel_m
            + self.config.repeat_penalty_m * repeat_encounters as f64
            + self.config.size_penalty_m * size_violations as f64
            + self.config.tag_penalty_m * tag_violations as f64
            + self.config.preference_penalty_m * preference_misses as f64;

        ScoreBreakdown {
            travel_m,
            repeat_encounters,
            size_violations,
            tag_violations,
            preference_misses,
            max_team_travel_m,
            total,
        }
    }
}

/// Meetings beyond the first, summed over all pairs.
fn count_repeats(mut pairs: Vec<(usize, usize)>) -> usize {
    pairs.sort_unstable();
    pairs.windows(2).filter(|w| matches!(w, [a, b] if a == b)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Table;
    use rstest::rstest;
    use rundinner_core::test_support::team_at;
    use rundinner_core::{
        Course, GroupSizeBounds, HaversineEstimator, TagRule, Team, classic_menu,
    };

    fn four_teams() -> Vec<Team> {
        vec![
            team_at(1, 48.1300, 11.5700),
            team_at(2, 48.1300, 11.5800),
            team_at(3, 48.1400, 11.5700),
            team_at(4, 48.1400, 11.5800),
        ]
    }

    /// Every course: 0 hosts 2, 1 hosts 3.
    fn static_schedule() -> Schedule {
        let course = vec![
            Table {
                host: 0,
                guests: vec![2],
            },
            Table {
                host: 1,
                guests: vec![3],
            },
        ];
        Schedule::new(vec![course.clone(), course.clone(), course], 4)
    }

    #[rstest]
    fn repeats_count_meetings_beyond_the_first() {
        assert_eq!(count_repeats(vec![(0, 1), (0, 1), (0, 1), (1, 2)]), 2);
        assert_eq!(count_repeats(vec![(0, 1), (1, 2), (0, 2)]), 0);
    }

    #[rstest]
    fn breakdown_sums_travel_and_repeat_penalties() {
        let model = ConstraintModel::new(classic_menu(), four_teams(), GroupSizeBounds::default())
            .expect("valid model");
        let travel = TravelTable::build(&model, &HaversineEstimator::default(), 3_000.0)
            .expect("travel table");
        let config = SolverConfig::default();
        let score = Evaluator::new(&model, &travel, &config).evaluate(&static_schedule());

        assert_eq!(score.repeat_encounters, 4);
        assert_eq!(score.size_violations, 0);
        assert_eq!(score.tag_violations, 0);
        let expected_travel = 3.0 * (travel.get(2, 0) + travel.get(3, 1));
        assert!((score.travel_m - expected_travel).abs() < 1e-6);
        let longest = 3.0 * travel.get(2, 0).max(travel.get(3, 1));
        assert!((score.max_team_travel_m - longest).abs() < 1e-6);
        let expected_total = expected_travel + 4.0 * config.repeat_penalty_m;
        assert!((score.total - expected_total).abs() < 1e-6);
    }

    #[rstest]
    fn tag_rules_and_preferences_are_penalised() {
        let teams = vec![
            team_at(1, 48.1300, 11.5700).with_preferred_course(1),
            team_at(2, 48.1300, 11.5800).with_tag("step-free"),
            team_at(3, 48.1400, 11.5700).with_tag("wheelchair"),
        ];
        let courses = vec![Course::new(1, "starter", 0), Course::new(2, "main", 1)];
        let model = ConstraintModel::new(courses, teams, GroupSizeBounds::new(2, 3).expect("bounds"))
            .expect("valid model")
            .with_tag_rules(vec![TagRule::new("wheelchair", "step-free")]);
        // Starter at team 2 (step-free), main at team 1 (not step-free).
        let schedule = Schedule::new(
            vec![
                vec![Table {
                    host: 1,
                    guests: vec![0, 2],
                }],
                vec![Table {
                    host: 0,
                    guests: vec![1, 2],
                }],
            ],
            3,
        );
        let travel = TravelTable::build(&model, &HaversineEstimator::default(), 3_000.0)
            .expect("travel table");
        let config = SolverConfig::default();
        let score = Evaluator::new(&model, &travel, &config).evaluate(&schedule);

        assert_eq!(score.tag_violations, 1);
        assert_eq!(score.preference_misses, 1);
        assert_eq!(score.size_violations, 0);
        assert_eq!(score.repeat_encounters, 3);
    }

    #[rstest]
    fn oversized_tables_are_counted() {
        let model = ConstraintModel::new(classic_menu(), four_teams(), GroupSizeBounds::new(2, 3).expect("bounds"))
            .expect("valid model");
        let everyone = vec![Table {
            host: 0,
            guests: vec![1, 2, 3],
        }];
        let schedule = Schedule::new(vec![everyone.clone(), everyone.clone(), everyone], 4);
        let travel = TravelTable::build(&model, &HaversineEstimator::default(), 3_000.0)
            .expect("travel table");
        let config = SolverConfig::default();
        let score = Evaluator::new(&model, &travel, &config).evaluate(&schedule);
        assert_eq!(score.size_violations, 3);
    }
}
