//! Initial rotation.
//!
//! Hosts come from the precheck's matching. Guests are then seated course by
//! course. Each guest is ranked against every table with free seats by, in
//! order: teams already met at that table, distance from the guest's
//! round-robin slot, walking distance, and host index.
//!
//! The round-robin slot of the host with index `i` in course `c`, when
//! seated for course `d`, is `(i + d·(c − d)) mod g`, where `g` is the table
//! count of course `d`. With `N = C·g` teams, `g` prime and `g ≥ C`, two
//! teams never share a slot twice, so the first choice is always
//! repeat-free.

use std::cmp::Ordering;

use crate::precheck::Layout;
use crate::schedule::{Schedule, Table};
use crate::travel::TravelTable;

/// Seat every guest and return the resulting schedule.
pub(crate) fn construct(layout: &Layout, travel: &TravelTable, teams: usize) -> Schedule {
    let courses = layout.hosts.len();
    let mut label: Vec<Option<(usize, usize)>> = vec![None; teams];
    for (course, hosts) in layout.hosts.iter().enumerate() {
        for (index, &host) in hosts.iter().enumerate() {
            if let Some(slot) = label.get_mut(host) {
                *slot = Some((course, index));
            }
        }
    }

    let mut order: Vec<usize> = (0..teams).collect();
    order.sort_by_key(|&team| (label.get(team).copied().flatten().unwrap_or((courses, 0)), team));

    let mut met = Encounters::new(teams);
    let mut schedule_tables = Vec::with_capacity(courses);
    for (course, hosts) in layout.hosts.iter().enumerate() {
        let mut tables: Vec<Table> = hosts
            .iter()
            .map(|&host| Table {
                host,
                guests: Vec::new(),
            })
            .collect();
        let capacity = table_sizes(teams, tables.len());

        for &guest in &order {
            if label.get(guest).copied().flatten().is_some_and(|(c, _)| c == course) {
                continue;
            }
            let preferred = label
                .get(guest)
                .copied()
                .flatten()
                .map(|(c, i)| round_robin_slot(i, c, course, tables.len()));
            let choice = tables
                .iter()
                .enumerate()
                .filter(|(index, table)| {
                    capacity.get(*index).is_some_and(|&size| table.size() < size)
                })
                .map(|(index, table)| Candidate {
                    index,
                    conflicts: table.members().filter(|&m| met.count(guest, m) > 0).count(),
                    off_slot: preferred.is_some_and(|slot| slot != index),
                    distance: travel.get(guest, table.host),
                    host: table.host,
                })
                .min_by(Candidate::cmp);
            if let Some(table) = choice.and_then(|c| tables.get_mut(c.index)) {
                table.guests.push(guest);
            }
        }

        for table in &tables {
            met.record(table);
        }
        schedule_tables.push(tables);
    }

    Schedule::new(schedule_tables, teams)
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "round-robin slots are defined modulo the table count"
)]
fn round_robin_slot(index: usize, hosted: usize, course: usize, tables: usize) -> usize {
    if tables == 0 {
        return 0;
    }
    let offset = (hosted % tables + tables - course % tables) % tables;
    (index + (course % tables) * offset) % tables
}

/// Table sizes for `teams` split over `tables`, larger tables first.
#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "balanced integer split of teams over tables"
)]
fn table_sizes(teams: usize, tables: usize) -> Vec<usize> {
    if tables == 0 {
        return Vec::new();
    }
    let base = teams / tables;
    let extra = teams % tables;
    (0..tables).map(|i| base + usize::from(i < extra)).collect()
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    conflicts: usize,
    off_slot: bool,
    distance: f64,
    host: usize,
}

impl Candidate {
    fn cmp(a: &Self, b: &Self) -> Ordering {
        a.conflicts
            .cmp(&b.conflicts)
            .then(a.off_slot.cmp(&b.off_slot))
            .then(a.distance.total_cmp(&b.distance))
            .then(a.host.cmp(&b.host))
    }
}

/// Pairwise meeting counts accumulated while seating.
struct Encounters {
    teams: usize,
    counts: Vec<u16>,
}

impl Encounters {
    fn new(teams: usize) -> Self {
        Self {
            teams,
            counts: vec![0; teams.saturating_mul(teams)],
        }
    }

    fn count(&self, a: usize, b: usize) -> u16 {
        self.counts.get(a * self.teams + b).copied().unwrap_or(0)
    }

    fn record(&mut self, table: &Table) {
        let members: Vec<usize> = table.members().collect();
        for &a in &members {
            for &b in &members {
                if a != b
                    && let Some(cell) = self.counts.get_mut(a * self.teams + b)
                {
                    *cell = cell.saturating_add(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precheck::precheck;
    use rstest::rstest;
    use rundinner_core::test_support::grid_teams;
    use rundinner_core::{ConstraintModel, GroupSizeBounds, HaversineEstimator, classic_menu};

    fn build(teams: u64) -> (ConstraintModel, Schedule) {
        let model = ConstraintModel::new(classic_menu(), grid_teams(teams), GroupSizeBounds::default())
            .expect("valid model");
        let layout = precheck(&model).expect("feasible");
        let travel = TravelTable::build(&model, &HaversineEstimator::default(), 3_000.0)
            .expect("travel table");
        let schedule = construct(&layout, &travel, model.teams().len());
        (model, schedule)
    }

    #[rstest]
    #[case(0, 0, 1, 3, 2)]
    #[case(1, 0, 1, 3, 0)]
    #[case(0, 2, 1, 3, 1)]
    #[case(2, 1, 2, 3, 0)]
    fn round_robin_slots(
        #[case] index: usize,
        #[case] hosted: usize,
        #[case] course: usize,
        #[case] tables: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(round_robin_slot(index, hosted, course, tables), expected);
    }

    #[rstest]
    #[case(9)]
    #[case(15)]
    fn prime_table_counts_give_repeat_free_rotations(#[case] teams: u64) {
        let (model, schedule) = build(teams);
        let rotation = schedule.to_rotation(&model);
        assert_eq!(rotation.repeat_encounters(), 0);
    }

    #[rstest]
    #[case(6)]
    #[case(10)]
    #[case(13)]
    fn every_team_sits_once_per_course_within_bounds(#[case] teams: u64) {
        let (model, schedule) = build(teams);
        let bounds = model.group_size();
        for course in 0..schedule.courses() {
            let seated: usize = schedule.tables(course).iter().map(Table::size).sum();
            assert_eq!(seated, model.teams().len());
            assert!(schedule.tables(course).iter().all(|t| bounds.contains(t.size())));
        }
    }

    #[rstest]
    fn table_sizes_are_balanced() {
        assert_eq!(table_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(table_sizes(9, 3), vec![3, 3, 3]);
    }
}
