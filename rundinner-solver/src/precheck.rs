//! Feasibility checks and host selection.
//!
//! Everything here runs before a single distance is looked up: group counts
//! are derived from the team count and size bounds, hosting slots are matched
//! to eligible teams, and two pigeonhole bounds decide whether repeat
//! encounters are a hard constraint: the distinct partners each team needs,
//! and whether any table outgrows another course's table count.

use log::info;
use rundinner_core::{ConstraintModel, EncounterPolicy, InfeasibleReason};

/// What the construction phase needs from a successful precheck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Layout {
    /// Table count per course, in menu order.
    pub tables: Vec<usize>,
    /// Hosting team indices per course, ascending.
    pub hosts: Vec<Vec<usize>>,
    /// `eligible[team][course]`.
    pub eligible: Vec<Vec<bool>>,
    /// Whether moves that add repeat encounters are forbidden.
    pub hard_encounters: bool,
}

/// Run every check in order and pick the hosts.
///
/// # Errors
///
/// Returns the first [`InfeasibleReason`] that applies.
pub(crate) fn precheck(model: &ConstraintModel) -> Result<Layout, InfeasibleReason> {
    let teams = model.teams().len();
    let courses = model.courses().len();
    let bounds = model.group_size();

    let fewest = teams.div_ceil(bounds.max());
    let most = teams.checked_div(bounds.min()).unwrap_or(0);
    if fewest == 0 || fewest > most {
        return Err(InfeasibleReason::GroupSizeUnsatisfiable {
            teams,
            min: bounds.min(),
            max: bounds.max(),
        });
    }

    let eligible: Vec<Vec<bool>> = model
        .teams()
        .iter()
        .map(|team| {
            model
                .courses()
                .iter()
                .map(|course| team.can_host(course.id))
                .collect()
        })
        .collect();
    let capable = model.host_capable_count();
    let required = courses.saturating_mul(fewest);
    if capable < courses || capable < required {
        return Err(InfeasibleReason::InsufficientHostCapacity {
            eligible: capable,
            required,
        });
    }
    let maximum = courses.saturating_mul(most);
    if capable > maximum {
        return Err(InfeasibleReason::ExcessHostCapacity {
            eligible: capable,
            maximum,
        });
    }

    // Every eligible team hosts exactly one course.
    let tables = spread(capable, courses);
    let hosts = match_hosts(model, &eligible, &tables)?;

    let hard_encounters = encounter_hardness(model, teams, &tables)?;
    info!(
        "precheck passed: {teams} teams, {courses} courses, tables per course {tables:?}, \
         repeat encounters {}",
        if hard_encounters { "forbidden" } else { "penalised" }
    );

    Ok(Layout {
        tables,
        hosts,
        eligible,
        hard_encounters,
    })
}

/// Split `slots` over `courses` as evenly as possible, earlier courses first.
#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "balanced integer split of hosting slots"
)]
fn spread(slots: usize, courses: usize) -> Vec<usize> {
    let base = slots / courses;
    let extra = slots % courses;
    (0..courses)
        .map(|course| base + usize::from(course < extra))
        .collect()
}

/// Decide whether repeat encounters are forbidden under the model's policy.
///
/// A repeat-free rotation needs two things. Each team must find enough
/// distinct partners, and no table may hold more teams than another course
/// has tables, since its members must all sit apart there.
fn encounter_hardness(
    model: &ConstraintModel,
    teams: usize,
    tables: &[usize],
) -> Result<bool, InfeasibleReason> {
    let required = partners_needed(teams, tables);
    let available = teams.saturating_sub(1);
    let obstacle = if required > available {
        Some(InfeasibleReason::EncounterCapacity {
            required,
            available,
        })
    } else {
        table_overlap(teams, tables).map(|(course, table_size, fewest)| {
            InfeasibleReason::TableOverlap {
                course: model.courses().get(course).map_or(0, |c| c.id),
                table_size,
                tables: fewest,
            }
        })
    };

    match (model.encounter_policy(), obstacle) {
        (EncounterPolicy::Strict, Some(reason)) => Err(reason),
        (EncounterPolicy::Strict, None) => Ok(true),
        (EncounterPolicy::Relaxed, _) => Ok(false),
        (EncounterPolicy::Auto, obstacle) => Ok(obstacle.is_none()),
    }
}

/// Lower bound on the distinct partners one team needs across all courses.
#[expect(
    clippy::integer_division,
    reason = "smallest table size under an even split"
)]
fn partners_needed(teams: usize, tables: &[usize]) -> usize {
    tables
        .iter()
        .map(|&count| (teams / count.max(1)).saturating_sub(1))
        .sum()
}

/// The first course whose largest table exceeds the table count of another
/// course, as `(course, largest table, fewest other tables)`.
fn table_overlap(teams: usize, tables: &[usize]) -> Option<(usize, usize, usize)> {
    tables.iter().enumerate().find_map(|(course, &count)| {
        let largest = teams.div_ceil(count.max(1));
        let fewest = tables
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != course)
            .map(|(_, &other)| other)
            .min()?;
        (largest > fewest).then_some((course, largest, fewest))
    })
}

/// Assign hosting slots to teams with augmenting paths.
///
/// Teams with the fewest eligible courses go first, and each team tries its
/// preferred course before the others.
fn match_hosts(
    model: &ConstraintModel,
    eligible: &[Vec<bool>],
    tables: &[usize],
) -> Result<Vec<Vec<usize>>, InfeasibleReason> {
    let options: Vec<Vec<usize>> = model
        .teams()
        .iter()
        .zip(eligible)
        .map(|(team, row)| {
            let preferred = team
                .preferred_course
                .and_then(|id| model.courses().iter().position(|course| course.id == id));
            let mut courses: Vec<usize> = row
                .iter()
                .enumerate()
                .filter_map(|(course, &ok)| ok.then_some(course))
                .collect();
            if let Some(first) = preferred
                && let Some(position) = courses.iter().position(|&course| course == first)
            {
                courses.remove(position);
                courses.insert(0, first);
            }
            courses
        })
        .collect();

    let mut order: Vec<usize> = (0..options.len())
        .filter(|&team| options.get(team).is_some_and(|o| !o.is_empty()))
        .collect();
    order.sort_by_key(|&team| (options.get(team).map_or(0, Vec::len), team));

    let mut matching = Matching {
        options: &options,
        capacity: tables,
        slots: vec![Vec::new(); tables.len()],
    };
    let total: usize = tables.iter().sum();
    for team in order {
        if matching.filled() == total {
            break;
        }
        let mut visited = vec![false; tables.len()];
        matching.augment(team, &mut visited);
    }

    for (course, (slots, &capacity)) in matching.slots.iter_mut().zip(tables).enumerate() {
        if slots.len() < capacity {
            let id = model.courses().get(course).map_or(0, |c| c.id);
            return Err(InfeasibleReason::HostEligibility { course: id });
        }
        slots.sort_unstable();
    }
    Ok(matching.slots)
}

struct Matching<'a> {
    options: &'a [Vec<usize>],
    capacity: &'a [usize],
    slots: Vec<Vec<usize>>,
}

impl<'a> Matching<'a> {
    fn filled(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Seat `team` in a course with room, or else displace other hosts along
    /// an augmenting path.
    fn augment(&mut self, team: usize, visited: &mut [bool]) -> bool {
        let options: &'a [usize] = match self.options.get(team) {
            Some(options) => options,
            None => return false,
        };
        if let Some(&course) = options.iter().find(|&&course| self.has_room(course))
            && let Some(slots) = self.slots.get_mut(course)
        {
            slots.push(team);
            return true;
        }
        for &course in options {
            match visited.get_mut(course) {
                Some(seen) if !*seen => *seen = true,
                _ => continue,
            }
            let occupants = self.slots.get(course).cloned().unwrap_or_default();
            for (position, other) in occupants.into_iter().enumerate() {
                if self.augment(other, visited) {
                    if let Some(slot) = self
                        .slots
                        .get_mut(course)
                        .and_then(|slots| slots.get_mut(position))
                    {
                        *slot = team;
                    }
                    return true;
                }
            }
        }
        false
    }

    fn has_room(&self, course: usize) -> bool {
        let capacity = self.capacity.get(course).copied().unwrap_or(0);
        self.slots.get(course).map_or(0, Vec::len) < capacity
    }
}
