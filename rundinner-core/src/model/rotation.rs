//! Solver output: who hosts which course and who visits whom.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::course::CourseId;
use super::team::TeamId;

/// One table during one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationGroup {
    /// Team cooking in its own kitchen.
    pub host: TeamId,
    /// Visiting teams, sorted by id.
    pub guests: Vec<TeamId>,
}

impl RotationGroup {
    /// Host followed by guests.
    pub fn members(&self) -> impl Iterator<Item = TeamId> + '_ {
        std::iter::once(self.host).chain(self.guests.iter().copied())
    }

    /// Number of teams at the table, host included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.guests.len() + 1
    }
}

/// All tables for a single course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRotation {
    /// The course being served.
    pub course: CourseId,
    /// Tables, sorted by host id.
    pub groups: Vec<RotationGroup>,
}

/// A complete hosting and visiting plan, one entry per course in menu order.
///
/// # Examples
///
/// ```
/// use rundinner_core::{CourseRotation, Rotation, RotationGroup};
///
/// let rotation = Rotation {
///     courses: vec![CourseRotation {
///         course: 1,
///         groups: vec![RotationGroup { host: 1, guests: vec![2, 3] }],
///     }],
/// };
/// assert_eq!(rotation.host_of(1, 3), Some(1));
/// assert_eq!(rotation.hosted_course(1), Some(1));
/// assert_eq!(rotation.repeat_encounters(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rotation {
    /// Per-course tables in menu order.
    pub courses: Vec<CourseRotation>,
}

impl Rotation {
    /// Host of the table `team` sits at during `course`.
    #[must_use]
    pub fn host_of(&self, course: CourseId, team: TeamId) -> Option<TeamId> {
        self.courses
            .iter()
            .find(|entry| entry.course == course)?
            .groups
            .iter()
            .find(|group| group.members().any(|member| member == team))
            .map(|group| group.host)
    }

    /// Course hosted by `team`, if any.
    #[must_use]
    pub fn hosted_course(&self, team: TeamId) -> Option<CourseId> {
        self.courses
            .iter()
            .find(|entry| entry.groups.iter().any(|group| group.host == team))
            .map(|entry| entry.course)
    }

    /// Number of times each unordered pair of teams shares a table.
    #[must_use]
    pub fn encounter_counts(&self) -> BTreeMap<(TeamId, TeamId), usize> {
        let mut counts = BTreeMap::new();
        for group in self.courses.iter().flat_map(|entry| &entry.groups) {
            let members: Vec<TeamId> = group.members().collect();
            for (position, a) in members.iter().enumerate() {
                for b in members.iter().skip(position + 1) {
                    let key = if a < b { (*a, *b) } else { (*b, *a) };
                    *counts.entry(key).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Meetings beyond the first, summed over all pairs.
    #[must_use]
    pub fn repeat_encounters(&self) -> usize {
        self.encounter_counts()
            .values()
            .map(|count| count.saturating_sub(1))
            .sum()
    }

    /// Build per-team itineraries.
    ///
    /// `distance(guest, host)` supplies the walking distance in metres; stops
    /// where a team hosts record zero.
    pub fn assignments<F>(&self, teams: &[TeamId], mut distance: F) -> Vec<TeamAssignment>
    where
        F: FnMut(TeamId, TeamId) -> f64,
    {
        teams
            .iter()
            .map(|&team| {
                let stops = self
                    .courses
                    .iter()
                    .filter_map(|entry| {
                        let host = self.host_of(entry.course, team)?;
                        let distance_m = if host == team {
                            0.0
                        } else {
                            distance(team, host)
                        };
                        Some(CourseStop {
                            course: entry.course,
                            host,
                            distance_m,
                        })
                    })
                    .collect();
                TeamAssignment {
                    team,
                    hosted_course: self.hosted_course(team),
                    stops,
                }
            })
            .collect()
    }
}

/// Where a team eats one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStop {
    /// The course.
    pub course: CourseId,
    /// Hosting team; equal to the team itself when it hosts.
    pub host: TeamId,
    /// Walking distance from the team's home to the host in metres.
    pub distance_m: f64,
}

/// A single team's itinerary for the evening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAssignment {
    /// The team.
    pub team: TeamId,
    /// Course the team hosts, if any.
    pub hosted_course: Option<CourseId>,
    /// One stop per course in menu order.
    pub stops: Vec<CourseStop>,
}

impl TeamAssignment {
    /// Total walking distance over all stops.
    #[must_use]
    pub fn total_distance_m(&self) -> f64 {
        self.stops.iter().map(|stop| stop.distance_m).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn rotation() -> Rotation {
        Rotation {
            courses: vec![
                CourseRotation {
                    course: 1,
                    groups: vec![RotationGroup {
                        host: 1,
                        guests: vec![2, 3],
                    }],
                },
                CourseRotation {
                    course: 2,
                    groups: vec![RotationGroup {
                        host: 2,
                        guests: vec![1, 3],
                    }],
                },
            ],
        }
    }

    #[rstest]
    fn counts_repeat_meetings(rotation: Rotation) {
        // Every pair meets twice.
        assert_eq!(rotation.repeat_encounters(), 3);
        assert_eq!(rotation.encounter_counts().get(&(1, 2)), Some(&2));
    }

    #[rstest]
    fn builds_itineraries(rotation: Rotation) {
        let assignments =
            rotation.assignments(&[3], |_, host| if host == 1 { 100.0 } else { 200.0 });
        let itinerary = assignments.first().expect("one itinerary");
        assert_eq!(itinerary.hosted_course, None);
        assert_eq!(itinerary.stops.len(), 2);
        assert_eq!(itinerary.total_distance_m(), 300.0);
    }

    #[rstest]
    fn hosts_travel_nowhere(rotation: Rotation) {
        let assignments = rotation.assignments(&[1], |_, _| 500.0);
        let itinerary = assignments.first().expect("one itinerary");
        assert_eq!(itinerary.hosted_course, Some(1));
        assert_eq!(itinerary.total_distance_m(), 500.0);
    }
}
