//! The validated input handed to a rotation solver.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::course::{Course, CourseId};
use super::team::{Team, TeamId};

/// Smallest group the engine will schedule: a host and one guest.
pub const MIN_GROUP_SIZE: usize = 2;

/// Inclusive bounds on the number of teams around one table, host included.
///
/// # Examples
///
/// ```
/// use rundinner_core::GroupSizeBounds;
///
/// let bounds = GroupSizeBounds::new(3, 3).expect("valid bounds");
/// assert!(bounds.contains(3));
/// assert!(!bounds.contains(4));
/// assert!(GroupSizeBounds::new(4, 2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds", into = "RawBounds")]
pub struct GroupSizeBounds {
    min: usize,
    max: usize,
}

impl GroupSizeBounds {
    /// Validate and construct bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidGroupSize`] when `min` is below
    /// [`MIN_GROUP_SIZE`] or greater than `max`.
    pub const fn new(min: usize, max: usize) -> Result<Self, ModelError> {
        if min < MIN_GROUP_SIZE || min > max {
            return Err(ModelError::InvalidGroupSize { min, max });
        }
        Ok(Self { min, max })
    }

    /// Smallest allowed group.
    #[must_use]
    pub const fn min(self) -> usize {
        self.min
    }

    /// Largest allowed group.
    #[must_use]
    pub const fn max(self) -> usize {
        self.max
    }

    /// Whether `size` lies within the bounds.
    #[must_use]
    pub const fn contains(self, size: usize) -> bool {
        size >= self.min && size <= self.max
    }
}

impl Default for GroupSizeBounds {
    fn default() -> Self {
        Self { min: 2, max: 4 }
    }
}

#[derive(Serialize, Deserialize)]
struct RawBounds {
    min: usize,
    max: usize,
}

impl TryFrom<RawBounds> for GroupSizeBounds {
    type Error = ModelError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl From<GroupSizeBounds> for RawBounds {
    fn from(value: GroupSizeBounds) -> Self {
        Self {
            min: value.min,
            max: value.max,
        }
    }
}

/// How strictly the solver avoids seating two teams together twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterPolicy {
    /// Repeat encounters are forbidden; the solver reports infeasibility
    /// rather than return a rotation containing one.
    Strict,
    /// Repeat encounters are only penalised.
    Relaxed,
    /// Hard when the team and course counts admit a repeat-free rotation,
    /// penalised otherwise.
    #[default]
    Auto,
}

/// A soft seating rule: guests tagged `guest_tag` should visit hosts tagged
/// `host_tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    /// Tag carried by the guest, e.g. `wheelchair`.
    pub guest_tag: String,
    /// Tag the host should carry, e.g. `step-free`.
    pub host_tag: String,
}

impl TagRule {
    /// Construct a rule.
    pub fn new(guest_tag: impl Into<String>, host_tag: impl Into<String>) -> Self {
        Self {
            guest_tag: guest_tag.into(),
            host_tag: host_tag.into(),
        }
    }

    /// Whether seating `guest` at `host` breaks this rule.
    #[must_use]
    pub fn violated_by(&self, guest: &Team, host: &Team) -> bool {
        guest.tags.contains(&self.guest_tag) && !host.tags.contains(&self.host_tag)
    }
}

/// Errors returned while building a [`ConstraintModel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// No courses were supplied.
    #[error("an event needs at least one course")]
    NoCourses,
    /// Fewer than two teams were supplied.
    #[error("an event needs at least two teams, got {count}")]
    TooFewTeams {
        /// Number of teams supplied.
        count: usize,
    },
    /// Two courses shared an identifier.
    #[error("course id {id} appears more than once")]
    DuplicateCourse {
        /// The repeated identifier.
        id: CourseId,
    },
    /// Two courses shared a menu position.
    #[error("course order {order} appears more than once")]
    DuplicateCourseOrder {
        /// The repeated position.
        order: u32,
    },
    /// Two teams shared an identifier.
    #[error("team id {id} appears more than once")]
    DuplicateTeam {
        /// The repeated identifier.
        id: TeamId,
    },
    /// A team referenced a course that is not on the menu.
    #[error("team {team} references unknown course {course}")]
    UnknownCourse {
        /// The offending team.
        team: TeamId,
        /// The unknown course.
        course: CourseId,
    },
    /// Group size bounds were inconsistent.
    #[error("group size bounds {min}..={max} are invalid")]
    InvalidGroupSize {
        /// Requested minimum.
        min: usize,
        /// Requested maximum.
        max: usize,
    },
}

/// Teams, courses and rules for one optimisation.
///
/// Courses are kept sorted by `order` and teams by `id`, so index-based
/// algorithms see a deterministic layout.
///
/// # Examples
///
/// ```
/// use rundinner_core::{classic_menu, ConstraintModel, GroupSizeBounds, Team};
///
/// let teams = (1..=6).map(|id| Team::new(id, format!("team {id}"))).collect();
/// let model = ConstraintModel::new(classic_menu(), teams, GroupSizeBounds::default())
///     .expect("valid model");
/// assert_eq!(model.courses().len(), 3);
/// assert_eq!(model.team_index(4), Some(3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintModel {
    courses: Vec<Course>,
    teams: Vec<Team>,
    group_size: GroupSizeBounds,
    encounter_policy: EncounterPolicy,
    tag_rules: Vec<TagRule>,
}

impl ConstraintModel {
    /// Validate and construct a model.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] describing the first inconsistency found.
    pub fn new(
        mut courses: Vec<Course>,
        mut teams: Vec<Team>,
        group_size: GroupSizeBounds,
    ) -> Result<Self, ModelError> {
        if courses.is_empty() {
            return Err(ModelError::NoCourses);
        }
        if teams.len() < 2 {
            return Err(ModelError::TooFewTeams { count: teams.len() });
        }
        courses.sort_by_key(|course| course.order);
        teams.sort_by_key(|team| team.id);

        let mut course_ids = BTreeSet::new();
        for pair in courses.windows(2) {
            if let [a, b] = pair
                && a.order == b.order
            {
                return Err(ModelError::DuplicateCourseOrder { order: a.order });
            }
        }
        for course in &courses {
            if !course_ids.insert(course.id) {
                return Err(ModelError::DuplicateCourse { id: course.id });
            }
        }
        for pair in teams.windows(2) {
            if let [a, b] = pair
                && a.id == b.id
            {
                return Err(ModelError::DuplicateTeam { id: a.id });
            }
        }
        for team in &teams {
            let referenced = team
                .host_courses
                .iter()
                .flatten()
                .chain(team.preferred_course.iter());
            for course in referenced {
                if !course_ids.contains(course) {
                    return Err(ModelError::UnknownCourse {
                        team: team.id,
                        course: *course,
                    });
                }
            }
        }

        Ok(Self {
            courses,
            teams,
            group_size,
            encounter_policy: EncounterPolicy::default(),
            tag_rules: Vec::new(),
        })
    }

    /// Replace the encounter policy.
    #[must_use]
    pub const fn with_encounter_policy(mut self, policy: EncounterPolicy) -> Self {
        self.encounter_policy = policy;
        self
    }

    /// Replace the tag rules.
    #[must_use]
    pub fn with_tag_rules(mut self, rules: Vec<TagRule>) -> Self {
        self.tag_rules = rules;
        self
    }

    /// Courses in menu order.
    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// Teams sorted by id.
    #[must_use]
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Group size bounds.
    #[must_use]
    pub const fn group_size(&self) -> GroupSizeBounds {
        self.group_size
    }

    /// Encounter policy.
    #[must_use]
    pub const fn encounter_policy(&self) -> EncounterPolicy {
        self.encounter_policy
    }

    /// Soft seating rules.
    #[must_use]
    pub fn tag_rules(&self) -> &[TagRule] {
        &self.tag_rules
    }

    /// Position of team `id` within [`Self::teams`].
    #[must_use]
    pub fn team_index(&self, id: TeamId) -> Option<usize> {
        self.teams.binary_search_by_key(&id, |team| team.id).ok()
    }

    /// Number of teams able to host at least one course.
    #[must_use]
    pub fn host_capable_count(&self) -> usize {
        self.teams
            .iter()
            .filter(|team| self.courses.iter().any(|course| team.can_host(course.id)))
            .count()
    }
}
