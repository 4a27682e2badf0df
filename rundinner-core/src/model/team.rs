//! Participating teams and their hosting eligibility.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::course::CourseId;
use crate::Coordinate;

/// Identifier of a [`Team`].
pub type TeamId = u64;

/// Whether a team may open its kitchen to other teams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participation {
    /// The team can host one course.
    #[default]
    HostCapable,
    /// The team only ever visits other kitchens.
    GuestOnly,
}

/// A team taking part in the event.
///
/// Teams without a location are still scheduled; distances involving them
/// fall back to a configured constant.
///
/// # Examples
///
/// ```
/// use rundinner_core::{Coordinate, Participation, Team};
///
/// # fn main() -> Result<(), rundinner_core::CoordinateError> {
/// let team = Team::new(7, "Blue")
///     .with_location(Coordinate::new(48.14, 11.58)?)
///     .with_tag("vegetarian");
/// assert!(team.is_host_capable());
///
/// let visitor = Team::new(8, "Red").with_participation(Participation::GuestOnly);
/// assert!(!visitor.can_host(1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Unique identifier.
    pub id: TeamId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Home location, if it has been geocoded.
    #[serde(default)]
    pub location: Option<Coordinate>,
    /// Whether the team has a usable kitchen.
    #[serde(default = "default_has_kitchen")]
    pub has_kitchen: bool,
    /// Free-form dietary and accessibility tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Hosting participation type.
    #[serde(default)]
    pub participation: Participation,
    /// Courses the team is able to host. `None` means every course.
    #[serde(default)]
    pub host_courses: Option<BTreeSet<CourseId>>,
    /// Course the team would rather host, if any.
    #[serde(default)]
    pub preferred_course: Option<CourseId>,
}

const fn default_has_kitchen() -> bool {
    true
}

impl Team {
    /// Construct a host-capable team with a kitchen and no location.
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: None,
            has_kitchen: true,
            tags: BTreeSet::new(),
            participation: Participation::HostCapable,
            host_courses: None,
            preferred_course: None,
        }
    }

    /// Set the home location.
    #[must_use]
    pub fn with_location(mut self, location: Coordinate) -> Self {
        self.location = Some(location);
        self
    }

    /// Set kitchen availability.
    #[must_use]
    pub fn with_kitchen(mut self, has_kitchen: bool) -> Self {
        self.has_kitchen = has_kitchen;
        self
    }

    /// Set the participation type.
    #[must_use]
    pub fn with_participation(mut self, participation: Participation) -> Self {
        self.participation = participation;
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Restrict hosting to the given courses.
    #[must_use]
    pub fn with_host_courses(mut self, courses: impl IntoIterator<Item = CourseId>) -> Self {
        self.host_courses = Some(courses.into_iter().collect());
        self
    }

    /// Record a hosting preference.
    #[must_use]
    pub fn with_preferred_course(mut self, course: CourseId) -> Self {
        self.preferred_course = Some(course);
        self
    }

    /// Whether the team can host at all.
    #[must_use]
    pub fn is_host_capable(&self) -> bool {
        self.participation == Participation::HostCapable && self.has_kitchen
    }

    /// Whether the team can host `course`.
    #[must_use]
    pub fn can_host(&self, course: CourseId) -> bool {
        self.is_host_capable()
            && self
                .host_courses
                .as_ref()
                .is_none_or(|courses| courses.contains(&course))
    }
}
