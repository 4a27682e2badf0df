//! Event model: courses, teams, constraints and the resulting rotation.

mod constraints;
mod course;
mod rotation;
mod team;

pub use constraints::{
    ConstraintModel, EncounterPolicy, GroupSizeBounds, MIN_GROUP_SIZE, ModelError, TagRule,
};
pub use course::{Course, CourseId, classic_menu};
pub use rotation::{CourseRotation, CourseStop, Rotation, RotationGroup, TeamAssignment};
pub use team::{Participation, Team, TeamId};
