//! Courses served during an event.

use serde::{Deserialize, Serialize};

/// Identifier of a [`Course`].
pub type CourseId = u32;

/// A single course of the menu.
///
/// Courses are visited in ascending `order`; the ordering is fixed for the
/// lifetime of an event.
///
/// # Examples
///
/// ```
/// use rundinner_core::Course;
///
/// let main = Course::new(2, "Main course", 1);
/// assert_eq!(main.order, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier.
    pub id: CourseId,
    /// Display name, e.g. "Dessert".
    pub name: String,
    /// Position in the menu, lowest first.
    pub order: u32,
}

impl Course {
    /// Construct a course.
    pub fn new(id: CourseId, name: impl Into<String>, order: u32) -> Self {
        Self {
            id,
            name: name.into(),
            order,
        }
    }
}

/// The classic three-course menu: appetizer, main course and dessert.
#[must_use]
pub fn classic_menu() -> Vec<Course> {
    vec![
        Course::new(1, "Appetizer", 0),
        Course::new(2, "Main course", 1),
        Course::new(3, "Dessert", 2),
    ]
}
