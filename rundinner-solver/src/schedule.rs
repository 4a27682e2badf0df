//! Index-based working representation of a rotation.
//!
//! The search mutates a [`Schedule`] many thousands of times, so it works on
//! team indices into [`ConstraintModel::teams`] rather than ids and converts
//! to a [`Rotation`] once at the end.

use rundinner_core::{ConstraintModel, CourseRotation, Rotation, RotationGroup};

/// One table: its host and the visiting guests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Table {
    pub host: usize,
    pub guests: Vec<usize>,
}

impl Table {
    pub(crate) fn size(&self) -> usize {
        self.guests.len() + 1
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.host).chain(self.guests.iter().copied())
    }
}

/// A local modification of a [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Move {
    /// Two guests at different tables of one course trade places.
    GuestSwap { course: usize, a: usize, b: usize },
    /// A guest changes table within one course.
    GuestMove {
        course: usize,
        guest: usize,
        to: usize,
    },
    /// Two hosts of different courses trade courses.
    HostSwap { a: usize, b: usize },
}

impl Move {
    /// Lowest team index involved; model indices follow team id order.
    pub(crate) fn lowest_team(self) -> usize {
        match self {
            Self::GuestSwap { a, b, .. } | Self::HostSwap { a, b } => a.min(b),
            Self::GuestMove { guest, .. } => guest,
        }
    }
}

/// Tables per course plus reverse lookups kept in sync by [`Schedule::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Schedule {
    /// `tables[course][table]`.
    tables: Vec<Vec<Table>>,
    /// `seat[course][team]`: table index the team sits at.
    seat: Vec<Vec<usize>>,
    /// `hosted[team]`: course the team hosts.
    hosted: Vec<Option<usize>>,
}

impl Schedule {
    /// Build the lookups for `tables` over `teams` teams.
    pub(crate) fn new(tables: Vec<Vec<Table>>, teams: usize) -> Self {
        let mut seat = vec![vec![0; teams]; tables.len()];
        let mut hosted = vec![None; teams];
        for (course, course_tables) in tables.iter().enumerate() {
            for (index, table) in course_tables.iter().enumerate() {
                if let Some(slot) = hosted.get_mut(table.host) {
                    *slot = Some(course);
                }
                for member in table.members() {
                    if let Some(slot) = seat.get_mut(course).and_then(|row| row.get_mut(member)) {
                        *slot = index;
                    }
                }
            }
        }
        Self {
            tables,
            seat,
            hosted,
        }
    }

    pub(crate) fn courses(&self) -> usize {
        self.tables.len()
    }

    pub(crate) fn teams(&self) -> usize {
        self.hosted.len()
    }

    pub(crate) fn tables(&self, course: usize) -> &[Table] {
        self.tables.get(course).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn all_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().flatten()
    }

    pub(crate) fn seat(&self, course: usize, team: usize) -> Option<usize> {
        self.seat.get(course)?.get(team).copied()
    }

    pub(crate) fn hosted(&self, team: usize) -> Option<usize> {
        self.hosted.get(team).copied().flatten()
    }

    pub(crate) fn hosts(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.hosted
            .iter()
            .enumerate()
            .filter_map(|(team, course)| course.map(|c| (team, c)))
    }

    /// Apply `mv`, which must already have been validated by the caller.
    pub(crate) fn apply(&mut self, mv: Move) {
        match mv {
            Move::GuestSwap { course, a, b } => {
                let (Some(ta), Some(tb)) = (self.seat(course, a), self.seat(course, b)) else {
                    return;
                };
                self.replace_guest(course, ta, a, b);
                self.replace_guest(course, tb, b, a);
                self.set_seat(course, a, tb);
                self.set_seat(course, b, ta);
            }
            Move::GuestMove { course, guest, to } => {
                let Some(from) = self.seat(course, guest) else {
                    return;
                };
                if let Some(table) = self.table_mut(course, from) {
                    table.guests.retain(|&g| g != guest);
                }
                if let Some(table) = self.table_mut(course, to) {
                    table.guests.push(guest);
                }
                self.set_seat(course, guest, to);
            }
            Move::HostSwap { a, b } => {
                let (Some(ca), Some(cb)) = (self.hosted(a), self.hosted(b)) else {
                    return;
                };
                self.take_over(ca, b, a);
                self.take_over(cb, a, b);
                self.set_hosted(a, cb);
                self.set_hosted(b, ca);
            }
        }
    }

    /// `successor` becomes host of `predecessor`'s table in `course`, and
    /// `predecessor` takes the guest seat `successor` leaves behind.
    fn take_over(&mut self, course: usize, successor: usize, predecessor: usize) {
        let (Some(hosted_at), Some(guest_at)) =
            (self.seat(course, predecessor), self.seat(course, successor))
        else {
            return;
        };
        if let Some(table) = self.table_mut(course, hosted_at) {
            table.host = successor;
        }
        self.replace_guest(course, guest_at, successor, predecessor);
        self.set_seat(course, predecessor, guest_at);
        self.set_seat(course, successor, hosted_at);
    }

    fn replace_guest(&mut self, course: usize, table: usize, old: usize, new: usize) {
        if let Some(slot) = self
            .table_mut(course, table)
            .and_then(|t| t.guests.iter_mut().find(|g| **g == old))
        {
            *slot = new;
        }
    }

    fn table_mut(&mut self, course: usize, index: usize) -> Option<&mut Table> {
        self.tables.get_mut(course)?.get_mut(index)
    }

    fn set_seat(&mut self, course: usize, team: usize, table: usize) {
        if let Some(slot) = self.seat.get_mut(course).and_then(|row| row.get_mut(team)) {
            *slot = table;
        }
    }

    fn set_hosted(&mut self, team: usize, course: usize) {
        if let Some(slot) = self.hosted.get_mut(team) {
            *slot = Some(course);
        }
    }

    /// Convert to the public id-based representation, with tables ordered by
    /// host id and guests ascending.
    pub(crate) fn to_rotation(&self, model: &ConstraintModel) -> Rotation {
        let id = |index: usize| model.teams().get(index).map_or(0, |team| team.id);
        let courses = model
            .courses()
            .iter()
            .zip(&self.tables)
            .map(|(course, tables)| {
                let mut groups: Vec<RotationGroup> = tables
                    .iter()
                    .map(|table| {
                        let mut guests: Vec<_> = table.guests.iter().map(|&g| id(g)).collect();
                        guests.sort_unstable();
                        RotationGroup {
                            host: id(table.host),
                            guests,
                        }
                    })
                    .collect();
                groups.sort_by_key(|group| group.host);
                CourseRotation {
                    course: course.id,
                    groups,
                }
            })
            .collect();
        Rotation { courses }
    }
}
