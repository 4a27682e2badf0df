//! Random neighbourhood sampling.

use rand::Rng;
use rundinner_core::GroupSizeBounds;

use crate::schedule::{Move, Schedule};

/// Attempts per sample before giving up on finding a valid move.
const MAX_ATTEMPTS: usize = 16;

/// Static facts a move must respect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MoveSpace<'a> {
    /// `eligible[team][course]`.
    pub eligible: &'a [Vec<bool>],
    pub bounds: GroupSizeBounds,
}

impl MoveSpace<'_> {
    fn can_host(&self, team: usize, course: usize) -> bool {
        self.eligible
            .get(team)
            .and_then(|row| row.get(course))
            .copied()
            .unwrap_or(false)
    }

    /// Draw a valid move, or `None` if none turned up within the attempt
    /// limit.
    pub(crate) fn sample<R: Rng>(&self, schedule: &Schedule, rng: &mut R) -> Option<Move> {
        let teams = schedule.teams();
        let courses = schedule.courses();
        if teams < 2 || courses == 0 {
            return None;
        }
        (0..MAX_ATTEMPTS).find_map(|_| match rng.gen_range(0..3) {
            0 => self.guest_swap(schedule, rng, teams, courses),
            1 => self.guest_move(schedule, rng, teams, courses),
            _ => self.host_swap(schedule, rng, teams),
        })
    }

    fn guest_swap<R: Rng>(
        &self,
        schedule: &Schedule,
        rng: &mut R,
        teams: usize,
        courses: usize,
    ) -> Option<Move> {
        let course = rng.gen_range(0..courses);
        let a = rng.gen_range(0..teams);
        let b = rng.gen_range(0..teams);
        let hosts_course = |team| schedule.hosted(team) == Some(course);
        if a == b || hosts_course(a) || hosts_course(b) {
            return None;
        }
        (schedule.seat(course, a)? != schedule.seat(course, b)?)
            .then_some(Move::GuestSwap { course, a, b })
    }

    fn guest_move<R: Rng>(
        &self,
        schedule: &Schedule,
        rng: &mut R,
        teams: usize,
        courses: usize,
    ) -> Option<Move> {
        let course = rng.gen_range(0..courses);
        let tables = schedule.tables(course);
        if tables.len() < 2 {
            return None;
        }
        let guest = rng.gen_range(0..teams);
        let to = rng.gen_range(0..tables.len());
        if schedule.hosted(guest) == Some(course) {
            return None;
        }
        let from = schedule.seat(course, guest)?;
        let shrinks_ok = tables.get(from)?.size() > self.bounds.min();
        let grows_ok = tables.get(to)?.size() < self.bounds.max();
        (from != to && shrinks_ok && grows_ok).then_some(Move::GuestMove { course, guest, to })
    }

    fn host_swap<R: Rng>(&self, schedule: &Schedule, rng: &mut R, teams: usize) -> Option<Move> {
        let a = rng.gen_range(0..teams);
        let b = rng.gen_range(0..teams);
        let ca = schedule.hosted(a)?;
        let cb = schedule.hosted(b)?;
        (ca != cb && self.can_host(a, cb) && self.can_host(b, ca)).then_some(Move::HostSwap { a, b })
    }
}
