//! Shared test harness modules for the rundinner CLI.

use super::*;

mod event_file_unit;
mod helpers;
mod optimize_unit;
