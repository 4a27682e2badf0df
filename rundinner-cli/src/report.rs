//! JSON documents printed by the CLI.

use std::collections::BTreeMap;
use std::io::Write;

use rundinner_core::{CacheStats, TeamAssignment};
use rundinner_runs::OptimizationRun;
use serde::{Deserialize, Serialize};

use crate::CliError;

/// A run and, when it completed, every team's itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RunReport {
    pub(crate) run: OptimizationRun,
    pub(crate) assignments: Vec<TeamAssignment>,
}

/// Route cache entry counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CacheReport {
    pub(crate) entries: usize,
    pub(crate) by_source: BTreeMap<String, usize>,
}

impl From<CacheStats> for CacheReport {
    fn from(stats: CacheStats) -> Self {
        Self {
            entries: stats.entries,
            by_source: stats.by_source,
        }
    }
}

/// Pretty-print `value` followed by a newline.
pub(crate) fn write_json<T: Serialize>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}
