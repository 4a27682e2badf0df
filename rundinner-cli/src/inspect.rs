//! Read-only commands: `status` and `cache-stats`.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use rundinner_core::{RouteCache, SqliteRouteCache};
use rundinner_runs::RunId;
use serde::{Deserialize, Serialize};

use crate::fs::require_file;
use crate::optimize::open_run_store;
use crate::report::{CacheReport, RunReport, write_json};
use crate::{ARG_DATA_DIR, ARG_STATUS_RUN, CliError, DEFAULT_DATA_DIR, ENV_STATUS_RUN, ROUTES_DB, RUNS_DB};

/// CLI arguments for the `status` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "status", about = "Show a stored run and its itineraries")]
#[ortho_config(prefix = "RUNDINNER")]
pub(crate) struct StatusArgs {
    /// Identifier printed by `rundinner optimize`.
    #[arg(value_name = "run-id")]
    #[serde(default)]
    pub(crate) run_id: Option<RunId>,
    /// Directory holding the run database.
    #[arg(long = ARG_DATA_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) data_dir: Option<Utf8PathBuf>,
}

/// Resolved `status` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusConfig {
    pub(crate) run: RunId,
    pub(crate) runs_db: Utf8PathBuf,
}

impl TryFrom<StatusArgs> for StatusConfig {
    type Error = CliError;

    fn try_from(args: StatusArgs) -> Result<Self, Self::Error> {
        let run = args.run_id.ok_or(CliError::MissingArgument {
            field: ARG_STATUS_RUN,
            env: ENV_STATUS_RUN,
        })?;
        let data_dir = args
            .data_dir
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATA_DIR));
        Ok(Self {
            run,
            runs_db: data_dir.join(RUNS_DB),
        })
    }
}

pub(crate) fn run_status_with(args: StatusArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = StatusConfig::try_from(merged)?;
    require_file(&config.runs_db, ARG_DATA_DIR)?;

    let repository = open_run_store(&config.runs_db)?;
    let run = repository
        .get(config.run)?
        .ok_or(CliError::UnknownRun { run: config.run })?;
    let assignments = repository.assignments(run.id)?;
    write_json(writer, &RunReport { run, assignments })
}

/// CLI arguments for the `cache-stats` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "cache-stats", about = "Count cached walking distances per source")]
#[ortho_config(prefix = "RUNDINNER")]
pub(crate) struct CacheStatsArgs {
    /// Directory holding the route cache.
    #[arg(long = ARG_DATA_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) data_dir: Option<Utf8PathBuf>,
}

/// Resolved `cache-stats` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheStatsConfig {
    pub(crate) routes_db: Utf8PathBuf,
}

impl From<CacheStatsArgs> for CacheStatsConfig {
    fn from(args: CacheStatsArgs) -> Self {
        let data_dir = args
            .data_dir
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATA_DIR));
        Self {
            routes_db: data_dir.join(ROUTES_DB),
        }
    }
}

pub(crate) fn run_cache_stats_with(
    args: CacheStatsArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = CacheStatsConfig::from(merged);
    require_file(&config.routes_db, ARG_DATA_DIR)?;

    let cache = SqliteRouteCache::open(&config.routes_db).map_err(|source| {
        CliError::OpenRouteCache {
            path: config.routes_db.clone(),
            source,
        }
    })?;
    let stats = cache.stats().map_err(CliError::ReadRouteCache)?;
    write_json(writer, &CacheReport::from(stats))
}
