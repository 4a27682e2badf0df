//! Command-line interface for the Running Dinner rotation engine.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod error;
mod event_file;
mod fs;
mod inspect;
mod optimize;
mod report;

pub use error::CliError;

use inspect::{CacheStatsArgs, StatusArgs, run_cache_stats_with, run_status_with};
use optimize::{DefaultOptimizeSolverBuilder, OptimizeArgs, OptimizeSolverBuilder, run_optimize_with};

pub(crate) const ARG_OPTIMIZE_EVENT: &str = "event";
pub(crate) const ENV_OPTIMIZE_EVENT: &str = "RUNDINNER_CMDS_OPTIMIZE_EVENT_PATH";
pub(crate) const ARG_DATA_DIR: &str = "data-dir";
pub(crate) const ARG_OFFLINE: &str = "offline";
pub(crate) const ARG_OSRM_URL: &str = "osrm-url";
pub(crate) const ARG_ORS_API_KEY: &str = "ors-api-key";
pub(crate) const ARG_MAX_ITERATIONS: &str = "max-iterations";
pub(crate) const ARG_TIME_LIMIT: &str = "time-limit-secs";
pub(crate) const ARG_SEED: &str = "seed";
pub(crate) const ARG_STALE_AFTER: &str = "stale-after-secs";
pub(crate) const ARG_STATUS_RUN: &str = "run-id";
pub(crate) const ENV_STATUS_RUN: &str = "RUNDINNER_CMDS_STATUS_RUN_ID";

/// Directory used for the route cache and run database when none is given.
pub(crate) const DEFAULT_DATA_DIR: &str = ".";
/// Route cache file inside the data directory.
pub(crate) const ROUTES_DB: &str = "routes.sqlite";
/// Run database file inside the data directory.
pub(crate) const RUNS_DB: &str = "runs.sqlite";

/// Run the CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments or configuration are invalid, when a
/// command fails, or when an optimisation run ends without a rotation.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging()?;
    let mut stdout = std::io::stdout().lock();
    dispatch(cli, &DefaultOptimizeSolverBuilder, &mut stdout)
}

fn dispatch(
    cli: Cli,
    builder: &dyn OptimizeSolverBuilder,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    match cli.command {
        Command::Optimize(args) => run_optimize_with(args, builder, writer),
        Command::Status(args) => run_status_with(args, writer),
        Command::CacheStats(args) => run_cache_stats_with(args, writer),
    }
}

/// Send `log` records and tracing events to stderr, filtered by `RUST_LOG`.
fn init_logging() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| CliError::Logging(err.to_string()))
}

#[derive(Debug, Parser)]
#[command(
    name = "rundinner",
    about = "Plan who cooks for whom at a running dinner",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Optimise the rotation of an event described in a JSON file.
    Optimize(OptimizeArgs),
    /// Show a stored run and its itineraries.
    Status(StatusArgs),
    /// Count cached walking distances per source.
    CacheStats(CacheStatsArgs),
}

#[cfg(test)]
mod tests;
