//! Optimize command implementation.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use rundinner_core::{
    BackendSlot, Clock, RateLimiter, RotationSolver, RouteCache, RouteResolver, SolveBudget,
    SqliteRouteCache, SystemClock,
};
use rundinner_routing::{
    DEFAULT_ORS_QUOTA, DEFAULT_OSRM_PROFILE, DEFAULT_OSRM_URL, HttpBackendConfig,
    OpenRouteServiceBackend, OsrmBackend,
};
use rundinner_runs::{DEFAULT_STALE_THRESHOLD, Orchestrator, RunRepository, SqliteRunRepository};
use rundinner_solver::LocalSearchSolver;
use serde::{Deserialize, Serialize};

use crate::event_file::{EventFileSource, load_event};
use crate::fs::{ensure_dir, require_file};
use crate::report::{RunReport, write_json};
use crate::{
    ARG_DATA_DIR, ARG_MAX_ITERATIONS, ARG_OFFLINE, ARG_OPTIMIZE_EVENT, ARG_ORS_API_KEY,
    ARG_OSRM_URL, ARG_SEED, ARG_STALE_AFTER, ARG_TIME_LIMIT, CliError, DEFAULT_DATA_DIR,
    ENV_OPTIMIZE_EVENT, ROUTES_DB, RUNS_DB,
};

/// CLI arguments for the `optimize` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "optimize",
    long_about = "Optimise the rotation of one event. The event is read from a \
                 JSON file; walking distances come from OpenRouteService (when \
                 an API key is configured), then OSRM, then a straight-line \
                 estimate, and are cached in the data directory alongside the \
                 run history.",
    about = "Optimise the rotation of an event"
)]
#[ortho_config(prefix = "RUNDINNER")]
pub(crate) struct OptimizeArgs {
    /// Path to a JSON file describing the event.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) event_path: Option<Utf8PathBuf>,
    /// Directory holding the route cache and the run database.
    #[arg(long = ARG_DATA_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) data_dir: Option<Utf8PathBuf>,
    /// Use cached and estimated distances only.
    #[arg(long = ARG_OFFLINE)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) offline: bool,
    /// Base URL of the OSRM server.
    #[arg(long = ARG_OSRM_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) osrm_url: Option<String>,
    /// OpenRouteService API key; the service is skipped without one.
    #[arg(long = ARG_ORS_API_KEY, value_name = "key")]
    #[serde(default)]
    pub(crate) ors_api_key: Option<String>,
    /// Maximum improvement iterations.
    #[arg(long = ARG_MAX_ITERATIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_iterations: Option<u64>,
    /// Wall-clock limit in seconds; zero removes the limit.
    #[arg(long = ARG_TIME_LIMIT, value_name = "seconds")]
    #[serde(default)]
    pub(crate) time_limit_secs: Option<u64>,
    /// Seed for the solver's random choices.
    #[arg(long = ARG_SEED, value_name = "seed")]
    #[serde(default)]
    pub(crate) seed: Option<u64>,
    /// Fail runs left active for longer than this many seconds.
    #[arg(long = ARG_STALE_AFTER, value_name = "seconds")]
    #[serde(default)]
    pub(crate) stale_after_secs: Option<u64>,
}

impl OptimizeArgs {
    pub(crate) fn into_config(self) -> Result<OptimizeConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        OptimizeConfig::try_from(merged)
    }
}

/// Resolved `optimize` command configuration.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct OptimizeConfig {
    /// Path to the event JSON file.
    pub(crate) event_path: Utf8PathBuf,
    /// Directory holding `routes.sqlite` and `runs.sqlite`.
    pub(crate) data_dir: Utf8PathBuf,
    /// Skip the HTTP backends.
    pub(crate) offline: bool,
    /// Base URL for the OSRM route service.
    pub(crate) osrm_url: String,
    /// OpenRouteService API key.
    pub(crate) ors_api_key: Option<String>,
    /// Limits handed to the solver.
    pub(crate) budget: SolveBudget,
    /// Age at which active runs count as abandoned.
    pub(crate) stale_threshold: Duration,
}

impl fmt::Debug for OptimizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizeConfig")
            .field("event_path", &self.event_path)
            .field("data_dir", &self.data_dir)
            .field("offline", &self.offline)
            .field("osrm_url", &self.osrm_url)
            .field(
                "ors_api_key",
                &self.ors_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("budget", &self.budget)
            .field("stale_threshold", &self.stale_threshold)
            .finish()
    }
}

impl OptimizeConfig {
    pub(crate) fn routes_db(&self) -> Utf8PathBuf {
        self.data_dir.join(ROUTES_DB)
    }

    pub(crate) fn runs_db(&self) -> Utf8PathBuf {
        self.data_dir.join(RUNS_DB)
    }

    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_file(&self.event_path, ARG_OPTIMIZE_EVENT)
    }
}

impl TryFrom<OptimizeArgs> for OptimizeConfig {
    type Error = CliError;

    fn try_from(args: OptimizeArgs) -> Result<Self, Self::Error> {
        let event_path = args.event_path.ok_or(CliError::MissingArgument {
            field: ARG_OPTIMIZE_EVENT,
            env: ENV_OPTIMIZE_EVENT,
        })?;
        let data_dir = args
            .data_dir
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATA_DIR));
        let osrm_url = args
            .osrm_url
            .unwrap_or_else(|| DEFAULT_OSRM_URL.to_owned());

        let mut budget = SolveBudget::default();
        if let Some(iterations) = args.max_iterations {
            budget = budget.with_max_iterations(iterations);
        }
        if let Some(seconds) = args.time_limit_secs {
            let limit = (seconds > 0).then(|| Duration::from_secs(seconds));
            budget = budget.with_time_limit(limit);
        }
        if let Some(seed) = args.seed {
            budget = budget.with_seed(seed);
        }
        let stale_threshold = args
            .stale_after_secs
            .map_or(DEFAULT_STALE_THRESHOLD, Duration::from_secs);

        Ok(Self {
            event_path,
            data_dir,
            offline: args.offline,
            osrm_url,
            ors_api_key: args.ors_api_key,
            budget,
            stale_threshold,
        })
    }
}

/// Builds the solver for the current optimize invocation.
pub(crate) trait OptimizeSolverBuilder {
    fn build(&self, config: &OptimizeConfig) -> Result<Arc<dyn RotationSolver>, CliError>;
}

/// Local search over distances from the cached resolver chain.
pub(crate) struct DefaultOptimizeSolverBuilder;

impl OptimizeSolverBuilder for DefaultOptimizeSolverBuilder {
    fn build(&self, config: &OptimizeConfig) -> Result<Arc<dyn RotationSolver>, CliError> {
        let path = config.routes_db();
        let cache = SqliteRouteCache::open(&path)
            .map_err(|source| CliError::OpenRouteCache { path, source })?;
        let resolver = build_resolver(config, Arc::new(cache))?;
        Ok(Arc::new(LocalSearchSolver::new(resolver)))
    }
}

/// Assemble the ORS → OSRM → estimator chain over `cache`.
pub(crate) fn build_resolver(
    config: &OptimizeConfig,
    cache: Arc<dyn RouteCache>,
) -> Result<RouteResolver, CliError> {
    let mut builder = RouteResolver::builder(cache);
    if config.offline {
        info!("offline mode: using cached and estimated distances only");
        return Ok(builder.build()?);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ors = OpenRouteServiceBackend::hosted(config.ors_api_key.as_deref()).map_err(|source| {
        CliError::BuildBackend {
            backend: OpenRouteServiceBackend::NAME,
            source,
        }
    })?;
    match ors {
        Some(backend) => {
            builder = builder.backend(
                BackendSlot::new(backend).with_limiter(RateLimiter::new(DEFAULT_ORS_QUOTA, clock)),
            );
        }
        None => info!("no OpenRouteService key configured; skipping it"),
    }

    let osrm = OsrmBackend::new(HttpBackendConfig::new(
        config.osrm_url.as_str(),
        DEFAULT_OSRM_PROFILE,
    ))
    .map_err(|source| CliError::BuildBackend {
        backend: OsrmBackend::NAME,
        source,
    })?;
    builder = builder.backend(BackendSlot::new(osrm));
    Ok(builder.build()?)
}

pub(crate) fn run_optimize_with(
    args: OptimizeArgs,
    builder: &dyn OptimizeSolverBuilder,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = resolve_optimize_config(args)?;
    let (event, model) = load_event(&config.event_path)?;
    ensure_dir(&config.data_dir).map_err(|source| CliError::CreateDataDir {
        path: config.data_dir.clone(),
        source,
    })?;
    let solver = builder.build(&config)?;
    let repository = open_run_store(&config.runs_db())?;

    let orchestrator = Orchestrator::new(
        repository,
        Arc::new(EventFileSource::new(event, model)),
        solver,
    )
    .with_budget(config.budget);
    let reconciled = orchestrator.reconcile_stale(config.stale_threshold)?;
    if !reconciled.is_empty() {
        warn!("failed {} stale runs before starting", reconciled.len());
    }

    let run = orchestrator.run_blocking(event)?;
    let assignments = orchestrator.assignments(run.id)?;
    let report = RunReport { run, assignments };
    write_json(writer, &report)?;

    match report.run.failure {
        Some(failure) => Err(CliError::RunFailed {
            run: report.run.id,
            kind: failure.kind,
            message: failure.message,
        }),
        None => Ok(()),
    }
}

fn resolve_optimize_config(args: OptimizeArgs) -> Result<OptimizeConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Open the run database at `path`, creating it when absent.
pub(crate) fn open_run_store(path: &Utf8Path) -> Result<Arc<dyn RunRepository>, CliError> {
    let repository = SqliteRunRepository::open(path).map_err(|source| CliError::OpenRunStore {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Arc::new(repository))
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<OptimizeConfig, CliError> {
    let merged = OptimizeArgs::merge_from_layers(layers).map_err(CliError::from)?;
    OptimizeConfig::try_from(merged)
}
