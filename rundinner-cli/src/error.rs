//! Error types emitted by the rundinner CLI.
//!
//! Keep this error type reasonably small; every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use rundinner_core::{CacheError, ModelError, ResolverBuildError};
use rundinner_routing::ProviderBuildError;
use rundinner_runs::{FailureKind, RepositoryError, RunId, TriggerError};
use thiserror::Error;

/// Errors emitted by the rundinner CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// The log subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The data directory could not be created.
    #[error("failed to create data directory {path:?}: {source}")]
    CreateDataDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the event file failed.
    #[error("failed to open event file at {path:?}: {source}")]
    OpenEventFile {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The event file is not valid JSON for an event.
    #[error("failed to parse event JSON at {path:?}: {source}")]
    ParseEventFile {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The event's teams or courses are inconsistent.
    #[error("event in {path:?} is invalid: {source}")]
    InvalidEvent {
        path: Utf8PathBuf,
        #[source]
        source: ModelError,
    },
    /// Opening the route cache failed.
    #[error("failed to open route cache at {path:?}: {source}")]
    OpenRouteCache {
        path: Utf8PathBuf,
        #[source]
        source: CacheError,
    },
    /// Reading route cache statistics failed.
    #[error("failed to read route cache: {0}")]
    ReadRouteCache(#[source] CacheError),
    /// A routing backend could not be constructed.
    #[error("failed to build {backend} backend: {source}")]
    BuildBackend {
        backend: &'static str,
        #[source]
        source: ProviderBuildError,
    },
    /// The distance resolver could not be constructed.
    #[error(transparent)]
    BuildResolver(#[from] ResolverBuildError),
    /// Opening the run database failed.
    #[error("failed to open run database at {path:?}: {source}")]
    OpenRunStore {
        path: Utf8PathBuf,
        #[source]
        source: RepositoryError,
    },
    /// Reading or updating runs failed.
    #[error(transparent)]
    RunStore(#[from] RepositoryError),
    /// The run could not be started or recorded.
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    /// No run has the requested id.
    #[error("run {run} does not exist")]
    UnknownRun { run: RunId },
    /// The run ended without a rotation.
    #[error("run {run} failed ({kind}): {message}")]
    RunFailed {
        run: RunId,
        kind: FailureKind,
        message: String,
    },
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
