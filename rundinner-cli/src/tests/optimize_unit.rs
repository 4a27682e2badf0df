//! Focused unit tests covering optimize configuration and resolver wiring.

use std::sync::Arc;
use std::time::Duration;

use super::helpers::{workspace, write_utf8};
use super::*;
use crate::optimize::{OptimizeArgs, OptimizeConfig, build_resolver, config_from_layers_for_test};
use camino::Utf8PathBuf;
use ortho_config::MergeComposer;
use rstest::rstest;
use rundinner_core::{MemoryRouteCache, SolveBudget};
use rundinner_routing::{DEFAULT_OSRM_URL, OpenRouteServiceBackend, OsrmBackend};
use rundinner_runs::DEFAULT_STALE_THRESHOLD;
use serde_json::json;

fn config_for(event_path: Utf8PathBuf) -> OptimizeConfig {
    OptimizeConfig::try_from(OptimizeArgs {
        event_path: Some(event_path),
        ..OptimizeArgs::default()
    })
    .expect("config should build")
}

#[rstest]
fn converting_optimize_without_event_errors() {
    let err = OptimizeConfig::try_from(OptimizeArgs::default())
        .expect_err("missing event should error");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_OPTIMIZE_EVENT);
            assert_eq!(env, ENV_OPTIMIZE_EVENT);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn optimize_config_applies_defaults() {
    let config = config_for(Utf8PathBuf::from("event.json"));

    assert_eq!(config.data_dir, Utf8PathBuf::from(DEFAULT_DATA_DIR));
    assert_eq!(config.routes_db(), Utf8PathBuf::from("./routes.sqlite"));
    assert_eq!(config.runs_db(), Utf8PathBuf::from("./runs.sqlite"));
    assert!(!config.offline);
    assert_eq!(config.osrm_url, DEFAULT_OSRM_URL);
    assert_eq!(config.ors_api_key, None);
    assert_eq!(config.budget, SolveBudget::default());
    assert_eq!(config.stale_threshold, DEFAULT_STALE_THRESHOLD);
}

#[rstest]
fn optimize_config_maps_budget_flags() {
    let args = OptimizeArgs {
        event_path: Some(Utf8PathBuf::from("event.json")),
        max_iterations: Some(250),
        time_limit_secs: Some(12),
        seed: Some(7),
        stale_after_secs: Some(90),
        ..OptimizeArgs::default()
    };

    let config = OptimizeConfig::try_from(args).expect("config should build");
    assert_eq!(config.budget.max_iterations, 250);
    assert_eq!(config.budget.time_limit, Some(Duration::from_secs(12)));
    assert_eq!(config.budget.seed, 7);
    assert_eq!(config.stale_threshold, Duration::from_secs(90));
}

#[rstest]
fn zero_time_limit_removes_the_limit() {
    let args = OptimizeArgs {
        event_path: Some(Utf8PathBuf::from("event.json")),
        time_limit_secs: Some(0),
        ..OptimizeArgs::default()
    };

    let config = OptimizeConfig::try_from(args).expect("config should build");
    assert_eq!(config.budget.time_limit, None);
}

#[rstest]
fn validate_sources_reports_missing_event() {
    let (_tmp, root) = workspace();
    let config = config_for(root.join("event.json"));

    match config.validate_sources().expect_err("event is absent") {
        CliError::MissingSourceFile { field, .. } => assert_eq!(field, ARG_OPTIMIZE_EVENT),
        other => panic!("expected MissingSourceFile, found {other:?}"),
    }
}

#[rstest]
fn validate_sources_reports_not_file() {
    let (_tmp, root) = workspace();
    let event_path = root.join("event.json");
    std::fs::create_dir(&event_path).expect("event directory");
    let config = config_for(event_path.clone());

    match config
        .validate_sources()
        .expect_err("expected directory path to fail validation")
    {
        CliError::SourcePathNotFile { field, path } => {
            assert_eq!(field, ARG_OPTIMIZE_EVENT);
            assert_eq!(path, event_path);
        }
        other => panic!("expected SourcePathNotFile, found {other:?}"),
    }
}

#[rstest]
fn validate_sources_accepts_an_existing_event() {
    let (_tmp, root) = workspace();
    let event_path = root.join("event.json");
    write_utf8(&event_path, b"{}");

    config_for(event_path)
        .validate_sources()
        .expect("event file exists");
}

#[rstest]
fn debug_output_redacts_the_api_key() {
    let mut config = config_for(Utf8PathBuf::from("event.json"));
    config.ors_api_key = Some("secret-key".to_owned());

    let rendered = format!("{config:?}");
    assert!(!rendered.contains("secret-key"));
    assert!(rendered.contains("<redacted>"));
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "event_path": 42 }));

    let err = config_from_layers_for_test(composer.layers())
        .expect_err("invalid config layer should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_honours_precedence() {
    let (_tmp, root) = workspace();
    let env_event = root.join("from-env-event.json");
    let cli_dir = root.join("from-cli");

    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "data_dir": root.join("from-file").as_str(),
            "osrm_url": "http://from-file:5000",
            "offline": true,
            "max_iterations": 10,
        }),
        None,
    );
    composer.push_environment(json!({
        "event_path": env_event.as_str(),
        "data_dir": root.join("from-env").as_str(),
        "max_iterations": 20,
    }));
    composer.push_cli(json!({
        "data_dir": cli_dir.as_str(),
        "max_iterations": 30,
    }));

    let config =
        config_from_layers_for_test(composer.layers()).expect("merged config should build");
    assert_eq!(config.event_path, env_event);
    assert_eq!(config.data_dir, cli_dir);
    assert_eq!(config.runs_db(), cli_dir.join(RUNS_DB));
    assert_eq!(config.osrm_url, "http://from-file:5000");
    assert!(config.offline);
    assert_eq!(config.budget.max_iterations, 30);
}

#[rstest]
#[case::offline(true, None, &[])]
#[case::osrm_only(false, None, &[OsrmBackend::NAME])]
#[case::blank_key(false, Some("   "), &[OsrmBackend::NAME])]
#[case::both(false, Some("key"), &[OpenRouteServiceBackend::NAME, OsrmBackend::NAME])]
fn resolver_chain_follows_configuration(
    #[case] offline: bool,
    #[case] key: Option<&str>,
    #[case] expected: &[&str],
) {
    let mut config = config_for(Utf8PathBuf::from("event.json"));
    config.offline = offline;
    config.ors_api_key = key.map(str::to_owned);

    let resolver = build_resolver(&config, Arc::new(MemoryRouteCache::new()))
        .expect("resolver should build");
    assert_eq!(resolver.backend_names(), expected);
}
