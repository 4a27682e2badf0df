//! Unit tests for event file decoding and validation.

use super::helpers::{SAMPLE_EVENT, event_file, workspace, write_event, write_utf8};
use crate::event_file::{EventFileSource, load_event};
use crate::CliError;
use rstest::rstest;
use rundinner_core::{EncounterPolicy, GroupSizeBounds, ModelError, classic_menu};
use rundinner_runs::{EventId, EventSource, EventSourceError};

#[rstest]
fn omitted_fields_take_their_defaults() {
    let file = event_file(SAMPLE_EVENT.0, 6);
    assert_eq!(file.event, SAMPLE_EVENT);
    assert_eq!(file.courses, classic_menu());
    assert_eq!(file.group_size, GroupSizeBounds::default());
    assert_eq!(file.encounter_policy, EncounterPolicy::Auto);
    assert!(file.tag_rules.is_empty());
}

#[rstest]
fn load_event_builds_a_validated_model() {
    let (_tmp, root) = workspace();
    let path = root.join("event.json");
    let mut file = event_file(SAMPLE_EVENT.0, 9);
    file.encounter_policy = EncounterPolicy::Strict;
    write_event(&path, &file);

    let (event, model) = load_event(&path).expect("event should load");
    assert_eq!(event, SAMPLE_EVENT);
    assert_eq!(model.teams().len(), 9);
    assert_eq!(model.courses().len(), 3);
    assert_eq!(model.encounter_policy(), EncounterPolicy::Strict);
}

#[rstest]
#[case::not_json(b"{ not valid json".as_slice())]
#[case::unknown_field(br#"{"event": 1, "teams": [], "venue": "town hall"}"#.as_slice())]
#[case::missing_teams(br#"{"event": 1}"#.as_slice())]
fn malformed_files_fail_to_parse(#[case] contents: &[u8]) {
    let (_tmp, root) = workspace();
    let path = root.join("event.json");
    write_utf8(&path, contents);

    match load_event(&path).expect_err("parse should fail") {
        CliError::ParseEventFile { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected ParseEventFile, found {other:?}"),
    }
}

#[rstest]
fn inconsistent_events_are_rejected() {
    let (_tmp, root) = workspace();
    let path = root.join("event.json");
    write_event(&path, &event_file(1, 1));

    match load_event(&path).expect_err("one team is not an event") {
        CliError::InvalidEvent { source, .. } => {
            assert_eq!(source, ModelError::TooFewTeams { count: 1 });
        }
        other => panic!("expected InvalidEvent, found {other:?}"),
    }
}

#[rstest]
fn missing_files_report_the_open_failure() {
    let (_tmp, root) = workspace();
    let path = root.join("absent.json");
    match load_event(&path).expect_err("file is absent") {
        CliError::OpenEventFile { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected OpenEventFile, found {other:?}"),
    }
}

#[rstest]
fn the_file_source_only_serves_its_own_event() {
    let (event, model) = event_file(5, 6).into_model().expect("valid model");
    let source = EventFileSource::new(event, model.clone());

    assert_eq!(source.load_model(EventId(5)), Ok(model));
    assert_eq!(
        source.load_model(EventId(6)),
        Err(EventSourceError::UnknownEvent { event: EventId(6) })
    );
}
