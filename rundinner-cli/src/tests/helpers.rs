//! Test helpers for writing event files into temporary workspaces.

use camino::{Utf8Path, Utf8PathBuf};
use rundinner_core::test_support::grid_teams;
use rundinner_runs::EventId;
use tempfile::TempDir;

use crate::event_file::EventFile;

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents).expect("write test file");
}

/// A temporary directory and its UTF-8 path.
pub(super) fn workspace() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
    (tmp, root)
}

/// An event file with `teams` grid teams and every other field defaulted.
pub(super) fn event_file(event: u64, teams: u64) -> EventFile {
    let payload = serde_json::json!({
        "event": event,
        "teams": grid_teams(teams),
    });
    serde_json::from_value(payload).expect("event file JSON")
}

pub(super) fn write_event(path: &Utf8Path, event: &EventFile) {
    let payload = serde_json::to_string_pretty(event).expect("serialise event");
    write_utf8(path, payload.as_bytes());
}

pub(super) const SAMPLE_EVENT: EventId = EventId(3);
