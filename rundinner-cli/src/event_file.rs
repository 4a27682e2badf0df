//! The JSON event description read by `rundinner optimize`.

use std::io::BufReader;

use camino::Utf8Path;
use rundinner_core::{
    ConstraintModel, Course, EncounterPolicy, GroupSizeBounds, ModelError, TagRule, Team,
};
use rundinner_runs::{EventId, EventSource, EventSourceError};
use serde::{Deserialize, Serialize};

use crate::CliError;
use crate::fs::open_utf8_file;

/// An event as stored on disk.
///
/// Only `event` and `teams` are required; the menu defaults to appetizer,
/// main course and dessert, and groups default to two to four teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EventFile {
    pub(crate) event: EventId,
    #[serde(default = "rundinner_core::classic_menu")]
    pub(crate) courses: Vec<Course>,
    pub(crate) teams: Vec<Team>,
    #[serde(default)]
    pub(crate) group_size: GroupSizeBounds,
    #[serde(default)]
    pub(crate) encounter_policy: EncounterPolicy,
    #[serde(default)]
    pub(crate) tag_rules: Vec<TagRule>,
}

impl EventFile {
    /// Validate the file into a solver model.
    pub(crate) fn into_model(self) -> Result<(EventId, ConstraintModel), ModelError> {
        let model = ConstraintModel::new(self.courses, self.teams, self.group_size)?
            .with_encounter_policy(self.encounter_policy)
            .with_tag_rules(self.tag_rules);
        Ok((self.event, model))
    }
}

/// Load and validate the event at `path`.
pub(crate) fn load_event(path: &Utf8Path) -> Result<(EventId, ConstraintModel), CliError> {
    let file = open_utf8_file(path).map_err(|source| CliError::OpenEventFile {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: EventFile = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        CliError::ParseEventFile {
            path: path.to_path_buf(),
            source,
        }
    })?;
    parsed.into_model().map_err(|source| CliError::InvalidEvent {
        path: path.to_path_buf(),
        source,
    })
}

/// Serves the single event loaded from disk.
#[derive(Debug, Clone)]
pub(crate) struct EventFileSource {
    event: EventId,
    model: ConstraintModel,
}

impl EventFileSource {
    pub(crate) const fn new(event: EventId, model: ConstraintModel) -> Self {
        Self { event, model }
    }
}

impl EventSource for EventFileSource {
    fn load_model(&self, event: EventId) -> Result<ConstraintModel, EventSourceError> {
        if event == self.event {
            Ok(self.model.clone())
        } else {
            Err(EventSourceError::UnknownEvent { event })
        }
    }
}
