//! SQLite-backed run repository.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rundinner_core::{CourseStop, TeamAssignment};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use super::{RepositoryError, RunRepository, stale_cutoff, stale_failure};
use crate::run::{EventId, OptimizationRun, RunFailure, RunId, RunStatus, RunSummary};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS optimization_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    summary TEXT,
    failure_kind TEXT,
    failure_message TEXT
);
CREATE INDEX IF NOT EXISTS optimization_runs_event
    ON optimization_runs (event_id);
CREATE UNIQUE INDEX IF NOT EXISTS optimization_runs_one_active
    ON optimization_runs (event_id) WHERE status IN ('pending', 'running');
CREATE TABLE IF NOT EXISTS team_assignments (
    run_id INTEGER NOT NULL REFERENCES optimization_runs (id),
    team_id INTEGER NOT NULL,
    hosted_course INTEGER,
    PRIMARY KEY (run_id, team_id)
);
CREATE TABLE IF NOT EXISTS assignment_stops (
    run_id INTEGER NOT NULL,
    team_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    host_team_id INTEGER NOT NULL,
    distance_m REAL NOT NULL,
    PRIMARY KEY (run_id, team_id, position),
    FOREIGN KEY (run_id, team_id) REFERENCES team_assignments (run_id, team_id)
);
";

const RUN_COLUMNS: &str = "id, event_id, status, created_at, started_at, completed_at, summary, \
                           failure_kind, failure_message";

/// How long a writer waits for another process's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> RepositoryError {
    move |source| RepositoryError::Sqlite { operation, source }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_sql_id(value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::IdOutOfRange { value })
}

/// Run repository persisted in a SQLite database.
///
/// Each operation runs in an `IMMEDIATE` transaction and every transition is
/// a conditional `UPDATE … WHERE status = …`, so processes sharing the file
/// cannot both claim a run. A partial unique index additionally keeps at
/// most one active run per event.
pub struct SqliteRunRepository {
    path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteRunRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteRunRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRunRepository {
    /// Open or create the run database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Sqlite`] when the database cannot be opened
    /// or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(sqlite("open database"))?;
        Self::with_connection(connection, Some(path.to_path_buf()))
    }

    /// An in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Sqlite`] when SQLite cannot allocate the
    /// database.
    pub fn in_memory() -> Result<Self, RepositoryError> {
        let connection = Connection::open_in_memory().map_err(sqlite("open in-memory database"))?;
        Self::with_connection(connection, None)
    }

    fn with_connection(
        connection: Connection,
        path: Option<PathBuf>,
    ) -> Result<Self, RepositoryError> {
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite("set busy timeout"))?;
        connection
            .execute_batch(SCHEMA)
            .map_err(sqlite("initialise schema"))?;
        Ok(Self {
            path,
            connection: Mutex::new(connection),
        })
    }

    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| RepositoryError::Poisoned)?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sqlite("begin transaction"))?;
        let value = f(&transaction)?;
        transaction.commit().map_err(sqlite("commit transaction"))?;
        Ok(value)
    }
}

fn load_run(connection: &Connection, run: RunId) -> Result<Option<OptimizationRun>, RepositoryError> {
    connection
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM optimization_runs WHERE id = ?1"),
            [to_sql_id(run.0)?],
            RunRow::from_row,
        )
        .optional()
        .map_err(sqlite("load run"))?
        .map(RunRow::into_run)
        .transpose()
}

fn require_run(connection: &Connection, run: RunId) -> Result<OptimizationRun, RepositoryError> {
    load_run(connection, run)?.ok_or(RepositoryError::NotFound { run })
}

/// Turn an `UPDATE` that matched no row into the right error.
fn check_transition(
    connection: &Connection,
    run: RunId,
    changed: usize,
    expected: &'static str,
) -> Result<OptimizationRun, RepositoryError> {
    let record = require_run(connection, run)?;
    if changed == 0 {
        return Err(RepositoryError::InvalidTransition {
            run,
            expected,
            actual: record.status,
        });
    }
    Ok(record)
}

struct RunRow {
    id: i64,
    event_id: i64,
    status: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    summary: Option<String>,
    failure_kind: Option<String>,
    failure_message: Option<String>,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            event_id: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            summary: row.get(6)?,
            failure_kind: row.get(7)?,
            failure_message: row.get(8)?,
        })
    }

    fn into_run(self) -> Result<OptimizationRun, RepositoryError> {
        let id = RunId(u64::try_from(self.id).unwrap_or_default());
        let corrupt = |message: String| RepositoryError::Corrupt { run: id, message };
        let parse_time = |text: &str| {
            DateTime::parse_from_rfc3339(text)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|err| corrupt(format!("timestamp `{text}`: {err}")))
        };

        let event = u64::try_from(self.event_id)
            .map(EventId)
            .map_err(|_| corrupt(format!("event id {}", self.event_id)))?;
        let status = self.status.parse::<RunStatus>().map_err(corrupt)?;
        let created_at = parse_time(&self.created_at)?;
        let started_at = self.started_at.as_deref().map(parse_time).transpose()?;
        let completed_at = self.completed_at.as_deref().map(parse_time).transpose()?;
        let summary = self
            .summary
            .map(|json| serde_json::from_str::<RunSummary>(&json))
            .transpose()
            .map_err(|err| corrupt(format!("summary: {err}")))?;
        let failure = match self.failure_kind {
            Some(kind) => Some(RunFailure {
                kind: kind.parse().map_err(corrupt)?,
                message: self.failure_message.unwrap_or_default(),
            }),
            None => None,
        };

        Ok(OptimizationRun {
            id,
            event,
            status,
            created_at,
            started_at,
            completed_at,
            summary,
            failure,
        })
    }
}

fn store_assignments(
    transaction: &Transaction<'_>,
    run: i64,
    assignments: &[TeamAssignment],
) -> Result<(), RepositoryError> {
    let mut insert_team = transaction
        .prepare_cached(
            "INSERT INTO team_assignments (run_id, team_id, hosted_course) VALUES (?1, ?2, ?3)",
        )
        .map_err(sqlite("prepare insert assignment"))?;
    let mut insert_stop = transaction
        .prepare_cached(
            "INSERT INTO assignment_stops (
                run_id, team_id, position, course_id, host_team_id, distance_m
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(sqlite("prepare insert stop"))?;

    for assignment in assignments {
        let team = to_sql_id(assignment.team)?;
        insert_team
            .execute(params![run, team, assignment.hosted_course])
            .map_err(sqlite("insert assignment"))?;
        for (index, stop) in assignment.stops.iter().enumerate() {
            let position = i64::try_from(index).map_err(|_| RepositoryError::IdOutOfRange {
                value: u64::try_from(index).unwrap_or(u64::MAX),
            })?;
            insert_stop
                .execute(params![
                    run,
                    team,
                    position,
                    stop.course,
                    to_sql_id(stop.host)?,
                    stop.distance_m
                ])
                .map_err(sqlite("insert stop"))?;
        }
    }
    Ok(())
}

fn load_assignments(
    connection: &Connection,
    run: RunId,
) -> Result<Vec<TeamAssignment>, RepositoryError> {
    let sql_run = to_sql_id(run.0)?;
    let corrupt = |message: String| RepositoryError::Corrupt { run, message };
    let to_team = |value: i64| {
        u64::try_from(value).map_err(|_| corrupt(format!("team id {value}")))
    };

    let mut teams = connection
        .prepare_cached(
            "SELECT team_id, hosted_course FROM team_assignments
             WHERE run_id = ?1 ORDER BY team_id",
        )
        .map_err(sqlite("prepare load assignments"))?;
    let rows = teams
        .query_map([sql_run], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<u32>>(1)?))
        })
        .map_err(sqlite("load assignments"))?;
    let mut by_team = BTreeMap::new();
    for row in rows {
        let (raw_team, hosted_course) = row.map_err(sqlite("read assignment"))?;
        let team = to_team(raw_team)?;
        by_team.insert(
            team,
            TeamAssignment {
                team,
                hosted_course,
                stops: Vec::new(),
            },
        );
    }

    let mut stops = connection
        .prepare_cached(
            "SELECT team_id, course_id, host_team_id, distance_m FROM assignment_stops
             WHERE run_id = ?1 ORDER BY team_id, position",
        )
        .map_err(sqlite("prepare load stops"))?;
    let rows = stops
        .query_map([sql_run], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })
        .map_err(sqlite("load stops"))?;
    for row in rows {
        let (raw_team, course, host, distance_m) = row.map_err(sqlite("read stop"))?;
        let team = to_team(raw_team)?;
        let stop = CourseStop {
            course,
            host: to_team(host)?,
            distance_m,
        };
        by_team
            .get_mut(&team)
            .ok_or_else(|| corrupt(format!("stop for unknown team {team}")))?
            .stops
            .push(stop);
    }
    Ok(by_team.into_values().collect())
}

impl RunRepository for SqliteRunRepository {
    fn create_run(
        &self,
        event: EventId,
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError> {
        let sql_event = to_sql_id(event.0)?;
        self.in_transaction(|transaction| {
            let active: Option<i64> = transaction
                .query_row(
                    "SELECT id FROM optimization_runs
                     WHERE event_id = ?1 AND status IN ('pending', 'running')
                     ORDER BY id LIMIT 1",
                    [sql_event],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sqlite("check active runs"))?;
            if let Some(active) = active {
                return Err(RepositoryError::Conflict {
                    event,
                    active: RunId(u64::try_from(active).unwrap_or_default()),
                });
            }
            transaction
                .execute(
                    "INSERT INTO optimization_runs (event_id, status, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![sql_event, RunStatus::Pending.as_str(), timestamp(now)],
                )
                .map_err(sqlite("insert run"))?;
            let id = u64::try_from(transaction.last_insert_rowid()).unwrap_or_default();
            require_run(transaction, RunId(id))
        })
    }

    fn try_start(&self, run: RunId, now: DateTime<Utc>) -> Result<OptimizationRun, RepositoryError> {
        let sql_run = to_sql_id(run.0)?;
        self.in_transaction(|transaction| {
            let changed = transaction
                .execute(
                    "UPDATE optimization_runs SET status = 'running', started_at = ?2
                     WHERE id = ?1 AND status = 'pending'",
                    params![sql_run, timestamp(now)],
                )
                .map_err(sqlite("start run"))?;
            check_transition(transaction, run, changed, "pending")
        })
    }

    fn complete(
        &self,
        run: RunId,
        summary: &RunSummary,
        assignments: &[TeamAssignment],
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError> {
        let sql_run = to_sql_id(run.0)?;
        let summary_json = serde_json::to_string(summary).map_err(|err| RepositoryError::Corrupt {
            run,
            message: format!("summary: {err}"),
        })?;
        self.in_transaction(|transaction| {
            let changed = transaction
                .execute(
                    "UPDATE optimization_runs
                     SET status = 'completed', completed_at = ?2, summary = ?3
                     WHERE id = ?1 AND status = 'running'",
                    params![sql_run, timestamp(now), summary_json],
                )
                .map_err(sqlite("complete run"))?;
            let record = check_transition(transaction, run, changed, "running")?;
            store_assignments(transaction, sql_run, assignments)?;
            Ok(record)
        })
    }

    fn fail(
        &self,
        run: RunId,
        failure: &RunFailure,
        now: DateTime<Utc>,
    ) -> Result<OptimizationRun, RepositoryError> {
        let sql_run = to_sql_id(run.0)?;
        self.in_transaction(|transaction| {
            let changed = transaction
                .execute(
                    "UPDATE optimization_runs
                     SET status = 'failed', completed_at = ?2, failure_kind = ?3,
                         failure_message = ?4
                     WHERE id = ?1 AND status IN ('pending', 'running')",
                    params![
                        sql_run,
                        timestamp(now),
                        failure.kind.as_str(),
                        failure.message
                    ],
                )
                .map_err(sqlite("fail run"))?;
            check_transition(transaction, run, changed, "active")
        })
    }

    fn get(&self, run: RunId) -> Result<Option<OptimizationRun>, RepositoryError> {
        self.in_transaction(|transaction| load_run(transaction, run))
    }

    fn assignments(&self, run: RunId) -> Result<Vec<TeamAssignment>, RepositoryError> {
        self.in_transaction(|transaction| {
            require_run(transaction, run)?;
            load_assignments(transaction, run)
        })
    }

    fn runs_for_event(&self, event: EventId) -> Result<Vec<OptimizationRun>, RepositoryError> {
        let sql_event = to_sql_id(event.0)?;
        self.in_transaction(|transaction| {
            let mut statement = transaction
                .prepare_cached(&format!(
                    "SELECT {RUN_COLUMNS} FROM optimization_runs WHERE event_id = ?1 ORDER BY id"
                ))
                .map_err(sqlite("prepare runs for event"))?;
            let rows = statement
                .query_map([sql_event], RunRow::from_row)
                .map_err(sqlite("load runs for event"))?;
            rows.map(|row| row.map_err(sqlite("read run")).and_then(RunRow::into_run))
                .collect()
        })
    }

    fn reconcile_stale(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<RunId>, RepositoryError> {
        let cutoff = stale_cutoff(threshold, now);
        let failure = stale_failure(threshold);
        self.in_transaction(|transaction| {
            let active: Vec<OptimizationRun> = {
                let mut statement = transaction
                    .prepare_cached(&format!(
                        "SELECT {RUN_COLUMNS} FROM optimization_runs
                         WHERE status IN ('pending', 'running') ORDER BY id"
                    ))
                    .map_err(sqlite("prepare stale scan"))?;
                let rows = statement
                    .query_map([], RunRow::from_row)
                    .map_err(sqlite("scan active runs"))?;
                rows.map(|row| row.map_err(sqlite("read run")).and_then(RunRow::into_run))
                    .collect::<Result<_, _>>()?
            };

            let mut reconciled = Vec::new();
            for run in active {
                let since = match run.status {
                    RunStatus::Running => run.started_at.unwrap_or(run.created_at),
                    _ => run.created_at,
                };
                if since >= cutoff {
                    continue;
                }
                let changed = transaction
                    .execute(
                        "UPDATE optimization_runs
                         SET status = 'failed', completed_at = ?2, failure_kind = ?3,
                             failure_message = ?4
                         WHERE id = ?1 AND status = ?5",
                        params![
                            to_sql_id(run.id.0)?,
                            timestamp(now),
                            failure.kind.as_str(),
                            failure.message,
                            run.status.as_str()
                        ],
                    )
                    .map_err(sqlite("reconcile run"))?;
                if changed > 0 {
                    reconciled.push(run.id);
                }
            }
            Ok(reconciled)
        })
    }
}
