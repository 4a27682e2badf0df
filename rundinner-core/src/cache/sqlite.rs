//! SQLite-backed route cache that survives restarts.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{CacheEntry, CacheError, CacheKey, CacheStats, PutOutcome, RouteCache};
use crate::{Coordinate, Distance};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS route_cache (
    cache_key TEXT PRIMARY KEY,
    meters REAL NOT NULL,
    geometry TEXT,
    source TEXT NOT NULL,
    resolved_at TEXT NOT NULL
);
";

/// Route cache persisted in a SQLite database.
///
/// Rows are written with `INSERT OR IGNORE`, so the first writer for a key
/// wins even across processes sharing the file.
pub struct SqliteRouteCache {
    path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteRouteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteRouteCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRouteCache {
    /// Open or create the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sqlite`] when the database cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|source| CacheError::Sqlite {
            operation: "open database",
            source,
        })?;
        Self::with_connection(connection, Some(path.to_path_buf()))
    }

    /// An in-memory database, useful for tests and offline runs.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sqlite`] when SQLite cannot allocate the
    /// database.
    pub fn in_memory() -> Result<Self, CacheError> {
        let connection = Connection::open_in_memory().map_err(|source| CacheError::Sqlite {
            operation: "open in-memory database",
            source,
        })?;
        Self::with_connection(connection, None)
    }

    fn with_connection(connection: Connection, path: Option<PathBuf>) -> Result<Self, CacheError> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|source| CacheError::Sqlite {
                operation: "initialise schema",
                source,
            })?;
        Ok(Self {
            path,
            connection: Mutex::new(connection),
        })
    }

    fn with_connection_locked<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&connection)
    }
}

struct StoredRow {
    meters: f64,
    geometry: Option<String>,
    source: String,
    resolved_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meters: row.get(0)?,
            geometry: row.get(1)?,
            source: row.get(2)?,
            resolved_at: row.get(3)?,
        })
    }

    fn into_entry(self, key: CacheKey) -> Result<CacheEntry, CacheError> {
        let corrupt = |message: String| CacheError::Corrupt {
            key: key.storage_key(),
            message,
        };
        let geometry = self
            .geometry
            .map(|json| serde_json::from_str::<Vec<Coordinate>>(&json))
            .transpose()
            .map_err(|err| corrupt(format!("geometry: {err}")))?;
        let resolved_at = DateTime::parse_from_rfc3339(&self.resolved_at)
            .map_err(|err| corrupt(format!("resolved_at: {err}")))?
            .with_timezone(&Utc);
        let distance = Distance {
            meters: self.meters,
            geometry,
        };
        if !distance.is_valid() {
            return Err(corrupt(format!("invalid distance {}", self.meters)));
        }
        Ok(CacheEntry {
            key,
            distance,
            source: self.source,
            resolved_at,
        })
    }
}

impl RouteCache for SqliteRouteCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let row = self.with_connection_locked(|connection| {
            let mut statement = connection
                .prepare_cached(
                    "SELECT meters, geometry, source, resolved_at \
                     FROM route_cache WHERE cache_key = ?1",
                )
                .map_err(|source| CacheError::Sqlite {
                    operation: "prepare lookup",
                    source,
                })?;
            statement
                .query_row(params![key.storage_key()], StoredRow::from_row)
                .optional()
                .map_err(|source| CacheError::Sqlite {
                    operation: "lookup",
                    source,
                })
        })?;
        row.map(|stored| stored.into_entry(*key)).transpose()
    }

    fn put(&self, entry: CacheEntry) -> Result<PutOutcome, CacheError> {
        let geometry = entry
            .distance
            .geometry
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| CacheError::Corrupt {
                key: entry.key.storage_key(),
                message: format!("geometry: {err}"),
            })?;
        let inserted = self.with_connection_locked(|connection| {
            let mut statement = connection
                .prepare_cached(
                    "INSERT OR IGNORE INTO route_cache \
                     (cache_key, meters, geometry, source, resolved_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|source| CacheError::Sqlite {
                    operation: "prepare insert",
                    source,
                })?;
            statement
                .execute(params![
                    entry.key.storage_key(),
                    entry.distance.meters,
                    geometry,
                    entry.source,
                    entry.resolved_at.to_rfc3339(),
                ])
                .map_err(|source| CacheError::Sqlite {
                    operation: "insert",
                    source,
                })
        })?;
        Ok(if inserted == 0 {
            PutOutcome::AlreadyPresent
        } else {
            PutOutcome::Inserted
        })
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        self.with_connection_locked(|connection| {
            let mut statement = connection
                .prepare("SELECT source, COUNT(*) FROM route_cache GROUP BY source")
                .map_err(|source| CacheError::Sqlite {
                    operation: "prepare stats",
                    source,
                })?;
            let rows = statement
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(|source| CacheError::Sqlite {
                    operation: "stats",
                    source,
                })?;
            let mut stats = CacheStats::default();
            for row in rows {
                let (source_name, count) = row.map_err(|source| CacheError::Sqlite {
                    operation: "read stats row",
                    source,
                })?;
                let count = usize::try_from(count).unwrap_or(0);
                stats.entries += count;
                stats.by_source.insert(source_name, count);
            }
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyMode;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn key() -> CacheKey {
        CacheKey::new(
            Coordinate::new(48.1371, 11.5754).expect("valid"),
            Coordinate::new(48.1500, 11.5800).expect("valid"),
            KeyMode::Symmetric,
        )
    }

    fn entry(key: CacheKey, meters: f64) -> CacheEntry {
        CacheEntry {
            key,
            distance: Distance {
                meters,
                geometry: Some(vec![
                    Coordinate::new(48.1371, 11.5754).expect("valid"),
                    Coordinate::new(48.1500, 11.5800).expect("valid"),
                ]),
            },
            source: "openrouteservice".into(),
            resolved_at: Utc::now(),
        }
    }

    #[rstest]
    fn entries_survive_reopening(key: CacheKey) {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("routes.db");
        {
            let cache = SqliteRouteCache::open(&path).expect("open cache");
            assert_eq!(
                cache.put(entry(key, 1_234.5)).expect("put"),
                PutOutcome::Inserted
            );
        }
        let reopened = SqliteRouteCache::open(&path).expect("reopen cache");
        let stored = reopened.get(&key).expect("lookup").expect("entry present");
        assert_eq!(stored.distance.meters, 1_234.5);
        assert_eq!(stored.distance.geometry.map(|g| g.len()), Some(2));
        assert_eq!(stored.source, "openrouteservice");
    }

    #[rstest]
    fn first_writer_wins(key: CacheKey) {
        let cache = SqliteRouteCache::in_memory().expect("cache");
        cache.put(entry(key, 10.0)).expect("first put");
        assert_eq!(
            cache.put(entry(key, 20.0)).expect("second put"),
            PutOutcome::AlreadyPresent
        );
        let stored = cache.get(&key).expect("lookup").expect("present");
        assert_eq!(stored.distance.meters, 10.0);
    }

    #[rstest]
    fn corrupt_rows_surface_as_errors(key: CacheKey) {
        let cache = SqliteRouteCache::in_memory().expect("cache");
        cache
            .with_connection_locked(|connection| {
                connection
                    .execute(
                        "INSERT INTO route_cache VALUES (?1, 5.0, 'not json', 'osrm', ?2)",
                        params![key.storage_key(), Utc::now().to_rfc3339()],
                    )
                    .map_err(|source| CacheError::Sqlite {
                        operation: "seed",
                        source,
                    })
            })
            .expect("seed corrupt row");
        let err = cache.get(&key).expect_err("corrupt geometry");
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[rstest]
    fn stats_group_by_source(key: CacheKey) {
        let cache = SqliteRouteCache::in_memory().expect("cache");
        cache.put(entry(key, 10.0)).expect("put");
        let stats = cache.stats().expect("stats");
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.by_source.get("openrouteservice"), Some(&1));
    }
}
