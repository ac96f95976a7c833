//! # Trajectory Store
//!
//! SQLite-backed store for the normalized three-table schema:
//! `User` → `Activity` → `TrackPoint`, with cascading deletes down the chain.
//!
//! Ingestion is single-writer and synchronous; every call here blocks. Batch
//! inserts are chunked purely to bound statement size. The analytics queries
//! return rows pre-joined and pre-ordered by `(activity_id, point id)` so the
//! scans in [`crate::analytics`] can group by contiguous activity runs
//! without sorting.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::analytics::{AltitudeRow, ModeUsageRow, PointRow, TimestampRow};
use crate::error::Result;
use crate::TrackPoint;

/// Text layout for stored datetimes.
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed trajectory store.
///
/// The connection is released when the store is dropped, including on the
/// error path of an aborted run.
pub struct Store {
    conn: Connection,
}

impl Store {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given database path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create the schema if it does not exist.
    pub fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS User (
                id TEXT NOT NULL PRIMARY KEY,
                has_labels INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS Activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                transportation_mode TEXT,
                start_date_time TEXT,
                end_date_time TEXT,
                FOREIGN KEY (user_id) REFERENCES User(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS TrackPoint (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                activity_id INTEGER,
                lat REAL,
                lon REAL,
                altitude INTEGER,
                date_days REAL,
                date_time TEXT,
                FOREIGN KEY (activity_id) REFERENCES Activity(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_activity_user ON Activity(user_id);
            CREATE INDEX IF NOT EXISTS idx_trackpoint_activity ON TrackPoint(activity_id);
        "#,
        )?;
        Ok(())
    }

    /// Drop a table if it exists.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", name))?;
        Ok(())
    }

    // ========================================================================
    // Ingestion Writes
    // ========================================================================

    /// Insert one user row.
    pub fn insert_user(&self, id: &str, has_labels: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO User (id, has_labels) VALUES (?, ?)",
            params![id, has_labels],
        )?;
        Ok(())
    }

    /// Insert one activity row and return its store-assigned id.
    pub fn insert_activity(
        &self,
        user_id: &str,
        mode: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO Activity (user_id, transportation_mode, start_date_time, end_date_time)
             VALUES (?, ?, ?, ?)",
            params![
                user_id,
                mode,
                start.format(DATETIME_FMT).to_string(),
                end.format(DATETIME_FMT).to_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Bulk-insert an activity's points, preserving source order.
    ///
    /// Rows are partitioned into multi-values statements of `batch_size`
    /// rows each, all inside one transaction.
    pub fn insert_trackpoints(
        &mut self,
        activity_id: i64,
        points: &[TrackPoint],
        batch_size: usize,
    ) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for chunk in points.chunks(batch_size.max(1)) {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO TrackPoint (activity_id, lat, lon, altitude, date_days, date_time)
                 VALUES {}",
                placeholders
            );

            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 6);
            for point in chunk {
                values.push(Value::Integer(activity_id));
                values.push(Value::Real(point.lat));
                values.push(Value::Real(point.lon));
                values.push(Value::Integer(point.altitude as i64));
                values.push(Value::Real(point.date_days));
                values.push(Value::Text(point.time.format(DATETIME_FMT).to_string()));
            }
            tx.execute(&sql, rusqlite::params_from_iter(values))?;
        }
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Counts & Ad-hoc Queries
    // ========================================================================

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> Result<i64> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Execute an ad-hoc query and return its rows as untyped values.
    pub fn execute_query(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ncols = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..ncols)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // Analytics Queries (pre-joined, pre-ordered)
    // ========================================================================

    /// (activity_id, lat, lon) for one user's activities of one mode in one
    /// year, ordered by activity then point insertion order.
    pub fn points_for_user_mode_year(
        &self,
        user_id: &str,
        mode: &str,
        year: i32,
    ) -> Result<Vec<PointRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT TrackPoint.activity_id, TrackPoint.lat, TrackPoint.lon
             FROM TrackPoint
             WHERE TrackPoint.activity_id IN (
                 SELECT id FROM Activity
                 WHERE user_id = ?1
                   AND transportation_mode = ?2
                   AND strftime('%Y', start_date_time) = ?3
             )
             ORDER BY TrackPoint.activity_id, TrackPoint.id",
        )?;
        let rows = stmt
            .query_map(params![user_id, mode, year.to_string()], |row| {
                Ok(PointRow {
                    activity_id: row.get(0)?,
                    lat: row.get(1)?,
                    lon: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// (user_id, activity_id, altitude) across all users, ordered by
    /// activity then point insertion order.
    pub fn altitude_rows(&self) -> Result<Vec<AltitudeRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT Activity.user_id, TrackPoint.activity_id, TrackPoint.altitude
             FROM TrackPoint
             INNER JOIN Activity ON TrackPoint.activity_id = Activity.id
             ORDER BY TrackPoint.activity_id, TrackPoint.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AltitudeRow {
                    user_id: row.get(0)?,
                    activity_id: row.get(1)?,
                    altitude: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// (user_id, activity_id, timestamp) across all users, ordered by
    /// activity then point insertion order.
    pub fn timestamp_rows(&self) -> Result<Vec<TimestampRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT Activity.user_id, TrackPoint.activity_id, TrackPoint.date_time
             FROM TrackPoint
             INNER JOIN Activity ON TrackPoint.activity_id = Activity.id
             ORDER BY TrackPoint.activity_id, TrackPoint.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TimestampRow {
                    user_id: row.get(0)?,
                    activity_id: row.get(1)?,
                    time: datetime_column(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// (user_id, mode, count) aggregated over labeled activities, sorted by
    /// user ascending then count descending.
    pub fn mode_usage_rows(&self) -> Result<Vec<ModeUsageRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, transportation_mode, COUNT(*) AS cnt
             FROM Activity
             WHERE transportation_mode IS NOT NULL
             GROUP BY transportation_mode, user_id
             ORDER BY user_id ASC, cnt DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ModeUsageRow {
                    user_id: row.get(0)?,
                    mode: row.get(1)?,
                    count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// (start, end) spans of every activity, for recorded-hours tallies.
    pub fn activity_spans(&self) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT start_date_time, end_date_time FROM Activity")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((datetime_column(row, 0)?, datetime_column(row, 1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Mean activity count per user; `None` when no activities exist.
    pub fn average_activities_per_user(&self) -> Result<Option<f64>> {
        let avg = self.conn.query_row(
            "SELECT AVG(cnt) FROM (
                 SELECT COUNT(*) AS cnt FROM Activity GROUP BY user_id
             )",
            [],
            |row| row.get::<_, Option<f64>>(0),
        )?;
        Ok(avg)
    }

    /// Users with the most activities, descending.
    pub fn most_active_users(&self, limit: u32) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, COUNT(*) AS cnt
             FROM Activity
             GROUP BY user_id
             ORDER BY cnt DESC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct users with at least one activity of the given mode.
    pub fn users_with_mode(&self, mode: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM Activity
             WHERE transportation_mode = ?
             GROUP BY user_id",
        )?;
        let rows = stmt
            .query_map(params![mode], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Activity count per labeled transportation mode.
    pub fn mode_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT transportation_mode, COUNT(*) AS cnt
             FROM Activity
             WHERE transportation_mode IS NOT NULL
             GROUP BY transportation_mode",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The year with the most activities; `None` on an empty store.
    pub fn year_with_most_activities(&self) -> Result<Option<(i32, i64)>> {
        let row = self
            .conn
            .query_row(
                "SELECT CAST(strftime('%Y', start_date_time) AS INTEGER) AS year,
                        COUNT(*) AS cnt
                 FROM Activity
                 GROUP BY year
                 ORDER BY cnt DESC
                 LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Distinct users with a trackpoint whose coordinates round (3 decimals)
    /// to the given cell.
    pub fn users_at_location(&self, lat: f64, lon: f64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT Activity.user_id
             FROM TrackPoint
             INNER JOIN Activity ON TrackPoint.activity_id = Activity.id
             WHERE ROUND(TrackPoint.lat, 3) = ?1 AND ROUND(TrackPoint.lon, 3) = ?2
             GROUP BY Activity.user_id",
        )?;
        let rows = stmt
            .query_map(params![lat, lon], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Read a stored `YYYY-MM-DD HH:MM:SS` text column back into a timestamp.
fn datetime_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(index)?;
    NaiveDateTime::parse_from_str(&text, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}
