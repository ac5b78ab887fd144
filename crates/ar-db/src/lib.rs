//! Read-only storage access for the activity event store.
//!
//! The store is an externally owned SQLite database (the tracker's
//! `peewee-sqlite` file) with two tables of interest: `bucketmodel`
//! (event channels) and `eventmodel` (timestamped, durationed rows).
//! This crate never writes to it.
//!
//! # Handle lifecycle
//!
//! [`Database`] wraps a `rusqlite::Connection` and is explicitly
//! constructed by the caller and dropped on scope exit; there is no
//! process-global handle. The connection is `Send` but not `Sync` — for
//! concurrent use, open one handle per task.
//!
//! # Row hygiene
//!
//! The store is loosely typed: `duration` may arrive as REAL, INTEGER, or
//! TEXT, and `datastr`/`name` may contain raw blobs. Reads coerce rather
//! than reject — a malformed duration becomes NaN (filtered downstream),
//! blob text decodes lossily, and non-JSON payload text is wrapped into a
//! JSON string so downstream parsing stays uniform.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, params_from_iter};
use thiserror::Error;

use ar_core::RawEvent;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse an event timestamp.
    #[error("invalid timestamp for event {event_id}: {timestamp}")]
    TimestampParse { event_id: i64, timestamp: String },
}

/// Read-only connection to the event store.
pub struct Database {
    conn: Connection,
}

/// An event channel (bucket) in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: i64,
    pub id: String,
    pub bucket_type: String,
    pub client: String,
    pub hostname: String,
}

fn text_lossy(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
    }
}

/// Coerces a loosely typed duration column to seconds.
///
/// Unparseable text becomes NaN so the normalizer's duration filter
/// discards the event instead of the whole query failing.
fn coerce_duration(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Real(f) => f,
        #[expect(clippy::cast_precision_loss, reason = "durations are small")]
        ValueRef::Integer(n) => n as f64,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Ensures payload text is JSON; non-JSON text is wrapped as a JSON string.
fn coerce_payload(raw: Option<String>) -> String {
    let Some(text) = raw else {
        return "{}".to_string();
    };
    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
        text
    } else {
        serde_json::Value::String(text).to_string()
    }
}

/// Parses store timestamps: RFC 3339 first, then the naive
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` form the store also emits, read as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

fn row_to_event(row: &Row<'_>) -> Result<RawEvent, rusqlite::Error> {
    let id: i64 = row.get("id")?;
    let bucket_id: i64 = row.get("bucket_id")?;
    let timestamp_text: String = row.get("timestamp")?;
    let duration = coerce_duration(row.get_ref("duration")?);
    let payload = coerce_payload(text_lossy(row.get_ref("datastr")?));
    let bucket_type: String = row.get("type")?;

    let timestamp = parse_timestamp(&timestamp_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(DbError::TimestampParse {
                event_id: id,
                timestamp: timestamp_text,
            }),
        )
    })?;

    Ok(RawEvent {
        id,
        bucket_id,
        timestamp,
        duration,
        payload,
        bucket_type,
    })
}

impl Database {
    /// Opens the store read-only. The file must already exist.
    pub fn open_readonly(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!(path = %path.display(), "opened event store read-only");
        Ok(Self { conn })
    }

    /// Opens a writable handle. Only used by tests and fixtures; the
    /// analyzer itself never mutates the store.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Creates the store schema on an empty database (test fixtures).
    pub fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS bucketmodel (
                key INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                created TEXT NOT NULL,
                name TEXT,
                type TEXT NOT NULL,
                client TEXT NOT NULL,
                hostname TEXT NOT NULL,
                datastr TEXT
            );
            CREATE TABLE IF NOT EXISTS eventmodel (
                id INTEGER PRIMARY KEY,
                bucket_id INTEGER NOT NULL REFERENCES bucketmodel(key),
                timestamp TEXT NOT NULL,
                duration REAL NOT NULL,
                datastr TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_eventmodel_timestamp
                ON eventmodel(timestamp);
            ",
        )?;
        Ok(())
    }

    /// Inserts one event row (test fixtures).
    pub fn insert_event(
        &self,
        bucket_key: i64,
        timestamp: DateTime<Utc>,
        duration: f64,
        datastr: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO eventmodel (bucket_id, timestamp, duration, datastr)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                bucket_key,
                timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                duration,
                datastr
            ],
        )?;
        Ok(())
    }

    /// Inserts one bucket row (test fixtures).
    pub fn insert_bucket(&self, key: i64, id: &str, bucket_type: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO bucketmodel (key, id, created, name, type, client, hostname)
             VALUES (?1, ?2, ?3, NULL, ?4, 'test', 'test-host')",
            rusqlite::params![
                key,
                id,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                bucket_type
            ],
        )?;
        Ok(())
    }

    /// Lists all buckets, newest first.
    pub fn buckets(&self) -> Result<Vec<Bucket>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, id, type, client, hostname
             FROM bucketmodel
             ORDER BY created DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Bucket {
                key: row.get(0)?,
                id: row.get(1)?,
                bucket_type: row.get(2)?,
                client: row.get(3)?,
                hostname: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetches events within `[start, end)`, ascending by timestamp,
    /// optionally restricted to one bucket.
    ///
    /// Timestamps are compared as RFC 3339 text, which the store orders
    /// lexicographically equal to chronologically.
    pub fn events_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket_filter: Option<i64>,
    ) -> Result<Vec<RawEvent>, DbError> {
        let mut sql = String::from(
            "SELECT e.id, e.bucket_id, e.timestamp, e.duration, e.datastr, b.type
             FROM eventmodel e
             JOIN bucketmodel b ON e.bucket_id = b.key
             WHERE e.timestamp >= ?1 AND e.timestamp < ?2",
        );
        let mut params: Vec<String> = vec![
            start.to_rfc3339_opts(SecondsFormat::Micros, true),
            end.to_rfc3339_opts(SecondsFormat::Micros, true),
        ];
        if let Some(bucket) = bucket_filter {
            sql.push_str(" AND e.bucket_id = ?3");
            params.push(bucket.to_string());
        }
        sql.push_str(" ORDER BY e.timestamp ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), row_to_event)?;
        let events = rows.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = events.len(), "fetched events by time range");
        Ok(events)
    }
}
