pub mod queries;

use anyhow::Context;
use chrono::{Duration, Local, NaiveDate, TimeZone};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const BUSY_TIMEOUT_SECONDS: u64 = 30;

pub const DAY_QUERY_LIMIT: usize = 10_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event {0} does not exist")]
    NotFound(i64),
    #[error("duration must be non-negative, got {0}")]
    NegativeDuration(i64),
    #[error("event store writer lock poisoned")]
    LockPoisoned,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare event store directory: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of an interval. Set once at creation.
///
/// Clients posting through the ingestion endpoint may use kinds outside the
/// known set; those are preserved verbatim as [`IntervalKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntervalKind {
    Window,
    Idle,
    Whatsapp,
    Telegram,
    Discord,
    Slack,
    BrowserInput,
    TextInput,
    Other(String),
}

impl IntervalKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Window => "window",
            Self::Idle => "idle",
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::BrowserInput => "browser_input",
            Self::TextInput => "text_input",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl From<&str> for IntervalKind {
    fn from(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "window" => Self::Window,
            "idle" => Self::Idle,
            "whatsapp" => Self::Whatsapp,
            "telegram" => Self::Telegram,
            "discord" => Self::Discord,
            "slack" => Self::Slack,
            "browser_input" => Self::BrowserInput,
            "text_input" => Self::TextInput,
            "" => Self::Other("unknown".to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for IntervalKind {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<IntervalKind> for String {
    fn from(kind: IntervalKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted activity interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub id: i64,
    #[serde(rename = "ts")]
    pub started_at: i64,
    #[serde(rename = "type")]
    pub kind: IntervalKind,
    #[serde(rename = "title")]
    pub label: String,
    pub detail: String,
    #[serde(rename = "duration")]
    pub duration_seconds: i64,
}

impl IntervalRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(2)?;

        Ok(Self {
            id: row.get(0)?,
            started_at: row.get(1)?,
            kind: IntervalKind::from(kind),
            label: row.get(3)?,
            detail: row.get(4)?,
            duration_seconds: row.get(5)?,
        })
    }
}

/// An interval that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterval {
    pub started_at: i64,
    pub kind: IntervalKind,
    pub label: String,
    pub detail: String,
    pub duration_seconds: i64,
}

/// Write side of the store, as seen by the tracker.
pub trait IntervalWriter {
    fn append(&self, interval: &NewInterval) -> Result<i64, StoreError>;
    fn update_duration(&self, id: i64, duration_seconds: i64) -> Result<(), StoreError>;
}

/// SQLite-backed event store.
///
/// All mutations go through one connection guarded by a mutex. Reads open
/// their own connection, so a reader never waits behind the writer lock and
/// always sees whole committed rows.
pub struct EventStore {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = connect(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| conn.execute(statement, []).map(|_| ()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, interval: &NewInterval) -> Result<i64, StoreError> {
        if interval.duration_seconds < 0 {
            return Err(StoreError::NegativeDuration(interval.duration_seconds));
        }

        let conn = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            queries::INSERT_EVENT,
            params![
                interval.started_at,
                interval.kind.as_str(),
                interval.label,
                interval.detail,
                interval.duration_seconds
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn update_duration(&self, id: i64, duration_seconds: i64) -> Result<(), StoreError> {
        if duration_seconds < 0 {
            return Err(StoreError::NegativeDuration(duration_seconds));
        }

        let conn = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let changed = conn.execute(queries::UPDATE_EVENT_DURATION, params![duration_seconds, id])?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        Ok(())
    }

    /// Intervals whose start lies in `[start_ts, end_ts]`, oldest first.
    /// A missing bound leaves that side open.
    pub fn query(
        &self,
        start_ts: Option<i64>,
        end_ts: Option<i64>,
        limit: usize,
    ) -> Result<Vec<IntervalRecord>, StoreError> {
        let conn = connect(&self.path)?;
        let mut statement = conn.prepare(queries::SELECT_EVENTS_RANGE)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = statement
            .query_map(params![start_ts, end_ts, limit], IntervalRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn latest_timestamp(&self) -> Result<Option<i64>, StoreError> {
        let conn = connect(&self.path)?;
        let ts = conn
            .query_row(queries::SELECT_LATEST_TS, [], |row| row.get(0))
            .optional()?;

        Ok(ts)
    }

    pub fn intervals_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<IntervalRecord>> {
        let (from_ts, to_ts) = local_day_bounds(date)?;

        self.query(Some(from_ts), Some(to_ts), DAY_QUERY_LIMIT)
            .with_context(|| format!("Failed to query events for {date}"))
    }
}

impl IntervalWriter for EventStore {
    fn append(&self, interval: &NewInterval) -> Result<i64, StoreError> {
        EventStore::append(self, interval)
    }

    fn update_duration(&self, id: i64, duration_seconds: i64) -> Result<(), StoreError> {
        EventStore::update_duration(self, id, duration_seconds)
    }
}

/// First and last second of a local calendar day.
pub fn local_day_bounds(date: NaiveDate) -> anyhow::Result<(i64, i64)> {
    let from = date
        .and_hms_opt(0, 0, 0)
        .context("Failed to build from timestamp")?;
    let to = (date + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .context("Failed to build to timestamp")?;

    let from_ts = Local
        .from_local_datetime(&from)
        .earliest()
        .context("Failed to convert from timestamp to local time")?
        .timestamp();
    let to_ts = Local
        .from_local_datetime(&to)
        .earliest()
        .context("Failed to convert to timestamp to local time")?
        .timestamp()
        - 1;

    Ok((from_ts, to_ts))
}

fn connect(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECONDS))?;
    Ok(conn)
}
