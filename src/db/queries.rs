pub const CREATE_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS events (
  id       INTEGER PRIMARY KEY AUTOINCREMENT,
  ts       INTEGER NOT NULL,
  type     TEXT NOT NULL,
  title    TEXT NOT NULL DEFAULT '',
  detail   TEXT NOT NULL DEFAULT '',
  duration INTEGER NOT NULL DEFAULT 0 CHECK (duration >= 0)
);
"#;

pub const INDEX_EVENTS_TS: &str = "CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);";

pub const INSERT_EVENT: &str =
    "INSERT INTO events (ts, type, title, detail, duration) VALUES (?1, ?2, ?3, ?4, ?5)";

pub const UPDATE_EVENT_DURATION: &str = "UPDATE events SET duration = ?1 WHERE id = ?2";

pub const SELECT_EVENTS_RANGE: &str = "SELECT id, ts, type, title, detail, duration
     FROM events
     WHERE (?1 IS NULL OR ts >= ?1) AND (?2 IS NULL OR ts <= ?2)
     ORDER BY ts ASC, id ASC
     LIMIT ?3";

pub const SELECT_LATEST_TS: &str = "SELECT ts FROM events ORDER BY ts DESC LIMIT 1";

pub fn schema_statements() -> Vec<&'static str> {
    vec![CREATE_EVENTS, INDEX_EVENTS_TS]
}
