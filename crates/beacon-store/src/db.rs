use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Result};

/// Open a connection tuned for several processes sharing one database file
/// (the request layer plus one or more workers).
pub fn open_connection(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// Initialise trigger and event log tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_triggers_table(conn)?;
    create_event_logs_table(conn)?;
    Ok(())
}

fn create_triggers_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS triggers (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT    NOT NULL,
            type          TEXT    NOT NULL CHECK (type IN ('scheduled', 'api')),
            schedule_time TEXT,             -- set for absolute-time triggers
            interval_mins INTEGER,          -- set for relative/recurring triggers
            recurrence    INTEGER NOT NULL DEFAULT 0,
            api_endpoint  TEXT,
            api_payload   TEXT,             -- JSON document
            generation    INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_triggers_user
            ON triggers(user_id);",
    )
}

/// No foreign key on trigger_id: logs are history and outlive their trigger.
fn create_event_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS event_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            trigger_id  INTEGER,
            user_id     TEXT    NOT NULL,
            response    TEXT,               -- JSON document or NULL
            status      TEXT    NOT NULL DEFAULT 'active'
                                CHECK (status IN ('active', 'archived', 'test')),
            created_at  TEXT    NOT NULL,
            archived_at TEXT
        );
        -- sweeper: WHERE status = ? AND created_at <= ?
        CREATE INDEX IF NOT EXISTS idx_event_logs_status_created
            ON event_logs(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_event_logs_user
            ON event_logs(user_id, status, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_event_logs_trigger
            ON event_logs(trigger_id);",
    )
}

/// Fixed-width RFC 3339 (microseconds, `Z`), so lexical order is time order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 9, 59, 59).unwrap();
        let b = a + Duration::microseconds(1);
        let c = a + Duration::hours(1);
        assert!(fmt_ts(a) < fmt_ts(b));
        assert!(fmt_ts(b) < fmt_ts(c));
        assert_eq!(parse_ts(&fmt_ts(b)).unwrap(), b);
    }
}
