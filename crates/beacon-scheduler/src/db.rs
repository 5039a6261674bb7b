use rusqlite::Connection;

use crate::error::Result;

/// Initialise the delayed job schema in `conn`. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS delayed_jobs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            queue       TEXT    NOT NULL,
            due_at      TEXT    NOT NULL,   -- RFC 3339, fixed width
            call        TEXT    NOT NULL,   -- JSON-encoded JobCall
            enqueued_at TEXT    NOT NULL
        );

        -- Claim query: WHERE queue = ? AND due_at <= ? ORDER BY due_at, id
        CREATE INDEX IF NOT EXISTS idx_delayed_jobs_due
            ON delayed_jobs (queue, due_at, id);
        ",
    )?;
    Ok(())
}
