use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_store::db::{fmt_ts, parse_ts};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    types::{Job, JobCall, QueueName},
};

/// Due-time ordered work queue.
///
/// A job stays persisted until a worker claims it; claiming removes it
/// whatever the outcome of running it. There is no retry.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_at(&self, queue: QueueName, due_at: DateTime<Utc>, call: JobCall)
        -> Result<Job>;

    async fn enqueue_in(&self, queue: QueueName, delay: Duration, call: JobCall) -> Result<Job> {
        self.enqueue_at(queue, Utc::now() + delay, call).await
    }

    /// Atomically remove and return the earliest job with `due_at <= now`.
    /// Ties go to the job enqueued first.
    async fn claim_due(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Option<Job>>;

    async fn depth(&self, queue: QueueName) -> Result<u64>;

    /// Every job still waiting in `queue`, earliest first.
    async fn pending(&self, queue: QueueName) -> Result<Vec<Job>>;
}

/// SQLite-backed [`JobQueue`]. Several processes may share the database
/// file; a claim is a single `DELETE … RETURNING`, so no two claimers ever
/// receive the same job.
#[derive(Clone)]
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueue {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue_at(
        &self,
        queue: QueueName,
        due_at: DateTime<Utc>,
        call: JobCall,
    ) -> Result<Job> {
        let enqueued_at = Utc::now();
        let call_json = serde_json::to_string(&call)?;
        let conn = self.conn.lock().expect("queue connection poisoned");
        conn.execute(
            "INSERT INTO delayed_jobs (queue, due_at, call, enqueued_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                queue.as_str(),
                fmt_ts(due_at),
                call_json,
                fmt_ts(enqueued_at)
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(job_id = id, queue = %queue, call = call.name(), due_at = %due_at, "job enqueued");
        Ok(Job {
            id,
            queue,
            due_at,
            call,
            enqueued_at,
        })
    }

    async fn claim_due(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Option<Job>> {
        let conn = self.conn.lock().expect("queue connection poisoned");
        let row = conn
            .query_row(
                "DELETE FROM delayed_jobs WHERE id = (
                     SELECT id FROM delayed_jobs
                     WHERE queue = ?1 AND due_at <= ?2
                     ORDER BY due_at, id
                     LIMIT 1
                 )
                 RETURNING id, queue, due_at, call, enqueued_at",
                rusqlite::params![queue.as_str(), fmt_ts(now)],
                JobRow::read,
            )
            .optional()?;
        // The row is gone either way; an undecodable job is reported and lost.
        row.map(JobRow::into_job).transpose()
    }

    async fn depth(&self, queue: QueueName) -> Result<u64> {
        let conn = self.conn.lock().expect("queue connection poisoned");
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM delayed_jobs WHERE queue = ?1",
            [queue.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    async fn pending(&self, queue: QueueName) -> Result<Vec<Job>> {
        let conn = self.conn.lock().expect("queue connection poisoned");
        let mut stmt = conn.prepare_cached(
            "SELECT id, queue, due_at, call, enqueued_at FROM delayed_jobs
             WHERE queue = ?1 ORDER BY due_at, id",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map([queue.as_str()], JobRow::read)?
            .collect::<rusqlite::Result<_>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_job() {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(queue = %queue, "skipping undecodable job: {e}"),
            }
        }
        Ok(jobs)
    }
}

struct JobRow {
    id: i64,
    queue: String,
    due_at: String,
    call: String,
    enqueued_at: String,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            queue: row.get(1)?,
            due_at: row.get(2)?,
            call: row.get(3)?,
            enqueued_at: row.get(4)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        let bad = |what: &str, detail: String| SchedulerError::CorruptJob {
            id: self.id,
            reason: format!("bad {what}: {detail}"),
        };
        Ok(Job {
            id: self.id,
            queue: self.queue.parse().map_err(|e| bad("queue", e))?,
            due_at: parse_ts(&self.due_at).map_err(|e| bad("due_at", e.to_string()))?,
            call: serde_json::from_str(&self.call)?,
            enqueued_at: parse_ts(&self.enqueued_at)
                .map_err(|e| bad("enqueued_at", e.to_string()))?,
        })
    }
}
