use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_core::{EventLogId, TriggerId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{types::Value as SqlValue, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::{
    db::{fmt_ts, init_db, parse_ts},
    error::{Result, StoreError},
    types::{
        EventLog, EventLogFilter, EventStatus, NewEventLog, Schedule, SortOrder, Trigger,
        TriggerSpec, TriggerType,
    },
};

/// Durable storage the engine needs from its relational collaborator.
///
/// Implementations must tolerate concurrent use from the request layer and
/// from every worker; the store is the single source of truth.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_trigger(
        &self,
        user_id: &UserId,
        spec: &TriggerSpec,
        now: DateTime<Utc>,
    ) -> Result<Trigger>;

    async fn get_trigger(&self, id: TriggerId) -> Result<Option<Trigger>>;

    async fn list_triggers(&self, user_id: &UserId) -> Result<Vec<Trigger>>;

    /// Persist the mutable columns of `trigger`. `type` never changes.
    async fn update_trigger(&self, trigger: &Trigger) -> Result<()>;

    /// Remove a trigger. Its event logs are left untouched.
    async fn delete_trigger(&self, id: TriggerId) -> Result<bool>;

    /// Single-row insert: a log is either fully written or absent.
    async fn create_event_log(&self, log: &NewEventLog) -> Result<EventLog>;

    async fn get_event_log(&self, id: EventLogId) -> Result<Option<EventLog>>;

    async fn query_event_logs(&self, filter: &EventLogFilter) -> Result<Vec<EventLog>>;

    /// Count matching rows, ignoring `limit`/`offset`.
    async fn count_event_logs(&self, filter: &EventLogFilter) -> Result<u64>;

    /// Move every `active` log created at or before `cutoff` to `archived`,
    /// stamping `archived_at`. Committed before returning.
    async fn archive_event_logs(
        &self,
        cutoff: DateTime<Utc>,
        archived_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Delete every log in `status` created at or before `cutoff`.
    async fn purge_event_logs(&self, status: EventStatus, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// SQLite-backed [`Store`].
///
/// Wraps its connection in a mutex; open one `SqliteStore` per process (or
/// per subsystem) on the same file and let SQLite's locking arbitrate.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

const TRIGGER_COLUMNS: &str = "id, user_id, type, schedule_time, interval_mins, recurrence,
     api_endpoint, api_payload, generation, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, trigger_id, user_id, response, status, created_at, archived_at";

impl SqliteStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.db.lock().expect("store connection poisoned");
        f(&conn)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_trigger(
        &self,
        user_id: &UserId,
        spec: &TriggerSpec,
        now: DateTime<Utc>,
    ) -> Result<Trigger> {
        let cols = SpecColumns::from_spec(spec)?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO triggers
                 (user_id, type, schedule_time, interval_mins, recurrence,
                  api_endpoint, api_payload, generation, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, NULL)",
                rusqlite::params![
                    user_id.as_str(),
                    cols.kind.to_string(),
                    cols.schedule_time,
                    cols.interval_mins,
                    cols.recurrence,
                    cols.api_endpoint,
                    cols.api_payload,
                    fmt_ts(now),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!(trigger_id = id, user_id = %user_id, kind = %cols.kind, "trigger created");
        Ok(Trigger {
            id: TriggerId(id),
            user_id: user_id.clone(),
            spec: spec.clone(),
            generation: 0,
            created_at: now,
            updated_at: None,
        })
    }

    async fn get_trigger(&self, id: TriggerId) -> Result<Option<Trigger>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = ?1"),
                    [id.get()],
                    TriggerRow::read,
                )
                .optional()?;
            row.map(TriggerRow::into_trigger).transpose()
        })
    }

    async fn list_triggers(&self, user_id: &UserId) -> Result<Vec<Trigger>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRIGGER_COLUMNS} FROM triggers WHERE user_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([user_id.as_str()], TriggerRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(TriggerRow::into_trigger).collect()
        })
    }

    async fn update_trigger(&self, trigger: &Trigger) -> Result<()> {
        let cols = SpecColumns::from_spec(&trigger.spec)?;
        let n = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE triggers SET schedule_time = ?1, interval_mins = ?2, recurrence = ?3,
                   api_endpoint = ?4, api_payload = ?5, generation = ?6, updated_at = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    cols.schedule_time,
                    cols.interval_mins,
                    cols.recurrence,
                    cols.api_endpoint,
                    cols.api_payload,
                    trigger.generation,
                    trigger.updated_at.map(fmt_ts),
                    trigger.id.get(),
                ],
            )?)
        })?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "trigger",
                id: trigger.id.to_string(),
            });
        }
        debug!(trigger_id = %trigger.id, generation = trigger.generation, "trigger updated");
        Ok(())
    }

    async fn delete_trigger(&self, id: TriggerId) -> Result<bool> {
        let n = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM triggers WHERE id = ?1", [id.get()])?)
        })?;
        if n > 0 {
            info!(trigger_id = %id, "trigger deleted (event logs retained)");
        }
        Ok(n > 0)
    }

    async fn create_event_log(&self, log: &NewEventLog) -> Result<EventLog> {
        let response = log
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO event_logs (trigger_id, user_id, response, status, created_at, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                rusqlite::params![
                    log.trigger_id.map(TriggerId::get),
                    log.user_id.as_str(),
                    response,
                    log.status.to_string(),
                    fmt_ts(log.created_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(EventLog {
            id: EventLogId(id),
            trigger_id: log.trigger_id,
            user_id: log.user_id.clone(),
            response: log.response.clone(),
            status: log.status,
            created_at: log.created_at,
            archived_at: None,
        })
    }

    async fn get_event_log(&self, id: EventLogId) -> Result<Option<EventLog>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {EVENT_COLUMNS} FROM event_logs WHERE id = ?1"),
                    [id.get()],
                    EventRow::read,
                )
                .optional()?;
            row.map(EventRow::into_event_log).transpose()
        })
    }

    async fn query_event_logs(&self, filter: &EventLogFilter) -> Result<Vec<EventLog>> {
        let (where_sql, mut args) = where_clause(filter);
        let order = match filter.order {
            SortOrder::NewestFirst => "ORDER BY created_at DESC, id DESC",
            SortOrder::OldestFirst => "ORDER BY created_at ASC, id ASC",
        };
        // LIMIT -1 means "no limit" in SQLite; needed whenever OFFSET is present.
        args.push(SqlValue::Integer(filter.limit.map_or(-1, i64::from)));
        args.push(SqlValue::Integer(filter.offset.map_or(0, i64::from)));
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM event_logs {where_sql} {order} LIMIT ?{} OFFSET ?{}",
            args.len() - 1,
            args.len()
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args), EventRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(EventRow::into_event_log).collect()
        })
    }

    async fn count_event_logs(&self, filter: &EventLogFilter) -> Result<u64> {
        let (where_sql, args) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM event_logs {where_sql}");
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(&sql, rusqlite::params_from_iter(args), |row| row.get(0))?;
            Ok(n as u64)
        })
    }

    async fn archive_event_logs(
        &self,
        cutoff: DateTime<Utc>,
        archived_at: DateTime<Utc>,
    ) -> Result<u64> {
        let n = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE event_logs SET status = 'archived', archived_at = ?1
                 WHERE status = 'active' AND created_at <= ?2",
                rusqlite::params![fmt_ts(archived_at), fmt_ts(cutoff)],
            )?)
        })?;
        Ok(n as u64)
    }

    async fn purge_event_logs(&self, status: EventStatus, cutoff: DateTime<Utc>) -> Result<u64> {
        let n = self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM event_logs WHERE status = ?1 AND created_at <= ?2",
                rusqlite::params![status.to_string(), fmt_ts(cutoff)],
            )?)
        })?;
        Ok(n as u64)
    }
}

// --- row mapping -----------------------------------------------------------

/// Column values for the type-specific part of a trigger.
struct SpecColumns {
    kind: TriggerType,
    schedule_time: Option<String>,
    interval_mins: Option<i64>,
    recurrence: bool,
    api_endpoint: Option<String>,
    api_payload: Option<String>,
}

impl SpecColumns {
    fn from_spec(spec: &TriggerSpec) -> Result<Self> {
        Ok(match spec {
            TriggerSpec::Scheduled {
                schedule,
                recurrence,
            } => {
                let (schedule_time, interval_mins) = match schedule {
                    Schedule::At { schedule_time } => (Some(fmt_ts(*schedule_time)), None),
                    Schedule::Every { minutes } => (None, Some(i64::from(*minutes))),
                };
                Self {
                    kind: TriggerType::Scheduled,
                    schedule_time,
                    interval_mins,
                    recurrence: *recurrence,
                    api_endpoint: None,
                    api_payload: None,
                }
            }
            TriggerSpec::Api { endpoint, payload } => Self {
                kind: TriggerType::Api,
                schedule_time: None,
                interval_mins: None,
                recurrence: false,
                api_endpoint: Some(endpoint.clone()),
                api_payload: Some(serde_json::to_string(payload)?),
            },
        })
    }
}

struct TriggerRow {
    id: i64,
    user_id: String,
    kind: String,
    schedule_time: Option<String>,
    interval_mins: Option<i64>,
    recurrence: bool,
    api_endpoint: Option<String>,
    api_payload: Option<String>,
    generation: u32,
    created_at: String,
    updated_at: Option<String>,
}

impl TriggerRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            schedule_time: row.get(3)?,
            interval_mins: row.get(4)?,
            recurrence: row.get(5)?,
            api_endpoint: row.get(6)?,
            api_payload: row.get(7)?,
            generation: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_trigger(self) -> Result<Trigger> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "triggers",
            reason,
        };
        let kind: TriggerType = self.kind.parse().map_err(corrupt)?;
        let spec = match kind {
            TriggerType::Scheduled => {
                let schedule = match (self.schedule_time, self.interval_mins) {
                    (Some(at), _) => Schedule::At {
                        schedule_time: parse_ts(&at).map_err(|e| corrupt(e.to_string()))?,
                    },
                    (None, Some(minutes)) => Schedule::Every {
                        minutes: u32::try_from(minutes)
                            .map_err(|_| corrupt(format!("bad interval {minutes}")))?,
                    },
                    (None, None) => {
                        return Err(corrupt(format!("trigger {} has no schedule", self.id)))
                    }
                };
                TriggerSpec::Scheduled {
                    schedule,
                    recurrence: self.recurrence,
                }
            }
            TriggerType::Api => TriggerSpec::Api {
                endpoint: self
                    .api_endpoint
                    .ok_or_else(|| corrupt(format!("trigger {} has no endpoint", self.id)))?,
                payload: match self.api_payload {
                    Some(json) => serde_json::from_str(&json)?,
                    None => serde_json::Value::Null,
                },
            },
        };

        Ok(Trigger {
            id: TriggerId(self.id),
            user_id: UserId(self.user_id),
            spec,
            generation: self.generation,
            created_at: parse_ts(&self.created_at).map_err(|e| corrupt(e.to_string()))?,
            updated_at: self
                .updated_at
                .as_deref()
                .map(parse_ts)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
        })
    }
}

struct EventRow {
    id: i64,
    trigger_id: Option<i64>,
    user_id: String,
    response: Option<String>,
    status: String,
    created_at: String,
    archived_at: Option<String>,
}

impl EventRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            trigger_id: row.get(1)?,
            user_id: row.get(2)?,
            response: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            archived_at: row.get(6)?,
        })
    }

    fn into_event_log(self) -> Result<EventLog> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "event_logs",
            reason,
        };
        Ok(EventLog {
            id: EventLogId(self.id),
            trigger_id: self.trigger_id.map(TriggerId),
            user_id: UserId(self.user_id),
            response: self
                .response
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            status: self.status.parse().map_err(corrupt)?,
            created_at: parse_ts(&self.created_at).map_err(|e| corrupt(e.to_string()))?,
            archived_at: self
                .archived_at
                .as_deref()
                .map(parse_ts)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
        })
    }
}

/// Build `WHERE …` plus positional arguments for an event log filter.
fn where_clause(filter: &EventLogFilter) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    let mut push = |column: &str, op: &str, value: SqlValue| {
        args.push(value);
        clauses.push(format!("{column} {op} ?{}", args.len()));
    };

    if let Some(id) = filter.trigger_id {
        push("trigger_id", "=", SqlValue::Integer(id.get()));
    }
    if let Some(ref user) = filter.user_id {
        push("user_id", "=", SqlValue::Text(user.0.clone()));
    }
    if let Some(status) = filter.status {
        push("status", "=", SqlValue::Text(status.to_string()));
    }
    if let Some(from) = filter.created_from {
        push("created_at", ">=", SqlValue::Text(fmt_ts(from)));
    }
    if let Some(until) = filter.created_until {
        push("created_at", "<=", SqlValue::Text(fmt_ts(until)));
    }

    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), args)
    }
}
