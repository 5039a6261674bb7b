//! `beacon-scheduler`: fires triggers on time and ages their event logs.
//!
//! | Module     | Role                                                   |
//! |------------|--------------------------------------------------------|
//! | `queue`    | Delayed job queue on SQLite (`trigger`, `archive`)     |
//! | `executor` | Fires a trigger, logs it, re-enqueues recurrences      |
//! | `sweeper`  | active → archived → deleted, on its own recurring job  |
//! | `worker`   | One polling loop per queue                             |
//! | `service`  | Request-facing trigger CRUD, test firings, event pages |

pub mod db;
pub mod error;
pub mod executor;
pub mod http;
pub mod queue;
pub mod schedule;
pub mod service;
pub mod sweeper;
pub mod types;
pub mod worker;

pub use error::{Result, SchedulerError};
pub use executor::{FireOutcome, SkipReason, TriggerExecutor};
pub use http::{ApiCaller, ApiOutcome, FailureKind, ReqwestCaller};
pub use queue::{JobQueue, SqliteQueue};
pub use service::{EventPage, Pagination, TestFiring, TriggerService};
pub use sweeper::{SweepReport, Sweeper};
pub use types::{Job, JobCall, QueueName, ScheduledFire};
pub use worker::{JobRunner, QueueWorker, WorkerRuntime};
