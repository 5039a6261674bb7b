//! `beacon-store`: durable storage for triggers and their event logs.
//!
//! Everything lives in two SQLite tables:
//!
//! | Table        | Contents                                              |
//! |--------------|-------------------------------------------------------|
//! | `triggers`   | User-defined firing rules (`scheduled` or `api`)      |
//! | `event_logs` | One row per firing; aged by the archival sweeper      |
//!
//! `event_logs.trigger_id` deliberately has no foreign key: deleting a
//! trigger leaves its history in place.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::{SqliteStore, Store};
pub use types::{
    EventLog, EventLogFilter, EventStatus, InvalidTrigger, NewEventLog, Schedule, SortOrder,
    Trigger, TriggerDraft, TriggerSpec, TriggerType, TriggerUpdate,
};
