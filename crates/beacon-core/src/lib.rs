//! `beacon-core`: identifiers, configuration and the shared error type used
//! by every other Beacon crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::BeaconConfig;
pub use error::{BeaconError, Result};
pub use types::{EventLogId, TriggerId, UserId};
