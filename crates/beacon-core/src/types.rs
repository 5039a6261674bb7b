use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the user that owns a trigger.
///
/// Opaque to the engine; issued by whatever authenticates requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Row id of a persisted trigger (SQLite INTEGER PRIMARY KEY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub i64);

impl TriggerId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TriggerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Row id of a persisted event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLogId(pub i64);

impl EventLogId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EventLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventLogId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_values() {
        let json = serde_json::to_string(&TriggerId(7)).unwrap();
        assert_eq!(json, "7");

        let user: UserId = serde_json::from_str(r#""u-42""#).unwrap();
        assert_eq!(user.as_str(), "u-42");
    }

    #[test]
    fn user_id_display_is_raw() {
        assert_eq!(UserId::from("alice").to_string(), "alice");
    }
}
