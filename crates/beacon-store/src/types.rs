use beacon_core::{EventLogId, TriggerId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// A trigger definition that failed validation against its type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid trigger: {0}")]
pub struct InvalidTrigger(pub String);

impl InvalidTrigger {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Which kind of action a trigger performs. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Scheduled,
    Api,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Scheduled => write!(f, "scheduled"),
            TriggerType::Api => write!(f, "api"),
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TriggerType::Scheduled),
            "api" => Ok(TriggerType::Api),
            other => Err(format!("unknown trigger type: {other}")),
        }
    }
}

/// When a scheduled trigger fires. Exactly one rule is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Absolute UTC instant; recurrence repeats it daily.
    At { schedule_time: DateTime<Utc> },
    /// Relative to now; recurrence repeats it every `minutes`.
    Every { minutes: u32 },
}

/// Validated, type-specific part of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerSpec {
    Scheduled { schedule: Schedule, recurrence: bool },
    Api { endpoint: String, payload: Value },
}

impl TriggerSpec {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerSpec::Scheduled { .. } => TriggerType::Scheduled,
            TriggerSpec::Api { .. } => TriggerType::Api,
        }
    }
}

/// A persisted trigger owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub user_id: UserId,
    pub spec: TriggerSpec,
    /// Bumped whenever an update changes the firing rule. Jobs enqueued for
    /// an older generation are dropped when they come due.
    pub generation: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Trigger {
    pub fn trigger_type(&self) -> TriggerType {
        self.spec.trigger_type()
    }

    /// Apply an allow-listed update, validating every field against this
    /// trigger's type.
    ///
    /// Returns `true` when the firing rule (schedule or recurrence) changed;
    /// in that case `generation` has already been bumped and the caller is
    /// expected to enqueue a fresh job.
    pub fn apply_update(
        &mut self,
        update: &TriggerUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, InvalidTrigger> {
        let next = match &self.spec {
            TriggerSpec::Scheduled {
                schedule,
                recurrence,
            } => {
                if update.api_endpoint.is_some() || update.api_payload.is_some() {
                    return Err(InvalidTrigger::new(
                        "api_endpoint/api_payload do not apply to scheduled triggers",
                    ));
                }
                let schedule = match (update.schedule_time, update.interval) {
                    (Some(_), Some(_)) => {
                        return Err(InvalidTrigger::new(
                            "provide either schedule_time or interval, not both",
                        ))
                    }
                    (Some(at), None) => Schedule::At { schedule_time: at },
                    (None, Some(minutes)) => Schedule::Every {
                        minutes: validate_interval(minutes)?,
                    },
                    (None, None) => *schedule,
                };
                TriggerSpec::Scheduled {
                    schedule,
                    recurrence: update.recurrence.unwrap_or(*recurrence),
                }
            }
            TriggerSpec::Api { endpoint, payload } => {
                if update.schedule_time.is_some()
                    || update.interval.is_some()
                    || update.recurrence.is_some()
                {
                    return Err(InvalidTrigger::new(
                        "schedule_time/interval/recurrence do not apply to api triggers",
                    ));
                }
                let endpoint = match &update.api_endpoint {
                    Some(e) => validate_endpoint(e)?,
                    None => endpoint.clone(),
                };
                let payload = match &update.api_payload {
                    Some(p) => validate_payload(p)?,
                    None => payload.clone(),
                };
                TriggerSpec::Api { endpoint, payload }
            }
        };

        let rule_changed = matches!(
            (&self.spec, &next),
            (TriggerSpec::Scheduled { .. }, TriggerSpec::Scheduled { .. }) if self.spec != next
        );
        self.spec = next;
        self.updated_at = Some(now);
        if rule_changed {
            self.generation = self.generation.wrapping_add(1);
        }
        Ok(rule_changed)
    }
}

/// Loosely-typed trigger input as a request layer receives it.
///
/// Use [`TriggerDraft::validate`] to turn it into a [`TriggerSpec`]. Test
/// firings carry a validated draft without ever persisting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerDraft {
    #[serde(rename = "type")]
    pub kind: Option<TriggerType>,
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
    /// Minutes between firings.
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub recurrence: Option<bool>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub api_payload: Option<Value>,
}

impl TriggerDraft {
    pub fn scheduled_at(schedule_time: DateTime<Utc>, recurrence: bool) -> Self {
        Self {
            kind: Some(TriggerType::Scheduled),
            schedule_time: Some(schedule_time),
            recurrence: Some(recurrence),
            ..Default::default()
        }
    }

    pub fn scheduled_every(minutes: i64, recurrence: bool) -> Self {
        Self {
            kind: Some(TriggerType::Scheduled),
            interval: Some(minutes),
            recurrence: Some(recurrence),
            ..Default::default()
        }
    }

    pub fn api(endpoint: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: Some(TriggerType::Api),
            api_endpoint: Some(endpoint.into()),
            api_payload: Some(payload),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<TriggerSpec, InvalidTrigger> {
        match self.kind {
            None => Err(InvalidTrigger::new("type is required")),
            Some(TriggerType::Scheduled) => {
                if self.api_endpoint.is_some() || self.api_payload.is_some() {
                    return Err(InvalidTrigger::new(
                        "api_endpoint/api_payload do not apply to scheduled triggers",
                    ));
                }
                let schedule = match (self.schedule_time, self.interval) {
                    (Some(at), None) => Schedule::At { schedule_time: at },
                    (None, Some(minutes)) => Schedule::Every {
                        minutes: validate_interval(minutes)?,
                    },
                    (Some(_), Some(_)) => {
                        return Err(InvalidTrigger::new(
                            "provide either schedule_time or interval, not both",
                        ))
                    }
                    (None, None) => {
                        return Err(InvalidTrigger::new(
                            "scheduled triggers need schedule_time or interval",
                        ))
                    }
                };
                Ok(TriggerSpec::Scheduled {
                    schedule,
                    recurrence: self.recurrence.unwrap_or(false),
                })
            }
            Some(TriggerType::Api) => {
                if self.schedule_time.is_some() || self.interval.is_some() {
                    return Err(InvalidTrigger::new(
                        "schedule_time/interval do not apply to api triggers",
                    ));
                }
                let endpoint = self
                    .api_endpoint
                    .as_deref()
                    .ok_or_else(|| InvalidTrigger::new("api triggers need api_endpoint"))?;
                let payload = self
                    .api_payload
                    .as_ref()
                    .ok_or_else(|| InvalidTrigger::new("api triggers need api_payload"))?;
                Ok(TriggerSpec::Api {
                    endpoint: validate_endpoint(endpoint)?,
                    payload: validate_payload(payload)?,
                })
            }
        }
    }
}

/// Fields a trigger owner may change. Anything else is immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerUpdate {
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub recurrence: Option<bool>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub api_payload: Option<Value>,
}

fn validate_interval(minutes: i64) -> Result<u32, InvalidTrigger> {
    match u32::try_from(minutes) {
        Ok(m) if m > 0 => Ok(m),
        _ => Err(InvalidTrigger::new(format!(
            "interval must be a positive number of minutes, got {minutes}"
        ))),
    }
}

/// Accept absolute http(s) URLs with a non-empty host. Returns the parsed,
/// normalised form.
fn validate_endpoint(endpoint: &str) -> Result<String, InvalidTrigger> {
    let trimmed = endpoint.trim();
    let url = Url::parse(trimmed).map_err(|e| {
        InvalidTrigger::new(format!("api_endpoint is not a valid URI ({e}): {trimmed}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InvalidTrigger::new(format!(
            "api_endpoint must be http(s): {trimmed}"
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url.into()),
        _ => Err(InvalidTrigger::new(format!(
            "api_endpoint has no host: {trimmed}"
        ))),
    }
}

fn validate_payload(payload: &Value) -> Result<Value, InvalidTrigger> {
    if payload.is_null() {
        return Err(InvalidTrigger::new("api_payload must not be null"));
    }
    Ok(payload.clone())
}

/// Lifecycle bucket of an event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Archived,
    /// Written by dry-run firings; never archived, purged after retention.
    Test,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Active => "active",
            EventStatus::Archived => "archived",
            EventStatus::Test => "test",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "archived" => Ok(EventStatus::Archived),
            "test" => Ok(EventStatus::Test),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// One recorded firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: EventLogId,
    /// `None` only for test firings of a draft that was never persisted.
    pub trigger_id: Option<TriggerId>,
    /// Owner at write time; used to invalidate the owner's cached pages.
    pub user_id: UserId,
    pub response: Option<Value>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Insert payload for [`EventLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEventLog {
    pub trigger_id: Option<TriggerId>,
    pub user_id: UserId,
    pub response: Option<Value>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filter for event log queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLogFilter {
    pub trigger_id: Option<TriggerId>,
    pub user_id: Option<UserId>,
    pub status: Option<EventStatus>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_until: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EventLogFilter {
    pub fn for_user(user_id: &UserId) -> Self {
        Self {
            user_id: Some(user_id.clone()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn for_trigger(trigger_id: TriggerId) -> Self {
        Self {
            trigger_id: Some(trigger_id),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn scheduled(spec: TriggerSpec) -> Trigger {
        Trigger {
            id: TriggerId(1),
            user_id: UserId::from("u1"),
            spec,
            generation: 0,
            created_at: ts(),
            updated_at: None,
        }
    }

    #[test]
    fn draft_requires_exactly_one_schedule_rule() {
        let mut both = TriggerDraft::scheduled_every(5, true);
        both.schedule_time = Some(ts());
        assert!(both.validate().is_err());

        let neither = TriggerDraft {
            kind: Some(TriggerType::Scheduled),
            ..Default::default()
        };
        assert!(neither.validate().is_err());

        let spec = TriggerDraft::scheduled_every(5, true).validate().unwrap();
        assert_eq!(
            spec,
            TriggerSpec::Scheduled {
                schedule: Schedule::Every { minutes: 5 },
                recurrence: true
            }
        );
    }

    #[test]
    fn draft_rejects_non_positive_interval() {
        assert!(TriggerDraft::scheduled_every(0, false).validate().is_err());
        assert!(TriggerDraft::scheduled_every(-3, false).validate().is_err());
    }

    #[test]
    fn api_draft_needs_endpoint_and_payload() {
        let ok = TriggerDraft::api("https://example.com/hook", json!({"a": 1}));
        assert!(ok.validate().is_ok());

        let mut no_payload = ok.clone();
        no_payload.api_payload = None;
        assert!(no_payload.validate().is_err());

        let bad_uri = TriggerDraft::api("ftp://example.com", json!({}));
        assert!(bad_uri.validate().is_err());

        let no_host = TriggerDraft::api("http://:80/hook", json!({}));
        assert!(no_host.validate().is_err());
    }

    #[test]
    fn malformed_endpoints_are_rejected() {
        for bad in [
            "http://:80/hook",
            "http://[::1/hook",
            "http://exa<mple>.com",
            "https://a:b:c:d",
            "/relative/hook",
            "mailto:ops@example.com",
            "not a url",
        ] {
            assert!(
                TriggerDraft::api(bad, json!({})).validate().is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn endpoint_is_stored_normalised() {
        let spec = TriggerDraft::api("  HTTPS://Hooks.Example.com  ", json!({"a": 1}))
            .validate()
            .unwrap();
        match spec {
            TriggerSpec::Api { endpoint, .. } => {
                assert_eq!(endpoint, "https://hooks.example.com/")
            }
            other => panic!("expected api spec, got {other:?}"),
        }

        let ip = TriggerDraft::api("http://10.0.0.1:9/x?y=1", json!({}))
            .validate()
            .unwrap();
        assert!(matches!(ip, TriggerSpec::Api { endpoint, .. } if endpoint == "http://10.0.0.1:9/x?y=1"));
    }

    #[test]
    fn draft_deserializes_from_request_shape() {
        let draft: TriggerDraft = serde_json::from_value(json!({
            "type": "scheduled",
            "interval": 5,
            "recurrence": true
        }))
        .unwrap();
        assert_eq!(draft.kind, Some(TriggerType::Scheduled));
        assert_eq!(draft.interval, Some(5));
    }

    #[test]
    fn update_switches_schedule_rule_and_bumps_generation() {
        let mut trigger = scheduled(TriggerSpec::Scheduled {
            schedule: Schedule::Every { minutes: 5 },
            recurrence: true,
        });
        let at = ts() + Duration::days(1);
        let changed = trigger
            .apply_update(
                &TriggerUpdate {
                    schedule_time: Some(at),
                    ..Default::default()
                },
                ts(),
            )
            .unwrap();

        assert!(changed);
        assert_eq!(trigger.generation, 1);
        assert_eq!(trigger.updated_at, Some(ts()));
        assert_eq!(
            trigger.spec,
            TriggerSpec::Scheduled {
                schedule: Schedule::At { schedule_time: at },
                recurrence: true
            }
        );
    }

    #[test]
    fn generation_wraps_instead_of_overflowing() {
        let mut trigger = scheduled(TriggerSpec::Scheduled {
            schedule: Schedule::Every { minutes: 5 },
            recurrence: false,
        });
        trigger.generation = u32::MAX;
        let changed = trigger
            .apply_update(
                &TriggerUpdate {
                    interval: Some(6),
                    ..Default::default()
                },
                ts(),
            )
            .unwrap();
        assert!(changed);
        assert_eq!(trigger.generation, 0);
    }

    #[test]
    fn no_op_update_keeps_generation() {
        let mut trigger = scheduled(TriggerSpec::Scheduled {
            schedule: Schedule::Every { minutes: 5 },
            recurrence: false,
        });
        let changed = trigger
            .apply_update(
                &TriggerUpdate {
                    recurrence: Some(false),
                    ..Default::default()
                },
                ts(),
            )
            .unwrap();
        assert!(!changed);
        assert_eq!(trigger.generation, 0);
    }

    #[test]
    fn update_rejects_fields_of_the_other_type() {
        let mut sched = scheduled(TriggerSpec::Scheduled {
            schedule: Schedule::Every { minutes: 5 },
            recurrence: false,
        });
        let err = sched
            .apply_update(
                &TriggerUpdate {
                    api_endpoint: Some("https://example.com".into()),
                    ..Default::default()
                },
                ts(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("scheduled"));

        let mut api = scheduled(TriggerSpec::Api {
            endpoint: "https://example.com".into(),
            payload: json!({}),
        });
        assert!(api
            .apply_update(
                &TriggerUpdate {
                    interval: Some(10),
                    ..Default::default()
                },
                ts(),
            )
            .is_err());
        // Unchanged after a rejected update.
        assert_eq!(api.updated_at, None);
    }

    #[test]
    fn api_update_never_bumps_generation() {
        let mut api = scheduled(TriggerSpec::Api {
            endpoint: "https://example.com".into(),
            payload: json!({}),
        });
        let changed = api
            .apply_update(
                &TriggerUpdate {
                    api_payload: Some(json!({"b": 2})),
                    ..Default::default()
                },
                ts(),
            )
            .unwrap();
        assert!(!changed);
        assert_eq!(api.generation, 0);
    }

    #[test]
    fn event_status_round_trips_through_str() {
        for s in [EventStatus::Active, EventStatus::Archived, EventStatus::Test] {
            assert_eq!(s.to_string().parse::<EventStatus>().unwrap(), s);
        }
        assert!("deleted".parse::<EventStatus>().is_err());
    }
}
