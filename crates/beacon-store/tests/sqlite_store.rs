// Round-trips through the SQLite store: trigger CRUD, event log filters,
// and the batched archive/purge used by the sweeper.

use beacon_core::{TriggerId, UserId};
use beacon_store::{
    EventLogFilter, EventStatus, NewEventLog, Schedule, SortOrder, SqliteStore, Store,
    StoreError, TriggerSpec,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;
use serde_json::json;

fn store() -> SqliteStore {
    SqliteStore::new(Connection::open_in_memory().unwrap()).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
}

fn every(minutes: u32, recurrence: bool) -> TriggerSpec {
    TriggerSpec::Scheduled {
        schedule: Schedule::Every { minutes },
        recurrence,
    }
}

fn log(trigger: Option<i64>, user: &str, status: EventStatus, at: DateTime<Utc>) -> NewEventLog {
    NewEventLog {
        trigger_id: trigger.map(TriggerId),
        user_id: UserId::from(user),
        response: None,
        status,
        created_at: at,
    }
}

#[tokio::test]
async fn trigger_round_trip() {
    let store = store();
    let user = UserId::from("alice");
    let at = now() + Duration::hours(3);
    let spec = TriggerSpec::Scheduled {
        schedule: Schedule::At { schedule_time: at },
        recurrence: true,
    };

    let created = store.create_trigger(&user, &spec, now()).await.unwrap();
    let loaded = store.get_trigger(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.generation, 0);
    assert!(loaded.updated_at.is_none());
}

#[tokio::test]
async fn api_trigger_keeps_payload_document() {
    let store = store();
    let spec = TriggerSpec::Api {
        endpoint: "https://hooks.example.com/in".into(),
        payload: json!({"event": "ping", "tags": ["a", "b"], "n": 3}),
    };
    let created = store
        .create_trigger(&UserId::from("bob"), &spec, now())
        .await
        .unwrap();
    let loaded = store.get_trigger(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.spec, spec);
}

#[tokio::test]
async fn list_is_scoped_to_owner() {
    let store = store();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    store.create_trigger(&alice, &every(5, false), now()).await.unwrap();
    store.create_trigger(&alice, &every(10, true), now()).await.unwrap();
    store.create_trigger(&bob, &every(1, false), now()).await.unwrap();

    let mine = store.list_triggers(&alice).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|t| t.user_id == alice));
}

#[tokio::test]
async fn update_persists_rule_and_generation() {
    let store = store();
    let mut trigger = store
        .create_trigger(&UserId::from("alice"), &every(5, false), now())
        .await
        .unwrap();
    trigger.spec = every(15, true);
    trigger.generation = 3;
    trigger.updated_at = Some(now() + Duration::minutes(1));
    store.update_trigger(&trigger).await.unwrap();

    let loaded = store.get_trigger(trigger.id).await.unwrap().unwrap();
    assert_eq!(loaded, trigger);
}

#[tokio::test]
async fn update_of_missing_trigger_is_not_found() {
    let store = store();
    let mut ghost = store
        .create_trigger(&UserId::from("alice"), &every(5, false), now())
        .await
        .unwrap();
    store.delete_trigger(ghost.id).await.unwrap();
    ghost.generation = 1;

    let err = store.update_trigger(&ghost).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "trigger", .. }));
}

#[tokio::test]
async fn delete_keeps_event_logs() {
    let store = store();
    let user = UserId::from("alice");
    let trigger = store.create_trigger(&user, &every(5, false), now()).await.unwrap();
    store
        .create_event_log(&log(Some(trigger.id.get()), "alice", EventStatus::Active, now()))
        .await
        .unwrap();

    assert!(store.delete_trigger(trigger.id).await.unwrap());
    assert!(!store.delete_trigger(trigger.id).await.unwrap());
    assert!(store.get_trigger(trigger.id).await.unwrap().is_none());

    let orphans = store
        .query_event_logs(&EventLogFilter::for_trigger(trigger.id))
        .await
        .unwrap();
    assert_eq!(orphans.len(), 1);
}

#[tokio::test]
async fn event_log_response_round_trips() {
    let store = store();
    let mut new = log(Some(7), "alice", EventStatus::Active, now());
    new.response = Some(json!({"status": 500, "body": "boom"}));
    let written = store.create_event_log(&new).await.unwrap();

    let loaded = store.get_event_log(written.id).await.unwrap().unwrap();
    assert_eq!(loaded, written);
    assert_eq!(loaded.response, Some(json!({"status": 500, "body": "boom"})));
    assert!(loaded.archived_at.is_none());
}

#[tokio::test]
async fn test_log_without_trigger_is_accepted() {
    let store = store();
    let written = store
        .create_event_log(&log(None, "alice", EventStatus::Test, now()))
        .await
        .unwrap();
    let loaded = store.get_event_log(written.id).await.unwrap().unwrap();
    assert_eq!(loaded.trigger_id, None);
    assert_eq!(loaded.status, EventStatus::Test);
}

#[tokio::test]
async fn query_filters_orders_and_pages() {
    let store = store();
    for i in 0..5 {
        store
            .create_event_log(&log(
                Some(1),
                "alice",
                EventStatus::Active,
                now() - Duration::minutes(i),
            ))
            .await
            .unwrap();
    }
    store
        .create_event_log(&log(Some(2), "bob", EventStatus::Active, now()))
        .await
        .unwrap();
    store
        .create_event_log(&log(Some(1), "alice", EventStatus::Test, now()))
        .await
        .unwrap();

    let filter = EventLogFilter::for_user(&UserId::from("alice")).with_status(EventStatus::Active);
    assert_eq!(store.count_event_logs(&filter).await.unwrap(), 5);

    let page = EventLogFilter {
        limit: Some(2),
        offset: Some(1),
        ..filter.clone()
    };
    let rows = store.query_event_logs(&page).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].created_at, now() - Duration::minutes(1));
    assert_eq!(rows[1].created_at, now() - Duration::minutes(2));
    // count ignores paging
    assert_eq!(store.count_event_logs(&page).await.unwrap(), 5);

    let oldest = EventLogFilter {
        order: SortOrder::OldestFirst,
        limit: Some(1),
        ..filter.clone()
    };
    let rows = store.query_event_logs(&oldest).await.unwrap();
    assert_eq!(rows[0].created_at, now() - Duration::minutes(4));

    let recent = EventLogFilter {
        created_from: Some(now() - Duration::minutes(2)),
        ..filter
    };
    assert_eq!(store.count_event_logs(&recent).await.unwrap(), 3);
}

#[tokio::test]
async fn offset_without_limit_returns_the_rest() {
    let store = store();
    for i in 0..3 {
        store
            .create_event_log(&log(Some(1), "alice", EventStatus::Active, now() - Duration::minutes(i)))
            .await
            .unwrap();
    }
    let filter = EventLogFilter {
        offset: Some(1),
        ..EventLogFilter::for_user(&UserId::from("alice"))
    };
    assert_eq!(store.query_event_logs(&filter).await.unwrap().len(), 2);
}

#[tokio::test]
async fn archive_moves_only_old_active_logs() {
    let store = store();
    let cutoff = now() - Duration::hours(2);
    let at_cutoff = store
        .create_event_log(&log(Some(1), "alice", EventStatus::Active, cutoff))
        .await
        .unwrap();
    let just_after = store
        .create_event_log(&log(
            Some(1),
            "alice",
            EventStatus::Active,
            cutoff + Duration::seconds(1),
        ))
        .await
        .unwrap();
    let old_test = store
        .create_event_log(&log(None, "alice", EventStatus::Test, now() - Duration::hours(5)))
        .await
        .unwrap();

    let n = store.archive_event_logs(cutoff, now()).await.unwrap();
    assert_eq!(n, 1);

    let archived = store.get_event_log(at_cutoff.id).await.unwrap().unwrap();
    assert_eq!(archived.status, EventStatus::Archived);
    assert_eq!(archived.archived_at, Some(now()));
    assert_eq!(archived.created_at, cutoff);

    let still_active = store.get_event_log(just_after.id).await.unwrap().unwrap();
    assert_eq!(still_active.status, EventStatus::Active);

    let test = store.get_event_log(old_test.id).await.unwrap().unwrap();
    assert_eq!(test.status, EventStatus::Test);
}

#[tokio::test]
async fn purge_is_scoped_to_status() {
    let store = store();
    let old = now() - Duration::hours(49);
    let active = store
        .create_event_log(&log(Some(1), "alice", EventStatus::Active, old))
        .await
        .unwrap();
    store
        .create_event_log(&log(Some(1), "alice", EventStatus::Archived, old))
        .await
        .unwrap();
    let young = store
        .create_event_log(&log(Some(1), "alice", EventStatus::Archived, now()))
        .await
        .unwrap();

    let n = store
        .purge_event_logs(EventStatus::Archived, now() - Duration::hours(48))
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert!(store.get_event_log(active.id).await.unwrap().is_some());
    assert!(store.get_event_log(young.id).await.unwrap().is_some());
}
