/// End-to-end moderation and live-state scenarios over the in-memory store
use chrono::{Duration, Utc};
use roomwatch::{
    aggregator::LiveAggregator,
    attribution::StaticAttribution,
    audit::AuditLogger,
    error::ConsoleError,
    identity::{Principal, StaticIdentity},
    models::{Room, User},
    moderation::{Caller, ModerationEngine, ModerationOptions},
    store::{DocPath, DocumentStore, MemoryStore, Patch},
    traffic::{bucket_id, Provenance, TrafficEstimator, TrafficOptions},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Harness {
    store: Arc<MemoryStore>,
    audit: AuditLogger,
    engine: ModerationEngine,
    root: Caller,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditLogger::new(store.clone(), Arc::new(StaticAttribution::new("10.0.0.7")));
    let engine = ModerationEngine::new(store.clone(), audit.clone(), ModerationOptions::default());

    store
        .set(
            &DocPath::doc("admins", "root"),
            Patch::new()
                .set("email", "root@example.com")
                .set("superAdmin", true),
        )
        .await
        .unwrap();

    let root = engine
        .resolve_caller(&Principal::new("root", Some("root@example.com".to_string())))
        .await
        .unwrap();

    Harness {
        store,
        audit,
        engine,
        root,
    }
}

async fn seed_room(store: &MemoryStore, id: &str, participants: usize, messages: usize) {
    let room = DocPath::doc("rooms", id);
    store
        .set(
            &room,
            Patch::new()
                .set("code", "ABC123")
                .set("hostName", "Host")
                .set("active", true),
        )
        .await
        .unwrap();
    for i in 0..participants {
        store
            .set(
                &DocPath::doc(&room.sub_collection("participants"), &format!("p{}", i)),
                Patch::new().set("online", true),
            )
            .await
            .unwrap();
    }
    for i in 0..messages {
        store
            .set(
                &DocPath::doc(&room.sub_collection("messages"), &format!("m{}", i)),
                Patch::new().set("text", "hi"),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn temp_ban_removes_user_from_room_and_audits_once() {
    let h = harness().await;
    h.store
        .set(
            &DocPath::doc("users", "u1"),
            Patch::new().set("email", "u1@example.com").set("online", true),
        )
        .await
        .unwrap();
    h.store
        .set(
            &DocPath::doc("rooms", "r1"),
            Patch::new()
                .set("active", true)
                .set("participants", json!(["u1", "u2"])),
        )
        .await
        .unwrap();

    let expires = h
        .engine
        .temp_ban(&h.root, "u1", Duration::hours(1))
        .await
        .unwrap();

    let doc = h.store.get(&DocPath::doc("users", "u1")).await.unwrap().unwrap();
    let user = User::from_document(&doc).unwrap();
    assert!(user.banned);
    assert!(user.effective_banned(Utc::now()));
    assert!(!user.effective_banned(expires + Duration::seconds(1)));

    let doc = h.store.get(&DocPath::doc("rooms", "r1")).await.unwrap().unwrap();
    let room = Room::from_document(&doc).unwrap();
    assert_eq!(room.participants, vec!["u2".to_string()]);

    let logs = h.audit.recent(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "ban_temporary");
    assert_eq!(logs[0].target_id.as_deref(), Some("u1"));
    assert_eq!(logs[0].admin_id, "root");
    assert_eq!(logs[0].ip.as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn room_deletion_drains_dependents_in_bounded_batches() {
    let h = harness().await;
    seed_room(&h.store, "r1", 120, 75).await;
    h.store.clear_commit_log();

    let report = h.engine.delete_room(&h.root, "r1").await.unwrap();

    assert_eq!(report.total_documents(), 195);
    assert_eq!(report.collection("participants").unwrap().batches, 3);
    assert_eq!(report.collection("messages").unwrap().batches, 2);
    assert_eq!(report.collection("signaling").unwrap().documents, 0);

    // Cascade batches, the room itself, then the audit entry
    assert_eq!(h.store.commit_sizes(), vec![50, 50, 20, 50, 25, 1, 1]);
    assert!(h.store.get(&DocPath::doc("rooms", "r1")).await.unwrap().is_none());
    assert_eq!(h.store.count("rooms/r1/participants").await, 0);
    assert_eq!(h.store.count("rooms/r1/messages").await, 0);

    let logs = h.audit.recent(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "delete_room");
    assert_eq!(logs[0].details["code"], json!("ABC123"));
    assert_eq!(logs[0].details["host"], json!("Host"));
}

#[tokio::test]
async fn interrupted_room_deletion_resumes_on_retry() {
    let h = harness().await;
    seed_room(&h.store, "r1", 120, 75).await;

    h.store.fail_commit_at(3);
    let err = h.engine.delete_room(&h.root, "r1").await.unwrap_err();
    match err {
        ConsoleError::PartialCascade {
            collection,
            deleted,
            ..
        } => {
            assert_eq!(collection, "participants");
            assert_eq!(deleted, 100);
        }
        other => panic!("unexpected error: {}", other),
    }

    // Nothing audited, room and remaining dependents still present
    assert_eq!(h.store.count("admin_logs").await, 0);
    assert!(h.store.get(&DocPath::doc("rooms", "r1")).await.unwrap().is_some());
    assert_eq!(h.store.count("rooms/r1/participants").await, 20);
    assert_eq!(h.store.count("rooms/r1/messages").await, 75);

    let report = h.engine.delete_room(&h.root, "r1").await.unwrap();
    assert_eq!(report.collection("participants").unwrap().documents, 20);
    assert_eq!(report.collection("messages").unwrap().documents, 75);
    assert!(h.store.get(&DocPath::doc("rooms", "r1")).await.unwrap().is_none());
    assert_eq!(h.store.count("admin_logs").await, 1);
}

#[tokio::test]
async fn deleting_missing_room_is_not_found() {
    let h = harness().await;
    let err = h.engine.delete_room(&h.root, "ghost").await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)));
    assert_eq!(h.store.count("admin_logs").await, 0);
}

#[tokio::test]
async fn add_admin_failures_write_nothing() {
    let h = harness().await;
    h.store
        .set(
            &DocPath::doc("users", "u1"),
            Patch::new().set("email", "u1@example.com"),
        )
        .await
        .unwrap();

    h.store.clear_commit_log();
    let err = h
        .engine
        .add_admin(&h.root, "nobody@example.com", false)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)));
    assert!(h.store.commit_sizes().is_empty());

    let admin = h
        .engine
        .add_admin(&h.root, "u1@example.com", false)
        .await
        .unwrap();
    assert_eq!(admin.id, "u1");
    assert_eq!(admin.added_by.as_deref(), Some("root"));

    h.store.clear_commit_log();
    let err = h
        .engine
        .add_admin(&h.root, "u1@example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Conflict(_)));
    assert!(h.store.commit_sizes().is_empty());

    // Only the successful grant was audited
    let logs = h.audit.recent(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "add_admin");
    assert_eq!(logs[0].details["superAdmin"], json!(false));
}

#[tokio::test]
async fn every_successful_action_is_audited_exactly_once() {
    let h = harness().await;
    h.store
        .set(
            &DocPath::doc("users", "u1"),
            Patch::new().set("email", "u1@example.com"),
        )
        .await
        .unwrap();

    h.engine.ban(&h.root, "u1").await.unwrap();
    h.engine.unban(&h.root, "u1").await.unwrap();
    h.engine.temp_ban_default(&h.root, "u1").await.unwrap();
    h.engine.record_dashboard_access(&h.root).await.unwrap();
    assert!(h.engine.ban(&h.root, "ghost").await.is_err());

    let mut actions: Vec<String> = h
        .audit
        .recent(50)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    actions.sort();
    assert_eq!(
        actions,
        vec!["ban_permanent", "ban_temporary", "dashboard_access", "unban"]
    );
}

#[tokio::test]
async fn non_admin_principal_cannot_act() {
    let h = harness().await;
    let err = h
        .engine
        .resolve_caller(&Principal::new("u1", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Unauthorized(_)));

    let signed_out = StaticIdentity::new(None);
    let err = h.engine.current_caller(&signed_out).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Authentication(_)));

    let signed_in = StaticIdentity::new(Some(Principal::new("root", None)));
    let caller = h.engine.current_caller(&signed_in).await.unwrap();
    assert!(caller.is_super_admin());
}

#[tokio::test]
async fn concurrent_traffic_ticks_are_additive() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let first = TrafficEstimator::new(store.clone(), TrafficOptions::default());
    let second = TrafficEstimator::new(store.clone(), TrafficOptions::default());
    let now = Utc::now();

    let (a, b) = tokio::join!(first.record_tick(2, now), second.record_tick(3, now));
    assert_eq!(a.unwrap() + b.unwrap(), 5 * 102_400);

    let bucket = store
        .get(&DocPath::doc("traffic", &bucket_id(now)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.fields["bytes"], json!(5 * 102_400));

    let summary = first.load(now).await;
    assert_eq!(summary.provenance, Provenance::Store);
    assert_eq!(summary.today, 5 * 102_400);
}

#[tokio::test]
async fn unreachable_ledger_yields_placeholder_traffic() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let estimator = TrafficEstimator::new(store, TrafficOptions::default());

    let summary = estimator.load(Utc::now()).await;
    assert_eq!(summary.provenance, Provenance::Placeholder);
    assert_eq!(estimator.summary().provenance, Provenance::Placeholder);
}

#[tokio::test]
async fn resubscribing_keeps_a_single_live_subscription() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = LiveAggregator::new(store.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let first = tx.clone();
    aggregator.subscribe_users(move |view| {
        let _ = first.send(("first", view.total_users));
    });
    assert_eq!(rx.recv().await.unwrap(), ("first", 0));

    aggregator.subscribe_users(move |view| {
        let _ = tx.send(("second", view.total_users));
    });
    assert_eq!(rx.recv().await.unwrap(), ("second", 0));
    assert_eq!(aggregator.active(), vec!["users".to_string()]);

    store
        .set(&DocPath::doc("users", "u1"), Patch::new().set("online", true))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap(), ("second", 1));

    aggregator.dispose_all();
    assert!(aggregator.active().is_empty());
}

#[tokio::test]
async fn failed_subscription_delivers_degraded_view() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let aggregator = LiveAggregator::new(store);
    let (tx, mut rx) = mpsc::unbounded_channel();

    aggregator.subscribe_rooms(move |view| {
        let _ = tx.send(view);
    });

    let view = rx.recv().await.unwrap();
    assert!(view.degraded);
    assert_eq!(view.active_rooms, 0);
}
