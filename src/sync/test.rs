use std::sync::Arc;

use super::{ItemState, SyncEngine};
use crate::{
    admin::{AdminError, MemoryAdminClient},
    common::{ChangeSet, GatewayObject, GatewayObjectKind, ObjectId, ResolveGranularity, ResourceKey, SyncStatus, UpstreamObject},
    state::LocalStateStore,
};

fn upstream(owner: &ResourceKey, index: u32, port: u16) -> GatewayObject {
    let id = ObjectId::new(owner, GatewayObjectKind::Upstream, index);
    GatewayObject::Upstream(UpstreamObject {
        name: id.to_string(),
        id,
        service_name: "httpbin".to_owned(),
        port,
        weight: None,
        resolve_granularity: ResolveGranularity::Endpoint,
    })
}

fn engine(admin: &Arc<MemoryAdminClient>, state: &LocalStateStore) -> SyncEngine {
    SyncEngine::builder()
        .admin(Arc::clone(admin) as Arc<dyn crate::admin::AdminClient>)
        .state(state.clone())
        .build()
}

#[tokio::test]
async fn applied_items_land_in_store_and_gateway() {
    let owner = ResourceKey::route("default", "web");
    let admin = Arc::new(MemoryAdminClient::new());
    let state = LocalStateStore::new();
    let engine = engine(&admin, &state);

    let object = upstream(&owner, 0, 80);
    let change_set = ChangeSet {
        creates: vec![object.clone()],
        ..ChangeSet::default()
    };

    let report = engine.apply(&owner, change_set).await;
    assert_eq!(report.status(), SyncStatus::Synced);
    assert_eq!(report.applied(), 1);
    assert_eq!(admin.object_count().await, 1);

    let applied = state.get(object.id()).await.expect("object recorded");
    assert_eq!(applied.content_hash, object.content_hash());
    assert!(!applied.gateway_version.is_empty());
}

#[tokio::test]
async fn applying_the_same_change_set_twice_is_idempotent() {
    let owner = ResourceKey::route("default", "web");
    let change_set = ChangeSet {
        creates: vec![upstream(&owner, 0, 80), upstream(&owner, 1, 81)],
        ..ChangeSet::default()
    };

    let admin_once = Arc::new(MemoryAdminClient::new());
    let state_once = LocalStateStore::new();
    engine(&admin_once, &state_once).apply(&owner, change_set.clone()).await;

    let admin_twice = Arc::new(MemoryAdminClient::new());
    let state_twice = LocalStateStore::new();
    let twice = engine(&admin_twice, &state_twice);
    twice.apply(&owner, change_set.clone()).await;
    twice.apply(&owner, change_set).await;

    assert_eq!(state_once.len().await, state_twice.len().await);
    for id in state_once.ids_for_owner(&owner).await {
        let once = state_once.get(&id).await.expect("entry");
        let repeat = state_twice.get(&id).await.expect("entry");
        assert_eq!(once.content_hash, repeat.content_hash);
    }
}

#[tokio::test]
async fn deletes_run_after_upserts_and_clear_the_store() {
    let owner = ResourceKey::route("default", "web");
    let admin = Arc::new(MemoryAdminClient::new());
    let state = LocalStateStore::new();
    let engine = engine(&admin, &state);

    let stale = upstream(&owner, 1, 81);
    engine
        .apply(
            &owner,
            ChangeSet {
                creates: vec![stale.clone()],
                ..ChangeSet::default()
            },
        )
        .await;

    let fresh = upstream(&owner, 0, 80);
    let report = engine
        .apply(
            &owner,
            ChangeSet {
                creates: vec![fresh.clone()],
                deletes: vec![stale.id().clone()],
                ..ChangeSet::default()
            },
        )
        .await;

    assert_eq!(report.status(), SyncStatus::Synced);
    let last = report.items.last().expect("items");
    assert_eq!(last.id, stale.id().clone());

    assert_eq!(state.len().await, 1);
    assert!(state.get(fresh.id()).await.is_some());
    assert!(state.get(stale.id()).await.is_none());
    assert!(admin.stored(stale.id()).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn retryable_failure_is_retried_until_success() {
    let owner = ResourceKey::route("default", "web");
    let admin = Arc::new(MemoryAdminClient::new());
    admin.inject_failure(AdminError::Unavailable("connection refused".to_owned())).await;
    let state = LocalStateStore::new();
    let engine = engine(&admin, &state);

    let report = engine
        .apply(
            &owner,
            ChangeSet {
                creates: vec![upstream(&owner, 0, 80)],
                ..ChangeSet::default()
            },
        )
        .await;

    assert_eq!(report.status(), SyncStatus::Synced);
    assert_eq!(report.items[0].attempts, 2);
}

#[tokio::test]
async fn deterministic_rejection_is_not_retried() {
    let owner = ResourceKey::route("default", "web");
    let admin = Arc::new(MemoryAdminClient::new());
    admin.inject_failure(AdminError::Rejected(400)).await;
    let state = LocalStateStore::new();
    let engine = engine(&admin, &state);

    let report = engine
        .apply(
            &owner,
            ChangeSet {
                creates: vec![upstream(&owner, 0, 80)],
                ..ChangeSet::default()
            },
        )
        .await;

    match report.status() {
        SyncStatus::SyncFailed(reason) => assert!(reason.contains("400"), "{reason}"),
        other => panic!("expected SyncFailed, got {other}"),
    }
    assert_eq!(report.items[0].attempts, 1);
    assert!(state.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn exhausted_backoff_surfaces_failure_without_store_update() {
    let owner = ResourceKey::route("default", "web");
    let admin = Arc::new(MemoryAdminClient::new());
    for _ in 0..4 {
        admin.inject_failure(AdminError::Unavailable("connection refused".to_owned())).await;
    }
    let state = LocalStateStore::new();
    let engine = engine(&admin, &state);

    let report = engine
        .apply(
            &owner,
            ChangeSet {
                creates: vec![upstream(&owner, 0, 80)],
                ..ChangeSet::default()
            },
        )
        .await;

    assert!(matches!(report.status(), SyncStatus::SyncFailed(_)));
    assert_eq!(report.items[0].attempts, 4);
    assert!(state.is_empty().await);
    assert_eq!(admin.object_count().await, 0);
}

#[tokio::test]
async fn superseded_pass_abandons_remaining_items() {
    let owner = ResourceKey::route("default", "web");
    let admin = Arc::new(MemoryAdminClient::new());
    let state = LocalStateStore::new();
    let engine = engine(&admin, &state);

    let report = engine
        .apply_unless(
            &owner,
            ChangeSet {
                creates: vec![upstream(&owner, 0, 80), upstream(&owner, 1, 81)],
                ..ChangeSet::default()
            },
            || true,
        )
        .await;

    assert_eq!(report.status(), SyncStatus::Pending);
    assert!(report.items.iter().all(|item| item.state == ItemState::Pending));
    assert!(state.is_empty().await);
}
