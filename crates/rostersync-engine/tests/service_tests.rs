//! Service surface tests: validation bounds, status shape, conflict
//! resolution flows.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{env, group, TestEnv};
use rostersync_core::{EntityKind, Resolution, RunStatus, SyncError, SyncType};
use rostersync_engine::{LocalRoster, SyncService};
use rostersync_registry::{RegistryCredentials, RegistryFactory};
use rostersync_store::SyncStore;
use uuid::Uuid;

fn service(env: &TestEnv) -> SyncService {
    SyncService::new(
        env.store.clone() as Arc<dyn SyncStore>,
        env.factory.clone() as Arc<dyn RegistryFactory>,
        env.roster.clone() as Arc<dyn LocalRoster>,
    )
}

#[tokio::test]
async fn test_log_paging_bounds() {
    let env = env().await;
    let service = service(&env);

    for limit in [0, -5, 101, 1000] {
        let err = service
            .get_logs(env.organization_id, limit, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }), "limit {limit}");
    }

    let err = service
        .get_logs(env.organization_id, 10, -1)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));

    assert!(service.get_logs(env.organization_id, 100, 0).await.is_ok());
    assert!(service.get_logs(env.organization_id, 1, 50).await.is_ok());
}

#[tokio::test]
async fn test_logs_most_recent_first() {
    let env = env().await;
    let service = service(&env);
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);

    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();
    let second = service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    let logs = service.get_logs(env.organization_id, 10, 0).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].id, second.id);

    let page = service.get_logs(env.organization_id, 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_ne!(page[0].id, second.id);
}

#[tokio::test]
async fn test_status_reports_latest_run_and_conflicts() {
    let env = env().await;
    let service = service(&env);

    let status = service.get_status(env.organization_id).await.unwrap();
    assert!(status.latest_run.is_none());
    assert_eq!(status.pending_conflicts, 0);
    assert!(!status.config.sync_in_progress);

    env.roster
        .seed(env.organization_id, EntityKind::Team, "U16 Tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    // The quarantined duplicate shows up in the pending count and the run's
    // conflict tally; the run itself stays clean.
    let status = service.get_status(env.organization_id).await.unwrap();
    assert_eq!(
        status.latest_run.as_ref().map(|r| r.status),
        Some(RunStatus::Success)
    );
    assert_eq!(
        status.latest_run.as_ref().map(|r| r.counts.conflicts),
        Some(1)
    );
    assert_eq!(status.pending_conflicts, 1);
}

#[tokio::test]
async fn test_status_unknown_organization() {
    let env = env().await;
    let service = service(&env);
    let err = service.get_status(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
}

#[tokio::test]
async fn test_log_detail_not_found() {
    let env = env().await;
    let service = service(&env);
    let err = service.get_log_detail(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
}

#[tokio::test]
async fn test_connection_failure_is_normal_result() {
    let env = env().await;
    let service = service(&env);

    env.registry.fail_auth.store(true, Ordering::SeqCst);
    let result = service
        .test_connection(RegistryCredentials::new("sync-user", "wrong"))
        .await;
    assert!(!result.success);
    assert!(result.error.is_some());

    env.registry.fail_auth.store(false, Ordering::SeqCst);
    let result = service
        .test_connection(RegistryCredentials::new("sync-user", "right"))
        .await;
    assert!(result.success);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_resolve_remote_wins_applies_snapshot_and_maps() {
    let env = env().await;
    let service = service(&env);

    let local_id = env
        .roster
        .seed(env.organization_id, EntityKind::Team, "u16 tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    let conflicts = service.list_conflicts(env.organization_id).await.unwrap();
    assert_eq!(conflicts.len(), 1);

    let resolved = service
        .resolve_conflict(conflicts[0].id, Resolution::RemoteWins)
        .await
        .unwrap();
    assert_eq!(resolved.resolution, Resolution::RemoteWins);

    // Remote name won and the remote id is now mapped to the local record.
    assert_eq!(
        env.roster.name_of(EntityKind::Team, local_id),
        Some("U16 Tigers".to_string())
    );
    let mapping = SyncStore::find_mapping(
        env.store.as_ref(),
        env.organization_id,
        EntityKind::Team,
        "g-1",
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(mapping.local_id, local_id);

    // The next run reconciles normally instead of re-quarantining.
    let run = service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.counts.skipped, 1);
    assert_eq!(env.store.conflict_count(), 1);
}

#[tokio::test]
async fn test_resolve_remote_wins_recreates_deleted_record() {
    let env = env().await;
    let service = service(&env);

    let local_id = env
        .roster
        .seed(env.organization_id, EntityKind::Team, "u16 tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    // The quarantined record disappears while the conflict sits in review.
    env.roster.remove(EntityKind::Team, local_id);

    let conflicts = service.list_conflicts(env.organization_id).await.unwrap();
    let resolved = service
        .resolve_conflict(conflicts[0].id, Resolution::RemoteWins)
        .await
        .unwrap();
    assert_eq!(resolved.resolution, Resolution::RemoteWins);

    // The remote side was recreated and mapped.
    let mapping = SyncStore::find_mapping(
        env.store.as_ref(),
        env.organization_id,
        EntityKind::Team,
        "g-1",
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        env.roster.name_of(EntityKind::Team, mapping.local_id),
        Some("U16 Tigers".to_string())
    );
    assert_eq!(env.roster.count(EntityKind::Team), 1);
}

#[tokio::test]
async fn test_failed_apply_leaves_conflict_pending_and_retryable() {
    let env = env().await;
    let service = service(&env);

    env.roster
        .seed(env.organization_id, EntityKind::Team, "u16 tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    let conflicts = service.list_conflicts(env.organization_id).await.unwrap();
    let conflict_id = conflicts[0].id;

    // The snapshot fails to apply; the resolution must not flip.
    env.roster.fail_update.store(true, Ordering::SeqCst);
    service
        .resolve_conflict(conflict_id, Resolution::RemoteWins)
        .await
        .unwrap_err();
    assert_eq!(
        service.list_conflicts(env.organization_id).await.unwrap().len(),
        1
    );

    // Once the roster recovers, the same resolution goes through.
    env.roster.fail_update.store(false, Ordering::SeqCst);
    let resolved = service
        .resolve_conflict(conflict_id, Resolution::RemoteWins)
        .await
        .unwrap();
    assert_eq!(resolved.resolution, Resolution::RemoteWins);
    assert!(service
        .list_conflicts(env.organization_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_resolve_local_wins_keeps_local_data() {
    let env = env().await;
    let service = service(&env);

    let local_id = env
        .roster
        .seed(env.organization_id, EntityKind::Team, "u16 tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    let conflicts = service.list_conflicts(env.organization_id).await.unwrap();
    service
        .resolve_conflict(conflicts[0].id, Resolution::LocalWins)
        .await
        .unwrap();

    // Local record untouched, but the remote id is linked.
    assert_eq!(
        env.roster.name_of(EntityKind::Team, local_id),
        Some("u16 tigers".to_string())
    );
    assert!(SyncStore::find_mapping(
        env.store.as_ref(),
        env.organization_id,
        EntityKind::Team,
        "g-1"
    )
    .await
    .unwrap()
    .is_some());
    assert_eq!(
        service.get_status(env.organization_id).await.unwrap().pending_conflicts,
        0
    );
}

#[tokio::test]
async fn test_resolve_twice_is_rejected() {
    let env = env().await;
    let service = service(&env);

    env.roster
        .seed(env.organization_id, EntityKind::Team, "U16 Tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    let conflicts = service.list_conflicts(env.organization_id).await.unwrap();
    service
        .resolve_conflict(conflicts[0].id, Resolution::LocalWins)
        .await
        .unwrap();

    let err = service
        .resolve_conflict(conflicts[0].id, Resolution::RemoteWins)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict { .. }), "{err:?}");
}

#[tokio::test]
async fn test_resolve_to_pending_is_rejected() {
    let env = env().await;
    let service = service(&env);

    env.roster
        .seed(env.organization_id, EntityKind::Team, "U16 Tigers");
    env.registry.set_groups(vec![group("g-1", "U16 Tigers")]);
    service
        .start_sync(env.organization_id, SyncType::Teams)
        .await
        .unwrap();

    let conflicts = service.list_conflicts(env.organization_id).await.unwrap();
    let err = service
        .resolve_conflict(conflicts[0].id, Resolution::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }), "{err:?}");
}

#[tokio::test]
async fn test_save_and_delete_config() {
    let env = env().await;
    let service = service(&env);

    let config = service
        .get_config(env.organization_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.username, "sync-user");

    assert!(service.delete_config(config.id).await.unwrap());
    assert!(service
        .get_config(env.organization_id)
        .await
        .unwrap()
        .is_none());
    // Deleting again is a no-op.
    assert!(!service.delete_config(config.id).await.unwrap());
}
