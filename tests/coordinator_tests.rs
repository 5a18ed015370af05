//! Extensive tests for the sync coordinator
//!
//! Covers:
//! - Idempotent reconciliation cycles
//! - At-most-one-sync-in-flight per resource
//! - Conflict detection tie-breaks (strictly-newer server timestamps)
//! - Resolution strategies end to end
//! - Network failure and push rejection handling
//! - Stale completions after stop_sync
//! - Periodic timer syncing

use cachesync::{
    cache_key, CacheStore, ChangeOperation, ConflictStrategy, InMemoryRemote, SyncConfig,
    SyncRegistry, SyncStatus,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Setup Helpers
// ============================================================================

fn setup() -> (Arc<CacheStore>, Arc<InMemoryRemote>, Arc<SyncRegistry>) {
    let cache = Arc::new(CacheStore::new());
    let remote = Arc::new(InMemoryRemote::new());
    let remote_dyn: Arc<dyn cachesync::RemoteDataSource> = remote.clone();
    let registry = Arc::new(SyncRegistry::new(Arc::clone(&cache), remote_dyn));
    (cache, remote, registry)
}

fn order(id: &str, price: i64, updated_at: DateTime<Utc>) -> Value {
    json!({"id": id, "price": price, "updated_at": updated_at})
}

fn init_orders(registry: &Arc<SyncRegistry>, strategy: ConflictStrategy) {
    registry
        .init_sync(SyncConfig::new("orders", "id").with_strategy(strategy))
        .unwrap();
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_repeated_sync_is_idempotent() {
    let (cache, remote, registry) = setup();
    let past = Utc::now() - Duration::hours(1);
    remote.seed("orders", "id", order("A1", 10, past));
    remote.seed("orders", "id", order("A2", 20, past));
    init_orders(&registry, ConflictStrategy::ServerWins);

    registry.perform_sync("orders").await.unwrap();
    let first_a1: Value = cache.get(&cache_key("orders", "A1")).unwrap();
    let first_sync = registry.get_sync_status("orders").unwrap().last_sync.unwrap();

    registry.perform_sync("orders").await.unwrap();
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.conflicts.is_empty());
    assert!(state.last_sync.unwrap() >= first_sync);
    assert_eq!(cache.get::<Value>(&cache_key("orders", "A1")), Some(first_a1));
    assert_eq!(cache.stats().size, 2);
}

// ============================================================================
// At-Most-One-In-Flight
// ============================================================================

#[tokio::test]
async fn test_second_sync_while_in_flight_is_noop() {
    let (_cache, remote, registry) = setup();
    remote.seed("orders", "id", order("A1", 10, Utc::now() - Duration::hours(1)));
    remote.set_fetch_delay_ms(200);
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 11}))
        .unwrap();

    let first = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.perform_sync("orders").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // First cycle is suspended in the fetch; the status guard makes this a
    // no-op rather than a second concurrent cycle.
    assert_eq!(
        registry.get_sync_status("orders").unwrap().status,
        SyncStatus::Syncing
    );
    registry.perform_sync("orders").await.unwrap();
    assert_eq!(
        registry.get_sync_status("orders").unwrap().status,
        SyncStatus::Syncing
    );

    first.await.unwrap().unwrap();
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.pending_changes.is_empty());
    // The queued change was pushed exactly once.
    assert_eq!(remote.pushed_operations().len(), 1);
}

// ============================================================================
// Conflict Detection
// ============================================================================

#[tokio::test]
async fn test_newer_server_change_conflicts() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    remote.seed("orders", "id", order("A1", 12, Utc::now() + Duration::hours(1)));

    registry.perform_sync("orders").await.unwrap();
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.conflicts.len(), 1);
    assert_eq!(state.conflicts[0].entity_id, "A1");
}

#[tokio::test]
async fn test_older_server_change_does_not_conflict() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    remote.seed("orders", "id", order("A1", 12, Utc::now() - Duration::hours(1)));

    registry.perform_sync("orders").await.unwrap();
    assert!(registry.get_sync_status("orders").unwrap().conflicts.is_empty());
}

#[tokio::test]
async fn test_equal_timestamps_do_not_conflict() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();

    // Seed the server record with exactly the local stamp: local is assumed
    // already consistent with that version.
    let stamp = registry.get_sync_status("orders").unwrap().pending_changes[0].client_updated_at;
    remote.seed("orders", "id", order("A1", 12, stamp));

    registry.perform_sync("orders").await.unwrap();
    assert!(registry.get_sync_status("orders").unwrap().conflicts.is_empty());
}

#[tokio::test]
async fn test_conflicts_replaced_on_next_cycle() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    remote.seed("orders", "id", order("A1", 12, Utc::now() + Duration::hours(1)));

    registry.perform_sync("orders").await.unwrap();
    assert_eq!(registry.get_sync_status("orders").unwrap().conflicts.len(), 1);

    // Quiet cycle: the audit list is replaced, not accumulated.
    registry.perform_sync("orders").await.unwrap();
    assert!(registry.get_sync_status("orders").unwrap().conflicts.is_empty());
}

// ============================================================================
// Resolution Strategies
// ============================================================================

#[tokio::test]
async fn test_server_wins_caches_remote_record() {
    let (cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    let server = order("A1", 12, Utc::now() + Duration::hours(1));
    remote.seed("orders", "id", server.clone());

    registry.perform_sync("orders").await.unwrap();
    assert_eq!(cache.get::<Value>(&cache_key("orders", "A1")), Some(server));
}

#[tokio::test]
async fn test_client_wins_caches_local_record() {
    let (cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ClientWins);
    let local = json!({"id": "A1", "price": 10, "note": "local"});
    registry
        .queue_local_change("orders", ChangeOperation::Update, local.clone())
        .unwrap();
    remote.seed("orders", "id", order("A1", 12, Utc::now() + Duration::hours(1)));

    registry.perform_sync("orders").await.unwrap();
    assert_eq!(cache.get::<Value>(&cache_key("orders", "A1")), Some(local));
}

/// The end-to-end scenario: a merge conflict on 'orders/A1' yields one audit
/// conflict and a cache entry where the local price overrides the server's
/// but server-only fields survive.
#[tokio::test]
async fn test_merge_end_to_end() {
    let (cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::Merge);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    remote.seed(
        "orders",
        "id",
        json!({
            "id": "A1",
            "price": 12,
            "status": "shipped",
            "updated_at": Utc::now() + Duration::hours(1)
        }),
    );

    registry.perform_sync("orders").await.unwrap();

    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.conflicts.len(), 1);
    assert!(state.pending_changes.is_empty());

    let merged: Value = cache.get(&cache_key("orders", "A1")).unwrap();
    assert_eq!(merged["price"], 10);
    assert_eq!(merged["status"], "shipped");
    assert_eq!(merged["id"], "A1");

    // The local change was still pushed to the remote.
    assert_eq!(remote.pushed_operations().len(), 1);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_network_error_aborts_cycle_and_preserves_pending() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    remote.fail_next_fetch();

    assert!(registry.perform_sync("orders").await.is_err());
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(state.pending_changes.len(), 1);
    assert!(state.last_sync.is_none());
    assert!(remote.pushed_operations().is_empty());

    // The next tick retries from scratch.
    registry.perform_sync("orders").await.unwrap();
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.pending_changes.is_empty());
}

#[tokio::test]
async fn test_push_rejection_does_not_fail_cycle() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A2", "price": 20}))
        .unwrap();
    remote.set_reject_pushes(true);

    registry.perform_sync("orders").await.unwrap();
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    // Rejected changes are logged and dropped, not retried.
    assert!(state.pending_changes.is_empty());
    assert!(state.last_sync.is_some());
}

#[tokio::test]
async fn test_multiple_changes_for_same_entity_each_pushed() {
    let (_cache, remote, registry) = setup();
    init_orders(&registry, ConflictStrategy::ServerWins);
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 10}))
        .unwrap();
    registry
        .queue_local_change("orders", ChangeOperation::Update, json!({"id": "A1", "price": 11}))
        .unwrap();

    registry.perform_sync("orders").await.unwrap();
    assert_eq!(remote.pushed_operations().len(), 2);
}

// ============================================================================
// Stale Completions and Interleaving
// ============================================================================

#[tokio::test]
async fn test_stop_sync_discards_in_flight_completion() {
    let (_cache, remote, registry) = setup();
    remote.seed("orders", "id", order("A1", 10, Utc::now() - Duration::hours(1)));
    remote.set_fetch_delay_ms(200);
    init_orders(&registry, ConflictStrategy::ServerWins);

    let in_flight = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.perform_sync("orders").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    registry.stop_sync("orders");
    assert!(registry.get_sync_status("orders").is_none());

    // The stale completion must not resurrect the deleted resource.
    in_flight.await.unwrap().unwrap();
    assert!(registry.get_sync_status("orders").is_none());

    // A re-registered resource starts fresh, untouched by the old cycle.
    remote.set_fetch_delay_ms(0);
    init_orders(&registry, ConflictStrategy::ServerWins);
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.last_sync.is_none());
}

#[tokio::test]
async fn test_change_queued_during_cycle_waits_for_next_tick() {
    let (_cache, remote, registry) = setup();
    remote.set_fetch_delay_ms(200);
    init_orders(&registry, ConflictStrategy::ServerWins);

    let in_flight = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.perform_sync("orders").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    registry
        .queue_local_change("orders", ChangeOperation::Insert, json!({"id": "B1", "price": 5}))
        .unwrap();
    in_flight.await.unwrap().unwrap();

    // Not part of the snapshot, so still pending and not yet pushed.
    let state = registry.get_sync_status("orders").unwrap();
    assert_eq!(state.pending_changes.len(), 1);
    assert!(remote.pushed_operations().is_empty());

    remote.set_fetch_delay_ms(0);
    registry.perform_sync("orders").await.unwrap();
    assert!(registry.get_sync_status("orders").unwrap().pending_changes.is_empty());
    assert_eq!(remote.pushed_operations().len(), 1);
}

// ============================================================================
// Cache Tagging and Timers
// ============================================================================

#[tokio::test]
async fn test_synced_entries_invalidate_by_resource_tag() {
    let (cache, remote, registry) = setup();
    let past = Utc::now() - Duration::hours(1);
    remote.seed("orders", "id", order("A1", 10, past));
    remote.seed("orders", "id", order("A2", 20, past));
    init_orders(&registry, ConflictStrategy::ServerWins);

    registry.perform_sync("orders").await.unwrap();
    assert_eq!(cache.stats().size, 2);

    cache.invalidate_by_tag("orders");
    assert_eq!(cache.stats().size, 0);
}

#[tokio::test]
async fn test_poll_interval_drives_periodic_sync() {
    let (_cache, remote, registry) = setup();
    remote.seed("orders", "id", order("A1", 10, Utc::now() - Duration::hours(1)));
    registry
        .init_sync(SyncConfig::new("orders", "id").with_poll_interval_ms(50))
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let state = registry.get_sync_status("orders").unwrap();
    assert!(state.last_sync.is_some());

    registry.stop_sync("orders");
}
