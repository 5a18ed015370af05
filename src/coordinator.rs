// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Sync Coordinator
//!
//! The [`SyncRegistry`] owns per-resource reconciliation state and drives the
//! sync cycle: fetch remote deltas, detect conflicts, resolve them, apply
//! server changes to the cache, and push queued local mutations back to the
//! remote. One registry instance replaces any process-wide global state; it
//! carries its own lifecycle and can be instantiated independently in tests.
//!
//! Concurrency model: at most one cycle is in flight per resource, enforced
//! by a synchronous check-and-set of the resource status before the first
//! await. Periodic timers run as spawned tasks holding a `Weak` handle; they
//! stop on their own once the registry is dropped. An epoch counter captured
//! at cycle start guards against completions that land after `stop_sync`.

use crate::cache::CacheStore;
use crate::consistency::ConsistencyChecker;
use crate::error::{Result, SyncError};
use crate::models::{
    cache_key, extract_entity_id, ChangeOperation, Conflict, ConflictKind, ConsistencyReport,
    PendingChange, SyncConfig, SyncState, SyncStatus,
};
use crate::remote::RemoteDataSource;
use crate::resolver::{self, ResolutionHook};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

struct ResourceEntry {
    config: SyncConfig,
    state: SyncState,
    /// Epoch of the cycle currently in flight (0 = none yet); completions
    /// whose epoch no longer matches are discarded.
    current_epoch: u64,
    timer: Option<JoinHandle<()>>,
}

struct CycleOutcome {
    conflicts: Vec<Conflict>,
}

/// Registry of synced resources. Construct with [`SyncRegistry::new`], wrap
/// in an `Arc`, and register resources with [`init_sync`](Self::init_sync).
pub struct SyncRegistry {
    cache: Arc<CacheStore>,
    remote: Arc<dyn RemoteDataSource>,
    resources: Mutex<HashMap<String, ResourceEntry>>,
    hook: RwLock<Option<ResolutionHook>>,
    hook_timeout: Duration,
    epochs: AtomicU64,
}

impl SyncRegistry {
    pub fn new(cache: Arc<CacheStore>, remote: Arc<dyn RemoteDataSource>) -> Self {
        Self {
            cache,
            remote,
            resources: Mutex::new(HashMap::new()),
            hook: RwLock::new(None),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            epochs: AtomicU64::new(0),
        }
    }

    /// How long an `ask_user` resolution hook gets before the server-wins
    /// fallback kicks in.
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Install the decision hook consulted for `ask_user` conflicts.
    pub fn set_resolution_hook(&self, hook: ResolutionHook) {
        *self.write_hook() = Some(hook);
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register a resource for syncing. With `poll_interval_ms > 0` a
    /// repeating timer drives [`perform_sync`](Self::perform_sync); with 0
    /// the resource is manual-only. Registering an already-registered
    /// resource is a configuration error: call `stop_sync` first.
    pub fn init_sync(self: &Arc<Self>, config: SyncConfig) -> Result<()> {
        if config.resource_name.is_empty() {
            return Err(SyncError::Config("resource_name must not be empty".to_string()));
        }
        if config.primary_key_field.is_empty() {
            return Err(SyncError::Config(format!(
                "primary_key_field must not be empty for resource '{}'",
                config.resource_name
            )));
        }
        let mut resources = self.lock_resources();
        if resources.contains_key(&config.resource_name) {
            return Err(SyncError::Config(format!(
                "resource '{}' is already registered; stop_sync it first",
                config.resource_name
            )));
        }

        let timer = if config.poll_interval_ms > 0 {
            Some(self.spawn_timer(&config.resource_name, config.poll_interval_ms))
        } else {
            None
        };
        log::info!(
            "Registered resource '{}' (strategy {:?}, poll {} ms)",
            config.resource_name,
            config.conflict_strategy,
            config.poll_interval_ms
        );
        resources.insert(
            config.resource_name.clone(),
            ResourceEntry {
                state: SyncState::new(&config.resource_name),
                config,
                current_epoch: 0,
                timer,
            },
        );
        Ok(())
    }

    /// Stop the timer and drop all state for a resource. Unpushed pending
    /// changes are discarded; a cycle still in flight will find its epoch
    /// gone and discard its completion. Idempotent.
    pub fn stop_sync(&self, resource: &str) {
        let entry = self.lock_resources().remove(resource);
        match entry {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                if !entry.state.pending_changes.is_empty() {
                    log::warn!(
                        "Stopping sync for '{}' discards {} unpushed pending changes",
                        resource,
                        entry.state.pending_changes.len()
                    );
                }
            }
            None => log::debug!("stop_sync for unknown resource '{}' ignored", resource),
        }
    }

    /// Stop every resource and clear the registry.
    pub fn dispose(&self) {
        let mut resources = self.lock_resources();
        for (name, entry) in resources.drain() {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
            log::debug!("Disposed sync state for '{}'", name);
        }
    }

    /// Names of currently registered resources.
    pub fn resource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_resources().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Local Mutations
    // =========================================================================

    /// Queue a local mutation for push on the next cycle. FIFO per resource;
    /// repeated mutations to the same entity queue separately and are each
    /// pushed.
    pub fn queue_local_change(
        &self,
        resource: &str,
        operation: ChangeOperation,
        data: Value,
    ) -> Result<()> {
        let mut resources = self.lock_resources();
        let entry = resources
            .get_mut(resource)
            .ok_or_else(|| SyncError::ResourceNotRegistered(resource.to_string()))?;
        let entity_id = extract_entity_id(&data, &entry.config.primary_key_field).ok_or_else(
            || SyncError::MissingPrimaryKey {
                resource: resource.to_string(),
                field: entry.config.primary_key_field.clone(),
            },
        )?;
        entry.state.pending_changes.push(PendingChange {
            entity_id,
            operation,
            payload: data,
            client_updated_at: Utc::now(),
        });
        Ok(())
    }

    /// Read-only snapshot of a resource's sync state.
    pub fn get_sync_status(&self, resource: &str) -> Option<SyncState> {
        self.lock_resources().get(resource).map(|e| e.state.clone())
    }

    /// Mark a resource offline (ticks are skipped) or bring it back to idle.
    pub fn set_offline(&self, resource: &str, offline: bool) -> Result<()> {
        let mut resources = self.lock_resources();
        let entry = resources
            .get_mut(resource)
            .ok_or_else(|| SyncError::ResourceNotRegistered(resource.to_string()))?;
        if offline {
            entry.state.status = SyncStatus::Offline;
        } else if entry.state.status == SyncStatus::Offline {
            entry.state.status = SyncStatus::Idle;
        }
        Ok(())
    }

    // =========================================================================
    // Reconciliation Cycle
    // =========================================================================

    /// Run one reconciliation cycle for a resource. No-op if a cycle is
    /// already in flight or the resource is offline; safe to invoke manually
    /// alongside the timer.
    pub async fn perform_sync(&self, resource: &str) -> Result<()> {
        // Check-and-set before the first await: this is the sole concurrency
        // control, and it holds because nothing suspends between the check
        // and the status write.
        let (config, epoch, since, local_changes) = {
            let mut resources = self.lock_resources();
            let entry = resources
                .get_mut(resource)
                .ok_or_else(|| SyncError::ResourceNotRegistered(resource.to_string()))?;
            match entry.state.status {
                SyncStatus::Syncing => {
                    log::debug!("Sync already in flight for '{}', skipping", resource);
                    return Ok(());
                }
                SyncStatus::Offline => {
                    log::debug!("Resource '{}' is offline, skipping sync", resource);
                    return Ok(());
                }
                SyncStatus::Idle | SyncStatus::Error => {}
            }
            entry.state.status = SyncStatus::Syncing;
            let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
            entry.current_epoch = epoch;
            (
                entry.config.clone(),
                epoch,
                entry.state.last_sync,
                entry.state.pending_changes.clone(),
            )
        };

        log::debug!(
            "Sync cycle start for '{}' ({} pending, since {:?})",
            resource,
            local_changes.len(),
            since
        );
        let outcome = self.run_cycle(&config, since, &local_changes).await;

        let mut resources = self.lock_resources();
        let entry = match resources.get_mut(resource) {
            Some(entry) if entry.current_epoch == epoch => entry,
            Some(_) => {
                log::debug!(
                    "Discarding stale sync completion for '{}' (resource re-initialized)",
                    resource
                );
                return Ok(());
            }
            None => {
                log::debug!(
                    "Discarding stale sync completion for '{}' (resource stopped)",
                    resource
                );
                return Ok(());
            }
        };
        match outcome {
            Ok(outcome) => {
                // Wall clocks can step backward; last_sync must not.
                let now = Utc::now();
                entry.state.last_sync =
                    Some(entry.state.last_sync.map_or(now, |prev| prev.max(now)));
                // Drain only the snapshot we pushed; changes queued while the
                // cycle was in flight wait for the next tick.
                let pushed = local_changes.len().min(entry.state.pending_changes.len());
                entry.state.pending_changes.drain(..pushed);
                if !outcome.conflicts.is_empty() {
                    log::info!(
                        "Sync cycle for '{}' resolved {} conflict(s)",
                        resource,
                        outcome.conflicts.len()
                    );
                }
                entry.state.conflicts = outcome.conflicts;
                entry.state.status = SyncStatus::Idle;
                Ok(())
            }
            Err(e) => {
                log::warn!("Sync cycle for '{}' failed: {}", resource, e);
                entry.state.status = SyncStatus::Error;
                Err(e)
            }
        }
    }

    async fn run_cycle(
        &self,
        config: &SyncConfig,
        since: Option<DateTime<Utc>>,
        local_changes: &[PendingChange],
    ) -> Result<CycleOutcome> {
        let resource = config.resource_name.as_str();
        let server_changes = self.remote.get_changes_since(resource, since).await?;

        // Conflict detection: a pending change conflicts when the newest
        // server change for the same entity is strictly newer than the local
        // stamp. Equal timestamps mean local already saw that version.
        let mut conflicts = Vec::new();
        for local in local_changes {
            let newest = server_changes.iter().rev().find(|r| r.id == local.entity_id);
            if let Some(record) = newest {
                if record.updated_at > local.client_updated_at {
                    conflicts.push(Conflict {
                        id: Uuid::new_v4().to_string(),
                        entity_id: local.entity_id.clone(),
                        local_data: local.payload.clone(),
                        remote_data: record.data.clone(),
                        kind: ConflictKind::UpdateConflict,
                        detected_at: Utc::now(),
                    });
                }
            }
        }

        // Apply server changes in ascending updated_at order. Entries are
        // tagged with the resource name so invalidate_by_tag(resource) drops
        // the whole resource.
        for record in &server_changes {
            self.cache
                .set(&cache_key(resource, &record.id), &record.data, None, &[resource]);
        }

        // Resolved records overwrite the server copy for conflicted entities,
        // bypassing the pending queue. The conflict records themselves are
        // kept for audit regardless of strategy.
        let hook = self.resolution_hook();
        for conflict in &conflicts {
            let resolved = resolver::resolve_with_hook(
                config.conflict_strategy,
                conflict,
                hook.as_ref(),
                self.hook_timeout,
            )
            .await;
            self.cache.set(
                &cache_key(resource, &conflict.entity_id),
                &resolved,
                None,
                &[resource],
            );
        }

        // Best-effort push: each dispatch is independent, a rejection is
        // logged and the change dropped without aborting the rest.
        for change in local_changes {
            let result = match change.operation {
                ChangeOperation::Insert => self.remote.insert(resource, &change.payload).await,
                ChangeOperation::Update => {
                    self.remote
                        .update(resource, &change.entity_id, &change.payload)
                        .await
                }
                ChangeOperation::Delete => self.remote.delete(resource, &change.entity_id).await,
            };
            if let Err(e) = result {
                log::warn!(
                    "Push of {:?} for '{}/{}' rejected, dropping change: {}",
                    change.operation,
                    resource,
                    change.entity_id,
                    e
                );
            }
        }

        Ok(CycleOutcome { conflicts })
    }

    // =========================================================================
    // Consistency Audit
    // =========================================================================

    /// On-demand audit comparing a sample of remote records against the
    /// cache. Full-payload remote read, so not part of the periodic cycle.
    pub async fn perform_consistency_check(
        &self,
        resource: &str,
        sample_size: usize,
    ) -> Result<ConsistencyReport> {
        ConsistencyChecker::new(Arc::clone(&self.cache), Arc::clone(&self.remote))
            .check(resource, sample_size)
            .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn spawn_timer(self: &Arc<Self>, resource: &str, interval_ms: u64) -> JoinHandle<()> {
        let weak: Weak<SyncRegistry> = Arc::downgrade(self);
        let resource = resource.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the first cycle should wait a
            // full period after init.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else { break };
                if let Err(e) = registry.perform_sync(&resource).await {
                    log::warn!("Periodic sync for '{}' failed: {}", resource, e);
                }
            }
        })
    }

    fn lock_resources(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResourceEntry>> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolution_hook(&self) -> Option<ResolutionHook> {
        self.hook.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write_hook(&self) -> std::sync::RwLockWriteGuard<'_, Option<ResolutionHook>> {
        self.hook.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SyncRegistry {
    fn drop(&mut self) {
        if let Ok(mut resources) = self.resources.lock() {
            for entry in resources.values_mut() {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
            }
        }
    }
}
