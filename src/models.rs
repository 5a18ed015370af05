// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Core data shapes for the sync engine
//!
//! Records exchanged with the remote are untyped `serde_json::Value` objects;
//! the engine only cares about the primary key field and `updated_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Sync State and Tracking
// =============================================================================

/// Per-resource sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Offline,
}

/// Reconciliation state for a single named resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub resource_name: String,
    /// Timestamp of the last successful cycle; never moves backward.
    pub last_sync: Option<DateTime<Utc>>,
    /// FIFO queue of local mutations not yet confirmed on the remote.
    pub pending_changes: Vec<PendingChange>,
    /// Conflicts detected by the most recent cycle, kept for audit.
    pub conflicts: Vec<Conflict>,
    pub status: SyncStatus,
}

impl SyncState {
    pub fn new(resource_name: &str) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            last_sync: None,
            pending_changes: Vec::new(),
            conflicts: Vec::new(),
            status: SyncStatus::Idle,
        }
    }
}

/// Type of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A locally queued mutation awaiting push to the remote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub payload: Value,
    pub client_updated_at: DateTime<Utc>,
}

// =============================================================================
// Conflicts
// =============================================================================

/// Kind of divergence between local and remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    UpdateConflict,
}

/// A detected divergence between a pending local change and a newer remote
/// record for the same entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub entity_id: String,
    pub local_data: Value,
    pub remote_data: Value,
    pub kind: ConflictKind,
    pub detected_at: DateTime<Utc>,
}

/// How conflicts are resolved for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Remote record wins (safe default)
    ServerWins,
    /// Local record wins
    ClientWins,
    /// Shallow merge, local fields overlaid on the remote base
    Merge,
    /// Defer to a caller-supplied resolution hook, falling back to
    /// server-wins on timeout
    AskUser,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        Self::ServerWins
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Static per-resource sync configuration, immutable for the life of the sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub resource_name: String,
    /// Field in each record that identifies the entity (e.g. "id")
    pub primary_key_field: String,
    pub conflict_strategy: ConflictStrategy,
    /// Period of the automatic sync timer; 0 means manual-only sync
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    pub fn new(resource_name: &str, primary_key_field: &str) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            primary_key_field: primary_key_field.to_string(),
            conflict_strategy: ConflictStrategy::default(),
            poll_interval_ms: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }
}

// =============================================================================
// Remote Records
// =============================================================================

/// A record as seen by the remote system of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub data: Value,
}

impl RemoteRecord {
    /// Build a record from a raw JSON object, reading the id from
    /// `primary_key_field` and the timestamp from `updated_at`.
    pub fn from_value(primary_key_field: &str, data: Value) -> Option<Self> {
        let id = extract_entity_id(&data, primary_key_field)?;
        let updated_at = data
            .get("updated_at")
            .cloned()
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())?;
        Some(Self {
            id,
            updated_at,
            data,
        })
    }
}

// =============================================================================
// Consistency Reports
// =============================================================================

/// A single cache/remote divergence found by a consistency check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inconsistency {
    pub id: String,
    pub server_data: Value,
    /// `None` when the entity is missing from the cache entirely
    pub cached_data: Option<Value>,
}

/// Result of an on-demand consistency audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub resource_name: String,
    /// Number of remote records actually sampled
    pub sampled: usize,
    pub consistent: bool,
    pub inconsistencies: Vec<Inconsistency>,
    pub checked_at: DateTime<Utc>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Cache key for an entity within a resource
pub fn cache_key(resource_name: &str, entity_id: &str) -> String {
    format!("{}_{}", resource_name, entity_id)
}

/// Pull the entity id out of a record payload. String and integer keys are
/// both accepted; anything else is rejected.
pub fn extract_entity_id(data: &Value, primary_key_field: &str) -> Option<String> {
    match data.get(primary_key_field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_entity_id_string_and_number() {
        assert_eq!(
            extract_entity_id(&json!({"id": "A1"}), "id"),
            Some("A1".to_string())
        );
        assert_eq!(
            extract_entity_id(&json!({"order_id": 42}), "order_id"),
            Some("42".to_string())
        );
        assert_eq!(extract_entity_id(&json!({"id": null}), "id"), None);
        assert_eq!(extract_entity_id(&json!({"id": "A1"}), "uuid"), None);
    }

    #[test]
    fn test_remote_record_from_value() {
        let record = RemoteRecord::from_value(
            "id",
            json!({"id": "A1", "price": 12, "updated_at": "2026-01-01T00:00:00Z"}),
        )
        .unwrap();
        assert_eq!(record.id, "A1");
        assert_eq!(record.data["price"], 12);
    }

    #[test]
    fn test_remote_record_missing_timestamp() {
        assert!(RemoteRecord::from_value("id", json!({"id": "A1"})).is_none());
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("orders", "A1"), "orders_A1");
    }
}
