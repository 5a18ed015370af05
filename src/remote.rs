// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Remote Data Source
//!
//! The abstract collaborator this engine reconciles against. The wire
//! protocol is the implementation's concern; the engine only needs delta
//! reads ordered by `updated_at` and per-record mutations.
//!
//! Two implementations ship with the crate:
//! - [`InMemoryRemote`] - scriptable store with failure injection, for tests
//!   and simulation
//! - [`FileRemote`] - JSON-file-backed store (`<dir>/<resource>.json`), the
//!   system of record behind the CLI

use crate::error::{Result, SyncError};
use crate::models::{extract_entity_id, RemoteRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

// =============================================================================
// Trait
// =============================================================================

/// Abstract remote system of record
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Records changed strictly after `since` (all records when `None`),
    /// ordered ascending by `updated_at`.
    async fn get_changes_since(
        &self,
        resource: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteRecord>>;

    /// Up to `limit` most-recently-updated records, newest first. Used by
    /// consistency audits.
    async fn fetch_recent(&self, resource: &str, limit: usize) -> Result<Vec<RemoteRecord>>;

    async fn insert(&self, resource: &str, record: &Value) -> Result<()>;

    async fn update(&self, resource: &str, id: &str, record: &Value) -> Result<()>;

    async fn delete(&self, resource: &str, id: &str) -> Result<()>;
}

// =============================================================================
// In-Memory Remote
// =============================================================================

/// A pushed mutation, recorded for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedOperation {
    pub resource: String,
    pub kind: PushKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Insert,
    Update,
    Delete,
}

/// In-memory remote with failure injection. Every accepted mutation is
/// appended to a push log so callers can assert exactly what reached the
/// remote.
#[derive(Default)]
pub struct InMemoryRemote {
    records: Mutex<HashMap<String, Vec<RemoteRecord>>>,
    push_log: Mutex<Vec<PushedOperation>>,
    fail_next_fetch: AtomicBool,
    reject_pushes: AtomicBool,
    fetch_delay_ms: AtomicU64,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record; `updated_at` is taken from the payload's `updated_at`
    /// field.
    pub fn seed(&self, resource: &str, primary_key_field: &str, data: Value) {
        if let Some(record) = RemoteRecord::from_value(primary_key_field, data) {
            let mut records = self.lock_records();
            let list = records.entry(resource.to_string()).or_default();
            list.retain(|r| r.id != record.id);
            list.push(record);
        }
    }

    /// Make the next `get_changes_since` fail with a network error.
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Reject every push until cleared.
    pub fn set_reject_pushes(&self, reject: bool) {
        self.reject_pushes.store(reject, Ordering::SeqCst);
    }

    /// Delay every fetch, to hold a sync cycle in flight.
    pub fn set_fetch_delay_ms(&self, delay_ms: u64) {
        self.fetch_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn pushed_operations(&self) -> Vec<PushedOperation> {
        self.lock_push_log().clone()
    }

    pub fn records(&self, resource: &str) -> Vec<RemoteRecord> {
        self.lock_records().get(resource).cloned().unwrap_or_default()
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<RemoteRecord>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_push_log(&self) -> std::sync::MutexGuard<'_, Vec<PushedOperation>> {
        self.push_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_push(&self, resource: &str, kind: PushKind, id: &str) -> Result<()> {
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Err(SyncError::Network(format!(
                "push rejected by remote: {}/{}",
                resource, id
            )));
        }
        self.lock_push_log().push(PushedOperation {
            resource: resource.to_string(),
            kind,
            id: id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl RemoteDataSource for InMemoryRemote {
    async fn get_changes_since(
        &self,
        resource: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteRecord>> {
        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(SyncError::Network("remote unreachable".to_string()));
        }
        let mut changed: Vec<RemoteRecord> = self
            .lock_records()
            .get(resource)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| since.map_or(true, |ts| r.updated_at > ts))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        changed.sort_by_key(|r| r.updated_at);
        Ok(changed)
    }

    async fn fetch_recent(&self, resource: &str, limit: usize) -> Result<Vec<RemoteRecord>> {
        let mut records = self.records(resource);
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn insert(&self, resource: &str, record: &Value) -> Result<()> {
        let id = extract_entity_id(record, "id").unwrap_or_default();
        self.check_push(resource, PushKind::Insert, &id)?;
        let stored = RemoteRecord {
            id,
            updated_at: Utc::now(),
            data: record.clone(),
        };
        self.lock_records()
            .entry(resource.to_string())
            .or_default()
            .push(stored);
        Ok(())
    }

    async fn update(&self, resource: &str, id: &str, record: &Value) -> Result<()> {
        self.check_push(resource, PushKind::Update, id)?;
        let mut records = self.lock_records();
        if let Some(existing) = records
            .get_mut(resource)
            .and_then(|list| list.iter_mut().find(|r| r.id == id))
        {
            existing.data = record.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, resource: &str, id: &str) -> Result<()> {
        self.check_push(resource, PushKind::Delete, id)?;
        if let Some(list) = self.lock_records().get_mut(resource) {
            list.retain(|r| r.id != id);
        }
        Ok(())
    }
}

// =============================================================================
// File Remote
// =============================================================================

/// JSON-file-backed remote: each resource lives in `<dir>/<resource>.json` as
/// an array of record objects carrying the primary key and an RFC 3339
/// `updated_at`.
pub struct FileRemote {
    dir: PathBuf,
    primary_key_field: String,
}

impl FileRemote {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            primary_key_field: "id".to_string(),
        }
    }

    pub fn with_primary_key(mut self, field: &str) -> Self {
        self.primary_key_field = field.to_string();
        self
    }

    fn resource_path(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{}.json", resource))
    }

    /// Resource names found in the remote directory.
    pub fn list_resources(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut resources = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    resources.push(stem.to_string());
                }
            }
        }
        resources.sort();
        Ok(resources)
    }

    fn load(&self, resource: &str) -> Result<Vec<RemoteRecord>> {
        let path = self.resource_path(resource);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        let values: Vec<Value> = serde_json::from_str(&content)?;
        let mut records = Vec::with_capacity(values.len());
        for value in values {
            match RemoteRecord::from_value(&self.primary_key_field, value) {
                Some(record) => records.push(record),
                None => log::warn!(
                    "Skipping malformed record in {} (missing '{}' or 'updated_at')",
                    path.display(),
                    self.primary_key_field
                ),
            }
        }
        Ok(records)
    }

    fn store(&self, resource: &str, records: &[RemoteRecord]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let values: Vec<&Value> = records.iter().map(|r| &r.data).collect();
        let json = serde_json::to_string_pretty(&values)?;
        std::fs::write(self.resource_path(resource), json)?;
        Ok(())
    }

    /// Stamp `updated_at` into the payload so the file stays self-describing.
    fn stamped(record: &Value, updated_at: DateTime<Utc>) -> Value {
        let mut data = record.clone();
        if let Some(obj) = data.as_object_mut() {
            obj.insert("updated_at".to_string(), serde_json::json!(updated_at));
        }
        data
    }
}

#[async_trait]
impl RemoteDataSource for FileRemote {
    async fn get_changes_since(
        &self,
        resource: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteRecord>> {
        let mut records = self.load(resource)?;
        records.retain(|r| since.map_or(true, |ts| r.updated_at > ts));
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }

    async fn fetch_recent(&self, resource: &str, limit: usize) -> Result<Vec<RemoteRecord>> {
        let mut records = self.load(resource)?;
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn insert(&self, resource: &str, record: &Value) -> Result<()> {
        let now = Utc::now();
        let data = Self::stamped(record, now);
        let id = extract_entity_id(&data, &self.primary_key_field).unwrap_or_default();
        let mut records = self.load(resource)?;
        records.push(RemoteRecord {
            id,
            updated_at: now,
            data,
        });
        self.store(resource, &records)
    }

    async fn update(&self, resource: &str, id: &str, record: &Value) -> Result<()> {
        let mut records = self.load(resource)?;
        let now = Utc::now();
        let existing = records.iter_mut().find(|r| r.id == id).ok_or_else(|| {
            SyncError::RemoteRecordNotFound {
                resource: resource.to_string(),
                id: id.to_string(),
            }
        })?;
        existing.data = Self::stamped(record, now);
        existing.updated_at = now;
        self.store(resource, &records)
    }

    async fn delete(&self, resource: &str, id: &str) -> Result<()> {
        let mut records = self.load(resource)?;
        records.retain(|r| r.id != id);
        self.store(resource, &records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_remote() -> InMemoryRemote {
        let remote = InMemoryRemote::new();
        remote.seed(
            "orders",
            "id",
            json!({"id": "A1", "price": 10, "updated_at": "2026-01-01T00:00:00Z"}),
        );
        remote.seed(
            "orders",
            "id",
            json!({"id": "A2", "price": 20, "updated_at": "2026-01-02T00:00:00Z"}),
        );
        remote
    }

    #[tokio::test]
    async fn test_get_changes_since_filters_and_orders() {
        let remote = seeded_remote();
        let all = remote.get_changes_since("orders", None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "A1");

        let since = "2026-01-01T00:00:00Z".parse().unwrap();
        let newer = remote
            .get_changes_since("orders", Some(since))
            .await
            .unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, "A2");
    }

    #[tokio::test]
    async fn test_fetch_recent_newest_first() {
        let remote = seeded_remote();
        let recent = remote.fetch_recent("orders", 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "A2");
    }

    #[tokio::test]
    async fn test_rejected_push_is_not_logged() {
        let remote = seeded_remote();
        remote.set_reject_pushes(true);
        let err = remote
            .update("orders", "A1", &json!({"id": "A1", "price": 11}))
            .await;
        assert!(err.is_err());
        assert!(remote.pushed_operations().is_empty());
    }

    #[tokio::test]
    async fn test_file_remote_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FileRemote::new(dir.path());
        remote
            .insert("orders", &json!({"id": "A1", "price": 10}))
            .await
            .unwrap();
        remote
            .update("orders", "A1", &json!({"id": "A1", "price": 12}))
            .await
            .unwrap();

        let records = remote.get_changes_since("orders", None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data["price"], 12);
        assert_eq!(remote.list_resources().unwrap(), vec!["orders".to_string()]);

        remote.delete("orders", "A1").await.unwrap();
        assert!(remote
            .get_changes_since("orders", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_file_remote_update_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FileRemote::new(dir.path());
        let err = remote.update("orders", "nope", &json!({"id": "nope"})).await;
        assert!(matches!(err, Err(SyncError::RemoteRecordNotFound { .. })));
    }
}
