// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! In-Memory Cache Store
//!
//! A TTL- and tag-indexed key/value store. Entries are evicted lazily on read
//! once their TTL has elapsed, or eagerly via `invalidate` /
//! `invalidate_by_tag`. Purely process-local: no persistence, no cross-process
//! consistency.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Clock source, injectable for TTL tests
pub type ClockFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub const DEFAULT_TTL_SECONDS: u64 = 300;

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached copy of a remote record or derived value
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub tags: HashSet<String>,
}

impl CacheEntry {
    /// An entry with `ttl = 0` is stale on the very next read, so expiry is
    /// inclusive: `elapsed >= ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= self.ttl
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

/// Introspection snapshot of the cache
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let requests = self.hits + self.misses;
        if requests == 0 {
            0.0
        } else {
            self.hits as f64 / requests as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

// =============================================================================
// Cache Store
// =============================================================================

/// TTL- and tag-indexed in-memory store. Shared via `Arc`; interior locking
/// keeps all operations synchronous.
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: Mutex<Counters>,
    default_ttl: Duration,
    clock: ClockFn,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Build a store with an explicit clock source (tests use a settable
    /// clock to step through TTL expiry deterministically).
    pub fn with_clock(clock: ClockFn) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            default_ttl: Duration::seconds(DEFAULT_TTL_SECONDS as i64),
            clock,
        }
    }

    pub fn with_default_ttl(mut self, ttl_seconds: u64) -> Self {
        self.default_ttl = Duration::seconds(ttl_seconds as i64);
        self
    }

    /// Store a value, overwriting any existing entry. `ttl_seconds = None`
    /// uses the store default; entries written without tags are unreachable
    /// via `invalidate_by_tag`.
    pub fn set<T: Serialize>(&self, key: &str, data: &T, ttl_seconds: Option<u64>, tags: &[&str]) {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Cache set for '{}' skipped, unserializable value: {}", key, e);
                return;
            }
        };
        let entry = CacheEntry {
            data: value,
            created_at: (self.clock)(),
            ttl: ttl_seconds
                .map(|s| Duration::seconds(s as i64))
                .unwrap_or(self.default_ttl),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        self.write_entries().insert(key.to_string(), entry);
    }

    /// Fetch a value. An entry past its TTL is deleted and reported as a
    /// miss; a live entry is returned without side effects on the entry.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = (self.clock)();
        let mut entries = self.write_entries();
        let lookup = entries
            .get(key)
            .map(|entry| (entry.is_expired(now), entry.data.clone()));
        match lookup {
            Some((true, _)) => {
                entries.remove(key);
                drop(entries);
                let mut counters = self.lock_counters();
                counters.misses += 1;
                counters.evictions += 1;
                None
            }
            Some((false, data)) => {
                drop(entries);
                self.lock_counters().hits += 1;
                match serde_json::from_value(data) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        log::warn!("Cache entry '{}' failed to deserialize: {}", key, e);
                        None
                    }
                }
            }
            None => {
                drop(entries);
                self.lock_counters().misses += 1;
                None
            }
        }
    }

    /// Remove a single entry unconditionally.
    pub fn invalidate(&self, key: &str) {
        self.write_entries().remove(key);
    }

    /// Remove every entry whose tag set contains `tag`. O(n) scan over all
    /// entries.
    pub fn invalidate_by_tag(&self, tag: &str) {
        let mut entries = self.write_entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.contains(tag));
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Invalidated {} cache entries tagged '{}'", removed, tag);
        }
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.write_entries().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.read_entries();
        let counters = self.lock_counters();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: entries.len(),
            keys,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
        }
    }

    // A panicked writer elsewhere must not poison every later cache access;
    // recover the guard and keep serving.
    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CacheStore")
            .field("size", &stats.size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
