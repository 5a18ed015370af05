// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Consistency Checker
//!
//! On-demand audit of cache/remote agreement: samples the most-recently
//! updated remote records and deep-compares each against its cached copy.
//! Reads full payloads proportional to the sample size, so callers run it as
//! a diagnostic, not on every tick.

use crate::cache::CacheStore;
use crate::error::Result;
use crate::models::{cache_key, ConsistencyReport, Inconsistency};
use crate::remote::RemoteDataSource;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

pub struct ConsistencyChecker {
    cache: Arc<CacheStore>,
    remote: Arc<dyn RemoteDataSource>,
}

impl ConsistencyChecker {
    pub fn new(cache: Arc<CacheStore>, remote: Arc<dyn RemoteDataSource>) -> Self {
        Self { cache, remote }
    }

    /// Compare up to `sample_size` most-recently-updated remote records
    /// against the cache. A missing cache entry counts as an inconsistency
    /// (`cached_data: None`).
    pub async fn check(&self, resource: &str, sample_size: usize) -> Result<ConsistencyReport> {
        let sample = self.remote.fetch_recent(resource, sample_size).await?;
        let mut inconsistencies = Vec::new();
        for record in &sample {
            let cached: Option<Value> = self.cache.get(&cache_key(resource, &record.id));
            if cached.as_ref() != Some(&record.data) {
                inconsistencies.push(Inconsistency {
                    id: record.id.clone(),
                    server_data: record.data.clone(),
                    cached_data: cached,
                });
            }
        }
        if inconsistencies.is_empty() {
            log::debug!(
                "Consistency check for '{}': {} sampled, all consistent",
                resource,
                sample.len()
            );
        } else {
            log::warn!(
                "Consistency check for '{}': {} of {} sampled records diverged",
                resource,
                inconsistencies.len(),
                sample.len()
            );
        }
        Ok(ConsistencyReport {
            resource_name: resource.to_string(),
            sampled: sample.len(),
            consistent: inconsistencies.is_empty(),
            inconsistencies,
            checked_at: Utc::now(),
        })
    }
}
