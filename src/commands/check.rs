// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Consistency audit command

use crate::cache::CacheStore;
use crate::coordinator::SyncRegistry;
use crate::models::SyncConfig;
use crate::remote::FileRemote;
use anyhow::Result;
use colored::*;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style as TableStyle, Table, Tabled};

#[derive(Tabled)]
struct DriftRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Server")]
    server: String,
    #[tabled(rename = "Cached")]
    cached: String,
}

/// Run one sync cycle to populate the cache, then audit a sample of remote
/// records against it.
pub async fn check(remote_dir: &Path, resource: &str, key: &str, sample: usize) -> Result<()> {
    let cache = Arc::new(CacheStore::new());
    let remote = Arc::new(FileRemote::new(remote_dir).with_primary_key(key));
    let registry = Arc::new(SyncRegistry::new(cache, remote));
    registry.init_sync(SyncConfig::new(resource, key))?;

    println!(
        "\n{} Consistency check for '{}'",
        "[*]".blue().bold(),
        resource.cyan()
    );
    println!("{}", "=".repeat(60));

    registry.perform_sync(resource).await?;
    let report = registry.perform_consistency_check(resource, sample).await?;

    println!("   {} Sampled: {}", "[*]".blue(), report.sampled);
    if report.consistent {
        println!("{} Cache is consistent with the remote", "[+]".green().bold());
    } else {
        println!(
            "{} {} of {} sampled records diverged",
            "[X]".red().bold(),
            report.inconsistencies.len(),
            report.sampled
        );
        let rows: Vec<DriftRow> = report
            .inconsistencies
            .iter()
            .map(|inc| DriftRow {
                id: inc.id.clone(),
                server: inc.server_data.to_string(),
                cached: inc
                    .cached_data
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "(missing)".to_string()),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(TableStyle::rounded());
        println!("{}", table);
    }
    Ok(())
}
