// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Sync commands: one-shot cycles and the foreground watch loop

use crate::cache::CacheStore;
use crate::coordinator::SyncRegistry;
use crate::models::{ChangeOperation, ConflictStrategy, SyncConfig};
use crate::remote::FileRemote;
use anyhow::{Context, Result};
use colored::*;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style as TableStyle, Table, Tabled};

/// One entry of a `--changes` file
#[derive(Debug, Deserialize)]
struct ChangeFileEntry {
    operation: ChangeOperation,
    data: serde_json::Value,
}

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Local")]
    local: String,
    #[tabled(rename = "Remote")]
    remote: String,
}

fn build_registry(
    remote_dir: &Path,
    resource: &str,
    key: &str,
    strategy: ConflictStrategy,
    poll_interval_ms: u64,
) -> Result<Arc<SyncRegistry>> {
    let cache = Arc::new(CacheStore::new());
    let remote = Arc::new(FileRemote::new(remote_dir).with_primary_key(key));
    let registry = Arc::new(SyncRegistry::new(cache, remote));
    registry.init_sync(
        SyncConfig::new(resource, key)
            .with_strategy(strategy)
            .with_poll_interval_ms(poll_interval_ms),
    )?;
    Ok(registry)
}

fn queue_changes_from_file(registry: &SyncRegistry, resource: &str, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read changes file {}", path.display()))?;
    let entries: Vec<ChangeFileEntry> =
        serde_json::from_str(&content).context("Changes file must be a JSON array")?;
    let count = entries.len();
    for entry in entries {
        registry.queue_local_change(resource, entry.operation, entry.data)?;
    }
    Ok(count)
}

fn truncate(value: &serde_json::Value, max: usize) -> String {
    let mut s = value.to_string();
    if s.len() > max {
        s.truncate(max.saturating_sub(3));
        s.push_str("...");
    }
    s
}

fn print_cycle_summary(registry: &SyncRegistry, resource: &str) {
    let Some(state) = registry.get_sync_status(resource) else {
        return;
    };
    println!("   {} Status: {:?}", "[*]".blue(), state.status);
    if let Some(ts) = state.last_sync {
        println!("   {} Last sync: {}", "[*]".blue(), ts.to_rfc3339());
    }
    println!(
        "   {} Pending changes: {}",
        "[*]".blue(),
        state.pending_changes.len()
    );

    if state.conflicts.is_empty() {
        println!("   {} No conflicts", "[+]".green());
    } else {
        println!(
            "\n{} {} conflict(s) detected and resolved:",
            "[!]".yellow().bold(),
            state.conflicts.len()
        );
        let rows: Vec<ConflictRow> = state
            .conflicts
            .iter()
            .map(|c| ConflictRow {
                entity: c.entity_id.clone(),
                kind: format!("{:?}", c.kind),
                local: truncate(&c.local_data, 40),
                remote: truncate(&c.remote_data, 40),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(TableStyle::rounded());
        println!("{}", table);
    }

    let stats = registry.cache().stats();
    println!(
        "   {} Cache: {} entries, {:.0}% hit rate",
        "[*]".blue(),
        stats.size,
        stats.hit_rate() * 100.0
    );
}

/// Run one reconciliation cycle for a resource against a file remote
pub async fn sync_once(
    remote_dir: &Path,
    resource: &str,
    key: &str,
    strategy: ConflictStrategy,
    changes: Option<&Path>,
) -> Result<()> {
    let registry = build_registry(remote_dir, resource, key, strategy, 0)?;

    if let Some(path) = changes {
        let queued = queue_changes_from_file(&registry, resource, path)?;
        println!("{} Queued {} local change(s)", "[*]".blue(), queued);
    }

    println!("\n{} Syncing '{}'", "[*]".blue().bold(), resource.cyan());
    println!("{}", "=".repeat(60));
    match registry.perform_sync(resource).await {
        Ok(()) => {
            println!("{} Cycle complete", "[+]".green().bold());
            print_cycle_summary(&registry, resource);
            Ok(())
        }
        Err(e) => {
            println!("{} Cycle failed: {}", "[X]".red().bold(), e);
            print_cycle_summary(&registry, resource);
            Err(e.into())
        }
    }
}

/// Run the periodic sync timer in the foreground until Ctrl-C
pub async fn watch(
    remote_dir: &Path,
    resource: &str,
    key: &str,
    strategy: ConflictStrategy,
    interval_ms: u64,
) -> Result<()> {
    let registry = build_registry(remote_dir, resource, key, strategy, interval_ms)?;

    println!(
        "\n{} Watching '{}' every {} ms (Ctrl-C to stop)",
        "[*]".blue().bold(),
        resource.cyan(),
        interval_ms
    );
    println!("{}", "=".repeat(60));

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if let Some(state) = registry.get_sync_status(resource) {
                    println!(
                        "{} {:?} | pending {} | conflicts {} | cache {} entries",
                        "[*]".blue(),
                        state.status,
                        state.pending_changes.len(),
                        state.conflicts.len(),
                        registry.cache().stats().size
                    );
                }
            }
        }
    }

    registry.stop_sync(resource);
    println!("\n{} Stopped", "[+]".green());
    Ok(())
}
