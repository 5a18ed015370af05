// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! CLI argument definitions using clap derive macros

use crate::models::ConflictStrategy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cachesync - Sync a local cache against a JSON-file remote
#[derive(Parser)]
#[command(name = "cachesync")]
#[command(author = "Nervosys")]
#[command(version)]
#[command(about = "Sync a local cache against a JSON-file system of record", long_about = None)]
pub struct Cli {
    /// Directory holding one <resource>.json record array per resource
    #[arg(long, global = true, env = "CACHESYNC_REMOTE_DIR", default_value = "./remote")]
    pub remote_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ============================================================================
    // Sync Commands
    // ============================================================================
    /// Run one reconciliation cycle for a resource
    Sync {
        /// Resource name (maps to <remote-dir>/<resource>.json)
        resource: String,

        /// Primary key field in each record
        #[arg(long, default_value = "id")]
        key: String,

        /// Conflict resolution strategy
        #[arg(long, value_enum, default_value_t = StrategyArg::ServerWins)]
        strategy: StrategyArg,

        /// JSON file of local changes to queue before the cycle
        /// (array of {"operation": ..., "data": {...}})
        #[arg(long)]
        changes: Option<PathBuf>,
    },

    /// Run periodic sync in the foreground until interrupted
    Watch {
        /// Resource name
        resource: String,

        /// Primary key field in each record
        #[arg(long, default_value = "id")]
        key: String,

        /// Conflict resolution strategy
        #[arg(long, value_enum, default_value_t = StrategyArg::ServerWins)]
        strategy: StrategyArg,

        /// Sync timer period in milliseconds
        #[arg(long, default_value_t = 5000)]
        interval_ms: u64,
    },

    // ============================================================================
    // Inspection Commands
    // ============================================================================
    /// Show the remote's resources, or the records of one resource
    Status {
        /// Resource to inspect; omit for an overview of all resources
        resource: Option<String>,
    },

    /// Sync a resource, then audit cache/remote consistency
    Check {
        /// Resource name
        resource: String,

        /// Primary key field in each record
        #[arg(long, default_value = "id")]
        key: String,

        /// Number of most-recently-updated records to sample
        #[arg(long, default_value_t = 20)]
        sample: usize,
    },

    /// List resource files in the remote directory
    Resources,
}

/// CLI-facing conflict strategy. `ask_user` is excluded: it needs an
/// application-supplied resolution hook and has no sensible one-shot CLI
/// form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum StrategyArg {
    ServerWins,
    ClientWins,
    Merge,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::ServerWins => ConflictStrategy::ServerWins,
            StrategyArg::ClientWins => ConflictStrategy::ClientWins,
            StrategyArg::Merge => ConflictStrategy::Merge,
        }
    }
}
