// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! cachesync - Main entry point
//!
//! A CLI driving the sync engine against a JSON-file system of record.

use anyhow::Result;
use cachesync::cli::{Cli, Commands};
use cachesync::commands;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // ====================================================================
        // Sync Commands
        // ====================================================================
        Commands::Sync {
            resource,
            key,
            strategy,
            changes,
        } => {
            commands::sync_once(
                &cli.remote_dir,
                &resource,
                &key,
                strategy.into(),
                changes.as_deref(),
            )
            .await
        }
        Commands::Watch {
            resource,
            key,
            strategy,
            interval_ms,
        } => commands::watch(&cli.remote_dir, &resource, &key, strategy.into(), interval_ms).await,

        // ====================================================================
        // Inspection Commands
        // ====================================================================
        Commands::Status { resource } => commands::status(&cli.remote_dir, resource.as_deref()).await,
        Commands::Check {
            resource,
            key,
            sample,
        } => commands::check(&cli.remote_dir, &resource, &key, sample).await,
        Commands::Resources => commands::list_resources(&cli.remote_dir),
    }
}
