// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Remote inspection commands

use crate::remote::{FileRemote, RemoteDataSource};
use anyhow::Result;
use colored::*;
use std::path::Path;
use tabled::{settings::Style as TableStyle, Table, Tabled};

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Records")]
    records: usize,
    #[tabled(rename = "Newest Update")]
    newest: String,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Updated At")]
    updated_at: String,
    #[tabled(rename = "Data")]
    data: String,
}

/// Overview of every resource, or the records of one resource
pub async fn status(remote_dir: &Path, resource: Option<&str>) -> Result<()> {
    let remote = FileRemote::new(remote_dir);

    match resource {
        Some(name) => {
            let records = remote.get_changes_since(name, None).await?;
            println!(
                "\n{} Resource '{}' ({} records)",
                "[*]".blue().bold(),
                name.cyan(),
                records.len()
            );
            if records.is_empty() {
                println!("{} No records found", "[i]".yellow());
                return Ok(());
            }
            let rows: Vec<RecordRow> = records
                .iter()
                .map(|r| {
                    let mut data = r.data.to_string();
                    if data.len() > 60 {
                        data.truncate(57);
                        data.push_str("...");
                    }
                    RecordRow {
                        id: r.id.clone(),
                        updated_at: r.updated_at.to_rfc3339(),
                        data,
                    }
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(TableStyle::rounded());
            println!("{}", table);
        }
        None => {
            let resources = remote.list_resources()?;
            if resources.is_empty() {
                println!(
                    "{} No resources in {}",
                    "[i]".yellow(),
                    remote_dir.display()
                );
                return Ok(());
            }
            let mut rows = Vec::new();
            for name in &resources {
                let records = remote.get_changes_since(name, None).await?;
                let newest = records
                    .last()
                    .map(|r| r.updated_at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                rows.push(ResourceRow {
                    resource: name.clone(),
                    records: records.len(),
                    newest,
                });
            }
            println!(
                "\n{} Remote {} ({} resources)",
                "[*]".blue().bold(),
                remote_dir.display(),
                resources.len()
            );
            let mut table = Table::new(rows);
            table.with(TableStyle::rounded());
            println!("{}", table);
        }
    }
    Ok(())
}

/// Bare list of resource names in the remote directory
pub fn list_resources(remote_dir: &Path) -> Result<()> {
    let remote = FileRemote::new(remote_dir);
    let resources = remote.list_resources()?;
    if resources.is_empty() {
        println!("{} No resources in {}", "[i]".yellow(), remote_dir.display());
    } else {
        for name in resources {
            println!("{}", name);
        }
    }
    Ok(())
}
