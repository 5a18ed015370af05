//! CLI smoke tests over a temporary file remote

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_orders(dir: &TempDir) {
    let records = serde_json::json!([
        {"id": "A1", "price": 10, "updated_at": "2026-01-01T00:00:00Z"},
        {"id": "A2", "price": 20, "updated_at": "2026-01-02T00:00:00Z"}
    ]);
    std::fs::write(
        dir.path().join("orders.json"),
        serde_json::to_string_pretty(&records).unwrap(),
    )
    .unwrap();
}

fn cachesync() -> Command {
    Command::cargo_bin("cachesync").unwrap()
}

#[test]
fn test_resources_lists_remote_files() {
    let dir = TempDir::new().unwrap();
    write_orders(&dir);

    cachesync()
        .args(["--remote-dir", dir.path().to_str().unwrap(), "resources"])
        .assert()
        .success()
        .stdout(predicate::str::contains("orders"));
}

#[test]
fn test_resources_empty_dir() {
    let dir = TempDir::new().unwrap();
    cachesync()
        .args(["--remote-dir", dir.path().to_str().unwrap(), "resources"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No resources"));
}

#[test]
fn test_sync_reports_cycle_complete() {
    let dir = TempDir::new().unwrap();
    write_orders(&dir);

    cachesync()
        .args(["--remote-dir", dir.path().to_str().unwrap(), "sync", "orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cycle complete"))
        .stdout(predicate::str::contains("No conflicts"));
}

#[test]
fn test_sync_with_changes_file_pushes_insert() {
    let dir = TempDir::new().unwrap();
    write_orders(&dir);
    let changes = dir.path().join("changes.json");
    std::fs::write(
        &changes,
        serde_json::json!([
            {"operation": "insert", "data": {"id": "B1", "price": 5}}
        ])
        .to_string(),
    )
    .unwrap();

    cachesync()
        .args([
            "--remote-dir",
            dir.path().to_str().unwrap(),
            "sync",
            "orders",
            "--changes",
            changes.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued 1 local change"));

    // The insert reached the file remote.
    let content = std::fs::read_to_string(dir.path().join("orders.json")).unwrap();
    assert!(content.contains("B1"));
}

#[test]
fn test_status_shows_record_table() {
    let dir = TempDir::new().unwrap();
    write_orders(&dir);

    cachesync()
        .args(["--remote-dir", dir.path().to_str().unwrap(), "status", "orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A1"))
        .stdout(predicate::str::contains("2 records"));
}

#[test]
fn test_check_reports_consistent() {
    let dir = TempDir::new().unwrap();
    write_orders(&dir);

    cachesync()
        .args(["--remote-dir", dir.path().to_str().unwrap(), "check", "orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("consistent with the remote"));
}
