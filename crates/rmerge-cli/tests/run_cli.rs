//! Integration tests for `rmerge run`.
//!
//! These tests validate:
//! - Explicit golden + fragment analysis
//! - Scan-driven runs and their idempotence
//! - Dry-run leaving the disk untouched
//! - Argument errors

mod common;

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

use common::{create_source_tree, rmerge_cmd};

#[test]
fn test_run_explicit_fragment() {
    let temp = TempDir::new().expect("create temp dir");
    let src = create_source_tree(temp.path());
    let ws = temp.path().join("merged");

    rmerge_cmd(temp.path())
        .arg("run")
        .arg("--workspace")
        .arg(&ws)
        .arg("--golden")
        .arg(src.join("proj-golden"))
        .arg("--fragment")
        .arg(src.join("fragment-alpha"))
        .assert()
        .success()
        .stdout(predicate::str::contains("WORKSPACE acme-widget"))
        .stdout(predicate::str::contains("non-git"))
        .stdout(predicate::str::contains("added:1 (notes.txt)"))
        .stdout(predicate::str::contains("[ok] Analysis complete for 1 workspace"));

    let root = ws.join("acme-widget");
    assert!(root.join("golden/README.md").is_file());
    assert!(root.join("fragments_manifest.json").is_file());
    assert!(root.join("analysis.json").is_file());
    let report = fs::read_to_string(root.join("report.md")).expect("read report");
    assert!(report.starts_with("# Repo Merger Report"));
}

#[test]
fn test_run_json_output() {
    let temp = TempDir::new().expect("create temp dir");
    let src = create_source_tree(temp.path());

    let output = rmerge_cmd(temp.path())
        .arg("run")
        .arg("--workspace")
        .arg(temp.path().join("merged"))
        .arg("--golden")
        .arg(src.join("proj-golden"))
        .arg("--fragment")
        .arg(src.join("fragment-alpha"))
        .args(["--identifier", "demo", "--json"])
        .output()
        .expect("run rmerge");
    assert!(output.status.success());

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(summary["mode"], "analyze");
    assert_eq!(summary["workspaces"][0]["identifier"], "demo");
    assert_eq!(summary["workspaces"][0]["golden_status"], "installed");
    assert_eq!(summary["workspaces"][0]["analyses"][0]["status"], "non-git");
}

#[test]
fn test_run_scan_is_idempotent() {
    let temp = TempDir::new().expect("create temp dir");
    let src = create_source_tree(temp.path());
    let ws = temp.path().join("merged");

    let scan_run = || {
        let mut cmd = rmerge_cmd(temp.path());
        cmd.arg("run")
            .arg("--workspace")
            .arg(&ws)
            .arg("--scan")
            .arg("--scan-source")
            .arg(&src);
        cmd
    };

    scan_run()
        .assert()
        .success()
        .stdout(predicate::str::contains("ingested"))
        .stdout(predicate::str::contains("Scan: 1 golden, 1 pending, 1 ingested"));
    assert!(ws.join("acme-widget/scan_manifest.json").is_file());
    assert!(ws.join("acme-widget/scan_report.json").is_file());

    scan_run()
        .assert()
        .success()
        .stdout(predicate::str::contains("existing"))
        .stdout(predicate::str::contains("Scan: 1 golden, 0 pending, 0 ingested"));
}

#[test]
fn test_run_dry_run_writes_nothing() {
    let temp = TempDir::new().expect("create temp dir");
    let src = create_source_tree(temp.path());
    let ws = temp.path().join("merged");

    rmerge_cmd(temp.path())
        .arg("run")
        .arg("--workspace")
        .arg(&ws)
        .arg("--golden")
        .arg(src.join("proj-golden"))
        .arg("--fragment")
        .arg(src.join("fragment-alpha"))
        .args(["--mode", "merge", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run: no changes were written."));

    assert!(!ws.exists());
}

#[test]
fn test_run_without_golden_fails() {
    let temp = TempDir::new().expect("create temp dir");

    rmerge_cmd(temp.path())
        .arg("run")
        .arg("--workspace")
        .arg(temp.path().join("merged"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("[err]"))
        .stderr(predicate::str::contains("--golden is required"));
}

#[test]
fn test_run_without_workspace_fails() {
    let temp = TempDir::new().expect("create temp dir");
    let src = create_source_tree(temp.path());

    rmerge_cmd(temp.path())
        .arg("run")
        .arg("--golden")
        .arg(src.join("proj-golden"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--workspace is required"));
}

#[test]
fn test_run_workspace_from_config() {
    let temp = TempDir::new().expect("create temp dir");
    let src = create_source_tree(temp.path());
    let ws = temp.path().join("from-config");
    fs::write(
        temp.path().join("config.yaml"),
        format!("workspace:\n  root: {}\n", ws.display()),
    )
    .expect("write config");

    rmerge_cmd(temp.path())
        .arg("run")
        .arg("--golden")
        .arg(src.join("proj-golden"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No fragments to inspect."));

    assert!(ws.join("acme-widget/golden").is_dir());
}

#[test]
fn test_run_scan_missing_source() {
    let temp = TempDir::new().expect("create temp dir");

    rmerge_cmd(temp.path())
        .arg("run")
        .arg("--workspace")
        .arg(temp.path().join("merged"))
        .arg("--scan")
        .arg("--scan-source")
        .arg(temp.path().join("absent"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("[err]"));
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = TempDir::new().expect("create temp dir");
    fs::write(temp.path().join("config.yaml"), "scan:\n  golden_pattern: \"[\"\n")
        .expect("write config");

    rmerge_cmd(temp.path())
        .arg("scenarios")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to initialize rmerge engine"));
}
