//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const VALID_DEFINITION: &str = r#"
schema: scout/dashboard@0.1
id: sales-overview
zones:
  - id: revenue-kpi
    type: kpi
    config:
      title: Revenue
  - id: trend-chart
    type: chart
parameters:
  - name: year
    value: 2025
"#;

fn scout() -> Command {
    Command::cargo_bin("scout").expect("binary builds")
}

#[test]
fn validate_accepts_valid_definition() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sales.scout.yaml");
    fs::write(&path, VALID_DEFINITION).unwrap();

    scout()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Zones: 2"))
        .stdout(predicate::str::contains("revenue-kpi"));
}

#[test]
fn validate_rejects_wrong_schema() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.scout.yaml");
    fs::write(
        &path,
        VALID_DEFINITION.replace("scout/dashboard@0.1", "scout/dashboard@2.0"),
    )
    .unwrap();

    scout()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("SCOUT-043"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn validate_rejects_duplicate_zone_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dup.scout.yaml");
    fs::write(
        &path,
        VALID_DEFINITION.replace("trend-chart", "revenue-kpi"),
    )
    .unwrap();

    scout()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate zone id"));
}

#[test]
fn validate_missing_file_fails() {
    scout()
        .arg("validate")
        .arg("/nonexistent/void.scout.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn run_with_mock_source_refreshes_all_zones() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sales.scout.yaml");
    fs::write(&path, VALID_DEFINITION).unwrap();

    scout()
        .arg("run")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Refreshed 2/2 zones"))
        .stdout(predicate::str::contains("revenue-kpi"))
        .stdout(predicate::str::contains("ready"));
}

#[test]
fn run_with_unknown_source_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sales.scout.yaml");
    fs::write(&path, VALID_DEFINITION).unwrap();

    scout()
        .arg("run")
        .arg(&path)
        .args(["--source", "postgres"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SCOUT-040"));
}

#[test]
fn run_with_http_source_requires_base_url() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sales.scout.yaml");
    fs::write(&path, VALID_DEFINITION).unwrap();

    scout()
        .arg("run")
        .arg(&path)
        .args(["--source", "http"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("base-url"));
}

#[test]
fn record_then_replay_roundtrip() {
    let dir = tempdir().unwrap();
    let definition = dir.path().join("sales.scout.yaml");
    let recording = dir.path().join("events.json");
    fs::write(&definition, VALID_DEFINITION).unwrap();

    scout()
        .arg("run")
        .arg(&definition)
        .arg("--record")
        .arg(&recording)
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded"));

    assert!(recording.exists());

    scout()
        .arg("replay")
        .arg(&recording)
        .args(["--speed", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("zone:added"))
        .stdout(predicate::str::contains("Replayed"));
}

#[test]
fn replay_rejects_non_positive_speed() {
    let dir = tempdir().unwrap();
    let recording = dir.path().join("events.json");
    fs::write(&recording, "[]").unwrap();

    scout()
        .arg("replay")
        .arg(&recording)
        .args(["--speed", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SCOUT-042"));
}
