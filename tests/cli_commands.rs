use assert_cmd::prelude::*;
use serde_json::Value;
use std::process::Command;
use tempfile::TempDir;

fn roamdeck(config_dir: &TempDir) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("roamdeck");
    let mut cmd = Command::new(bin);
    cmd.env_remove("ROAMDECK_ACTION_TIMEOUT_MS")
        .env_remove("ROAMDECK_MAX_ROAMERS")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config_dir.path().join("roamdeck.yaml"));
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output")
}

#[test]
fn config_set_then_get_round_trips_through_the_file() {
    let dir = TempDir::new().unwrap();

    let path = stdout_of(roamdeck(&dir).args(["config", "path"]));
    assert!(path.trim().ends_with("roamdeck.yaml"));

    roamdeck(&dir)
        .args(["config", "set", "session.max_roamers", "3"])
        .assert()
        .success();
    assert!(dir.path().join("roamdeck.yaml").exists());

    let value = stdout_of(roamdeck(&dir).args(["config", "get", "session.max_roamers"]));
    assert_eq!(value.trim(), "3");

    let shown = stdout_of(roamdeck(&dir).args(["config", "show"]));
    assert!(shown.contains("max_roamers: 3"));
    assert!(shown.contains("action_ms: 1000"));

    roamdeck(&dir).args(["config", "reset"]).assert().success();
    let value = stdout_of(roamdeck(&dir).args(["config", "get", "session.max_roamers"]));
    assert_eq!(value.trim(), "6");
}

#[test]
fn config_rejects_unknown_keys_and_bad_values() {
    let dir = TempDir::new().unwrap();
    roamdeck(&dir)
        .args(["config", "set", "session.stage_size", "3"])
        .assert()
        .failure();
    roamdeck(&dir)
        .args(["config", "set", "session.max_roamers", "many"])
        .assert()
        .failure();
    roamdeck(&dir)
        .args(["config", "get", "handler.nothing"])
        .assert()
        .failure();
}

#[test]
fn invalid_env_override_fails_fast() {
    let dir = TempDir::new().unwrap();
    roamdeck(&dir)
        .env("ROAMDECK_MAX_ROAMERS", "plenty")
        .arg("info")
        .assert()
        .failure();
}

#[test]
fn info_reports_effective_configuration() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(
        roamdeck(&dir)
            .env("ROAMDECK_ACTION_TIMEOUT_MS", "2500")
            .arg("info"),
    );
    assert!(out.contains("Roamdeck System Information"));
    assert!(out.contains("Statement length: 7:30"));
    assert!(out.contains("Action timeout: 2s 500ms"));
    assert!(out.contains("not found, defaults"));
}

#[test]
fn simulate_runs_a_full_statement() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(roamdeck(&dir).args([
        "simulate",
        "--output",
        "json",
        "--callers",
        "5",
        "--seated",
        "1",
        "--max-roamers",
        "3",
        "--seed",
        "9",
        "--latency",
        "2ms",
    ]));
    let summary: Value = serde_json::from_str(&out).expect("valid json");

    assert_eq!(summary["on_stage"].as_array().unwrap().len(), 3);
    let reports = summary["reports"].as_array().unwrap();
    // Two seats filled, two callers declined, then three hang-ups.
    assert_eq!(reports.len(), 7);
    assert!(reports.iter().all(|report| report["ok"] == true));
    assert_eq!(summary["counters"]["ok"], 7);
    assert_eq!(summary["counters"]["failed"], 0);
    assert!(summary["status"]
        .as_str()
        .unwrap()
        .starts_with("Finished statement: "));
    assert_eq!(summary["leaderboard"].as_array().unwrap().len(), 5);
}
