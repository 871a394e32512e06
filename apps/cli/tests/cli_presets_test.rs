//! Integration tests for the `affinity presets` command.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_presets_lists_families() {
    let mut cmd = Command::cargo_bin("affinity").unwrap();
    cmd.arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("weave_regression"))
        .stdout(predicate::str::contains("linear backend"));
}

#[test]
fn test_presets_json() {
    let mut cmd = Command::cargo_bin("affinity").unwrap();
    let output = cmd.arg("presets").arg("--json").assert().success().get_output().stdout.clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["weave"]["batch_size"], 230);
    assert_eq!(parsed["linear_regression"]["seed"], 123);
}

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("affinity").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("presets"));
}
