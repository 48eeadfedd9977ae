//! Integration tests for the CLI surface: help, version and argument parsing.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn blackberets() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("blackberets"));
    cmd.env("NO_COLOR", "1");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    blackberets().assert().code(2).stderr(predicate::str::contains(
        "Install and operate the Black Berets security bundle",
    ));
}

#[test]
fn test_cli_help_flag_shows_help() {
    blackberets()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    blackberets()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blackberets"));
}

#[test]
fn test_version_command_shows_version() {
    blackberets()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blackberets 0.3.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let output = blackberets()
        .args(["version", "--json"])
        .output()
        .expect("run blackberets");
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(value["version"], "0.3.0");
}

#[test]
fn test_version_quiet_prints_nothing() {
    blackberets()
        .args(["version", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// --- Command hierarchy tests ---

#[test]
fn test_help_lists_every_command() {
    let output = blackberets().arg("--help").output().expect("run blackberets");
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for command in ["install", "configure", "start", "stop", "status", "test", "cleanup", "version"] {
        assert!(help.contains(command), "help is missing `{command}`:\n{help}");
    }
}

#[test]
fn test_start_help_shows_optional_service_argument() {
    blackberets()
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[SERVICE]"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    blackberets()
        .arg("deploy")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_global_flags_accepted_after_subcommand() {
    blackberets()
        .args(["version", "--no-color", "-v"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blackberets"));
}

#[test]
fn test_no_color_env_accepts_any_value() {
    for value in ["1", "true", "yes", "0", ""] {
        Command::new(assert_cmd::cargo::cargo_bin!("blackberets"))
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("blackberets 0.3.0"));
    }
}

#[test]
fn test_no_color_flag_and_env_together() {
    blackberets().args(["--no-color", "version", "--json"]).assert().success();
}
