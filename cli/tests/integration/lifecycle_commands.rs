//! End-to-end runs of configure, status, start, stop, test and cleanup against a
//! scratch home. Every path the binary touches lives under the tempdir, apart
//! from the host-wide session lock.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

struct Sandbox {
    home: TempDir,
    config: PathBuf,
}

impl Sandbox {
    /// A bundle with every path under a fresh home and the package tools off.
    fn new(extra_yaml: &str) -> Self {
        let home = TempDir::new().expect("tempdir");
        let root = home.path().display().to_string();
        let config = home.path().join("bundle.yaml");
        let yaml = format!(
            "install:\n  prefix: {root}/bundle\n  stateDir: {root}/state\n  cacheDir: {root}/cache\n\
             tools:\n  enabled: false\n{extra_yaml}"
        );
        std::fs::write(&config, yaml).expect("write config");
        Self { home, config }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.home.path().join(rel)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("blackberets"));
        cmd.env("NO_COLOR", "1")
            .env("HOME", self.home.path())
            .env("XDG_CACHE_HOME", self.path("xdg-cache"))
            .env_remove("BLACKBERETS_CONFIG")
            .current_dir(self.home.path())
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn json(&self, args: &[&str]) -> (i32, Value) {
        let output = self.cmd().args(args).arg("--json").output().expect("run blackberets");
        let value = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
            panic!(
                "stdout is not JSON ({e}): {}",
                String::from_utf8_lossy(&output.stdout)
            )
        });
        (output.status.code().unwrap_or(-1), value)
    }
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[test]
fn configure_writes_files_into_config_dir() {
    let sandbox = Sandbox::new("ai:\n  localAI:\n    defaultPort: 9191\n");

    let (code, value) = sandbox.json(&["configure"]);

    assert_eq!(code, 0);
    let written = value["written"].as_array().expect("written list");
    assert_eq!(written.len(), 2);
    let mcp = std::fs::read_to_string(sandbox.path("bundle/localai-config/mcp.json")).unwrap();
    assert!(mcp.contains("http://127.0.0.1:9191/v1"));
    assert!(exists(&sandbox.path("bundle/localai-config/localai.yaml")));
}

#[test]
fn configure_human_output_names_each_file() {
    let sandbox = Sandbox::new("mcp:\n  enabled: false\n");

    sandbox
        .cmd()
        .arg("configure")
        .assert()
        .success()
        .stdout(predicate::str::contains("localai.yaml"))
        .stdout(predicate::str::contains("mcp.json").not());
}

#[test]
fn status_with_no_services_reports_empty_state() {
    let sandbox = Sandbox::new("ai:\n  localAI:\n    enabled: false\nmcp:\n  enabled: false\n");

    let (code, value) = sandbox.json(&["status"]);

    assert_eq!(code, 0);
    assert_eq!(value["services"], Value::Array(Vec::new()));
    assert!(value["last_session"].is_null());
}

#[test]
fn status_shows_recorded_session() {
    let sandbox = Sandbox::new("ai:\n  localAI:\n    enabled: false\nmcp:\n  enabled: false\n");
    std::fs::create_dir_all(sandbox.path("state")).unwrap();
    std::fs::write(
        sandbox.path("state/last-session.json"),
        r#"{"finished_at":"2026-01-05T10:00:00Z","state":"completed","report":{"modules":[{"name":"package-manager","required":true,"status":"installed"}]}}"#,
    )
    .unwrap();

    let (code, value) = sandbox.json(&["status"]);

    assert_eq!(code, 0);
    assert_eq!(value["last_session"]["state"], "completed");
    assert_eq!(value["last_session"]["report"]["modules"][0]["name"], "package-manager");
}

#[test]
fn start_unknown_service_is_json_error() {
    let sandbox = Sandbox::new("");

    let (code, value) = sandbox.json(&["start", "nosuch"]);

    assert_eq!(code, 1);
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "UNKNOWN_SERVICE");
    assert!(value["message"].as_str().unwrap_or_default().contains("localai, mcp"));
}

#[test]
fn stop_disabled_service_is_unknown() {
    let sandbox = Sandbox::new("mcp:\n  enabled: false\n");

    sandbox
        .cmd()
        .args(["stop", "mcp"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("mcp"));
}

#[test]
fn start_without_installed_binary_fails_per_service() {
    let sandbox = Sandbox::new(
        "ai:\n  localAI:\n    defaultPort: 1\nmcp:\n  enabled: false\n",
    );
    let output = sandbox
        .cmd()
        .env("PATH", sandbox.path("empty-path"))
        .args(["start", "localai", "--json"])
        .output()
        .expect("run blackberets");

    assert_eq!(output.status.code(), Some(1));
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let entry = &value["started"][0];
    assert_eq!(entry["service"], "localai");
    assert_eq!(entry["ok"], false);
}

#[test]
fn cleanup_removes_user_owned_install_and_repeats_cleanly() {
    let sandbox = Sandbox::new("mcp:\n  enabled: false\n");
    sandbox.json(&["configure"]);
    std::fs::create_dir_all(sandbox.path("bundle/bin")).unwrap();
    std::fs::write(sandbox.path("bundle/bin/local-ai"), "binary").unwrap();
    std::fs::create_dir_all(sandbox.path("state/logs")).unwrap();
    std::fs::write(sandbox.path("state/logs/localai.log"), "log").unwrap();

    let (code, value) = sandbox.json(&["cleanup", "--yes"]);

    assert_eq!(code, 0, "{value}");
    assert!(value["critical_failure"].is_null());
    assert!(!exists(&sandbox.path("bundle/bin/local-ai")));
    assert!(!exists(&sandbox.path("bundle/localai-config")));
    assert!(!exists(&sandbox.path("state/logs")));

    let (again, _) = sandbox.json(&["cleanup", "--yes"]);
    assert_eq!(again, 0);
}

#[test]
fn test_reports_localai_health_without_failing_on_it() {
    let sandbox = Sandbox::new("ai:\n  localAI:\n    defaultPort: 1\nmcp:\n  enabled: false\n");
    let output = sandbox
        .cmd()
        .env("PATH", sandbox.path("empty-path"))
        .args(["test", "--json"])
        .output()
        .expect("run blackberets");

    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let health = value["health"].as_array().expect("health checks");
    let names: Vec<&str> = health.iter().filter_map(|h| h["name"].as_str()).collect();
    assert_eq!(names, ["localai-model-file", "localai-api"]);
    assert!(health.iter().all(|h| h["required"] == false && h["passed"] == false));
    assert!(health[0]["detail"].as_str().unwrap().contains("bundle/models"));
}
