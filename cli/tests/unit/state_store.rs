//! Host state under a scratch home: session records, locks, written config
//! files and teardown of a fully user-owned install.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use anyhow::Result;
use blackberets_cli::application::ports::{
    LockAttempt, LockProvider, ProcessTable, SessionLogStore, Signal,
};
use blackberets_cli::application::services::cleanup::{CleanupOptions, run_cleanup};
use blackberets_cli::application::services::configure::{
    LOCALAI_CONFIG_FILE, MCP_CONFIG_FILE, apply_configuration,
};
use blackberets_cli::domain::catalog::{self, BundleSettings};
use blackberets_cli::domain::cleanup::{StepOutcome, TeardownAction};
use blackberets_cli::domain::config::ConfigDocument;
use blackberets_cli::domain::module::{AbortReason, ActionSpec, Module, ModuleStatus, SessionReport};
use blackberets_cli::domain::session::{SessionLog, SessionState};
use blackberets_cli::infra::fs::HostFs;
use blackberets_cli::infra::lock::FileLocks;
use blackberets_cli::infra::state::StateManager;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use crate::helpers::{Events, Reply, ScriptRunner};

/// Nothing is running on this host.
struct IdleProcesses;

impl ProcessTable for IdleProcesses {
    async fn command_line(&self, _: u32) -> Result<Option<String>> {
        Ok(None)
    }
    async fn find_by_pattern(&self, _: &str) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }
    async fn is_alive(&self, _: u32) -> bool {
        false
    }
    async fn signal(&self, _: u32, _: Signal) -> Result<()> {
        Ok(())
    }
    async fn signal_matching(&self, _: &str, _: Signal) -> Result<bool> {
        Ok(false)
    }
}

fn home_settings(home: &Path, extra: serde_json::Value) -> BundleSettings {
    let mut doc = json!({
        "install": {
            "prefix": "~/bundle",
            "stateDir": "~/state",
            "cacheDir": "~/cache"
        }
    });
    if let (Some(base), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    BundleSettings::from_document(&ConfigDocument::new(doc), home, home)
}

#[tokio::test]
async fn failed_session_record_keeps_abort_reason() {
    let dir = TempDir::new().unwrap();
    let store = StateManager::with_path(dir.path().join("last-session.json"));
    let mut report = SessionReport::default();
    let module = Module::new("localai", ActionSpec::new("install", ["-D"]));
    report.record(&module, ModuleStatus::Failed, "checksum mismatch");
    report.abort = Some(AbortReason::RequiredModuleFailed {
        module: "localai".into(),
        output: "checksum mismatch".into(),
    });
    let log = SessionLog { finished_at: Utc::now(), state: SessionState::Failed, report };

    store.save_async(&log).await.expect("save");
    let loaded = store.load_async().await.expect("load").expect("record present");

    assert_eq!(loaded.state, SessionState::Failed);
    assert_eq!(loaded.report.abort, log.report.abort);
}

#[tokio::test]
async fn corrupt_session_record_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("last-session.json");
    std::fs::write(&path, "not json").unwrap();

    let err = StateManager::with_path(path).load_async().await.unwrap_err();

    assert!(format!("{err:#}").contains("parsing session record"));
}

#[test]
fn locks_on_different_services_are_independent() {
    let dir = TempDir::new().unwrap();
    let localai = FileLocks.try_acquire(&dir.path().join("localai.lock")).unwrap();
    let mcp = FileLocks.try_acquire(&dir.path().join("mcp.lock")).unwrap();

    assert!(matches!(localai, LockAttempt::Acquired(_)));
    assert!(matches!(mcp, LockAttempt::Acquired(_)));
}

#[test]
fn configure_writes_both_files_and_rewrites_on_rerun() {
    let home = TempDir::new().unwrap();
    let settings = home_settings(home.path(), json!({ "ai": { "localAI": { "defaultPort": 9090 } } }));

    let written = apply_configuration(&HostFs, &settings, &Events::default()).expect("apply");
    let again = apply_configuration(&HostFs, &settings, &Events::default()).expect("reapply");

    let dir = home.path().join("bundle/localai-config");
    assert_eq!(written, vec![dir.join(LOCALAI_CONFIG_FILE), dir.join(MCP_CONFIG_FILE)]);
    assert_eq!(written, again);
    let mcp = std::fs::read_to_string(dir.join(MCP_CONFIG_FILE)).unwrap();
    assert!(mcp.contains("http://127.0.0.1:9090/v1"));
    let yaml = std::fs::read_to_string(dir.join(LOCALAI_CONFIG_FILE)).unwrap();
    assert!(yaml.contains("llama-3-8b"));
}

#[tokio::test]
async fn user_owned_cleanup_removes_files_and_is_repeatable() {
    let home = TempDir::new().unwrap();
    let settings = home_settings(home.path(), json!({}));
    apply_configuration(&HostFs, &settings, &Events::default()).expect("apply");
    std::fs::create_dir_all(settings.logs_dir()).unwrap();
    std::fs::write(settings.logs_dir().join("localai.log"), "log").unwrap();
    std::fs::create_dir_all(settings.localai_binary().parent().unwrap()).unwrap();
    std::fs::write(settings.localai_binary(), "bin").unwrap();

    let plan = catalog::cleanup_plan(&settings);
    assert!(!plan.needs_privilege());
    assert!(!plan.shared_steps.iter().any(|s| s.action == TeardownAction::ConfirmPrivilege));

    let runner = ScriptRunner::succeeding().on("nix-env", Reply::Missing);
    let opts = CleanupOptions::new(&settings.prefix);
    let first = run_cleanup(&plan, &runner, &IdleProcesses, &HostFs, &Events::default(), &opts).await;

    assert_eq!(first.exit_code(), 0);
    assert!(!settings.localai_binary().exists());
    assert!(!settings.localai.config_dir.exists());
    assert!(!settings.logs_dir().exists());
    let tools = first
        .modules
        .steps
        .iter()
        .find(|s| s.owner == catalog::SECURITY_TOOLS)
        .expect("security tools step");
    assert!(matches!(tools.outcome, StepOutcome::Skipped(_)));

    let second = run_cleanup(&plan, &runner, &IdleProcesses, &HostFs, &Events::default(), &opts).await;
    assert_eq!(second.exit_code(), 0);
    assert_eq!(second.modules.tally().failed + second.shared.tally().failed, 0);
}
