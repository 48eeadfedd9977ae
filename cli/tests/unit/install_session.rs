//! Install sequencing through the public `install_all` / `verify_all` API.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use blackberets_cli::application::services::module_installer::{
    CancelFlag, InstallContext, install_all, verify_all,
};
use blackberets_cli::domain::module::{
    AbortReason, ActionSpec, Artifact, Module, ModuleStatus, SessionReport, SessionStatus,
};

use crate::helpers::{Downloads, Events, Reply, ScriptRunner};

fn module(name: &str) -> Module {
    Module::new(name, ActionSpec::new(format!("install-{name}"), Vec::<String>::new()))
}

fn artifact(file: &str) -> Artifact {
    Artifact {
        url: format!("https://mirror.test/{file}"),
        file_name: file.into(),
        sha256: None,
    }
}

async fn install(runner: &ScriptRunner, modules: &[Module]) -> (SessionReport, Events) {
    install_with(runner, modules, &CancelFlag::new(), &Downloads::default()).await
}

async fn install_with(
    runner: &ScriptRunner,
    modules: &[Module],
    cancel: &CancelFlag,
    fetcher: &Downloads,
) -> (SessionReport, Events) {
    let events = Events::default();
    let ctx = InstallContext { workdir: Path::new("/tmp/session"), cancel, fetcher };
    let report = install_all(runner, &events, modules, &ctx).await;
    (report, events)
}

#[tokio::test]
async fn required_failure_skips_dependents_and_the_rest() {
    let runner = ScriptRunner::succeeding().on("install-b", Reply::Fail("disk full"));
    let modules = vec![module("a"), module("b").depends_on("a"), module("c").optional()];

    let (report, _) = install(&runner, &modules).await;

    assert_eq!(report.status_of("a"), Some(ModuleStatus::Installed));
    assert_eq!(report.status_of("b"), Some(ModuleStatus::Failed));
    assert_eq!(report.status_of("c"), Some(ModuleStatus::Skipped));
    assert_eq!(report.modules.len(), 3);
    assert_eq!(runner.called("install-c"), 0);
    assert!(matches!(
        &report.abort,
        Some(AbortReason::RequiredModuleFailed { module, output }) if module == "b" && output.contains("disk full")
    ));
    assert_eq!(report.status(), SessionStatus::Failed);
    assert_eq!(report.status().exit_code(), 1);
}

#[tokio::test]
async fn optional_failure_continues_to_later_modules() {
    let runner = ScriptRunner::succeeding().on("install-tools", Reply::Fail("mirror down"));
    let modules = vec![module("base"), module("tools").optional(), module("ai")];

    let (report, events) = install(&runner, &modules).await;

    assert!(report.abort.is_none());
    assert_eq!(report.status_of("tools"), Some(ModuleStatus::Failed));
    assert_eq!(report.status_of("ai"), Some(ModuleStatus::Installed));
    assert_eq!(report.status(), SessionStatus::PartialSuccess);
    assert_eq!(report.status().exit_code(), 0);
    assert!(events.warnings().iter().any(|w| w.contains("tools")));
}

#[tokio::test]
async fn installed_check_makes_reruns_idempotent() {
    let runner = ScriptRunner::succeeding();
    let modules = vec![
        module("a").installed_when(ActionSpec::new("check-a", Vec::<String>::new())),
    ];

    let (first, _) = install(&runner, &modules).await;
    let (second, _) = install(&runner, &modules).await;

    assert_eq!(first, second);
    assert_eq!(runner.called("install-a"), 0);
    assert_eq!(runner.called("check-a"), 2);
}

#[tokio::test]
async fn missing_program_counts_as_module_failure() {
    let runner = ScriptRunner::succeeding().on("install-a", Reply::Missing);

    let (report, _) = install(&runner, &[module("a")]).await;

    assert_eq!(report.status_of("a"), Some(ModuleStatus::Failed));
    assert_eq!(report.status(), SessionStatus::Failed);
}

#[tokio::test]
async fn failing_verify_degrades_to_warning() {
    let runner = ScriptRunner::succeeding().on("verify-a", Reply::Fail("bad checksum"));
    let modules = vec![module("a").verify_with(ActionSpec::new("verify-a", Vec::<String>::new()))];

    let (report, _) = install(&runner, &modules).await;

    assert_eq!(report.status_of("a"), Some(ModuleStatus::InstalledWithWarnings));
    assert!(report.modules[0].detail.contains("bad checksum"));
    assert_eq!(report.status(), SessionStatus::PartialSuccess);
}

#[tokio::test]
async fn optional_dependent_of_failed_optional_is_skipped_with_reason() {
    let runner = ScriptRunner::succeeding().on("install-model", Reply::Fail(""));
    let modules = vec![
        module("model").optional(),
        module("tuning").optional().depends_on("model"),
    ];

    let (report, _) = install(&runner, &modules).await;

    assert!(report.abort.is_none());
    assert_eq!(report.status_of("tuning"), Some(ModuleStatus::Skipped));
    assert!(report.modules[1].detail.contains("model"));
    assert_eq!(runner.called("install-tuning"), 0);
}

#[tokio::test]
async fn cancellation_before_start_runs_nothing() {
    let runner = ScriptRunner::succeeding();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let (report, _) = install_with(&runner, &[module("a"), module("b")], &cancel, &Downloads::default()).await;

    assert_eq!(report.abort, Some(AbortReason::Cancelled));
    assert!(runner.calls().is_empty());
    assert!(report.modules.iter().all(|r| r.status == ModuleStatus::Skipped));
}

#[tokio::test]
async fn failed_download_fails_module_without_running_it() {
    let runner = ScriptRunner::succeeding();
    let downloads = Downloads::failing(&["local-ai"]);
    let modules = [module("a").optional().with_artifact(artifact("local-ai"))];

    let (report, _) = install_with(&runner, &modules, &CancelFlag::new(), &downloads).await;

    assert_eq!(report.status_of("a"), Some(ModuleStatus::Failed));
    assert!(report.modules[0].detail.starts_with("download of https://mirror.test/local-ai failed"));
    assert_eq!(runner.called("install-a"), 0);
}

#[tokio::test]
async fn required_failure_leaves_later_artifacts_undownloaded() {
    let runner = ScriptRunner::succeeding().on("install-nix", Reply::Fail("curl: (6)"));
    let downloads = Downloads::default();
    let modules = [
        module("nix").with_artifact(artifact("nix-install.sh")),
        module("model").optional().depends_on("nix").with_artifact(artifact("model.gguf")),
    ];

    let (report, _) = install_with(&runner, &modules, &CancelFlag::new(), &downloads).await;

    assert_eq!(report.status(), SessionStatus::Failed);
    assert_eq!(downloads.fetched(), vec!["nix-install.sh".to_string()]);
}

#[tokio::test]
async fn duplicate_names_abort_as_invalid_plan() {
    let runner = ScriptRunner::succeeding();

    let (report, _) = install(&runner, &[module("a"), module("a")]).await;

    assert!(matches!(report.abort, Some(AbortReason::InvalidPlan { .. })));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn verify_all_separates_required_and_optional_failures() {
    let runner = ScriptRunner::failing();
    let modules = vec![
        module("core").verify_with(ActionSpec::new("verify-core", Vec::<String>::new())),
        module("extra")
            .optional()
            .installed_when(ActionSpec::new("check-extra", Vec::<String>::new())),
        module("plain"),
    ];
    let events = Events::default();

    let report = verify_all(&runner, &events, &modules, Path::new("/tmp")).await;

    assert_eq!(report.modules.len(), 2, "modules without checks are not verified");
    let failures = report.required_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "core");
    let tally = report.tally();
    assert_eq!((tally.failed, tally.warned), (1, 1));
    assert_eq!(runner.called("install-"), 0);
}
