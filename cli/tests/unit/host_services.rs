//! Service status, start and stop against real processes and sockets.
//!
//! Linux only: these rely on `/proc`, `pgrep`, `kill`, `sleep`, `tail --pid`
//! and the whole 127.0.0.0/8 loopback range.

#![cfg(target_os = "linux")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use blackberets_cli::application::services::service_lifecycle::{
    LifecycleTimings, ServiceLifecycle,
};
use blackberets_cli::domain::service::{
    LaunchSpec, Service, ServiceStatus, StartOutcome, StartPolicy, StopOutcome,
};
use blackberets_cli::infra::command_runner::TokioCommandRunner;
use blackberets_cli::infra::locator::PathLocator;
use blackberets_cli::infra::lock::FileLocks;
use blackberets_cli::infra::process::{HostServices, ProbeChain};
use tempfile::TempDir;

fn timings() -> LifecycleTimings {
    LifecycleTimings {
        settle: Duration::from_millis(400),
        stop_grace: Duration::from_secs(5),
        kill_grace: Duration::from_secs(2),
        lock_wait: Duration::from_secs(1),
        poll: Duration::from_millis(50),
    }
}

fn service(name: &str, pattern: &str, launch: LaunchSpec) -> Service {
    Service {
        name: name.into(),
        port: None,
        bind_address: None,
        process_pattern: pattern.into(),
        start_policy: StartPolicy::Exclusive,
        launch,
    }
}

fn launch(dir: &Path, program: &str, args: &[&str], hold_stdin: bool) -> LaunchSpec {
    LaunchSpec {
        candidates: vec![program.into()],
        args: args.iter().map(|a| (*a).to_string()).collect(),
        log_file: dir.join("logs").join("service.log"),
        working_dir: None,
        hold_stdin,
    }
}

fn command_line(pid: u32) -> String {
    std::fs::read(format!("/proc/{pid}/cmdline"))
        .map(|raw| String::from_utf8_lossy(&raw).replace('\0', " "))
        .unwrap_or_default()
}

fn test_binary_name() -> String {
    let exe: PathBuf = std::env::current_exe().expect("current exe");
    exe.file_name().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn listener_on_non_default_loopback_address_is_running() {
    let probes = ProbeChain::detect();
    if probes.is_empty() {
        eprintln!("no ss, lsof or netstat on this host; skipping");
        return;
    }
    let listener = TcpListener::bind("127.0.0.2:0").expect("bind 127.0.0.2");
    let port = listener.local_addr().unwrap().port();
    let dir = TempDir::new().unwrap();
    let runner = TokioCommandRunner::default();
    let host = HostServices::new(&runner, probes);
    let mut svc = service("bridge", &test_binary_name(), launch(dir.path(), "true", &[], false));
    svc.port = Some(port);
    svc.bind_address = Some("127.0.0.2".into());

    let status = ServiceLifecycle::new(&host, &PathLocator, &FileLocks, dir.path().join("locks"))
        .status(&svc)
        .await
        .expect("status");

    assert_eq!(status, ServiceStatus::Running { pid: std::process::id() });
    drop(listener);
}

#[tokio::test]
async fn launched_process_is_running_then_stopped() {
    let dir = TempDir::new().unwrap();
    let duration = format!("600.{}", std::process::id());
    let pattern = format!("sleep {duration}");
    let svc = service("napper", &pattern, launch(dir.path(), "sleep", &[&duration], false));
    let runner = TokioCommandRunner::default();
    let host = HostServices::new(&runner, ProbeChain::default());
    let manager = ServiceLifecycle::new(&host, &PathLocator, &FileLocks, dir.path().join("locks"))
        .with_timings(timings());

    assert_eq!(manager.status(&svc).await.expect("status"), ServiceStatus::Stopped);

    let StartOutcome::Started { pid } = manager.start(&svc).await.expect("start") else {
        panic!("expected a fresh launch");
    };
    assert!(command_line(pid).contains(&pattern));
    assert_eq!(manager.status(&svc).await.expect("status"), ServiceStatus::Running { pid });

    let stopped = manager.stop(&svc).await.expect("stop");
    assert_eq!(stopped, StopOutcome::Stopped { pid, forced: false });
    assert_eq!(manager.status(&svc).await.expect("status"), ServiceStatus::Stopped);
}

#[tokio::test]
async fn held_stdin_keeps_a_reading_server_alive() {
    let dir = TempDir::new().unwrap();
    let marker = format!("bb-stdin-{}", std::process::id());
    let script = format!("cat; : {marker}");
    let svc = service("reader", &marker, launch(dir.path(), "sh", &["-c", &script], true));
    let runner = TokioCommandRunner::default();
    let host = HostServices::new(&runner, ProbeChain::default());
    let manager = ServiceLifecycle::new(&host, &PathLocator, &FileLocks, dir.path().join("locks"))
        .with_timings(timings());

    let StartOutcome::Started { pid } = manager.start(&svc).await.expect("start") else {
        panic!("expected a fresh launch");
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.status(&svc).await.expect("status"), ServiceStatus::Running { pid });

    manager.stop(&svc).await.expect("stop");
    assert_eq!(manager.status(&svc).await.expect("status"), ServiceStatus::Stopped);
}
