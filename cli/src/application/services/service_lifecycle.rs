//! Application service: start, stop and status of long-running services.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! A service is only reported `Running` once a port check and a process
//! identity check agree, and nothing is launched over a confirmed instance.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{
    LockAttempt, LockProvider, PortListener, ServiceHost, Signal, ToolLocator,
};
use crate::domain::error::ServiceError;
use crate::domain::service::{
    DEFAULT_SETTLE, DEFAULT_STOP_GRACE, SERVICE_LOCK_WAIT, Service, ServiceStatus, StartOutcome,
    StartPolicy, StopOutcome,
};

/// Waits used by the lifecycle. Tests shrink these.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTimings {
    pub settle: Duration,
    pub stop_grace: Duration,
    pub kill_grace: Duration,
    pub lock_wait: Duration,
    pub poll: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            stop_grace: DEFAULT_STOP_GRACE,
            kill_grace: Duration::from_secs(2),
            lock_wait: SERVICE_LOCK_WAIT,
            poll: Duration::from_millis(200),
        }
    }
}

pub struct ServiceLifecycle<'a, H, T, K> {
    host: &'a H,
    locator: &'a T,
    locks: &'a K,
    lock_dir: PathBuf,
    timings: LifecycleTimings,
}

impl<'a, H, T, K> ServiceLifecycle<'a, H, T, K>
where
    H: ServiceHost,
    T: ToolLocator,
    K: LockProvider,
{
    /// Per-service locks live under `lock_dir`.
    pub fn new(host: &'a H, locator: &'a T, locks: &'a K, lock_dir: PathBuf) -> Self {
        Self {
            host,
            locator,
            locks,
            lock_dir,
            timings: LifecycleTimings::default(),
        }
    }

    #[must_use]
    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Observe the service. Read-only.
    ///
    /// # Errors
    ///
    /// Returns an error only if a probe fails in a way that cannot be
    /// degraded to a pattern match.
    pub async fn status(&self, service: &Service) -> Result<ServiceStatus> {
        let Some(port) = service.port else {
            return Ok(match self.pattern_pid(service).await {
                Some(pid) => ServiceStatus::Running { pid },
                None => ServiceStatus::Stopped,
            });
        };

        let listener = self.host.listener(port).await.unwrap_or_else(|e| {
            tracing::debug!(port, "listener lookup failed: {e:#}");
            PortListener::Unknown
        });

        let pid = match listener {
            PortListener::Owned(pid) => pid,
            PortListener::Absent => return Ok(ServiceStatus::Stopped),
            PortListener::Unattributed => return Ok(self.identify_by_pattern(service, port).await),
            PortListener::Unknown => {
                let host = service.connect_host();
                let listening = self
                    .host
                    .check_tcp_connectivity(host, port)
                    .await
                    .unwrap_or(false);
                if !listening {
                    return Ok(ServiceStatus::Stopped);
                }
                return Ok(self.identify_by_pattern(service, port).await);
            }
        };

        let command = self.host.command_line(pid).await.unwrap_or_default();
        match command {
            Some(cmd) if service.matches(&cmd) => Ok(ServiceStatus::Running { pid }),
            command => Ok(ServiceStatus::PortOccupiedByOther { port, pid: Some(pid), command }),
        }
    }

    /// Something listens on `port` but its owner is unknown.
    async fn identify_by_pattern(&self, service: &Service, port: u16) -> ServiceStatus {
        tracing::debug!(port, service = %service.name, "port owner unknown, matching by pattern");
        match self.pattern_pid(service).await {
            Some(pid) => ServiceStatus::Running { pid },
            None => ServiceStatus::PortOccupiedByOther { port, pid: None, command: None },
        }
    }

    async fn pattern_pid(&self, service: &Service) -> Option<u32> {
        match self.host.find_by_pattern(&service.process_pattern).await {
            Ok(pids) => pids.into_iter().min(),
            Err(e) => {
                tracing::debug!(service = %service.name, "pattern lookup failed: {e:#}");
                None
            }
        }
    }

    /// Start the service unless it is already confirmed running.
    ///
    /// # Errors
    ///
    /// Returns a `ServiceError` for conflicts, exclusive double starts,
    /// a missing binary, or a launch that did not come up.
    pub async fn start(&self, service: &Service) -> Result<StartOutcome> {
        let _guard = self.lock(service).await?;

        match self.status(service).await? {
            ServiceStatus::Running { pid } => {
                return match service.start_policy {
                    StartPolicy::Idempotent => {
                        tracing::info!(service = %service.name, pid, "already running");
                        Ok(StartOutcome::AlreadyRunning { pid })
                    }
                    StartPolicy::Exclusive => Err(ServiceError::AlreadyRunning {
                        name: service.name.clone(),
                        pid,
                    }
                    .into()),
                };
            }
            ServiceStatus::PortOccupiedByOther { port, pid, command } => {
                return Err(ServiceError::PortOccupiedByOther {
                    name: service.name.clone(),
                    port,
                    pid,
                    command,
                }
                .into());
            }
            ServiceStatus::Stopped => {}
        }

        let binary = self
            .locator
            .locate(&service.launch.candidates)
            .ok_or_else(|| ServiceError::BinaryNotFound {
                name: service.name.clone(),
                searched: service.launch.candidates.clone(),
            })?;

        tracing::info!(service = %service.name, binary = %binary.display(), "launching");
        let launched = self
            .host
            .spawn_detached(&binary, &service.launch)
            .await
            .with_context(|| format!("launching {}", service.name))?;

        tokio::time::sleep(self.timings.settle).await;

        match self.status(service).await? {
            ServiceStatus::Running { pid } => Ok(StartOutcome::Started { pid }),
            _ => Err(ServiceError::StartUnconfirmed {
                name: service.name.clone(),
                pid: launched,
                log: service.launch.log_file.clone(),
            }
            .into()),
        }
    }

    /// Stop the service if it is running. Never touches unrelated processes.
    ///
    /// # Errors
    ///
    /// Returns a `ServiceError` if the port belongs to another process or the
    /// service outlives SIGKILL.
    pub async fn stop(&self, service: &Service) -> Result<StopOutcome> {
        let _guard = self.lock(service).await?;

        let pid = match self.status(service).await? {
            ServiceStatus::Stopped => return Ok(StopOutcome::NotRunning),
            ServiceStatus::PortOccupiedByOther { port, pid, command } => {
                return Err(ServiceError::PortOccupiedByOther {
                    name: service.name.clone(),
                    port,
                    pid,
                    command,
                }
                .into());
            }
            ServiceStatus::Running { pid } => pid,
        };

        if let Err(e) = self.host.signal(pid, Signal::Term).await {
            tracing::warn!(pid, "cannot signal pid, falling back to pattern kill: {e:#}");
            let matched = self
                .host
                .signal_matching(&service.process_pattern, Signal::Term)
                .await
                .with_context(|| format!("stopping {}", service.name))?;
            if matched {
                return Ok(StopOutcome::PatternKilled);
            }
            return Err(e.context(format!("stopping {}", service.name)));
        }

        if self.wait_exit(pid, self.timings.stop_grace).await {
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }

        tracing::warn!(pid, service = %service.name, "did not exit after SIGTERM, sending SIGKILL");
        if let Err(e) = self.host.signal(pid, Signal::Kill).await {
            tracing::warn!(pid, "SIGKILL failed: {e:#}");
        }
        if self.wait_exit(pid, self.timings.kill_grace).await {
            return Ok(StopOutcome::Stopped { pid, forced: true });
        }

        Err(ServiceError::StopTimedOut {
            name: service.name.clone(),
            pid,
            seconds: self.timings.stop_grace.as_secs(),
        }
        .into())
    }

    async fn wait_exit(&self, pid: u32, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if !self.host.is_alive(pid).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.timings.poll).await;
        }
    }

    async fn lock(&self, service: &Service) -> Result<K::Guard> {
        let path = self.lock_dir.join(format!("{}.lock", service.name));
        let deadline = tokio::time::Instant::now() + self.timings.lock_wait;
        loop {
            if let LockAttempt::Acquired(guard) = self.locks.try_acquire(&path)? {
                return Ok(guard);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ServiceError::ServiceBusy(service.name.clone()).into());
            }
            tokio::time::sleep(self.timings.poll).await;
        }
    }

    /// Status of every service, in order.
    pub async fn status_all(&self, services: &[Service]) -> Vec<(String, Result<ServiceStatus>)> {
        let mut out = Vec::with_capacity(services.len());
        for service in services {
            out.push((service.name.clone(), self.status(service).await));
        }
        out
    }

    /// Start every service in order, continuing past failures.
    pub async fn start_all(&self, services: &[Service]) -> Vec<(String, Result<StartOutcome>)> {
        let mut out = Vec::with_capacity(services.len());
        for service in services {
            out.push((service.name.clone(), self.start(service).await));
        }
        out
    }

    /// Stop every service in reverse order, continuing past failures.
    pub async fn stop_all(&self, services: &[Service]) -> Vec<(String, Result<StopOutcome>)> {
        let mut out = Vec::with_capacity(services.len());
        for service in services.iter().rev() {
            out.push((service.name.clone(), self.stop(service).await));
        }
        out
    }
}
