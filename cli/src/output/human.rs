//! Human-readable terminal renderer.

use std::path::PathBuf;

use anyhow::Result;
use owo_colors::OwoColorize as _;

use crate::application::services::installation::InstallOutcome;
use crate::domain::cleanup::{CleanupReport, PhaseReport, StepOutcome};
use crate::domain::module::{ModuleStatus, SessionStatus, Tally, VerifyRecord, VerifyReport};
use crate::domain::service::{ServiceStatus, StartOutcome, StopOutcome};
use crate::domain::session::SessionLog;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("blackberets {version}");
    }

    /// Render the module table and final status of an install session.
    pub fn render_session(&self, outcome: &InstallOutcome) {
        let report = &outcome.report;
        if let Some(abort) = &report.abort {
            self.ctx.error(&format!("Installation failed: {abort}"));
        }
        if self.ctx.quiet {
            return;
        }

        println!();
        self.ctx.header("Modules:");
        for record in &report.modules {
            let kind = if record.required { "required" } else { "optional" };
            println!(
                "    {:<16} {:<9} {}",
                record.name,
                kind.style(self.ctx.styles.dim),
                module_status_label(record.status).style(self.ctx.styles.for_module(record.status)),
            );
            if record.status != ModuleStatus::Installed && !record.detail.is_empty() {
                println!("      {}", first_line(&record.detail).style(self.ctx.styles.dim));
            }
        }
        for warning in &report.warnings {
            self.ctx.warn(warning);
        }
        println!();
        self.ctx.kv("Result:", &format_tally(report.tally()));
        match report.status() {
            SessionStatus::Success => self.ctx.success("Installation complete."),
            SessionStatus::PartialSuccess => {
                self.ctx.warn("Installation complete with warnings.");
            }
            SessionStatus::Failed => {}
        }
        if report.abort.is_none() {
            self.ctx.kv("Start services:", "blackberets start");
        }
    }

    /// Render the files written by `configure`.
    pub fn render_configured(&self, written: &[PathBuf]) {
        for path in written {
            self.ctx.success(&format!("Wrote {}", path.display()));
        }
        if written.is_empty() {
            self.ctx.info("No components enabled; nothing to configure.");
        }
    }

    /// Render a `start` result per service.
    pub fn render_start(&self, results: &[(String, Result<StartOutcome>)]) {
        for (name, result) in results {
            match result {
                Ok(StartOutcome::Started { pid }) => {
                    self.ctx.success(&format!("{name} started (pid {pid})"));
                }
                Ok(StartOutcome::AlreadyRunning { pid }) => {
                    self.ctx.info(&format!("{name} already running (pid {pid})"));
                }
                Err(e) => self.ctx.error(&format!("{name}: {e:#}")),
            }
        }
    }

    /// Render a `stop` result per service.
    pub fn render_stop(&self, results: &[(String, Result<StopOutcome>)]) {
        for (name, result) in results {
            match result {
                Ok(StopOutcome::Stopped { pid, forced: false }) => {
                    self.ctx.success(&format!("{name} stopped (pid {pid})"));
                }
                Ok(StopOutcome::Stopped { pid, forced: true }) => {
                    self.ctx.warn(&format!("{name} killed after grace period (pid {pid})"));
                }
                Ok(StopOutcome::PatternKilled) => {
                    self.ctx.warn(&format!("{name} stopped by process pattern"));
                }
                Ok(StopOutcome::NotRunning) => self.ctx.info(&format!("{name} is not running")),
                Err(e) => self.ctx.error(&format!("{name}: {e:#}")),
            }
        }
    }

    /// Render service states and the last install session.
    pub fn render_status(
        &self,
        services: &[(String, Result<ServiceStatus>)],
        last_session: Option<&SessionLog>,
    ) {
        if self.ctx.quiet {
            return;
        }
        self.render_service_table(services);
        println!();
        match last_session {
            Some(log) => {
                self.ctx.kv(
                    "Last install:",
                    &format!(
                        "{} at {} ({})",
                        log.state.label(),
                        log.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        format_tally(log.report.tally()),
                    ),
                );
                if let Some(abort) = &log.report.abort {
                    self.ctx.kv("Reason:", first_line(&abort.to_string()));
                }
            }
            None => self.ctx.kv("Last install:", "none recorded"),
        }
    }

    /// Render `test`: verify results followed by service states.
    pub fn render_verify(
        &self,
        report: &VerifyReport,
        services: &[(String, Result<ServiceStatus>)],
    ) {
        for failure in report.required_failures() {
            self.ctx.error(&format!("{} failed verification", failure.name));
        }
        if self.ctx.quiet {
            return;
        }
        self.render_records("Modules:", &report.modules);
        if !report.health.is_empty() {
            self.render_records("Health:", &report.health);
        }
        println!();
        self.render_service_table(services);
        println!();
        self.ctx.kv("Result:", &format_tally(report.tally()));
    }

    fn render_records(&self, title: &str, records: &[VerifyRecord]) {
        println!();
        self.ctx.header(title);
        for record in records {
            if record.passed {
                println!("    {} {}", "✓".style(self.ctx.styles.success), record.name);
            } else {
                let style = if record.required { self.ctx.styles.error } else { self.ctx.styles.warning };
                println!("    {} {}", "✗".style(style), record.name);
                if !record.detail.is_empty() {
                    println!("      {}", first_line(&record.detail).style(self.ctx.styles.dim));
                }
            }
        }
    }

    /// Render both cleanup phases with their counts.
    pub fn render_cleanup(&self, report: &CleanupReport) {
        if let Some(reason) = &report.critical_failure {
            self.ctx.error(reason);
        }
        if self.ctx.quiet {
            return;
        }
        self.render_phase("Module teardown:", &report.modules);
        self.render_phase("Shared state:", &report.shared);
        println!();
        if report.critical_failure.is_none() {
            self.ctx.success("Cleanup finished.");
        }
    }

    fn render_phase(&self, title: &str, phase: &PhaseReport) {
        println!();
        self.ctx.header(title);
        for step in &phase.steps {
            let style = self.ctx.styles.for_step(&step.outcome);
            match &step.outcome {
                StepOutcome::Succeeded => println!("    {} {}", "✓".style(style), step.action),
                StepOutcome::Failed(reason) => {
                    println!("    {} {}", "✗".style(style), step.action);
                    println!("      {}", first_line(reason).style(self.ctx.styles.dim));
                }
                StepOutcome::Skipped(reason) => println!(
                    "    {} {} {}",
                    "-".style(style),
                    step.action,
                    format!("({})", first_line(reason)).style(self.ctx.styles.dim),
                ),
            }
        }
        self.ctx.kv("  Result:", &format_tally(phase.tally()));
    }

    fn render_service_table(&self, services: &[(String, Result<ServiceStatus>)]) {
        self.ctx.header("Services:");
        if services.is_empty() {
            println!("    no services enabled");
        }
        for (name, status) in services {
            match status {
                Ok(status) => println!(
                    "    {name:<10} {}",
                    describe_service_status(status).style(self.ctx.styles.for_service(status))
                ),
                Err(e) => println!(
                    "    {name:<10} {}",
                    format!("unknown ({e:#})").style(self.ctx.styles.error)
                ),
            }
        }
    }
}

// ── Display helpers (used by tests and output layer) ─────────────────────────

#[must_use]
pub fn module_status_label(status: ModuleStatus) -> &'static str {
    match status {
        ModuleStatus::Installed => "installed",
        ModuleStatus::InstalledWithWarnings => "installed (warnings)",
        ModuleStatus::Failed => "failed",
        ModuleStatus::Skipped => "skipped",
    }
}

/// `"2 passed, 1 warned, 0 failed, 1 skipped"`.
#[must_use]
pub fn format_tally(tally: Tally) -> String {
    format!(
        "{} passed, {} warned, {} failed, {} skipped",
        tally.passed, tally.warned, tally.failed, tally.skipped
    )
}

#[must_use]
pub fn describe_service_status(status: &ServiceStatus) -> String {
    match status {
        ServiceStatus::Running { pid } => format!("running (pid {pid})"),
        ServiceStatus::Stopped => "stopped".to_string(),
        ServiceStatus::PortOccupiedByOther { port, pid: Some(pid), command } => format!(
            "port {port} in use by pid {pid}{}",
            command.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
        ),
        ServiceStatus::PortOccupiedByOther { port, pid: None, .. } => {
            format!("port {port} in use by another process")
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}
