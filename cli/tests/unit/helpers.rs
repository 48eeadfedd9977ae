//! Shared test helpers: a scripted command runner and output constructors.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::time::Duration;

use anyhow::Result;
use blackberets_cli::application::ports::{ArtifactFetcher, CommandRunner, ProgressReporter};
use blackberets_cli::domain::module::Artifact;

// ── Cross-platform ExitStatus construction ───────────────────────────────────

/// Build an `ExitStatus` from a logical exit code (0 = success, non-zero = failure).
///
/// On Unix the raw wait-status encodes the exit code in bits 8–15, so we shift.
/// On Windows `ExitStatusExt::from_raw` takes the exit code directly.
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

// ── Output constructors ──────────────────────────────────────────────────────

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn err_output(code: i32, stderr: &[u8]) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

// ── Scripted runner ──────────────────────────────────────────────────────────

/// Reply for every command line starting with a prefix.
#[derive(Clone)]
pub enum Reply {
    Ok(&'static str),
    Fail(&'static str),
    /// The program is not installed.
    Missing,
}

/// Answers by longest matching command-line prefix and records every call.
pub struct ScriptRunner {
    replies: Vec<(String, Reply)>,
    fallback: Reply,
    calls: RefCell<Vec<String>>,
}

impl ScriptRunner {
    /// Unmatched commands succeed with empty output.
    pub fn succeeding() -> Self {
        Self::with_fallback(Reply::Ok(""))
    }

    /// Unmatched commands fail with exit code 1.
    pub fn failing() -> Self {
        Self::with_fallback(Reply::Fail(""))
    }

    fn with_fallback(fallback: Reply) -> Self {
        Self { replies: Vec::new(), fallback, calls: RefCell::new(Vec::new()) }
    }

    #[must_use]
    pub fn on(mut self, prefix: &str, reply: Reply) -> Self {
        self.replies.push((prefix.to_string(), reply));
        self
    }

    /// Number of invocations whose command line starts with `prefix`.
    pub fn called(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn reply_for(&self, line: &str) -> Reply {
        self.replies
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or_else(|| self.fallback.clone(), |(_, reply)| reply.clone())
    }
}

impl CommandRunner for ScriptRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, Duration::from_secs(1)).await
    }

    async fn run_with_timeout(&self, program: &str, args: &[&str], _: Duration) -> Result<Output> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.borrow_mut().push(line.clone());
        match self.reply_for(&line) {
            Reply::Ok(stdout) => Ok(ok_output(stdout.as_bytes())),
            Reply::Fail(stderr) => Ok(err_output(1, stderr.as_bytes())),
            Reply::Missing => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{program}: not found"),
            )
            .into()),
        }
    }
}

// ── Reporter ─────────────────────────────────────────────────────────────────

/// Collects progress events as `"step: ..."`, `"ok: ..."`, `"warn: ..."`.
#[derive(Default)]
pub struct Events(RefCell<Vec<String>>);

impl Events {
    pub fn warnings(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| e.strip_prefix("warn: ").map(String::from))
            .collect()
    }
}

impl ProgressReporter for Events {
    fn step(&self, message: &str) {
        self.0.borrow_mut().push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.0.borrow_mut().push(format!("ok: {message}"));
    }
    fn warn(&self, message: &str) {
        self.0.borrow_mut().push(format!("warn: {message}"));
    }
}

// ── Downloads ────────────────────────────────────────────────────────────────

/// Records fetched file names; names in `failing` return a 404.
#[derive(Default)]
pub struct Downloads {
    pub failing: Vec<String>,
    fetched: RefCell<Vec<String>>,
}

impl Downloads {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| (*n).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }
}

impl ArtifactFetcher for Downloads {
    async fn fetch(&self, artifact: &Artifact, dest_dir: &Path) -> Result<PathBuf> {
        if self.failing.contains(&artifact.file_name) {
            anyhow::bail!("server returned 404 for {}", artifact.url);
        }
        self.fetched.borrow_mut().push(artifact.file_name.clone());
        Ok(dest_dir.join(&artifact.file_name))
    }
}
