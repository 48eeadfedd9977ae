//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries between
//! domain, application, infra, commands and output hold.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn src_dir(layer: &str) -> PathBuf {
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    if layer.is_empty() { src } else { src.join(layer) }
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-comment production lines of `file` with their 1-based line numbers.
fn production_lines(file: &Path) -> Vec<(usize, String)> {
    let Ok(content) = std::fs::read_to_string(file) else {
        return Vec::new();
    };
    let mut tracker = CfgTestTracker::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            let comment = trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*');
            (!in_test && !comment).then(|| (i + 1, line.to_string()))
        })
        .collect()
}

/// Every production line in `layer` containing one of `forbidden`.
fn scan(layer: &str, forbidden: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir(layer)) {
        let rel = relative(&file);
        if rel.ends_with("test_support.rs") {
            continue;
        }
        for (lineno, line) in production_lines(&file) {
            if let Some(token) = forbidden.iter().find(|t| line.contains(*t)) {
                violations.push(format!("{rel}:{lineno}: `{token}`: {}", line.trim()));
            }
        }
    }
    violations
}

// ── Layer imports ─────────────────────────────────────────────────────────────

#[test]
fn domain_is_free_of_io_and_outer_layers() {
    let violations = scan(
        "domain",
        &[
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::fs",
            "std::process",
            "std::net",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay pure:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_depends_only_on_domain() {
    let violations = scan(
        "application",
        &["crate::infra", "crate::commands", "crate::output", "crate::app::"],
    );
    assert!(
        violations.is_empty(),
        "application/ may import only from domain/ and its own ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = scan("infra", &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_and_application_do_not_print() {
    let mut violations = scan("infra", &["println!", "eprintln!"]);
    violations.extend(scan("application", &["println!", "eprintln!"]));
    assert!(
        violations.is_empty(),
        "services and adapters report through ProgressReporter or tracing:\n{}",
        violations.join("\n")
    );
}

// ── Command handlers ──────────────────────────────────────────────────────────

#[test]
fn no_inline_json_branching_in_commands() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir("commands")) {
        let rel = relative(&file);
        for (lineno, line) in production_lines(&file) {
            let trimmed = line.trim();
            if line.contains("json: bool") {
                violations.push(format!("{rel}:{lineno}: found `json: bool` parameter: {trimmed}"));
            }
            if trimmed.starts_with("if json") || trimmed.starts_with("if !json") {
                violations.push(format!("{rel}:{lineno}: found inline JSON branch: {trimmed}"));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Found inline JSON branching in commands/, use app.renderer() instead:\n{}",
        violations.join("\n")
    );
}

#[test]
fn commands_use_standardized_confirmation() {
    let violations = scan("commands", &["dialoguer::", "stdin().read_line"]);
    assert!(
        violations.is_empty(),
        "Commands must use app.confirm() for user prompts:\n{}",
        violations.join("\n")
    );
}

#[test]
fn no_command_runner_construction_outside_infra_and_app() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir("")) {
        let rel = relative(&file);
        if rel.contains("/infra/") || rel.ends_with("/app.rs") {
            continue;
        }
        for (lineno, line) in production_lines(&file) {
            if line.contains("TokioCommandRunner::new") || line.contains("TokioCommandRunner::default") {
                violations.push(format!("{rel}:{lineno}: {}", line.trim()));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Commands must reuse app.runner:\n{}",
        violations.join("\n")
    );
}

// ── Blocking I/O safety ───────────────────────────────────────────────────────

/// Track whether a line is inside an async fn and outside `spawn_blocking`.
struct AsyncContextTracker {
    in_async_fn: bool,
    in_spawn_blocking: bool,
    brace_depth: i32,
    async_fn_start_depth: i32,
    spawn_blocking_start_depth: i32,
}

impl AsyncContextTracker {
    fn new() -> Self {
        Self {
            in_async_fn: false,
            in_spawn_blocking: false,
            brace_depth: 0,
            async_fn_start_depth: 0,
            spawn_blocking_start_depth: 0,
        }
    }

    /// Process a line. Returns `true` if the line is in an async fn but NOT in `spawn_blocking`.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("async fn ") && !trimmed.starts_with("//") {
            self.in_async_fn = true;
            self.async_fn_start_depth = self.brace_depth;
        } else if trimmed.contains("fn ") && !trimmed.contains("async ") && !trimmed.starts_with("//") {
            self.in_async_fn = false;
            self.in_spawn_blocking = false;
        }
        if self.in_async_fn && line.contains("spawn_blocking") {
            self.in_spawn_blocking = true;
            self.spawn_blocking_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_spawn_blocking && self.brace_depth <= self.spawn_blocking_start_depth {
                        self.in_spawn_blocking = false;
                    }
                    if self.in_async_fn && self.brace_depth <= self.async_fn_start_depth {
                        self.in_async_fn = false;
                    }
                }
                _ => {}
            }
        }
        self.in_async_fn && !self.in_spawn_blocking
    }
}

#[test]
fn infra_async_functions_do_not_use_blocking_fs() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir("infra")) {
        let rel = relative(&file);
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let mut tests = CfgTestTracker::new();
        let mut tracker = AsyncContextTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tests.process_line(line);
            let in_unguarded_async = tracker.process_line(line);
            if in_test || !in_unguarded_async || line.trim().starts_with("//") {
                continue;
            }
            if line.contains("std::fs::") {
                violations.push(format!(
                    "{rel}:{}: std::fs in async fn outside spawn_blocking: {}",
                    i + 1,
                    line.trim()
                ));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "infra/ async functions must not use blocking std::fs outside spawn_blocking:\n{}",
        violations.join("\n")
    );
}

/// No module-level #![`allow(dead_code)`] in domain/, application/, or infra/ layers.
#[test]
fn no_module_level_dead_code_allows_in_layers() {
    let mut violations = Vec::new();
    for layer in ["domain", "application", "infra"] {
        for file in collect_rs_files(&src_dir(layer)) {
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if line.trim().starts_with("#![allow(dead_code)]") {
                    violations.push(format!("{}:{}", relative(&file), i + 1));
                }
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Module-level #![allow(dead_code)] found in architecture layers:\n{}",
        violations.join("\n")
    );
}
