//! Preflight findings and the pure parsers behind the host checks.

use serde::Serialize;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Minimum free space under the install prefix.
pub const PREFIX_MIN_BYTES: u64 = 2 * GIB;
/// Minimum free space under the model directory.
pub const MODELS_MIN_BYTES: u64 = 8 * GIB;
/// Minimum free space under the temporary directory.
pub const TMP_MIN_BYTES: u64 = GIB;
/// Minimum free space under the state directory (logs, session record, cache).
pub const STATE_MIN_BYTES: u64 = GIB / 4;

/// OS family identifiers accepted without a warning.
pub const SUPPORTED_OS_IDS: &[&str] = &["debian", "ubuntu", "kali", "nixos", "arch", "fedora", "rhel"];

/// Host used for the TCP reachability check.
pub const CONNECTIVITY_HOST: &str = "1.1.1.1";
pub const CONNECTIVITY_PORT: u16 = 443;
/// Host used for the DNS resolution check.
pub const DNS_PROBE_HOST: &str = "nixos.org";

/// Package managers tried, in order, to self-install `curl`.
pub const PACKAGE_MANAGERS: &[(&str, &[&str])] = &[
    ("apt-get", &["install", "-y", "curl"]),
    ("dnf", &["install", "-y", "curl"]),
    ("yum", &["install", "-y", "curl"]),
    ("pacman", &["-S", "--noconfirm", "curl"]),
    ("apk", &["add", "curl"]),
    ("nix-env", &["-iA", "nixpkgs.curl"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Privilege,
    Concurrency,
    OsFamily,
    Network,
    DiskSpace,
    FetchTool,
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Privilege => "privilege",
            Self::Concurrency => "concurrency",
            Self::OsFamily => "os family",
            Self::Network => "network",
            Self::DiskSpace => "disk space",
            Self::FetchTool => "fetch tool",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub check: Check,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn warning(check: Check, message: impl Into<String>) -> Self {
        Self { check, severity: Severity::Warning, message: message.into() }
    }

    pub fn fatal(check: Check, message: impl Into<String>) -> Self {
        Self { check, severity: Severity::Fatal, message: message.into() }
    }
}

/// Fetch tool detected on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTool {
    Curl,
    Wget,
}

impl FetchTool {
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Wget => "wget",
        }
    }
}

/// `true` when any finding is fatal.
#[must_use]
pub fn has_fatal(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Fatal)
}

/// Extract `ID` and `ID_LIKE` tokens from `/etc/os-release` content.
#[must_use]
pub fn os_release_ids(content: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        if key != "ID" && key != "ID_LIKE" {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        ids.extend(value.split_whitespace().map(str::to_ascii_lowercase));
    }
    ids
}

/// Whether any of `ids` is a supported family.
#[must_use]
pub fn is_supported_os(ids: &[String]) -> bool {
    ids.iter().any(|id| SUPPORTED_OS_IDS.contains(&id.as_str()))
}

/// Parse available bytes from `df -Pk <path>` output.
///
/// The POSIX format guarantees one header line followed by one data line
/// whose fourth column is the available space in 1024-byte blocks.
#[must_use]
pub fn parse_df_available(stdout: &str) -> Option<u64> {
    let data = stdout.lines().skip(1).find(|l| !l.trim().is_empty())?;
    let kib: u64 = data.split_whitespace().nth(3)?.parse().ok()?;
    kib.checked_mul(1024)
}

/// Render a byte count as GiB with one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / GIB as f64)
}
