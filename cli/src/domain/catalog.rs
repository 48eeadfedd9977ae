//! The bundle: resolved settings and the static module, service and cleanup
//! lists derived from them.
//!
//! Everything here is a pure function of [`BundleSettings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::domain::cleanup::{CleanupPlan, CleanupStep, TeardownAction};
use crate::domain::config::ConfigDocument;
use crate::domain::module::{ActionSpec, Artifact, Module};
use crate::domain::service::{LaunchSpec, Service, StartPolicy};

pub const SYSTEM_DIR: &str = "/usr/local/share/theblackberets";
pub const DEFAULT_INSTALLER_URL: &str = "https://nixos.org/nix/install";
pub const DEFAULT_LOCALAI_URL: &str =
    "https://github.com/mudler/LocalAI/releases/download/v2.20.1/local-ai-Linux-x86_64";
pub const DEFAULT_MODEL_FILE: &str = "Meta-Llama-3-8B-Instruct.Q4_K_M.gguf";
pub const MODEL_URL_BASE: &str =
    "https://huggingface.co/QuantFactory/Meta-Llama-3-8B-Instruct-GGUF/resolve/main";
pub const DEFAULT_TOOLS: &[&str] = &["nmap", "sqlmap", "gobuster", "john", "aircrack-ng", "hashid"];
pub const LOCALAI_PATTERN: &str = "local-ai";
pub const DEFAULT_MCP_SCRIPT: &str = "mcp-kali-server.py";

pub const PACKAGE_MANAGER: &str = "package-manager";
pub const SECURITY_TOOLS: &str = "security-tools";
pub const LOCALAI: &str = "localai";
pub const LOCALAI_MODEL: &str = "localai-model";
pub const MCP_SERVER: &str = "mcp-server";

pub const LOCALAI_SERVICE: &str = "localai";
pub const MCP_SERVICE: &str = "mcp";

const NIX_INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSettings {
    pub enabled: bool,
    pub required: bool,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalAiSettings {
    pub enabled: bool,
    pub port: u16,
    pub bind_address: String,
    pub binary_url: String,
    pub binary_sha256: Option<String>,
    pub model_dir: PathBuf,
    pub config_dir: PathBuf,
    pub model_name: String,
    pub model_file: String,
    pub temperature: f64,
    pub context_size: u32,
    pub threads: u32,
    pub download_model: bool,
    pub model_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpSettings {
    pub enabled: bool,
    pub script: String,
    pub source_dir: PathBuf,
    /// `None` when the server speaks stdio only.
    pub port: Option<u16>,
    pub python: String,
}

/// Every configuration value the orchestrator reads, resolved once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleSettings {
    pub prefix: PathBuf,
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub home: PathBuf,
    pub installer_url: String,
    pub tools: ToolSettings,
    pub localai: LocalAiSettings,
    pub mcp: McpSettings,
}

impl BundleSettings {
    /// Resolve every key against `doc`, defaulting anything absent.
    ///
    /// `home` expands `~`; `cwd` anchors relative source paths. Relative
    /// install paths are anchored at the prefix.
    #[must_use]
    pub fn from_document(doc: &ConfigDocument, home: &Path, cwd: &Path) -> Self {
        let s = |path: &str, default: &str| doc.get(path, default.to_string());

        let prefix = expand(&s("install.prefix", SYSTEM_DIR), home, cwd);
        let state_dir = expand(&s("install.stateDir", "~/.local/state/blackberets"), home, cwd);
        let cache_dir = expand(&s("install.cacheDir", "~/.cache/blackberets"), home, cwd);

        let default_tools: Vec<String> = DEFAULT_TOOLS.iter().map(ToString::to_string).collect();
        let tools = ToolSettings {
            enabled: doc.get("tools.enabled", true),
            required: doc.get("tools.required", false),
            packages: doc.get("tools.packages", default_tools),
        };

        let download_name = s("ai.localAI.downloadModel.modelName", DEFAULT_MODEL_FILE);
        let model_file = s("ai.localAI.config.modelFile", &download_name);
        let model_url = s(
            "ai.localAI.downloadModel.url",
            &format!("{MODEL_URL_BASE}/{download_name}"),
        );
        let sha = s("ai.localAI.binarySha256", "");
        let localai = LocalAiSettings {
            enabled: doc.get("ai.localAI.enabled", true),
            port: doc.get("ai.localAI.defaultPort", 8080),
            bind_address: s("ai.localAI.bindAddress", "0.0.0.0"),
            binary_url: s("ai.localAI.binaryUrl", DEFAULT_LOCALAI_URL),
            binary_sha256: (!sha.is_empty()).then(|| sha.to_ascii_lowercase()),
            model_dir: expand(&s("ai.localAI.modelDir", "./models"), home, &prefix),
            config_dir: expand(&s("ai.localAI.configDir", "./localai-config"), home, &prefix),
            model_name: s("ai.localAI.config.modelName", "llama-3-8b"),
            model_file,
            temperature: doc.get("ai.localAI.config.temperature", 0.7),
            context_size: doc.get("ai.localAI.config.contextSize", 4096),
            threads: doc.get("ai.localAI.config.threads", 4),
            download_model: doc.get("ai.localAI.downloadModel.enabled", false),
            model_url,
        };

        let mcp_port: u16 = doc.get("mcp.port", 0);
        let mcp = McpSettings {
            enabled: doc.get("mcp.enabled", true),
            script: s("mcp.script", DEFAULT_MCP_SCRIPT),
            source_dir: expand(&s("mcp.sourceDir", "./mcp"), home, cwd),
            port: (mcp_port != 0).then_some(mcp_port),
            python: s("mcp.python", "python3"),
        };

        Self {
            prefix,
            state_dir,
            cache_dir,
            home: home.to_path_buf(),
            installer_url: s("packageManager.installerUrl", DEFAULT_INSTALLER_URL),
            tools,
            localai,
            mcp,
        }
    }

    #[must_use]
    pub fn localai_binary(&self) -> PathBuf {
        self.prefix.join("bin").join("local-ai")
    }

    #[must_use]
    pub fn mcp_install_dir(&self) -> PathBuf {
        self.prefix.join("mcp")
    }

    #[must_use]
    pub fn mcp_script_path(&self) -> PathBuf {
        self.mcp_install_dir().join(&self.mcp.script)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    #[must_use]
    pub fn session_log(&self) -> PathBuf {
        self.state_dir.join("last-session.json")
    }

    /// Paths outside the user's home need root to remove.
    #[must_use]
    pub fn is_privileged(&self, path: &Path) -> bool {
        !path.starts_with(&self.home)
    }
}

/// Expand `~` against `home` and anchor relative paths at `base`.
#[must_use]
pub fn expand(raw: &str, home: &Path, base: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home.join(rest);
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let trimmed = raw.strip_prefix("./").unwrap_or(raw);
    base.join(trimmed)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The ordered module list for `settings`.
#[must_use]
pub fn modules(settings: &BundleSettings) -> Vec<Module> {
    let mut modules = vec![
        Module::new(
            PACKAGE_MANAGER,
            ActionSpec::new("sh", ["{workdir}/nix-install.sh", "--daemon", "--yes"])
                .with_timeout(NIX_INSTALL_TIMEOUT),
        )
        .installed_when(ActionSpec::new("nix-env", ["--version"]).with_timeout(VERIFY_TIMEOUT))
        .verify_with(ActionSpec::new("nix", ["--version"]).with_timeout(VERIFY_TIMEOUT))
        .with_artifact(Artifact {
            url: settings.installer_url.clone(),
            file_name: "nix-install.sh".into(),
            sha256: None,
        }),
    ];

    if settings.tools.enabled && !settings.tools.packages.is_empty() {
        let attrs: Vec<String> = settings
            .tools
            .packages
            .iter()
            .map(|p| format!("nixpkgs.{p}"))
            .collect();
        let query: Vec<String> = std::iter::once("-q".to_string())
            .chain(settings.tools.packages.iter().cloned())
            .collect();
        modules.push(
            Module::new(
                SECURITY_TOOLS,
                ActionSpec::new("nix-env", std::iter::once("-iA".to_string()).chain(attrs))
                    .with_timeout(NIX_INSTALL_TIMEOUT),
            )
            .required(settings.tools.required)
            .installed_when(ActionSpec::new("nix-env", query.clone()).with_timeout(VERIFY_TIMEOUT))
            .verify_with(ActionSpec::new("nix-env", query).with_timeout(VERIFY_TIMEOUT))
            .depends_on(PACKAGE_MANAGER),
        );
    }

    if settings.localai.enabled {
        let binary = path_arg(&settings.localai_binary());
        modules.push(
            Module::new(
                LOCALAI,
                ActionSpec::new("install", ["-D", "-m", "0755", "{workdir}/local-ai", &binary]),
            )
            .installed_when(ActionSpec::new("test", ["-x", &binary]))
            .verify_with(ActionSpec::new(binary.clone(), ["--help"]).with_timeout(VERIFY_TIMEOUT))
            .with_artifact(Artifact {
                url: settings.localai.binary_url.clone(),
                file_name: "local-ai".into(),
                sha256: settings.localai.binary_sha256.clone(),
            }),
        );

        if settings.localai.download_model {
            let target = path_arg(&settings.localai.model_dir.join(&settings.localai.model_file));
            let staged = format!("{{workdir}}/{}", settings.localai.model_file);
            modules.push(
                Module::new(
                    LOCALAI_MODEL,
                    ActionSpec::new("install", ["-D", "-m", "0644", &staged, &target]),
                )
                .optional()
                .installed_when(ActionSpec::new("test", ["-s", &target]))
                .depends_on(LOCALAI)
                .with_artifact(Artifact {
                    url: settings.localai.model_url.clone(),
                    file_name: settings.localai.model_file.clone(),
                    sha256: None,
                }),
            );
        }
    }

    if settings.mcp.enabled {
        let source = path_arg(&settings.mcp.source_dir.join(&settings.mcp.script));
        let target = path_arg(&settings.mcp_script_path());
        modules.push(
            Module::new(
                MCP_SERVER,
                ActionSpec::new("install", ["-D", "-m", "0755", &source, &target]),
            )
            .optional()
            .verify_with(
                ActionSpec::new(settings.mcp.python.clone(), ["-m", "py_compile", &target])
                    .with_timeout(VERIFY_TIMEOUT),
            ),
        );
    }

    modules
}

/// The enabled services, in start order.
#[must_use]
pub fn services(settings: &BundleSettings) -> Vec<Service> {
    let mut services = Vec::new();
    let logs = settings.logs_dir();

    if settings.localai.enabled {
        let config_file = settings.localai.config_dir.join("localai.yaml");
        services.push(Service {
            name: LOCALAI_SERVICE.into(),
            port: Some(settings.localai.port),
            bind_address: Some(settings.localai.bind_address.clone()),
            process_pattern: LOCALAI_PATTERN.into(),
            start_policy: StartPolicy::Idempotent,
            launch: LaunchSpec {
                candidates: vec![path_arg(&settings.localai_binary()), "local-ai".into()],
                args: vec![
                    "run".into(),
                    "--address".into(),
                    format!("{}:{}", settings.localai.bind_address, settings.localai.port),
                    "--models-path".into(),
                    path_arg(&settings.localai.model_dir),
                    "--models-config-file".into(),
                    path_arg(&config_file),
                ],
                log_file: logs.join("localai.log"),
                working_dir: Some(settings.prefix.clone()),
                hold_stdin: false,
            },
        });
    }

    if settings.mcp.enabled {
        services.push(Service {
            name: MCP_SERVICE.into(),
            port: settings.mcp.port,
            bind_address: None,
            process_pattern: settings.mcp.script.clone(),
            start_policy: StartPolicy::Exclusive,
            launch: LaunchSpec {
                candidates: vec![settings.mcp.python.clone()],
                args: vec![path_arg(&settings.mcp_script_path())],
                log_file: logs.join("mcp.log"),
                working_dir: Some(settings.mcp_install_dir()),
                hold_stdin: true,
            },
        });
    }

    services
}

/// Teardown in reverse install order, then shared state.
#[must_use]
pub fn cleanup_plan(settings: &BundleSettings) -> CleanupPlan {
    let remove = |path: PathBuf| TeardownAction::RemovePath {
        privileged: settings.is_privileged(&path),
        path,
    };
    let mut plan = CleanupPlan::default();

    if settings.mcp.enabled {
        plan.module_steps.push(CleanupStep::new(
            MCP_SERVER,
            TeardownAction::StopProcesses { pattern: settings.mcp.script.clone() },
        ));
        plan.module_steps
            .push(CleanupStep::new(MCP_SERVER, remove(settings.mcp_install_dir())));
    }
    if settings.localai.enabled {
        if settings.localai.download_model {
            plan.module_steps.push(CleanupStep::new(
                LOCALAI_MODEL,
                remove(settings.localai.model_dir.join(&settings.localai.model_file)),
            ));
        }
        plan.module_steps.push(CleanupStep::new(
            LOCALAI,
            TeardownAction::StopProcesses { pattern: LOCALAI_PATTERN.into() },
        ));
        plan.module_steps
            .push(CleanupStep::new(LOCALAI, remove(settings.localai_binary())));
    }
    if settings.tools.enabled && !settings.tools.packages.is_empty() {
        plan.module_steps.push(CleanupStep::new(
            SECURITY_TOOLS,
            TeardownAction::Run(ActionSpec::new(
                "nix-env",
                std::iter::once("-e".to_string()).chain(settings.tools.packages.iter().cloned()),
            )),
        ));
    }

    let mut shared = vec![
        CleanupStep::new("processes", TeardownAction::StopProcesses { pattern: LOCALAI_PATTERN.into() }),
        CleanupStep::new(
            "processes",
            TeardownAction::StopProcesses { pattern: settings.mcp.script.clone() },
        ),
        CleanupStep::new("config", remove(settings.localai.config_dir.clone())),
        CleanupStep::new("state", remove(settings.session_log())),
        CleanupStep::new("state", remove(settings.logs_dir())),
        CleanupStep::new("cache", remove(settings.cache_dir.clone())),
    ];
    plan.shared_steps.append(&mut shared);

    if plan.needs_privilege() {
        plan.shared_steps
            .insert(0, CleanupStep::new("privilege", TeardownAction::ConfirmPrivilege));
    }
    plan
}
