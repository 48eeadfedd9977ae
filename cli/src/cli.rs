//! CLI argument parsing with clap derive

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Install and operate the Black Berets security bundle
#[derive(Parser)]
#[command(
    name = "blackberets",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Configuration source (.nix, .json or .yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install every enabled module
    Install,

    /// Write the LocalAI and MCP configuration files
    Configure,

    /// Start services (all enabled, or the one named)
    Start(commands::ServiceArgs),

    /// Stop services (all enabled, or the one named)
    Stop(commands::ServiceArgs),

    /// Show service state and the last install session
    Status,

    /// Verify installed modules and report service state
    Test,

    /// Remove installed modules and shared state
    Cleanup,

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails outright. Partial failures are
    /// rendered and reflected in the returned exit code.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli { json, quiet, no_color, config, verbose: _, yes, command } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags { no_color, quiet, json },
            behaviour: BehaviourFlags { yes },
            config,
        })?;

        match command {
            Command::Install => commands::install::run(&app).await,
            Command::Configure => commands::configure::run(&app).await.map(|()| ExitCode::SUCCESS),
            Command::Start(args) => commands::service::start(&args, &app).await,
            Command::Stop(args) => commands::service::stop(&args, &app).await,
            Command::Status => commands::status::run(&app).await,
            Command::Test => commands::verify::run(&app).await,
            Command::Cleanup => commands::cleanup::run(&app).await,
            Command::Version => commands::version::run(&app).map(|()| ExitCode::SUCCESS),
        }
    }
}
