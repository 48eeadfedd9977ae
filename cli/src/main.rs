//! blackberets - install and operate the Black Berets security bundle

use std::process::ExitCode;

use blackberets_cli::cli::Cli;
use blackberets_cli::output::json::{error_code, format_error};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BLACKBERETS_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if json {
                match format_error(&format!("{e:#}"), error_code(&e)) {
                    Ok(obj) => println!("{obj}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays clean for `--json`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
