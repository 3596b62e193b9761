//! Sitter CLI binary
//!
//! Runs a single command under the process coordinator and exits with its
//! status code.

use clap::Parser;
use cli::{run, RunOptions};
use sitter_core::utils::init_tracing;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "sitter")]
#[command(about = "Launch a command, relay its streams, and report how it exited")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML launcher config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Destroy the command after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Signal used to destroy the command (overrides the config file)
    #[arg(long, value_name = "SIGNAL")]
    kill_signal: Option<String>,

    /// Program to run followed by its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<OsString>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("warning: {}", e);
    }

    let result = match RunOptions::from_args(
        cli.command,
        cli.config.as_deref(),
        cli.kill_signal.as_deref(),
        cli.timeout,
    ) {
        Ok(options) => run(options).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(status) => std::process::exit(status.code()),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("sitter: [{}] {}", e.code(), e);
            std::process::exit(e.exit_code());
        }
    }
}
