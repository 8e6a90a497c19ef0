//! `reportledger` - recurring report email dispatcher
//!
//! Sends a batch of report emails only when every attachment was refreshed
//! for the run date and the same email was not already sent, recording each
//! outcome in a shared audit store.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;
mod config;
mod smtp;
mod source;
mod telemetry;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cli::{Cli, Command};
use config::AppConfig;

/// Exit status for usage and configuration errors.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let runner_log = matches!(cli.command, Command::Send(_)).then_some(config.log_dir.as_path());
    if let Err(e) = telemetry::init(&config.log_filter, runner_log) {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_CONFIG);
    }

    let result = match &cli.command {
        Command::Send(args) => commands::send(&config, args).await,
        Command::RecordRefresh(args) => commands::record_refresh(&config, args).await,
        Command::Export(args) => commands::export(&config, args).await,
    };

    result.unwrap_or_else(|e| {
        error!("{e:#}");
        ExitCode::from(EXIT_CONFIG)
    })
}
