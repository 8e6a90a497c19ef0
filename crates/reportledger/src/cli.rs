//! Command-line interface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reportledger_core::Status;

#[derive(Parser, Debug)]
#[command(
    name = "reportledger",
    about = "Send recurring report emails, gated on refresh freshness and prior sends",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate and send one batch of report emails
    Send(SendArgs),
    /// Record the outcome of an upstream report refresh
    RecordRefresh(RecordRefreshArgs),
    /// Export every recorded event of a run
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Batch number
    #[arg(long)]
    pub batch: String,
    /// CSV email list
    #[arg(long)]
    pub email_list: PathBuf,
    /// Run date (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub email_date: Option<NaiveDate>,
    /// Candidates processed at once (overrides REPORTLEDGER_MAX_PARALLEL)
    #[arg(long)]
    pub max_parallel: Option<usize>,
    /// Days before the run date that still count as fresh (overrides
    /// REPORTLEDGER_LOOKBACK_DAYS)
    #[arg(long)]
    pub lookback_days: Option<u32>,
    /// Bypass freshness and duplicate checks
    #[arg(long)]
    pub force_resend: bool,
    /// Record eligible candidates without sending
    #[arg(long)]
    pub dry_run: bool,
    /// Require refreshes delivered by email
    #[arg(long)]
    pub require_method_email: bool,
    /// Scope the duplicate check to the exact attachment list
    #[arg(long)]
    pub scope_attachments: bool,
    /// Export path (defaults to the log directory)
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RecordRefreshArgs {
    /// Refreshed artifact
    #[arg(long)]
    pub path: String,
    /// Run date (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub run_date: Option<NaiveDate>,
    /// Delivery method tag
    #[arg(long, default_value = "Email")]
    pub method: String,
    /// Outcome (OK, FAIL or SKIP)
    #[arg(long, default_value = "OK", value_parser = parse_status)]
    pub status: Status,
    /// Failure reason
    #[arg(long, default_value = "")]
    pub error: String,
    /// Run identifier (defaults to refresh-log_<date>)
    #[arg(long)]
    pub run_id: Option<String>,
    /// Batch label
    #[arg(long, default_value = "Refresh")]
    pub batch: String,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Run identifier
    #[arg(long)]
    pub run_id: String,
    /// Output file (defaults to stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

fn parse_status(raw: &str) -> Result<Status, String> {
    Status::parse(raw).map_err(|err| err.to_string())
}
