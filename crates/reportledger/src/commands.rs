//! Subcommand handlers.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{FixedOffset, Local, NaiveDate};
use reportledger_core::{
    AuditExporter, AuditStore, DispatchCandidate, DispatchConfig, DispatchPolicy, Dispatcher, Event,
    LookBack, Sender, Summary, TransportError,
};
use tracing::{info, warn};

use crate::cli::{ExportArgs, ExportFormat, RecordRefreshArgs, SendArgs};
use crate::config::AppConfig;
use crate::smtp::SmtpSender;
use crate::source;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn export_offset(config: &AppConfig) -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(config.export_offset_minutes * 60).with_context(|| {
        format!(
            "export offset of {} minutes is out of range",
            config.export_offset_minutes
        )
    })
}

/// Transport used when nothing is delivered. Dry runs never reach it.
struct NoTransport;

impl Sender for NoTransport {
    async fn send(&self, _candidate: &DispatchCandidate) -> Result<(), TransportError> {
        Err(TransportError::Connection("no SMTP transport in dry-run mode".to_string()))
    }
}

async fn run_batch<S: Sender + 'static>(
    store: AuditStore,
    sender: S,
    dispatch: DispatchConfig,
    candidates: Vec<DispatchCandidate>,
) -> Summary {
    Dispatcher::new(store, Arc::new(sender), dispatch)
        .execute(candidates)
        .await
}

/// Exit status for a finished dispatch run.
#[must_use]
pub fn exit_code(summary: &Summary) -> ExitCode {
    if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Builds the dispatch configuration from the environment and flags.
#[must_use]
pub fn dispatch_config(config: &AppConfig, args: &SendArgs, run_date: NaiveDate) -> DispatchConfig {
    let window = args.lookback_days.map_or(config.window, LookBack::days);
    let policy = DispatchPolicy::default()
        .with_window(window)
        .forced(args.force_resend)
        .dry_run(args.dry_run || config.dry_run)
        .require_method_email(args.require_method_email || config.require_method_email)
        .scope_to_attachments(args.scope_attachments);

    DispatchConfig::for_batch(&args.batch, run_date)
        .with_policy(policy)
        .with_master(config.master_path.clone())
        .with_max_parallel(args.max_parallel.unwrap_or(config.max_parallel))
}

/// Runs one dispatch batch.
///
/// Configuration problems are returned as errors before any candidate is
/// processed. Once dispatch starts, the exit code reflects the summary.
///
/// # Errors
///
/// Returns an error if the email list, credentials or store are unusable.
pub async fn send(config: &AppConfig, args: &SendArgs) -> anyhow::Result<ExitCode> {
    let run_date = args.email_date.unwrap_or_else(today);
    let dispatch = dispatch_config(config, args, run_date);

    if !dispatch.policy.dry_run && !config.smtp.has_credentials() {
        bail!("sender credentials missing: set REPORTLEDGER_FROM and REPORTLEDGER_APP_PASSWORD");
    }

    let candidates = source::load_candidates(&args.email_list)?;
    let total = candidates.len();
    let selected: Vec<_> = candidates.into_iter().filter(|c| c.is_selected()).collect();
    info!(
        email_list = %args.email_list.display(),
        rows = total,
        selected = selected.len(),
        "email list loaded"
    );

    let sender = if dispatch.policy.dry_run {
        None
    } else {
        Some(SmtpSender::new(&config.smtp).context("cannot configure SMTP transport")?)
    };
    let parallel = u32::try_from(dispatch.max_parallel).unwrap_or(u32::MAX);
    let store = AuditStore::connect(&config.store, parallel)
        .await
        .context("audit store unavailable")?;

    let run_id = dispatch.run_id.clone();
    let summary = match sender {
        Some(sender) => run_batch(store.clone(), sender, dispatch, selected).await,
        None => run_batch(store.clone(), NoTransport, dispatch, selected).await,
    };

    let export_path = args
        .export
        .clone()
        .unwrap_or_else(|| config.log_dir.join(format!("{run_id}.csv")));
    let exporter = AuditExporter::new(store.clone()).with_offset(export_offset(config)?);
    match exporter.write_csv_file(&run_id, &export_path).await {
        Ok(rows) => info!(path = %export_path.display(), rows, "run exported"),
        Err(e) => warn!(path = %export_path.display(), error = %e, "export failed"),
    }
    store.close().await;

    println!("Summary: {summary}");
    Ok(exit_code(&summary))
}

/// Appends one Refresh event.
///
/// # Errors
///
/// Returns an error if the store is unavailable or rejects the event.
pub async fn record_refresh(config: &AppConfig, args: &RecordRefreshArgs) -> anyhow::Result<ExitCode> {
    let run_date = args.run_date.unwrap_or_else(today);
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| format!("refresh-log_{}", run_date.format("%Y-%m-%d")));
    let event = Event::refresh(&run_id, &args.batch, &args.path, run_date, args.status)
        .with_method(args.method.clone())
        .with_master(config.master_path.clone())
        .with_error(args.error.clone());

    let store = AuditStore::connect(&config.store, 1)
        .await
        .context("audit store unavailable")?;
    let id = store.append(&event).await?;
    store.close().await;

    info!(id, run_id = %run_id, path = %args.path, status = %args.status, "refresh recorded");
    Ok(ExitCode::SUCCESS)
}

/// Writes every event of a run to a file or stdout.
///
/// # Errors
///
/// Returns an error if the store is unavailable or the output cannot be
/// written.
pub async fn export(config: &AppConfig, args: &ExportArgs) -> anyhow::Result<ExitCode> {
    let store = AuditStore::connect(&config.store, 1)
        .await
        .context("audit store unavailable")?;
    let exporter = AuditExporter::new(store.clone()).with_offset(export_offset(config)?);

    let rows = match (&args.out, args.format) {
        (Some(path), ExportFormat::Csv) => exporter.write_csv_file(&args.run_id, path).await?,
        (Some(path), ExportFormat::Json) => {
            let file = create_output(path)?;
            exporter.write_json(&args.run_id, file).await?
        }
        (None, format) => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            match format {
                ExportFormat::Csv => exporter.write_csv(&args.run_id, &mut handle).await?,
                ExportFormat::Json => {
                    let rows = exporter.write_json(&args.run_id, &mut handle).await?;
                    writeln!(handle)?;
                    rows
                }
            }
        }
    };
    store.close().await;

    info!(run_id = %args.run_id, rows, "run exported");
    Ok(ExitCode::SUCCESS)
}

fn create_output(path: &Path) -> anyhow::Result<std::io::BufWriter<std::fs::File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    Ok(std::io::BufWriter::new(file))
}
