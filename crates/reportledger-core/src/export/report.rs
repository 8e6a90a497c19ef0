//! Flat per-run audit report.

use std::io::Write;
use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use futures_util::StreamExt;
use serde::Serialize;

use crate::event::Event;
use crate::store::AuditStore;
use crate::{Error, Result};

/// Fixed column order of the export.
pub const EXPORT_COLUMNS: [&str; 12] = [
    "Timestamp",
    "RunDate",
    "Batch",
    "Stage",
    "Master",
    "FilePath",
    "Method",
    "Status",
    "Error",
    "DurationS",
    "RecipientsTo",
    "Subject",
];

/// Offset, in seconds east of UTC, used for export timestamps by default
/// (UTC+05:30).
pub const DEFAULT_EXPORT_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// One exported event, already rendered to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportRow {
    /// Event time in the export offset, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Run date, `YYYY-MM-DD`.
    pub run_date: String,
    /// Batch label.
    pub batch: String,
    /// Stage name.
    pub stage: String,
    /// Master workbook.
    pub master: String,
    /// Artifact path or attachment list.
    pub file_path: String,
    /// Method tag.
    pub method: String,
    /// Status name.
    pub status: String,
    /// Failure or skip reason.
    pub error: String,
    /// Duration in seconds, empty when not measured.
    #[serde(rename = "DurationS")]
    pub duration_s: String,
    /// Canonical recipients.
    pub recipients_to: String,
    /// Subject line.
    pub subject: String,
}

impl ExportRow {
    /// Renders `event` with timestamps shifted to `offset`.
    #[must_use]
    pub fn from_event(event: &Event, offset: &FixedOffset) -> Self {
        Self {
            timestamp: event
                .timestamp
                .with_timezone(offset)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            run_date: event.run_date.format("%Y-%m-%d").to_string(),
            batch: event.batch.clone(),
            stage: event.stage.as_str().to_string(),
            master: event.master_path.clone(),
            file_path: event.source_path.clone(),
            method: event.method.clone(),
            status: event.status.as_str().to_string(),
            error: event.error_text.clone(),
            duration_s: event.duration_s.map(|s| s.to_string()).unwrap_or_default(),
            recipients_to: event.recipients.clone(),
            subject: event.subject.clone(),
        }
    }

    /// Field values in [`EXPORT_COLUMNS`] order.
    #[must_use]
    pub fn fields(&self) -> [&str; 12] {
        [
            &self.timestamp,
            &self.run_date,
            &self.batch,
            &self.stage,
            &self.master,
            &self.file_path,
            &self.method,
            &self.status,
            &self.error,
            &self.duration_s,
            &self.recipients_to,
            &self.subject,
        ]
    }
}

/// Materializes the events of one run into an ordered flat table.
pub struct AuditExporter {
    store: AuditStore,
    offset: FixedOffset,
}

impl AuditExporter {
    /// Creates an exporter using the default UTC+05:30 rendering offset.
    #[must_use]
    pub fn new(store: AuditStore) -> Self {
        let offset = FixedOffset::east_opt(DEFAULT_EXPORT_OFFSET_SECS)
            .unwrap_or_else(|| Utc.fix());
        Self { store, offset }
    }

    /// Renders timestamps at `offset` instead.
    #[must_use]
    pub const fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Every event of `run_id` (all stages), ordered by timestamp then
    /// insertion sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn export(&self, run_id: &str) -> Result<Vec<ExportRow>> {
        let mut events = std::pin::pin!(self.store.events_for_run(run_id));
        let mut rows = Vec::new();
        while let Some(event) = events.next().await {
            rows.push(ExportRow::from_event(&event?, &self.offset));
        }
        Ok(rows)
    }

    /// Writes the run as CSV (header row first) and returns the row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the writer fails.
    pub async fn write_csv<W: Write>(&self, run_id: &str, writer: W) -> Result<usize> {
        let rows = self.export(run_id).await?;
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(EXPORT_COLUMNS)?;
        for row in &rows {
            csv.write_record(row.fields())?;
        }
        csv.flush()?;
        Ok(rows.len())
    }

    /// Writes the run as a JSON array and returns the row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the writer fails.
    pub async fn write_json<W: Write>(&self, run_id: &str, writer: W) -> Result<usize> {
        let rows = self.export(run_id).await?;
        serde_json::to_writer_pretty(writer, &rows)?;
        Ok(rows.len())
    }

    /// Writes the run as CSV to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub async fn write_csv_file(&self, run_id: &str, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))?;
        self.write_csv(run_id, std::io::BufWriter::new(file)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::event::{RecipientSet, Status};

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    async fn seeded() -> AuditStore {
        let store = AuditStore::in_memory().await.unwrap();
        let refresh = Event::refresh("run-7", "EmailBatch7", "/r/a.csv", d(), Status::Ok)
            .with_method("Email")
            .at(Utc.with_ymd_and_hms(2024, 6, 10, 2, 0, 0).unwrap());
        let email = Event::email(
            "run-7",
            "EmailBatch7",
            d(),
            &RecipientSet::parse("ops@co.com"),
            "Daily, \"final\"",
            Status::Ok,
        )
        .with_master("/m/master.xlsb")
        .with_source_path("/r/a.csv")
        .with_duration(3)
        .at(Utc.with_ymd_and_hms(2024, 6, 10, 20, 0, 0).unwrap());
        let other = Event::refresh("run-8", "EmailBatch8", "/r/b.csv", d(), Status::Fail);

        store.append(&email).await.unwrap();
        store.append(&refresh).await.unwrap();
        store.append(&other).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_export_includes_all_stages_in_order() {
        let exporter = AuditExporter::new(seeded().await);
        let rows = exporter.export("run-7").await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stage, "Refresh");
        assert_eq!(rows[1].stage, "Email");
        assert_eq!(rows[0].timestamp, "2024-06-10 07:30:00");
        // 20:00 UTC crosses midnight at +05:30; the run date does not change.
        assert_eq!(rows[1].timestamp, "2024-06-11 01:30:00");
        assert_eq!(rows[1].run_date, "2024-06-10");
        assert_eq!(rows[1].duration_s, "3");
        assert_eq!(rows[0].duration_s, "");
    }

    #[tokio::test]
    async fn test_csv_has_fixed_header_and_quotes_fields() {
        let exporter = AuditExporter::new(seeded().await)
            .with_offset(FixedOffset::east_opt(0).unwrap());
        let mut buffer = Vec::new();
        let count = exporter.write_csv("run-7", &mut buffer).await.unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        assert_eq!(count, 2);
        assert_eq!(lines.next().unwrap(), EXPORT_COLUMNS.join(","));
        assert!(lines.next().unwrap().starts_with("2024-06-10 02:00:00,2024-06-10,EmailBatch7,Refresh"));
        assert!(lines.next().unwrap().ends_with("ops@co.com,\"Daily, \"\"final\"\"\""));
    }

    #[tokio::test]
    async fn test_empty_run_still_writes_header() {
        let exporter = AuditExporter::new(AuditStore::in_memory().await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("empty.csv");

        let count = exporter.write_csv_file("nothing", &path).await.unwrap();
        assert_eq!(count, 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), EXPORT_COLUMNS.join(","));
    }

    #[tokio::test]
    async fn test_json_uses_column_names() {
        let exporter = AuditExporter::new(seeded().await);
        let mut buffer = Vec::new();
        exporter.write_json("run-7", &mut buffer).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value[1]["RecipientsTo"], "ops@co.com");
        assert_eq!(value[1]["DurationS"], "3");
        assert_eq!(value[0]["FilePath"], "/r/a.csv");
    }
}
