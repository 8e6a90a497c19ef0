//! Per-run audit export.

mod report;

pub use report::{AuditExporter, DEFAULT_EXPORT_OFFSET_SECS, EXPORT_COLUMNS, ExportRow};
