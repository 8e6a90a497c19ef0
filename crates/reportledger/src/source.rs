//! Candidate list loading.
//!
//! The email list is a CSV export of the dispatch sheet: one row per report
//! email, attachments separated by `;`, and an optional `Send` column where
//! `X` marks the rows to dispatch.

use std::io::Read;
use std::path::Path;

use reportledger_core::DispatchCandidate;
use reportledger_core::event::split_paths;
use serde::Deserialize;
use thiserror::Error;

/// Columns every email list must carry.
const REQUIRED_COLUMNS: [&str; 4] = ["Receiver", "CC", "BCC", "Subject"];

/// Optional selection column.
const SEND_COLUMN: &str = "Send";

/// Accepted spellings of the attachment column.
const ATTACHMENT_COLUMNS: [&str; 2] = ["Attachement Path", "Attachment Path"];

/// Errors while loading the email list.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be opened.
    #[error("cannot open email list {path}: {source}")]
    Open {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Required columns are absent from the header row.
    #[error("email list is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A row could not be parsed.
    #[error("malformed email list: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct EmailRow {
    #[serde(rename = "Receiver", default)]
    receiver: String,
    #[serde(rename = "CC", default)]
    cc: String,
    #[serde(rename = "BCC", default)]
    bcc: String,
    #[serde(rename = "Subject", default)]
    subject: String,
    #[serde(rename = "Attachment Path", alias = "Attachement Path", default)]
    attachments: String,
    #[serde(rename = "Send", default)]
    send: Option<String>,
}

impl EmailRow {
    fn is_blank(&self) -> bool {
        [&self.receiver, &self.cc, &self.bcc, &self.subject, &self.attachments]
            .iter()
            .all(|field| field.is_empty())
    }

    fn into_candidate(self, index: usize, has_send_column: bool) -> DispatchCandidate {
        let mut candidate = DispatchCandidate::new(&self.receiver, self.subject)
            .at_index(index)
            .cc(&self.cc)
            .bcc(&self.bcc);
        for path in split_paths(&self.attachments) {
            candidate = candidate.attach(path);
        }
        if has_send_column {
            let marked = self.send.is_some_and(|flag| flag.eq_ignore_ascii_case("x"));
            candidate.with_should_send(marked)
        } else {
            candidate
        }
    }
}

/// Loads every row of the email list at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is
/// missing, or a row is malformed.
pub fn load_candidates(path: &Path) -> Result<Vec<DispatchCandidate>, SourceError> {
    let file = std::fs::File::open(path).map_err(|source| SourceError::Open {
        path: path.display().to_string(),
        source,
    })?;
    read_candidates(file)
}

/// Parses an email list from any reader.
///
/// Rows whose fields are all empty are ignored. Rows are numbered by their
/// position among the remaining rows.
///
/// # Errors
///
/// Returns an error if a required column is missing or a row is malformed.
pub fn read_candidates<R: Read>(reader: R) -> Result<Vec<DispatchCandidate>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let has = |name: &str| headers.iter().any(|h| h == name);
    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !has(**column))
        .map(|column| (*column).to_string())
        .collect();
    if !ATTACHMENT_COLUMNS.iter().any(|column| has(*column)) {
        missing.push(ATTACHMENT_COLUMNS[0].to_string());
    }
    if !missing.is_empty() {
        return Err(SourceError::MissingColumns(missing));
    }
    let has_send_column = has(SEND_COLUMN);

    let mut candidates = Vec::new();
    for record in csv_reader.deserialize::<EmailRow>() {
        let row = record?;
        if row.is_blank() {
            continue;
        }
        candidates.push(row.into_candidate(candidates.len(), has_send_column));
    }
    Ok(candidates)
}
