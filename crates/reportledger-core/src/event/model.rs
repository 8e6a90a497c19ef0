//! Audit event data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::address::RecipientSet;
use crate::{Error, Result};

/// Pipeline phase that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// An upstream artifact was refreshed.
    Refresh,
    /// A report email was evaluated and dispatched (or not).
    Email,
}

impl Stage {
    /// Parse from database string representation.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown stage names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "refresh" => Ok(Self::Refresh),
            "email" => Ok(Self::Email),
            other => Err(Error::InvalidValue(format!("unknown stage '{other}'"))),
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "Refresh",
            Self::Email => "Email",
        }
    }
}

/// Outcome recorded by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The stage succeeded.
    Ok,
    /// The stage failed; `error_text` explains why.
    Fail,
    /// The stage was deliberately not performed.
    Skip,
}

impl Status {
    /// Parse from database string representation.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown status names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "OK" => Ok(Self::Ok),
            "FAIL" => Ok(Self::Fail),
            "SKIP" => Ok(Self::Skip),
            other => Err(Error::InvalidValue(format!("unknown status '{other}'"))),
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Insertion sequence assigned by the store (`None` before append).
    pub id: Option<i64>,
    /// Execution this event belongs to.
    pub run_id: String,
    /// Logical group of candidates processed together.
    pub batch: String,
    /// Pipeline phase.
    pub stage: Stage,
    /// Creation instant (UTC).
    pub timestamp: DateTime<Utc>,
    /// Logical calendar date of the run.
    pub run_date: NaiveDate,
    /// Master workbook that produced the batch.
    pub master_path: String,
    /// Artifact path, or the `;`-joined attachment list for Email events.
    pub source_path: String,
    /// How the artifact was produced or delivered.
    pub method: String,
    /// Outcome.
    pub status: Status,
    /// Failure or skip reason; empty on OK.
    pub error_text: String,
    /// Whole seconds spent delivering, when measured.
    pub duration_s: Option<i64>,
    /// Canonical recipient list (Email events).
    pub recipients: String,
    /// Exact subject line (Email events).
    pub subject: String,
}

impl Event {
    fn new(
        stage: Stage,
        run_id: impl Into<String>,
        batch: impl Into<String>,
        run_date: NaiveDate,
        status: Status,
    ) -> Self {
        Self {
            id: None,
            run_id: run_id.into(),
            batch: batch.into(),
            stage,
            timestamp: Utc::now(),
            run_date,
            master_path: String::new(),
            source_path: String::new(),
            method: String::new(),
            status,
            error_text: String::new(),
            duration_s: None,
            recipients: String::new(),
            subject: String::new(),
        }
    }

    /// Creates a Refresh event for one artifact.
    #[must_use]
    pub fn refresh(
        run_id: impl Into<String>,
        batch: impl Into<String>,
        source_path: impl Into<String>,
        run_date: NaiveDate,
        status: Status,
    ) -> Self {
        let mut event = Self::new(Stage::Refresh, run_id, batch, run_date, status);
        event.source_path = source_path.into();
        event
    }

    /// Creates an Email event for one candidate.
    #[must_use]
    pub fn email(
        run_id: impl Into<String>,
        batch: impl Into<String>,
        run_date: NaiveDate,
        recipients: &RecipientSet,
        subject: impl Into<String>,
        status: Status,
    ) -> Self {
        let mut event = Self::new(Stage::Email, run_id, batch, run_date, status);
        event.method = "Email".to_string();
        event.recipients = recipients.canonical();
        event.subject = subject.into();
        event
    }

    /// Sets the artifact path (or joined attachment list).
    #[must_use]
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = path.into();
        self
    }

    /// Sets the production/delivery method tag.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the master workbook path.
    #[must_use]
    pub fn with_master(mut self, master_path: impl Into<String>) -> Self {
        self.master_path = master_path.into();
        self
    }

    /// Sets the failure or skip reason.
    #[must_use]
    pub fn with_error(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = error_text.into();
        self
    }

    /// Sets the measured duration.
    #[must_use]
    pub const fn with_duration(mut self, seconds: i64) -> Self {
        self.duration_s = Some(seconds);
        self
    }

    /// Overrides the creation instant.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Checks the fields the store requires before appending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteRejected`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        if self.run_id.trim().is_empty() {
            return Err(Error::WriteRejected("run_id is required".into()));
        }
        if self.batch.trim().is_empty() {
            return Err(Error::WriteRejected("batch is required".into()));
        }
        if self.stage == Stage::Refresh && self.source_path.trim().is_empty() {
            return Err(Error::WriteRejected(
                "source_path is required for Refresh events".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap_or_default()
    }

    #[test]
    fn test_stage_and_status_round_trip_names() {
        assert_eq!(Stage::parse("refresh").ok(), Some(Stage::Refresh));
        assert_eq!(Stage::parse(Stage::Email.as_str()).ok(), Some(Stage::Email));
        assert_eq!(Status::parse("ok").ok(), Some(Status::Ok));
        assert!(Status::parse("PENDING").is_err());
    }

    #[test]
    fn test_email_event_uses_canonical_recipients() {
        let recipients = RecipientSet::parse("b@y.com; a@x.com");
        let event = Event::email("run", "EmailBatch1", date(), &recipients, "Daily", Status::Ok);
        assert_eq!(event.recipients, "a@x.com, b@y.com");
        assert_eq!(event.method, "Email");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_refresh_requires_path() {
        let event = Event::refresh("run", "b", "  ", date(), Status::Ok);
        assert!(matches!(event.validate(), Err(Error::WriteRejected(_))));
    }

    #[test]
    fn test_missing_run_id_is_rejected() {
        let event = Event::refresh("", "b", "/r/a.csv", date(), Status::Ok);
        assert!(matches!(event.validate(), Err(Error::WriteRejected(_))));
    }
}
