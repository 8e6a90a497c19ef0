//! Eligibility verdicts and rejection reasons.

use std::fmt;

use chrono::NaiveDate;

/// Separator used when several rejection reasons are recorded together.
pub const REASON_SEPARATOR: &str = "; ";

/// Broad class of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// A required candidate field is missing. Not retriable as-is.
    Validation,
    /// An attachment is not backed by a fresh refresh. Retriable later.
    Staleness,
}

/// One reason a candidate may not be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The recipient set is empty.
    MissingReceiver,
    /// The subject is empty.
    MissingSubject,
    /// An attachment does not exist on the filesystem.
    MissingFile(String),
    /// An attachment has never been refreshed successfully.
    NeverRefreshed(String),
    /// An attachment's last successful refresh is outside the window.
    Stale {
        /// Attachment path.
        path: String,
        /// Earliest accepted refresh date.
        earliest: NaiveDate,
        /// Run date being evaluated.
        run_date: NaiveDate,
        /// Last successful refresh on record.
        last_refresh: NaiveDate,
    },
    /// The refresh inside the window was not delivered by email.
    MethodNotEmail {
        /// Attachment path.
        path: String,
        /// Run date being evaluated.
        run_date: NaiveDate,
    },
}

impl Rejection {
    /// Classifies this rejection.
    #[must_use]
    pub const fn kind(&self) -> RejectionKind {
        match self {
            Self::MissingReceiver | Self::MissingSubject => RejectionKind::Validation,
            Self::MissingFile(_)
            | Self::NeverRefreshed(_)
            | Self::Stale { .. }
            | Self::MethodNotEmail { .. } => RejectionKind::Staleness,
        }
    }

    /// Attachment path this rejection concerns, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::MissingReceiver | Self::MissingSubject => None,
            Self::MissingFile(path)
            | Self::NeverRefreshed(path)
            | Self::Stale { path, .. }
            | Self::MethodNotEmail { path, .. } => Some(path),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReceiver => f.write_str("Missing Receiver"),
            Self::MissingSubject => f.write_str("Missing Subject"),
            Self::MissingFile(path) => write!(f, "Missing file: {path}"),
            Self::NeverRefreshed(path) => {
                write!(f, "No successful refresh found in database: {path}")
            }
            Self::Stale {
                path,
                earliest,
                run_date,
                last_refresh,
            } => {
                if earliest == run_date {
                    write!(f, "File not refreshed for {run_date}. ")?;
                } else {
                    write!(f, "File not refreshed for {earliest}..{run_date}. ")?;
                }
                write!(f, "Last refresh: {last_refresh}: {path}")
            }
            Self::MethodNotEmail { path, run_date } => {
                write!(f, "Method not 'Email' for {run_date}: {path}")
            }
        }
    }
}

/// Outcome of evaluating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The candidate may be sent now.
    Eligible,
    /// The candidate failed validation or freshness checks.
    Rejected(Vec<Rejection>),
    /// An identical send already succeeded in the window.
    AlreadySent(String),
}

impl Verdict {
    /// Returns true for [`Verdict::Eligible`].
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Human-readable explanation recorded on the outcome event.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Eligible => String::new(),
            Self::Rejected(reasons) => reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(REASON_SEPARATOR),
            Self::AlreadySent(reason) => reason.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_join_in_order() {
        let verdict = Verdict::Rejected(vec![
            Rejection::MissingFile("/r/a.csv".into()),
            Rejection::NeverRefreshed("/r/b.csv".into()),
        ]);
        assert_eq!(
            verdict.reason(),
            "Missing file: /r/a.csv; No successful refresh found in database: /r/b.csv"
        );
    }

    #[test]
    fn test_stale_message_for_strict_and_windowed() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let strict = Rejection::Stale {
            path: "/r/a.csv".into(),
            earliest: day,
            run_date: day,
            last_refresh: last,
        };
        assert_eq!(
            strict.to_string(),
            "File not refreshed for 2024-06-10. Last refresh: 2024-06-07: /r/a.csv"
        );

        let windowed = Rejection::Stale {
            path: "/r/a.csv".into(),
            earliest: day.pred_opt().unwrap(),
            run_date: day,
            last_refresh: last,
        };
        assert!(windowed.to_string().starts_with("File not refreshed for 2024-06-09..2024-06-10."));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Rejection::MissingSubject.kind(), RejectionKind::Validation);
        assert_eq!(
            Rejection::MissingFile("x".into()).kind(),
            RejectionKind::Staleness
        );
        assert_eq!(Rejection::MissingReceiver.path(), None);
    }
}
