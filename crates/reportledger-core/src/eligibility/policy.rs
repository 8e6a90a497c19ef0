//! Dispatch policy knobs.

use chrono::{Days, NaiveDate};

/// Span of calendar dates treated as "current" relative to a run date.
///
/// `LookBack::days(0)` accepts only the run date itself. `LookBack::days(1)`
/// also accepts the previous day, for batches whose refresh and email stages
/// fall on opposite sides of midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LookBack(u32);

impl LookBack {
    /// Same-day only.
    pub const STRICT: Self = Self(0);

    /// Same day or the previous day.
    pub const LENIENT: Self = Self(1);

    /// A window reaching `days` calendar days back from the run date.
    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self(days)
    }

    /// Number of days reached back.
    #[must_use]
    pub const fn span(&self) -> u32 {
        self.0
    }

    /// Returns true for the same-day-only window.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.0 == 0
    }

    /// Earliest date inside the window.
    #[must_use]
    pub fn earliest(&self, run_date: NaiveDate) -> NaiveDate {
        run_date
            .checked_sub_days(Days::new(u64::from(self.0)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Returns true if `date` lies in `[run_date - span, run_date]`.
    #[must_use]
    pub fn contains(&self, run_date: NaiveDate, date: NaiveDate) -> bool {
        date <= run_date && date >= self.earliest(run_date)
    }
}

/// Switches controlling how candidates are gated and delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchPolicy {
    /// Bypass freshness and duplicate checks.
    pub force: bool,
    /// Record eligible candidates as `SKIP`/`DRYRUN` instead of sending.
    pub dry_run: bool,
    /// Require the refresh event to have been delivered by email.
    pub require_method_email: bool,
    /// Window used for both freshness and duplicate-send matching.
    pub window: LookBack,
    /// Scope duplicate detection to the exact attachment list as well.
    pub scope_to_attachments: bool,
}

impl DispatchPolicy {
    /// Same-day freshness and duplicate matching, nothing forced.
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Same-day-or-previous-day matching.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            window: LookBack::LENIENT,
            ..Self::default()
        }
    }

    /// Sets the look-back window.
    #[must_use]
    pub const fn with_window(mut self, window: LookBack) -> Self {
        self.window = window;
        self
    }

    /// Enables or disables forced sending.
    #[must_use]
    pub const fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enables or disables the refresh-method requirement.
    #[must_use]
    pub const fn require_method_email(mut self, require: bool) -> Self {
        self.require_method_email = require;
        self
    }

    /// Enables or disables attachment scoping of the duplicate check.
    #[must_use]
    pub const fn scope_to_attachments(mut self, scope: bool) -> Self {
        self.scope_to_attachments = scope;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap_or_default()
    }

    #[test]
    fn test_strict_window_is_one_day() {
        assert_eq!(LookBack::STRICT.earliest(d(10)), d(10));
        assert!(LookBack::STRICT.contains(d(10), d(10)));
        assert!(!LookBack::STRICT.contains(d(10), d(9)));
    }

    #[test]
    fn test_lenient_window_includes_previous_day() {
        assert_eq!(LookBack::LENIENT.earliest(d(10)), d(9));
        assert!(LookBack::LENIENT.contains(d(10), d(9)));
        assert!(!LookBack::LENIENT.contains(d(10), d(8)));
        assert!(!LookBack::LENIENT.contains(d(10), d(11)));
    }

    #[test]
    fn test_window_crosses_month_boundary() {
        assert_eq!(
            LookBack::LENIENT.earliest(d(1)),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap_or_default()
        );
    }
}
