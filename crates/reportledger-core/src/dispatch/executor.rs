//! Concurrent dispatch of a candidate batch.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::candidate::DispatchCandidate;
use super::sender::Sender;
use crate::eligibility::{DispatchPolicy, Verdict, evaluate};
use crate::event::{Event, Status};
use crate::store::AuditStore;
use crate::Result;

/// Reason recorded for eligible candidates in dry-run mode.
pub const DRY_RUN_REASON: &str = "DRYRUN";

/// Explicit configuration for one dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Identifier that scopes every event of this run.
    pub run_id: String,
    /// Batch label recorded on events and used to scope duplicate checks.
    pub batch: String,
    /// Logical date of the run.
    pub run_date: NaiveDate,
    /// Master workbook recorded on events.
    pub master_path: String,
    /// Gate and delivery switches.
    pub policy: DispatchPolicy,
    /// Maximum number of candidates processed at once.
    pub max_parallel: usize,
}

impl DispatchConfig {
    /// Configuration for a numbered email batch on `run_date`.
    ///
    /// The run id is `email-log_<date>_Batch-<n>` and the batch label
    /// `EmailBatch<n>`.
    #[must_use]
    pub fn for_batch(batch: &str, run_date: NaiveDate) -> Self {
        Self {
            run_id: run_id_for(batch, run_date),
            batch: format!("EmailBatch{batch}"),
            run_date,
            master_path: String::new(),
            policy: DispatchPolicy::default(),
            max_parallel: 1,
        }
    }

    /// Sets the policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the master workbook path.
    #[must_use]
    pub fn with_master(mut self, master_path: impl Into<String>) -> Self {
        self.master_path = master_path.into();
        self
    }

    /// Sets the parallelism (at least one).
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }
}

/// Run identifier for a numbered email batch.
#[must_use]
pub fn run_id_for(batch: &str, run_date: NaiveDate) -> String {
    format!("email-log_{}_Batch-{batch}", run_date.format("%Y-%m-%d"))
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not sent: already sent, or dry run.
    Skipped(String),
    /// Not sent: failed validation or freshness checks.
    Rejected(String),
    /// Delivered.
    Sent,
    /// Delivery attempted and failed.
    SendFailed(String),
}

impl Outcome {
    /// Status recorded for this outcome.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Skipped(_) => Status::Skip,
            Self::Rejected(_) | Self::SendFailed(_) => Status::Fail,
            Self::Sent => Status::Ok,
        }
    }

    /// Reason recorded for this outcome (empty when sent).
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Skipped(reason) | Self::Rejected(reason) | Self::SendFailed(reason) => reason,
            Self::Sent => "",
        }
    }
}

/// Per-run outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Candidates delivered.
    pub ok: usize,
    /// Candidates rejected or whose delivery failed.
    pub fail: usize,
    /// Candidates skipped.
    pub skip: usize,
    /// Candidates left without an outcome event because the store failed.
    pub unrecorded: usize,
}

impl Summary {
    /// Counts one outcome.
    pub const fn record(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Fail => self.fail += 1,
            Status::Skip => self.skip += 1,
        }
    }

    /// Returns true if any candidate failed or went unrecorded.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.fail > 0 || self.unrecorded > 0
    }

    /// Total candidates accounted for.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.ok + self.fail + self.skip + self.unrecorded
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OK={} FAIL={} SKIP={}", self.ok, self.fail, self.skip)?;
        if self.unrecorded > 0 {
            write!(f, " UNRECORDED={}", self.unrecorded)?;
        }
        Ok(())
    }
}

/// Applies the eligibility gate to a batch and delivers eligible candidates.
///
/// Every candidate is an independent unit of work: it is evaluated, possibly
/// sent, and then exactly one outcome event is appended. Candidates run in
/// parallel up to `max_parallel`; no ordering holds between them.
pub struct Dispatcher<S> {
    store: AuditStore,
    sender: Arc<S>,
    config: Arc<DispatchConfig>,
}

impl<S: Sender + 'static> Dispatcher<S> {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(store: AuditStore, sender: Arc<S>, config: DispatchConfig) -> Self {
        Self {
            store,
            sender,
            config: Arc::new(config),
        }
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Processes every candidate and returns the outcome counts.
    ///
    /// Per-candidate problems become events; they never abort the batch. A
    /// candidate whose store access fails is left without an event and
    /// counted as unrecorded.
    pub async fn execute(&self, candidates: Vec<DispatchCandidate>) -> Summary {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            run_id = %self.config.run_id,
            batch = %self.config.batch,
            run_date = %self.config.run_date,
            candidates = candidates.len(),
            parallel = self.config.max_parallel,
            force = self.config.policy.force,
            dry_run = self.config.policy.dry_run,
            "dispatching batch"
        );

        for candidate in candidates {
            let permits = Arc::clone(&permits);
            let store = self.store.clone();
            let sender = Arc::clone(&self.sender);
            let config = Arc::clone(&self.config);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = process(&store, sender.as_ref(), &config, &candidate).await;
                (candidate, result)
            });
        }

        let mut summary = Summary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((candidate, Ok(outcome))) => {
                    log_outcome(&candidate, &outcome);
                    summary.record(outcome.status());
                }
                Ok((candidate, Err(e))) => {
                    error!(
                        email = candidate.index + 1,
                        error = %e,
                        "no outcome recorded; candidate must be retried"
                    );
                    summary.unrecorded += 1;
                }
                Err(e) => {
                    error!(error = %e, "dispatch task aborted");
                    summary.unrecorded += 1;
                }
            }
        }

        info!(run_id = %self.config.run_id, "Summary: {summary}");
        summary
    }
}

/// Drives one candidate from pending to its terminal state.
///
/// The eligibility check happens before the send, and the send before the
/// outcome append.
///
/// # Errors
///
/// Returns an error if the audit store fails; no event is recorded then.
pub async fn process<S: Sender>(
    store: &AuditStore,
    sender: &S,
    config: &DispatchConfig,
    candidate: &DispatchCandidate,
) -> Result<Outcome> {
    let verdict = evaluate(
        store,
        candidate,
        config.run_date,
        &config.batch,
        &config.policy,
    )
    .await?;

    let mut duration = None;
    let outcome = match verdict {
        Verdict::AlreadySent(reason) => Outcome::Skipped(reason),
        rejected @ Verdict::Rejected(_) => Outcome::Rejected(rejected.reason()),
        Verdict::Eligible if config.policy.dry_run => Outcome::Skipped(DRY_RUN_REASON.into()),
        Verdict::Eligible => {
            if config.policy.force {
                info!(email = candidate.index + 1, "force resend, bypassing all validations");
            }
            let started = Instant::now();
            let sent = sender.send(candidate).await;
            duration = Some(i64::try_from(started.elapsed().as_secs()).unwrap_or(i64::MAX));
            match sent {
                Ok(()) => Outcome::Sent,
                Err(e) => Outcome::SendFailed(e.to_string()),
            }
        }
    };

    let mut event = Event::email(
        &config.run_id,
        &config.batch,
        config.run_date,
        &candidate.to,
        &candidate.subject,
        outcome.status(),
    )
    .with_master(&config.master_path)
    .with_source_path(candidate.joined_attachments())
    .with_error(outcome.reason());
    if let Some(seconds) = duration {
        event = event.with_duration(seconds);
    }
    store.append(&event).await?;

    Ok(outcome)
}

fn log_outcome(candidate: &DispatchCandidate, outcome: &Outcome) {
    let email = candidate.index + 1;
    match outcome {
        Outcome::Sent => info!(email, to = %candidate.to, "OK"),
        Outcome::Skipped(reason) => info!(email, reason = %reason, "SKIP"),
        Outcome::Rejected(reason) | Outcome::SendFailed(reason) => {
            warn!(email, reason = %reason, "FAIL");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::dispatch::TransportError;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
        fail_with: Option<TransportError>,
    }

    impl Sender for Recording {
        async fn send(
            &self,
            candidate: &DispatchCandidate,
        ) -> std::result::Result<(), TransportError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.sent.lock().unwrap().push(candidate.subject.clone());
            Ok(())
        }
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn test_run_id_and_batch_label() {
        let config = DispatchConfig::for_batch("3", run_date());
        assert_eq!(config.run_id, "email-log_2024-06-10_Batch-3");
        assert_eq!(config.batch, "EmailBatch3");
        assert_eq!(config.with_max_parallel(0).max_parallel, 1);
    }

    #[test]
    fn test_summary_display() {
        let mut summary = Summary::default();
        summary.record(Status::Ok);
        summary.record(Status::Fail);
        summary.record(Status::Skip);
        summary.record(Status::Skip);
        assert_eq!(summary.to_string(), "OK=1 FAIL=1 SKIP=2");
        assert!(summary.has_failures());
        assert_eq!(summary.total(), 4);
    }

    #[tokio::test]
    async fn test_dry_run_records_skip_without_sending() {
        let store = AuditStore::in_memory().await.unwrap();
        let sender = Recording::default();
        let config = DispatchConfig::for_batch("1", run_date())
            .with_policy(DispatchPolicy::strict().forced(true).dry_run(true));
        let candidate = DispatchCandidate::new("ops@co.com", "Daily");

        let outcome = process(&store, &sender, &config, &candidate).await.unwrap();
        assert_eq!(outcome, Outcome::Skipped(DRY_RUN_REASON.into()));
        assert!(sender.sent.lock().unwrap().is_empty());
        assert_eq!(store.count_for_run(&config.run_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_recorded_as_fail() {
        let store = AuditStore::in_memory().await.unwrap();
        let sender = Recording {
            fail_with: Some(TransportError::Connection("refused".into())),
            ..Recording::default()
        };
        let config = DispatchConfig::for_batch("1", run_date())
            .with_policy(DispatchPolicy::strict().forced(true));
        let candidate = DispatchCandidate::new("ops@co.com", "Daily");

        let outcome = process(&store, &sender, &config, &candidate).await.unwrap();
        assert_eq!(outcome, Outcome::SendFailed("Connection failed: refused".into()));
        assert_eq!(outcome.status(), Status::Fail);
    }

    #[tokio::test]
    async fn test_rejected_candidate_never_reaches_sender() {
        let store = AuditStore::in_memory().await.unwrap();
        let sender = Arc::new(Recording::default());
        let config = DispatchConfig::for_batch("1", run_date()).with_max_parallel(4);
        let dispatcher = Dispatcher::new(store, Arc::clone(&sender), config);

        let summary = dispatcher
            .execute(vec![
                DispatchCandidate::new("", "Daily").at_index(0),
                DispatchCandidate::new("ops@co.com", "").at_index(1),
            ])
            .await;
        assert_eq!(summary.fail, 2);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_candidate_unrecorded() {
        let store = AuditStore::in_memory().await.unwrap();
        store.close().await;
        let sender = Arc::new(Recording::default());
        let config = DispatchConfig::for_batch("1", run_date());
        let dispatcher = Dispatcher::new(store, Arc::clone(&sender), config);

        let summary = dispatcher
            .execute(vec![DispatchCandidate::new("ops@co.com", "Daily")])
            .await;
        assert_eq!(summary.unrecorded, 1);
        assert_eq!(summary.total(), 1);
        assert!(summary.has_failures());
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
