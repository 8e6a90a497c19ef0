//! The eligibility gate.
//!
//! Checks run in a fixed order and the first failing stage short-circuits:
//! missing fields, then attachment freshness, then duplicate sends. All
//! attachments are checked before failing so every problem is reported at
//! once.

use chrono::NaiveDate;
use tracing::debug;

use super::policy::DispatchPolicy;
use super::verdict::{Rejection, Verdict};
use crate::Result;
use crate::dispatch::DispatchCandidate;
use crate::store::{AuditStore, SentLookup};

/// Decides whether `candidate` may be sent for `run_date` in `batch`.
///
/// The decision depends only on the arguments, the filesystem and the audit
/// store; no wall clock is consulted.
///
/// # Errors
///
/// Returns an error if the audit store cannot be queried.
pub async fn evaluate(
    store: &AuditStore,
    candidate: &DispatchCandidate,
    run_date: NaiveDate,
    batch: &str,
    policy: &DispatchPolicy,
) -> Result<Verdict> {
    if candidate.to.is_empty() {
        return Ok(Verdict::Rejected(vec![Rejection::MissingReceiver]));
    }
    if candidate.subject.trim().is_empty() {
        return Ok(Verdict::Rejected(vec![Rejection::MissingSubject]));
    }

    if policy.force {
        debug!(index = candidate.index, "forced; freshness and duplicate checks bypassed");
        return Ok(Verdict::Eligible);
    }

    let mut problems = Vec::new();
    for path in &candidate.attachments {
        if let Some(problem) = check_attachment(store, path, run_date, policy).await? {
            problems.push(problem);
        }
    }
    if !problems.is_empty() {
        return Ok(Verdict::Rejected(problems));
    }

    let joined = candidate.joined_attachments();
    let lookup = SentLookup {
        recipients: &candidate.to,
        subject: &candidate.subject,
        run_date,
        batch,
        source_paths: policy.scope_to_attachments.then_some(joined.as_str()),
        window: policy.window,
    };
    if store.already_sent_ok(&lookup).await? {
        return Ok(Verdict::AlreadySent(format!(
            "Already emailed for this run (rundate={run_date}, batch={batch})"
        )));
    }

    Ok(Verdict::Eligible)
}

async fn check_attachment(
    store: &AuditStore,
    path: &str,
    run_date: NaiveDate,
    policy: &DispatchPolicy,
) -> Result<Option<Rejection>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Some(Rejection::MissingFile(path.to_string())));
    }

    if !store.refreshed_within(path, run_date, policy.window, false).await? {
        let rejection = match store.latest_refresh_date(path).await? {
            None => Rejection::NeverRefreshed(path.to_string()),
            Some(last_refresh) => Rejection::Stale {
                path: path.to_string(),
                earliest: policy.window.earliest(run_date),
                run_date,
                last_refresh,
            },
        };
        return Ok(Some(rejection));
    }

    if policy.require_method_email
        && !store.refreshed_within(path, run_date, policy.window, true).await?
    {
        return Ok(Some(Rejection::MethodNotEmail {
            path: path.to_string(),
            run_date,
        }));
    }

    Ok(None)
}
