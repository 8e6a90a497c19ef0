//! # reportledger-core
//!
//! Dispatch gate for recurring report emails.
//!
//! This crate provides:
//! - **Audit Store** - shared append-only log of refresh and email events
//! - **Eligibility Gate** - freshness and duplicate-send checks against a run date
//! - **Dispatcher** - concurrent evaluation and delivery of a candidate batch
//! - **Audit Export** - flat, ordered per-run report of every recorded event

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod eligibility;
mod error;
pub mod event;
pub mod export;
pub mod store;

pub use dispatch::{
    DispatchCandidate, DispatchConfig, Dispatcher, Outcome, Sender, Summary, TransportError,
};
pub use eligibility::{DispatchPolicy, LookBack, Rejection, RejectionKind, Verdict, evaluate};
pub use error::{Error, Result};
pub use event::{Event, RecipientSet, Stage, Status};
pub use export::{AuditExporter, EXPORT_COLUMNS, ExportRow};
pub use store::{AuditStore, ConnectionSettings, SentLookup};
