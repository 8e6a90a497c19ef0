//! Dispatch executor.
//!
//! Drives a batch of candidates through the eligibility gate, hands eligible
//! ones to an external [`Sender`], and records one outcome event each.

mod candidate;
mod executor;
mod sender;

pub use candidate::DispatchCandidate;
pub use executor::{
    DRY_RUN_REASON, DispatchConfig, Dispatcher, Outcome, Summary, process, run_id_for,
};
pub use sender::{Sender, TransportError};
