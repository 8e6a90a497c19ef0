//! Eligibility gate: freshness and idempotence checks applied before sending.

mod evaluator;
mod policy;
mod verdict;

pub use evaluator::evaluate;
pub use policy::{DispatchPolicy, LookBack};
pub use verdict::{REASON_SEPARATOR, Rejection, RejectionKind, Verdict};
