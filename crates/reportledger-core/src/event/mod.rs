//! Audit event model.
//!
//! Events are append-only records of pipeline-stage outcomes. They are the
//! single source of truth for both artifact freshness and prior sends.

mod address;
mod model;

pub use address::{
    PATH_LIST_SEPARATOR, RECIPIENT_SEPARATOR, RecipientSet, join_paths, path_key, split_paths,
    subject_key,
};
pub use model::{Event, Stage, Status};
