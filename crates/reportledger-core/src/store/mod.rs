//! Shared audit store.
//!
//! A single relational table of immutable events, reachable by every
//! dispatch worker. It answers two questions: was artifact X refreshed on
//! date D, and was recipient set Y already emailed subject Z for date D.

mod connection;
mod repository;

pub use connection::{CONNECTION_ENV_VAR, ConnectionSettings, Provider, SslMode};
pub use repository::{AuditStore, SentLookup};
