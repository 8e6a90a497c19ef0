//! The external send capability.

use std::future::Future;

use super::candidate::DispatchCandidate;

/// Errors reported by a [`Sender`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Send failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Invalid address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An attachment could not be read or encoded.
    #[error("Attachment error: {0}")]
    Attachment(String),
}

/// Composes and delivers one candidate email.
///
/// Body construction, transport, authentication and retries are entirely
/// the implementor's concern.
pub trait Sender: Send + Sync {
    /// Delivers `candidate`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why delivery failed.
    fn send(
        &self,
        candidate: &DispatchCandidate,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
