//! Dispatch candidates.

use std::path::Path;

use crate::event::{RecipientSet, join_paths};

/// One prospective report email awaiting an eligibility decision.
///
/// Candidates carry no history; everything about prior refreshes and sends
/// lives in the audit store.
#[derive(Debug, Clone, Default)]
pub struct DispatchCandidate {
    /// Position in the candidate list (zero-based), used for logging.
    pub index: usize,
    /// Primary recipients.
    pub to: RecipientSet,
    /// Carbon-copy recipients.
    pub cc: RecipientSet,
    /// Blind carbon-copy recipients.
    pub bcc: RecipientSet,
    /// Subject line.
    pub subject: String,
    /// Attachment paths as listed by the candidate source.
    pub attachments: Vec<String>,
    /// Raw upstream "should send" flag, when the source carries one.
    pub should_send: Option<bool>,
}

impl DispatchCandidate {
    /// Creates a candidate with the given recipients and subject.
    #[must_use]
    pub fn new(to: &str, subject: impl Into<String>) -> Self {
        Self {
            to: RecipientSet::parse(to),
            subject: subject.into().trim().to_string(),
            ..Self::default()
        }
    }

    /// Sets the list position.
    #[must_use]
    pub const fn at_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Sets the CC recipients.
    #[must_use]
    pub fn cc(mut self, cc: &str) -> Self {
        self.cc = RecipientSet::parse(cc);
        self
    }

    /// Sets the BCC recipients.
    #[must_use]
    pub fn bcc(mut self, bcc: &str) -> Self {
        self.bcc = RecipientSet::parse(bcc);
        self
    }

    /// Adds an attachment path.
    #[must_use]
    pub fn attach(mut self, path: impl Into<String>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Sets the upstream "should send" flag.
    #[must_use]
    pub const fn with_should_send(mut self, should_send: bool) -> Self {
        self.should_send = Some(should_send);
        self
    }

    /// Whether the upstream selection wants this candidate dispatched.
    ///
    /// Candidates without a flag are always selected.
    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.should_send.unwrap_or(true)
    }

    /// The `;`-joined attachment list recorded on Email events.
    #[must_use]
    pub fn joined_attachments(&self) -> String {
        join_paths(&self.attachments)
    }

    /// Attachment paths as filesystem paths.
    pub fn attachment_paths(&self) -> impl Iterator<Item = &Path> {
        self.attachments.iter().map(Path::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let candidate = DispatchCandidate::new("ops@co.com; cfo@co.com", " Daily ")
            .cc("audit@co.com")
            .attach("/r/a.csv")
            .attach("/r/b.csv");
        assert_eq!(candidate.to.len(), 2);
        assert_eq!(candidate.subject, "Daily");
        assert_eq!(candidate.joined_attachments(), "/r/a.csv;/r/b.csv");
        assert_eq!(candidate.attachment_paths().count(), 2);
        assert!(candidate.is_selected());
        assert!(!candidate.with_should_send(false).is_selected());
    }
}
