//! SMTP delivery of report emails.

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reportledger_core::{DispatchCandidate, RecipientSet, Sender, TransportError};
use tracing::debug;

use crate::config::{Security, SmtpConfig};

/// Body template; `{GREETING}` is replaced per email.
const DEFAULT_BODY: &str = "{GREETING},

Please find attached today's report.

This is an automated email. Please do not reply to this message.

With regards,
Report Automation Team
";

const OCTET_STREAM: &str = "application/octet-stream";

/// Salutation for a recipient list: singular for one address, collective
/// otherwise.
#[must_use]
pub fn greeting(to: &RecipientSet) -> &'static str {
    if to.len() == 1 { "Dear Sir" } else { "Dear Team" }
}

/// Plain-text body for `to`.
#[must_use]
pub fn render_body(to: &RecipientSet) -> String {
    DEFAULT_BODY.replace("{GREETING}", greeting(to))
}

fn render_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<pre style='font-family: inherit; white-space: pre-wrap'>{escaped}</pre>")
}

/// MIME type guessed from a file extension.
#[must_use]
pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => "text/csv",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsb" => "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
        "xlsm" => "application/vnd.ms-excel.sheet.macroEnabled.12",
        _ => OCTET_STREAM,
    }
}

fn mailboxes(set: &RecipientSet) -> Result<Vec<Mailbox>, TransportError> {
    set.addresses()
        .iter()
        .map(|address| {
            address
                .parse::<Mailbox>()
                .map_err(|e| TransportError::InvalidAddress(format!("{address}: {e}")))
        })
        .collect()
}

fn classify(error: &lettre::transport::smtp::Error) -> TransportError {
    if error.is_tls() || error.is_timeout() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Send(error.to_string())
    }
}

/// [`Sender`] backed by an async SMTP transport.
pub struct SmtpSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    /// Builds the transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address is invalid or the relay
    /// cannot be configured.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {e}", config.from)))?;

        let builder = match config.security {
            Security::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Connection(e.to_string()))?,
            Security::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Connection(e.to_string()))?,
            Security::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };
        let builder = builder.port(config.port);
        let transport = if config.password.is_empty() {
            builder.build()
        } else {
            builder
                .credentials(Credentials::new(config.from.clone(), config.password.clone()))
                .build()
        };

        Ok(Self { from, transport })
    }

    /// Composes the message for `candidate`, reading its attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is invalid or an attachment cannot be
    /// read.
    pub async fn compose(&self, candidate: &DispatchCandidate) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(candidate.subject.clone());
        for mailbox in mailboxes(&candidate.to)? {
            builder = builder.to(mailbox);
        }
        for mailbox in mailboxes(&candidate.cc)? {
            builder = builder.cc(mailbox);
        }
        for mailbox in mailboxes(&candidate.bcc)? {
            builder = builder.bcc(mailbox);
        }

        let text = render_body(&candidate.to);
        let html = render_html(&text);
        let mut body = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(text, html));

        for path in candidate.attachment_paths() {
            let content = tokio::fs::read(path)
                .await
                .map_err(|e| TransportError::Attachment(format!("{}: {e}", path.display())))?;
            let filename = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            let content_type = ContentType::parse(mime_type_for(path))
                .map_err(|e| TransportError::Attachment(format!("{}: {e}", path.display())))?;
            body = body.singlepart(Attachment::new(filename).body(content, content_type));
        }

        builder
            .multipart(body)
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

impl Sender for SmtpSender {
    async fn send(&self, candidate: &DispatchCandidate) -> Result<(), TransportError> {
        let message = self.compose(candidate).await?;
        let response = self.transport.send(message).await.map_err(|e| classify(&e))?;
        debug!(
            subject = %candidate.subject,
            code = %response.code(),
            "message accepted"
        );
        Ok(())
    }
}
