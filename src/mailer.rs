use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{MailConfig, SmtpConfig, TlsMode};
use crate::error::DeliveryError;
use crate::fanout::NotificationDigest;
use crate::render::DigestRenderer;

/// Delivers one rendered digest to one address.
#[async_trait]
pub trait DigestTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig, from: &str) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(from)?;

        let mut builder = match smtp.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host),
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?,
        }
        .port(smtp.port);

        if let Some((username, password)) = smtp.credentials() {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl DigestTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), DeliveryError> {
        let message = build_message(self.from.clone(), to, subject, html)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|source| DeliveryError::Address {
        address: address.to_string(),
        source,
    })
}

/// A fresh message per recipient, carrying the digest as an HTML alternative.
pub fn build_message(
    from: Mailbox,
    to: &str,
    subject: &str,
    html: String,
) -> Result<Message, DeliveryError> {
    let message = Message::builder()
        .from(from)
        .to(parse_mailbox(to)?)
        .subject(subject)
        .multipart(MultiPart::alternative().singlepart(SinglePart::html(html)))?;
    Ok(message)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Renders and sends every digest. A failure for one address is logged and
/// counted, and the remaining addresses are still processed.
pub async fn dispatch(
    digest: &NotificationDigest<'_>,
    renderer: &DigestRenderer,
    transport: &dyn DigestTransport,
    mail: &MailConfig,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for entry in digest.iter() {
        let html = match renderer.render(&entry.hosts) {
            Ok(html) => html,
            Err(err) => {
                tracing::error!(recipient = %entry.address, error = %err, "Could not render digest.");
                summary.failed += 1;
                continue;
            }
        };

        if !mail.send {
            tracing::debug!(recipient = %entry.address, hosts = entry.hosts.len(), "Sending disabled, digest not sent.");
            summary.skipped += 1;
            continue;
        }

        match transport.send(&entry.address, &mail.subject, html).await {
            Ok(()) => {
                tracing::debug!(recipient = %entry.address, hosts = entry.hosts.len(), "Digest sent.");
                summary.sent += 1;
            }
            Err(err) => {
                tracing::error!(recipient = %entry.address, error = %err, "Could not send email.");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        "Dispatch finished."
    );
    summary
}
