//! Outbound email. Delivery is best-effort: the dispatcher logs failures
//! and never lets them reach the caller.

pub mod relay;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

pub use relay::HttpMailRelay;

/// A rendered email ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Errors from a mail transport.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request timed out")]
    Timeout,

    #[error("mail request failed: {0}")]
    Request(String),

    #[error("mail relay rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for MailError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// The external mail sender.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Mailer used when no relay is configured: records the message in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "mail relay not configured; email logged only");
        Ok(())
    }
}
