//! Outgoing mail
//!
//! The auth core never sends mail on its own. The account service builds a
//! message around a verification link and hands it to a [`Mailer`];
//! delivery (SMTP, SES, ...) lives behind that trait.

mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use mock::{CapturedEmail, MockMailer};

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery error: {0}")]
    Delivery(String),
}

/// Plain-text email message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: String, from: String, subject: String, body: String) -> Self {
        Self {
            to,
            from,
            subject,
            body,
        }
    }

    /// Verification email carrying `link`
    pub fn verification(to: &str, from: &str, link: &str, ttl_hours: u64) -> Self {
        let body = format!(
            "Welcome!\n\n\
             Confirm your email address by opening the link below:\n\n\
             {link}\n\n\
             The link expires in {ttl_hours} hours. If you did not sign up, \
             ignore this message.\n"
        );
        Self::new(
            to.to_string(),
            from.to_string(),
            "Verify your account".to_string(),
            body,
        )
    }
}

/// Mail-sending collaborator
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Mailer that only records a log event
///
/// Used by `authcore register`, which has no delivery configured. The body carries a
/// signed token and is never logged; `authcore issue-token --purpose
/// email_verification` mints an equivalent link by hand.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Email not delivered (log mailer)"
        );
        Ok(())
    }
}
