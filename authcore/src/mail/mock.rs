//! Mock mailer implementation
//!
//! Captures messages in memory so tests can pull verification links back
//! out of them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EmailMessage, MailError, Mailer};

/// Email captured by the mock mailer
#[derive(Debug, Clone)]
pub struct CapturedEmail {
    pub message: EmailMessage,
    pub captured_at: DateTime<Utc>,
}

impl CapturedEmail {
    /// Token at the end of the first link in the body
    ///
    /// Links look like `{verification_url}/{token}`.
    pub fn extract_token(&self) -> Option<String> {
        self.message
            .body
            .split_whitespace()
            .find(|word| word.starts_with("http://") || word.starts_with("https://"))
            .and_then(|link| link.rsplit('/').next())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}

/// Mailer that records instead of sending
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    captured: Arc<Mutex<Vec<CapturedEmail>>>,
    fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// All captured emails, oldest first
    pub fn captured(&self) -> Vec<CapturedEmail> {
        self.captured
            .lock()
            .map(|emails| emails.clone())
            .unwrap_or_default()
    }

    /// Most recent email sent to `to`
    pub fn last_to(&self, to: &str) -> Option<CapturedEmail> {
        self.captured()
            .into_iter()
            .rev()
            .find(|email| email.message.to == to)
    }

    pub fn count(&self) -> usize {
        self.captured().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Delivery("mock mailer set to fail".to_string()));
        }

        let mut emails = self
            .captured
            .lock()
            .map_err(|_| MailError::Delivery("mock mailer lock poisoned".to_string()))?;
        emails.push(CapturedEmail {
            message: message.clone(),
            captured_at: Utc::now(),
        });
        Ok(())
    }
}
