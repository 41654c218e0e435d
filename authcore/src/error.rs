//! Application error handling
//!
//! Unifies the auth taxonomy with store, mail and internal failures and
//! converts any of them into a status code plus `ErrorResponse` body.

use crate::mail::MailError;
use crate::repositories::StoreError;
use authcore_shared::{AuthError, ErrorDetail, ErrorResponse};
use thiserror::Error;
use tracing::error;

/// Error type returned by every authcore operation
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Store error")]
    Store(#[source] StoreError),

    #[error("Mail delivery failed")]
    Mail(#[from] MailError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } => Error::Auth(AuthError::DuplicateRegistration(field)),
            other => Error::Store(other),
        }
    }
}

impl Error {
    /// The auth error, if this is one
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            Error::Auth(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Auth(err) => err.status_code(),
            Error::Mail(_) => 502,
            Error::Store(_) | Error::Internal(_) => 500,
        }
    }

    /// Convert into a status code and response body
    ///
    /// Internal failures are logged here and replaced by a generic message.
    pub fn into_error_response(self) -> (u16, ErrorResponse) {
        let status = self.status_code();
        let (code, message, field) = match &self {
            Error::Auth(err) => {
                let field = match err {
                    AuthError::DuplicateRegistration(field) => Some(field.clone()),
                    _ => None,
                };
                (err.code(), err.to_string(), field)
            }
            Error::Store(err) => {
                error!("Store error: {:?}", err);
                ("STORE_ERROR", "A storage error occurred".to_string(), None)
            }
            Error::Mail(err) => {
                error!("Mail error: {:?}", err);
                ("MAIL_ERROR", "Could not send email".to_string(), None)
            }
            Error::Internal(err) => {
                error!("Internal error: {:?}", err);
                ("INTERNAL_ERROR", "An internal error occurred".to_string(), None)
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field,
            },
        };

        (status, body)
    }
}

/// Result type alias for authcore operations
pub type Result<T> = std::result::Result<T, Error>;
