//! Error types for the credential and token lifecycle

use thiserror::Error;

/// Authentication and account error types
///
/// Every variant is recoverable by the caller; none of them should take the
/// process down. `status_code` gives the HTTP status a service boundary is
/// expected to answer with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    MissingToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenMalformed,

    #[error("Token not valid for this purpose")]
    TokenPurposeMismatch,

    #[error("User not found")]
    UserNotFound,

    #[error("Inactive user")]
    UserInactive,

    #[error("Insufficient permissions")]
    InsufficientRole,

    #[error("{0} already registered")]
    DuplicateRegistration(String),

    #[error("Account already verified")]
    AlreadyVerified,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AuthError {
    /// HTTP status this error maps to at a service boundary
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenPurposeMismatch => 401,
            AuthError::UserInactive | AuthError::InsufficientRole => 403,
            AuthError::UserNotFound => 404,
            AuthError::DuplicateRegistration(_) => 409,
            AuthError::AlreadyVerified | AuthError::Validation(_) => 400,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::MissingToken => "NOT_AUTHENTICATED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenMalformed => "TOKEN_INVALID",
            AuthError::TokenPurposeMismatch => "TOKEN_PURPOSE_MISMATCH",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::UserInactive => "USER_INACTIVE",
            AuthError::InsufficientRole => "INSUFFICIENT_PERMISSIONS",
            AuthError::DuplicateRegistration(_) => "DUPLICATE_REGISTRATION",
            AuthError::AlreadyVerified => "ALREADY_VERIFIED",
            AuthError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// Whether the user can fix this by requesting a new token
    pub fn is_resendable(&self) -> bool {
        matches!(self, AuthError::TokenExpired)
    }
}
