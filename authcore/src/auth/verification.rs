//! Email verification workflow
//!
//! Verification tokens are ordinary signed tokens with
//! `purpose = "email_verification"`, `sub = email` and their own TTL.
//! Redemption activates the account exactly once; redeeming again is a
//! no-op that still succeeds.

use super::jwt::{Claims, TokenPurpose};
use crate::error::Result;
use crate::state::AuthState;
use authcore_shared::validation::normalize_email;
use authcore_shared::{AuthError, VerificationResponse};
use tracing::{debug, info};

#[derive(Clone)]
pub struct VerificationWorkflow {
    state: AuthState,
}

impl VerificationWorkflow {
    pub fn new(state: AuthState) -> Self {
        Self { state }
    }

    /// Issue a verification token for `email`
    pub fn issue_verification_token(&self, email: &str) -> Result<String> {
        let claims =
            Claims::new(normalize_email(email)).with_purpose(TokenPurpose::EmailVerification);
        self.state
            .tokens()
            .issue(claims, self.state.verification_ttl())
    }

    /// Link the mailer sends: `{verification_url}/{token}`
    pub fn verification_link(&self, token: &str) -> String {
        let base = self.state.config().mail.verification_url.trim_end_matches('/');
        format!("{base}/{token}")
    }

    /// Redeem a verification token
    ///
    /// Only tokens issued for email verification are accepted. The
    /// response says whether this call activated the account.
    pub async fn redeem(&self, token: &str) -> Result<VerificationResponse> {
        let claims = self
            .state
            .tokens()
            .decode_for(token, TokenPurpose::EmailVerification)?;

        let email = normalize_email(&claims.sub);
        let user = self
            .state
            .store()
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.is_verified {
            debug!(user_id = user.id, "Account already verified");
            return Ok(VerificationResponse {
                email,
                newly_verified: false,
            });
        }

        let newly_verified = self.state.store().activate(user.id).await?;
        if newly_verified {
            info!(user_id = user.id, "Account verified");
        }

        Ok(VerificationResponse {
            email,
            newly_verified,
        })
    }
}

/// User-facing message for a failed redemption
///
/// Only an expired link suggests requesting a new one.
pub fn link_failure_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::TokenExpired => "link expired",
        AuthError::UserNotFound => "account not found",
        _ => "invalid link",
    }
}
