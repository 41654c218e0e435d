//! Account service
//!
//! Wires the hasher, token codec, user store and mailer into the account
//! lifecycle: register, verify email, resend the link, log in, and resolve
//! the current user.
//!
//! # Performance
//!
//! - Password hashing and verification run on the blocking thread pool
//! - Signing keys are derived once and shared through `AuthState`

use crate::auth::{Principal, SessionAuthenticator, TokenSource, VerificationWorkflow};
use crate::error::Result;
use crate::mail::EmailMessage;
use crate::repositories::{NewUser, UserRecord};
use crate::state::AuthState;
use authcore_shared::validation::{
    normalize_email, validate_email, validate_password, validate_username,
};
use authcore_shared::{
    AuthError, LoginRequest, RegisterRequest, ResendVerificationRequest, SessionTokens,
    UserProfile, VerificationResponse, VerificationStatus,
};
use secrecy::ExposeSecret;
use tracing::{info, warn};

/// Account lifecycle operations
#[derive(Clone)]
pub struct AccountService {
    state: AuthState,
    sessions: SessionAuthenticator,
    verification: VerificationWorkflow,
}

impl AccountService {
    pub fn new(state: AuthState) -> Self {
        Self {
            sessions: SessionAuthenticator::new(state.clone()),
            verification: VerificationWorkflow::new(state.clone()),
            state,
        }
    }

    pub fn sessions(&self) -> &SessionAuthenticator {
        &self.sessions
    }

    pub fn verification(&self) -> &VerificationWorkflow {
        &self.verification
    }

    /// Register a new, not yet verified account
    ///
    /// The insert is attempted directly; a uniqueness violation from the
    /// store comes back as `DuplicateRegistration`. The verification email
    /// is sent afterwards and a delivery failure does not undo the
    /// registration.
    pub async fn register(&self, request: RegisterRequest) -> Result<UserProfile> {
        let email = normalize_email(&request.email);
        validate_email(&email).map_err(AuthError::Validation)?;
        validate_password(request.password.expose_secret()).map_err(AuthError::Validation)?;

        let username = request
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if let Some(username) = &username {
            validate_username(username).map_err(AuthError::Validation)?;
        }
        let phone_number = request
            .phone_number
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let password_hash = self.state.passwords().hash_async(request.password).await?;

        let user = self
            .state
            .store()
            .insert(NewUser {
                email,
                username,
                phone_number,
                password_hash,
                role: self.state.config().auth.default_role.clone(),
                is_active: false,
                is_verified: false,
            })
            .await?;

        info!(user_id = user.id, email = %user.email, "User registered");

        if let Err(e) = self.send_verification(&user.email).await {
            warn!(user_id = user.id, error = %e, "Verification email not sent");
        }

        Ok(profile(&user))
    }

    /// Log in with email and password
    pub async fn login(&self, request: LoginRequest) -> Result<SessionTokens> {
        self.sessions.login(&request.email, request.password).await
    }

    /// Redeem the token from a verification link
    pub async fn verify_email(&self, token: &str) -> Result<VerificationResponse> {
        self.verification.redeem(token).await
    }

    /// Send a fresh verification link
    pub async fn resend_verification(&self, request: ResendVerificationRequest) -> Result<()> {
        let user = self.find_by_email(&request.email).await?;

        if user.is_verified {
            return Err(AuthError::AlreadyVerified.into());
        }

        self.send_verification(&user.email).await?;
        info!(user_id = user.id, "Verification email re-sent");
        Ok(())
    }

    /// Whether the account behind `email` has confirmed its address, and when
    pub async fn verification_status(&self, email: &str) -> Result<VerificationStatus> {
        let user = self.find_by_email(email).await?;
        Ok(VerificationStatus {
            email: user.email,
            is_verified: user.is_verified,
            verified_at: user.verified_at,
        })
    }

    /// Profile of the authenticated user
    pub async fn current_user(&self, source: TokenSource<'_>) -> Result<UserProfile> {
        let principal = self.sessions.authenticate(source).await?;
        let user = self
            .state
            .store()
            .find_by_id(principal.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(profile(&user))
    }

    /// Authenticate and require `role`
    pub async fn require_role(&self, source: TokenSource<'_>, role: &str) -> Result<Principal> {
        self.sessions.require_role(source, role).await
    }

    async fn find_by_email(&self, email: &str) -> Result<UserRecord> {
        let user = self
            .state
            .store()
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(user)
    }

    async fn send_verification(&self, email: &str) -> Result<()> {
        let token = self.verification.issue_verification_token(email)?;
        let link = self.verification.verification_link(&token);
        let ttl_hours = self.state.config().auth.verification_ttl_secs / 3600;

        let message =
            EmailMessage::verification(email, &self.state.config().mail.from, &link, ttl_hours);
        self.state.mailer().send(&message).await?;
        Ok(())
    }
}

fn profile(user: &UserRecord) -> UserProfile {
    UserProfile {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        role: user.role.clone(),
        is_active: user.is_active,
        is_verified: user.is_verified,
        verified_at: user.verified_at,
        created_at: user.created_at,
    }
}
