//! Session authentication
//!
//! Turns a bearer header or cookie into an authenticated [`Principal`]:
//!
//! 1. no token at all -> `MissingToken`
//! 2. bad signature or expired -> `TokenMalformed` / `TokenExpired`
//! 3. not a session token -> `TokenPurposeMismatch`
//! 4. no subject or role in the claims -> `TokenMalformed`
//! 5. subject unknown to the store -> `UserNotFound`
//! 6. user inactive -> `UserInactive`
//!
//! Also performs password login, which is where session tokens come from.

use super::jwt::{Claims, TokenPurpose};
use crate::error::Result;
use crate::repositories::UserRecord;
use crate::state::AuthState;
use authcore_shared::validation::normalize_email;
use authcore_shared::{AuthError, SessionTokens};
use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, info};

/// Where the session token was presented
///
/// A bearer header wins over a cookie when both are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSource<'a> {
    pub bearer: Option<&'a str>,
    pub cookie: Option<&'a str>,
}

impl<'a> TokenSource<'a> {
    pub fn bearer(token: &'a str) -> Self {
        Self {
            bearer: Some(token),
            cookie: None,
        }
    }

    pub fn cookie(token: &'a str) -> Self {
        Self {
            bearer: None,
            cookie: Some(token),
        }
    }

    /// Build from raw `Authorization` and `Cookie` header values
    ///
    /// The `Bearer` scheme is matched case-insensitively. An Authorization
    /// header with any other scheme is ignored so the cookie can still be
    /// used.
    pub fn from_headers(
        authorization: Option<&'a str>,
        cookie_header: Option<&'a str>,
        cookie_name: &str,
    ) -> Self {
        Self {
            bearer: authorization.and_then(parse_bearer),
            cookie: cookie_header.and_then(|header| find_cookie(header, cookie_name)),
        }
    }

    /// The token to use, bearer first
    pub fn token(&self) -> Option<&'a str> {
        self.bearer
            .filter(|t| !t.is_empty())
            .or(self.cookie.filter(|t| !t.is_empty()))
    }
}

fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Fail with `InsufficientRole` unless the principal has `role`
    pub fn require_role(&self, role: &str) -> std::result::Result<&Self, AuthError> {
        if self.has_role(role) {
            Ok(self)
        } else {
            debug!(user_id = self.user_id, required = role, actual = %self.role, "Role check failed");
            Err(AuthError::InsufficientRole)
        }
    }
}

impl From<&UserRecord> for Principal {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
        }
    }
}

/// Session authenticator
#[derive(Clone)]
pub struct SessionAuthenticator {
    state: AuthState,
}

impl SessionAuthenticator {
    pub fn new(state: AuthState) -> Self {
        Self { state }
    }

    /// Check credentials and issue a session token
    ///
    /// Unknown email and wrong password are indistinguishable to the
    /// caller. Hashes in an outdated scheme are replaced on success.
    pub async fn login(&self, email: &str, password: SecretString) -> Result<SessionTokens> {
        let email = normalize_email(email);
        let passwords = self.state.passwords();
        let Some(mut user) = self.state.store().find_by_email(&email).await? else {
            debug!("Login for unknown email");
            passwords.verify_dummy_async(password).await?;
            return Err(AuthError::InvalidCredentials.into());
        };

        let valid = passwords
            .verify_async(password.clone(), user.password_hash.clone())
            .await?;
        if !valid {
            debug!(user_id = user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !user.is_active {
            return Err(AuthError::UserInactive.into());
        }

        if passwords.needs_rehash(&user.password_hash) {
            user.password_hash = passwords.hash_async(password).await?;
            info!(user_id = user.id, "Password hash upgraded");
        }
        user.last_login_at = Some(Utc::now());
        self.state.store().update(&user).await?;

        let ttl = self.state.session_ttl();
        let access_token = self.state.tokens().issue(
            Claims::new(user.id.to_string()).with_role(user.role.clone()),
            ttl,
        )?;

        info!(user_id = user.id, "User logged in");

        Ok(SessionTokens {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            role: user.role,
        })
    }

    /// Resolve the presented token into a principal
    pub async fn authenticate(&self, source: TokenSource<'_>) -> Result<Principal> {
        let token = source.token().ok_or(AuthError::MissingToken)?;

        let claims = self
            .state
            .tokens()
            .decode_for(token, TokenPurpose::Session)?;

        let has_role = claims
            .role
            .as_deref()
            .is_some_and(|role| !role.trim().is_empty());
        if claims.sub.trim().is_empty() || !has_role {
            debug!("Session token lacks subject or role");
            return Err(AuthError::TokenMalformed.into());
        }

        let user = self
            .resolve_subject(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            debug!(user_id = user.id, "Inactive user presented a session token");
            return Err(AuthError::UserInactive.into());
        }

        Ok(Principal::from(&user))
    }

    /// Token source from raw headers, using the configured cookie name
    pub fn source_from_headers<'a>(
        &self,
        authorization: Option<&'a str>,
        cookie_header: Option<&'a str>,
    ) -> TokenSource<'a> {
        TokenSource::from_headers(
            authorization,
            cookie_header,
            &self.state.config().auth.access_token_cookie,
        )
    }

    /// Authenticate from raw `Authorization` and `Cookie` header values
    pub async fn authenticate_headers(
        &self,
        authorization: Option<&str>,
        cookie_header: Option<&str>,
    ) -> Result<Principal> {
        self.authenticate(self.source_from_headers(authorization, cookie_header))
            .await
    }

    /// Authenticate and require a role
    pub async fn require_role(&self, source: TokenSource<'_>, role: &str) -> Result<Principal> {
        let principal = self.authenticate(source).await?;
        principal.require_role(role)?;
        Ok(principal)
    }

    /// Numeric subjects are user ids, anything else is an email
    async fn resolve_subject(&self, sub: &str) -> Result<Option<UserRecord>> {
        let store = self.state.store();
        let user = match sub.parse::<i64>() {
            Ok(id) => store.find_by_id(id).await?,
            Err(_) => store.find_by_email(&normalize_email(sub)).await?,
        };
        Ok(user)
    }
}
