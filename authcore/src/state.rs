//! Shared auth state
//!
//! Built once at startup from the loaded configuration and handed to every
//! component. Everything in it is immutable afterwards.
//!
//! # Design Principles
//!
//! 1. **Pre-compute expensive resources**: signing keys and hasher
//!    parameters are derived once
//! 2. **Cheap cloning**: all fields are Arc'd or already Clone-cheap
//! 3. **Read-only**: the secret and TTLs are never re-read per call

use crate::auth::{PasswordService, TokenCodec};
use crate::config::AppConfig;
use crate::error::Result;
use crate::mail::Mailer;
use crate::repositories::UserStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for the credential and token lifecycle
#[derive(Clone)]
pub struct AuthState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Token codec with cached keys
    pub tokens: TokenCodec,
    /// Password hasher with configured cost
    pub passwords: PasswordService,
    /// User store collaborator
    pub store: Arc<dyn UserStore>,
    /// Mail collaborator
    pub mailer: Arc<dyn Mailer>,
}

impl AuthState {
    /// Create the state
    ///
    /// Derives the signing keys from the config secret. Call once at
    /// startup.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let tokens = TokenCodec::new(&config.auth.secret);
        let passwords = PasswordService::new(&config.hashing)?;

        Ok(Self {
            config: Arc::new(config),
            tokens,
            passwords,
            store,
            mailer,
        })
    }

    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[inline]
    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    #[inline]
    pub fn passwords(&self) -> &PasswordService {
        &self.passwords
    }

    #[inline]
    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    #[inline]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    /// Lifetime of session tokens
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.auth.session_ttl_secs)
    }

    /// Lifetime of email verification tokens
    pub fn verification_ttl(&self) -> Duration {
        Duration::from_secs(self.config.auth.verification_ttl_secs)
    }
}
