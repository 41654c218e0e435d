//! Password hashing using argon2
//!
//! Produces Argon2id PHC strings and verifies against them. Hashes written
//! by older deployments still verify: plain bcrypt (`$2a$`, `$2b$`, `$2y$`)
//! and passlib's `bcrypt_sha256` (`$bcrypt-sha256$`). `needs_rehash` flags
//! both so they can be upgraded on the next successful login.
//!
//! # Performance Considerations
//!
//! Argon2 is intentionally CPU-intensive. Async callers should use
//! `hash_async` / `verify_async`, which run on the blocking thread pool.
//! Nothing here retries; rate limiting belongs to the caller.

use crate::config::HashingConfig;
use crate::error::{Error, Result};
use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use authcore_shared::AuthError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];
const BCRYPT_SHA256_PREFIX: &str = "$bcrypt-sha256$";

/// Password hashing service
///
/// Uses Argon2id with the configured cost parameters. Cloning is cheap.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    params: Params,
    /// Hash checked when there is no user, so the miss costs a full verify
    dummy_hash: Arc<str>,
}

impl PasswordService {
    /// Create a hasher with explicit cost parameters
    pub fn new(config: &HashingConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"authcore-no-such-user", &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(Self {
            argon2,
            params,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Hash a password (blocking operation)
    ///
    /// Empty passwords are rejected; everything else gets a fresh random
    /// salt, so hashing the same password twice yields different strings.
    pub fn hash(&self, password: &str) -> Result<String> {
        if password.is_empty() {
            return Err(Error::Auth(AuthError::Validation(
                "Password cannot be empty".to_string(),
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    /// Hash a password asynchronously (non-blocking)
    pub async fn hash_async(&self, password: SecretString) -> Result<String> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.hash(password.expose_secret()))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))?
    }

    /// Verify a password against a stored hash (blocking operation)
    ///
    /// Comparison is constant time. A mismatch, an empty password or a
    /// stored value that is not a recognisable hash all return `false`.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        if password.is_empty() {
            return false;
        }

        if is_bcrypt(stored) {
            return bcrypt::verify(password, stored).unwrap_or_else(|e| {
                debug!(error = %e, "Stored bcrypt hash could not be checked");
                false
            });
        }

        if let Some(rest) = stored.strip_prefix(BCRYPT_SHA256_PREFIX) {
            return verify_bcrypt_sha256(password, rest).unwrap_or_else(|| {
                debug!("Stored bcrypt-sha256 hash is malformed");
                false
            });
        }

        match PasswordHash::new(stored) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                debug!(error = %e, "Stored password hash is malformed");
                false
            }
        }
    }

    /// Verify a password asynchronously (non-blocking)
    pub async fn verify_async(&self, password: SecretString, stored: String) -> Result<bool> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.verify(password.expose_secret(), &stored))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e).into())
    }

    /// Spend the cost of a verification without a stored hash
    ///
    /// Used when the account does not exist so the response takes as long
    /// as a wrong password would.
    pub async fn verify_dummy_async(&self, password: SecretString) -> Result<()> {
        let stored = self.dummy_hash.to_string();
        self.verify_async(password, stored).await?;
        Ok(())
    }

    /// Whether a stored hash should be replaced with a fresh one
    ///
    /// True for bcrypt hashes, other argon2 variants, and Argon2id hashes
    /// made with different cost parameters.
    pub fn needs_rehash(&self, stored: &str) -> bool {
        if is_bcrypt(stored) || stored.starts_with(BCRYPT_SHA256_PREFIX) {
            return true;
        }

        let Ok(parsed) = PasswordHash::new(stored) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }

        match Params::try_from(&parsed) {
            Ok(params) => {
                params.m_cost() != self.params.m_cost()
                    || params.t_cost() != self.params.t_cost()
                    || params.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

fn is_bcrypt(stored: &str) -> bool {
    BCRYPT_PREFIXES.iter().any(|prefix| stored.starts_with(prefix))
}

/// Check passlib's `bcrypt_sha256` format
///
/// `rest` is what follows `$bcrypt-sha256$`, one of
/// - `v=2,t=2b,r=12$<salt>$<digest>`: key is base64(HMAC-SHA256(salt, password))
/// - `2a,12$<salt>$<digest>`: key is base64(SHA256(password))
///
/// The key is then checked as an ordinary bcrypt password. `None` means the
/// hash could not be parsed.
fn verify_bcrypt_sha256(password: &str, rest: &str) -> Option<bool> {
    let mut parts = rest.split('$');
    let (settings, salt, digest) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || salt.len() != 22 || digest.len() != 31 {
        return None;
    }

    let (ident, rounds, key) = if let Some(v2) = settings.strip_prefix("v=2,") {
        let mut ident = None;
        let mut rounds = None;
        for pair in v2.split(',') {
            match pair.split_once('=')? {
                ("t", value) => ident = Some(value),
                ("r", value) => rounds = value.parse::<u32>().ok(),
                _ => return None,
            }
        }
        let mut mac = Hmac::<Sha256>::new_from_slice(salt.as_bytes()).ok()?;
        mac.update(password.as_bytes());
        (ident?, rounds?, STANDARD.encode(mac.finalize().into_bytes()))
    } else {
        let (ident, rounds) = settings.split_once(',')?;
        let key = STANDARD.encode(Sha256::digest(password.as_bytes()));
        (ident, rounds.parse::<u32>().ok()?, key)
    };

    let bcrypt_hash = format!("${ident}${rounds:02}${salt}{digest}");
    bcrypt::verify(key, &bcrypt_hash).ok()
}
