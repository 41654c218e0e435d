//! Signed token issuance and validation
//!
//! Tokens are HS256 JWTs: three base64url segments (header, claims,
//! signature) joined by `.`. Only `sub` and `exp` are required on decode;
//! tokens issued here also carry `iat` and `jti`. `role`, `purpose` and
//! any extra fields are optional.
//!
//! Decoding checks the signature before anything else and only then looks
//! at `exp`, so an expired token that was genuinely ours is reported as
//! `TokenExpired` while a forged or damaged one is `TokenMalformed`.
//!
//! There is a single shared secret and no revocation list: leaking the
//! secret invalidates every outstanding token.

use crate::error::Result;
use anyhow::anyhow;
use authcore_shared::AuthError;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Claim names owned by [`Claims`] fields, never taken from `extra`
const RESERVED_CLAIMS: [&str; 6] = ["sub", "exp", "iat", "role", "purpose", "jti"];

/// What a token may be used for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Session token, the default when the claim is absent
    #[default]
    Session,
    EmailVerification,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID for sessions, email for verification links)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp), 0 when the issuer left it out
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub purpose: TokenPurpose,
    /// JWT ID, unique per issued token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Any further claims, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Claims for a subject; `exp`/`iat` are filled in at issuance
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            exp: 0,
            iat: 0,
            role: None,
            purpose: TokenPurpose::Session,
            jti: None,
            extra: Map::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_purpose(mut self, purpose: TokenPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    /// Attach an extra claim
    ///
    /// Names of the typed claims (`sub`, `exp`, `role`, ...) are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if RESERVED_CLAIMS.contains(&key.as_str()) {
            debug!(claim = %key, "Reserved claim name ignored in extra claims");
        } else {
            self.extra.insert(key, value);
        }
        self
    }

    /// Expiry as a UTC instant
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.exp, 0)
    }
}

/// Pre-computed signing keys
/// These are derived once from the secret and shared behind an Arc
#[derive(Clone)]
pub struct TokenKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl TokenKeys {
    /// Create keys from the secret
    /// This should be called once at startup
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: Arc::new(EncodingKey::from_secret(bytes)),
            decoding: Arc::new(DecodingKey::from_secret(bytes)),
        }
    }
}

/// Token codec: issues and validates signed tokens
///
/// Holds nothing but the immutable keys, so it is cheap to clone and safe
/// to share between threads.
#[derive(Clone)]
pub struct TokenCodec {
    keys: TokenKeys,
    validation: Arc<Validation>,
}

impl TokenCodec {
    pub fn new(secret: &SecretString) -> Self {
        Self::from_keys(TokenKeys::new(secret))
    }

    pub fn from_keys(keys: TokenKeys) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand after the signature, with no leeway
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "sub".to_string()]);

        Self {
            keys,
            validation: Arc::new(validation),
        }
    }

    /// Sign `claims` with `exp = now + ttl`
    ///
    /// `iat` is set to now and a fresh `jti` is assigned; any `exp`, `iat`
    /// or `jti` already present in `claims` is overwritten. Extra claims
    /// named like a typed claim are dropped.
    pub fn issue(&self, claims: Claims, ttl: Duration) -> Result<String> {
        self.issue_at(claims, ttl, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        mut claims: Claims,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| anyhow!("Token TTL out of range: {}", e))?;
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow!("Token expiry overflows"))?;

        claims.iat = now.timestamp();
        claims.exp = exp.timestamp();
        claims.jti = Some(Uuid::new_v4().to_string());
        // A reserved name in `extra` would be serialized twice
        claims
            .extra
            .retain(|key, _| !RESERVED_CLAIMS.contains(&key.as_str()));

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| anyhow!("Failed to sign token: {}", e))?;
        Ok(token)
    }

    /// Verify a token and return its claims
    pub fn decode(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        self.decode_at(token, Utc::now())
    }

    /// Verify a token against an explicit "now"
    pub fn decode_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.keys.decoding, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                AuthError::TokenMalformed
            })?
            .claims;

        if claims.exp <= now.timestamp() {
            debug!(sub = %claims.sub, exp = claims.exp, "Token expired");
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Decode and require a specific purpose
    pub fn decode_for(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> std::result::Result<Claims, AuthError> {
        let claims = self.decode(token)?;
        if claims.purpose != purpose {
            debug!(expected = ?purpose, actual = ?claims.purpose, "Token purpose mismatch");
            return Err(AuthError::TokenPurposeMismatch);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use proptest::prelude::*;
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    fn create_test_codec() -> TokenCodec {
        TokenCodec::new(&SecretString::new("test-secret".to_string()))
    }

    #[test]
    fn test_issue_and_decode_round_trip() {
        let codec = create_test_codec();
        let token = codec
            .issue(Claims::new("42").with_role("customer"), HOUR)
            .unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role.as_deref(), Some("customer"));
        assert_eq!(claims.purpose, TokenPurpose::Session);
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_exp_is_now_plus_ttl() {
        let codec = create_test_codec();
        let now = Utc::now();
        let token = codec.issue_at(Claims::new("1"), HOUR, now).unwrap();

        let claims = codec.decode_at(&token, now).unwrap();
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 3600);
    }

    #[test]
    fn test_zero_ttl_expires() {
        let codec = create_test_codec();
        let now = Utc::now();
        let token = codec.issue_at(Claims::new("42"), Duration::ZERO, now).unwrap();

        let later = now + chrono::Duration::seconds(1);
        assert_eq!(codec.decode_at(&token, later), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_expired_after_ttl_elapses() {
        let codec = create_test_codec();
        let now = Utc::now();
        let token = codec.issue_at(Claims::new("42"), HOUR, now).unwrap();

        let before = now + chrono::Duration::seconds(3599);
        let after = now + chrono::Duration::seconds(3601);
        assert!(codec.decode_at(&token, before).is_ok());
        assert_eq!(codec.decode_at(&token, after), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret_is_malformed_not_expired() {
        let codec = create_test_codec();
        let other = TokenCodec::new(&SecretString::new("another-secret".to_string()));
        let now = Utc::now();
        let token = codec.issue_at(Claims::new("42"), Duration::ZERO, now).unwrap();

        // Expired and foreign: the signature failure wins
        let later = now + chrono::Duration::seconds(10);
        assert_eq!(other.decode_at(&token, later), Err(AuthError::TokenMalformed));
        assert_eq!(codec.decode_at(&token, later), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = create_test_codec();
        assert_eq!(codec.decode(""), Err(AuthError::TokenMalformed));
        assert_eq!(codec.decode("invalid.token.here"), Err(AuthError::TokenMalformed));
        assert_eq!(codec.decode("a.b"), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let codec = create_test_codec();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let exp = Utc::now().timestamp() + 3600;
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{},"iat":0}}"#, exp));
        let token = format!("{}.{}.", header, payload);

        assert_eq!(codec.decode(&token), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_missing_exp_rejected() {
        let secret = "test-secret";
        let codec = create_test_codec();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "1" }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        assert_eq!(codec.decode(&token), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_wire_format() {
        let codec = create_test_codec();
        let token = codec.issue(Claims::new("42"), HOUR).unwrap();

        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        let payload = URL_SAFE_NO_PAD.decode(segments[1]).unwrap();
        let payload: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(payload["sub"], "42");
        assert!(payload["exp"].is_i64());
        assert_eq!(payload["purpose"], "session");
    }

    #[test]
    fn test_extra_claims_round_trip() {
        let codec = create_test_codec();
        let claims = Claims::new("7")
            .with_extra("tenant", json!("acme"))
            .with_extra("scopes", json!(["read", "write"]));
        let token = codec.issue(claims, HOUR).unwrap();

        let decoded = codec.decode(&token).unwrap();
        assert_eq!(decoded.extra["tenant"], "acme");
        assert_eq!(decoded.extra["scopes"], json!(["read", "write"]));
    }

    #[test]
    fn test_decode_for_purpose() {
        let codec = create_test_codec();
        let session = codec.issue(Claims::new("1"), HOUR).unwrap();
        let verification = codec
            .issue(
                Claims::new("a@x.com").with_purpose(TokenPurpose::EmailVerification),
                HOUR,
            )
            .unwrap();

        assert!(codec.decode_for(&session, TokenPurpose::Session).is_ok());
        assert_eq!(
            codec.decode_for(&session, TokenPurpose::EmailVerification),
            Err(AuthError::TokenPurposeMismatch)
        );
        assert_eq!(
            codec.decode_for(&verification, TokenPurpose::Session),
            Err(AuthError::TokenPurposeMismatch)
        );
    }

    #[test]
    fn test_absent_purpose_means_session() {
        let secret = "test-secret";
        let codec = create_test_codec();
        let exp = Utc::now().timestamp() + 3600;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "1", "exp": exp, "role": "admin" }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let claims = codec.decode_for(&token, TokenPurpose::Session).unwrap();
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_minimal_claims_decode() {
        let secret = "test-secret";
        let codec = create_test_codec();
        let exp = Utc::now().timestamp() + 3600;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "42", "exp": exp }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.iat, 0);
        assert!(claims.role.is_none());
        assert!(claims.jti.is_none());
    }

    #[test]
    fn test_reserved_extra_claims_do_not_break_decoding() {
        let codec = create_test_codec();
        let claims = Claims::new("42")
            .with_role("customer")
            .with_extra("role", json!("admin"))
            .with_extra("tenant", json!("acme"));
        assert!(!claims.extra.contains_key("role"));
        let token = codec.issue(claims, HOUR).unwrap();

        let decoded = codec.decode(&token).unwrap();
        assert_eq!(decoded.role.as_deref(), Some("customer"));
        assert_eq!(decoded.extra["tenant"], "acme");
    }

    #[test]
    fn test_reserved_names_inserted_directly_are_stripped() {
        let codec = create_test_codec();
        let mut claims = Claims::new("42");
        claims.extra.insert("sub".to_string(), json!("999"));
        claims.extra.insert("exp".to_string(), json!(1));
        let token = codec.issue(claims, HOUR).unwrap();

        let decoded = codec.decode(&token).unwrap();
        assert_eq!(decoded.sub, "42");
        assert!(decoded.extra.is_empty());
    }

    #[test]
    fn test_expires_at_matches_exp() {
        let codec = create_test_codec();
        let now = Utc::now();
        let token = codec.issue_at(Claims::new("1"), HOUR, now).unwrap();

        let claims = codec.decode_at(&token, now).unwrap();
        let expires_at = claims.expires_at().unwrap();
        assert_eq!(expires_at.timestamp(), now.timestamp() + 3600);
    }

    #[test]
    fn test_codec_is_clone_cheap() {
        let codec = create_test_codec();
        let cloned = codec.clone();
        let token = codec.issue(Claims::new("1"), HOUR).unwrap();
        assert!(cloned.decode(&token).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Changing any single character invalidates the token
        #[test]
        fn prop_tampering_is_detected(index in any::<prop::sample::Index>(), replacement in "[A-Za-z0-9_-]") {
            let codec = create_test_codec();
            let token = codec.issue(Claims::new("42").with_role("customer"), HOUR).unwrap();

            let mut chars: Vec<char> = token.chars().collect();
            let i = index.index(chars.len());
            let new_char = replacement.chars().next().unwrap();
            prop_assume!(chars[i] != '.' && chars[i] != new_char);
            chars[i] = new_char;
            let tampered: String = chars.into_iter().collect();

            prop_assert_eq!(codec.decode(&tampered), Err(AuthError::TokenMalformed));
        }

        #[test]
        fn prop_round_trip_preserves_subject(sub in "[a-zA-Z0-9@._-]{1,40}", role in "[a-z]{1,12}") {
            let codec = create_test_codec();
            let token = codec.issue(Claims::new(sub.clone()).with_role(role.clone()), HOUR).unwrap();
            let claims = codec.decode(&token).unwrap();
            prop_assert_eq!(claims.sub, sub);
            prop_assert_eq!(claims.role, Some(role));
        }
    }
}
