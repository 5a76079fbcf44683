//! Bearer token signing and verification.
//!
//! The codec signs a [`Claims`] object with a process-wide secret (HS256) and
//! verifies incoming tokens into typed failures. It deliberately knows nothing
//! about how roles are used; callers embed a [`TokenRole`] claim and enforce
//! it themselves.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Decode failures, split into the kinds callers branch on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("token expired")]
    Expired,

    #[error("token signature invalid")]
    SignatureInvalid,

    #[error("token malformed")]
    Malformed,
}

/// Role embedded in every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    Access,
    Refresh,
}

/// Claims carried by both access and refresh tokens.
///
/// `jti` is a per-token random identifier so that two tokens issued for the
/// same subject within the same second still differ byte-for-byte. The cache
/// layer compares raw token bytes, so this matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Identity key
    pub email: String,
    /// Token role: access or refresh
    pub role: TokenRole,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

impl Claims {
    /// Build claims expiring `ttl` from now.
    pub fn new(sub: &str, email: &str, role: TokenRole, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.to_string(),
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// HS256 signer/verifier over a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // No clock leeway: expiry decisions must be deterministic.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign claims into a compact bearer string.
    pub fn sign(&self, claims: &Claims) -> Result<String, CodecError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|_| CodecError::Malformed)
    }

    /// Verify a bearer string and extract its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, CodecError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => CodecError::Expired,
                ErrorKind::InvalidSignature => CodecError::SignatureInvalid,
                _ => CodecError::Malformed,
            })
    }
}
