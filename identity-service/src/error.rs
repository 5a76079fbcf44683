use thiserror::Error;
use token_codec::CodecError;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Verification key is invalid or expired")]
    InvalidKey,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token malformed")]
    TokenMalformed,

    #[error("Token signature invalid")]
    TokenSignature,

    #[error("Provided token is not an access token")]
    NotAccessToken,

    #[error("Provided token is not a refresh token")]
    NotRefreshToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// True for failures that travel in-band as `{is_valid: false, message}`
    /// bodies instead of wire errors.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            IdentityError::TokenExpired
                | IdentityError::TokenMalformed
                | IdentityError::TokenSignature
                | IdentityError::NotAccessToken
                | IdentityError::NotRefreshToken
        )
    }

    /// Message surfaced for token-flow rejections.
    pub fn token_message(&self) -> &'static str {
        match self {
            IdentityError::TokenExpired => "Token expired",
            IdentityError::TokenMalformed | IdentityError::TokenSignature => "Invalid token",
            IdentityError::NotRefreshToken => "Provided token is not a refresh token",
            IdentityError::NotAccessToken => "Provided token is not an access token",
            _ => "Token verification failed",
        }
    }
}

impl From<CodecError> for IdentityError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Expired => IdentityError::TokenExpired,
            CodecError::SignatureInvalid => IdentityError::TokenSignature,
            CodecError::Malformed => IdentityError::TokenMalformed,
        }
    }
}

impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for IdentityError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        IdentityError::Cache(err.to_string())
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(err.to_string())
    }
}
