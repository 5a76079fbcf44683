//! Broker wire contract shared by the gateway and the identity service.
//!
//! Every message on the identity queue is one JSON [`Envelope`]: a command
//! discriminator plus the command payload. Replies are either a success body
//! (shape depends on the command) or an `{ "error": { kind, message } }`
//! object. Token-flow rejections are deliberately NOT errors: refresh and
//! validate reply with success-shaped `{ is_valid: false, message }` bodies so
//! callers can branch without parsing failure types.

pub mod validators;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Command discriminator carried by every broker request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthCommand {
    #[serde(rename = "sign-up")]
    SignUp,
    #[serde(rename = "sign-in")]
    SignIn,
    #[serde(rename = "refresh-token")]
    RefreshToken,
    #[serde(rename = "validate-token")]
    ValidateToken,
    #[serde(rename = "verify-user")]
    VerifyUser,
}

/// Request envelope: discriminator + raw payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub cmd: AuthCommand,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(cmd: AuthCommand, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            cmd,
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Error kinds that cross the broker as failures. Token rejections never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidKey,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Reply envelope. Serialized untagged: an object with an `error` field is a
/// failure, anything else is the command's success body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Err { error: WireError },
    Ok(serde_json::Value),
}

impl Reply {
    pub fn ok<T: Serialize>(body: &T) -> Self {
        Reply::Ok(serde_json::to_value(body).unwrap_or(serde_json::Value::Null))
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Reply::Err {
            error: WireError {
                kind,
                message: message.into(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// sign-up payload. Names are bounded alphabetic strings; the password policy
/// is at least 8 and at most 128 characters with one character of each class.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(custom(function = "crate::validators::validate_name"))]
    pub firstname: String,
    #[validate(custom(function = "crate::validators::validate_name"))]
    pub lastname: String,
    #[validate(custom(function = "crate::validators::validate_email"))]
    pub email: String,
    #[validate(custom(function = "crate::validators::validate_password"))]
    pub password: String,
}

/// sign-in payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(custom(function = "crate::validators::validate_email"))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// refresh-token / validate-token payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

/// verify-user payload: the 128-bit verification key in its textual form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(custom(function = "crate::validators::validate_verification_key"))]
    pub key: String,
}

// ---------------------------------------------------------------------------
// Reply bodies
// ---------------------------------------------------------------------------

/// sign-up and verify-user reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
    pub message: String,
}

impl StatusReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// sign-in and successful refresh-token reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairReply {
    pub access_token: String,
    pub refresh_token: String,
}

/// refresh-token rejection, returned in-band as a success-shaped body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRejectedReply {
    pub is_valid: bool,
    pub message: String,
}

impl TokenRejectedReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

/// validate-token reply, valid or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReply {
    pub is_valid: bool,
    pub is_verified: bool,
    pub message: String,
}

impl ValidationReply {
    pub fn valid(is_verified: bool, message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            is_verified,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_verified: false,
            message: message.into(),
        }
    }
}
