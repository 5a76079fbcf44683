use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use wire::{ErrorKind, WireError};

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// Token rejected by the admission guard; the message travels in the
    /// body as `{is_valid: false, message}`.
    #[error("{0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            GatewayError::Unauthorized(message) => HttpResponse::build(status).json(json!({
                "is_valid": false,
                "message": message,
            })),
            GatewayError::RateLimited { retry_after } => HttpResponse::build(status)
                .insert_header(("Retry-After", retry_after.to_string()))
                .json(json!({
                    "error": "Too many requests",
                    "status": status.as_u16(),
                })),
            other => HttpResponse::build(status).json(json!({
                "error": other.to_string(),
                "status": status.as_u16(),
            })),
        }
    }
}

impl From<WireError> for GatewayError {
    fn from(err: WireError) -> Self {
        match err.kind {
            ErrorKind::Validation => GatewayError::Validation(err.message),
            ErrorKind::Conflict => GatewayError::Conflict(err.message),
            ErrorKind::InvalidKey => GatewayError::BadRequest(err.message),
            ErrorKind::Internal => GatewayError::Internal(err.message),
        }
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(err: validator::ValidationErrors) -> Self {
        GatewayError::Validation(err.to_string())
    }
}
