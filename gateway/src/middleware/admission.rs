//! Per-request admission policy for the image data-plane.
//!
//! Either a bearer token in the `token` header resolves to a valid identity,
//! or the request is anonymous and counted against the per-source sliding
//! window.

use crate::error::{GatewayError, Result};
use crate::middleware::rate_limit::RateLimiter;
use actix_web::HttpRequest;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use wire::ValidationReply;

/// Resolves a bearer token to a validation verdict. Implemented by the
/// broker RPC client; stubbed in tests.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<ValidationReply>;
}

pub struct AdmissionGuard {
    validator: Arc<dyn TokenValidator>,
    limiter: Arc<RateLimiter>,
}

impl AdmissionGuard {
    pub fn new(validator: Arc<dyn TokenValidator>, limiter: Arc<RateLimiter>) -> Self {
        Self { validator, limiter }
    }

    /// Admit or reject one request.
    pub async fn admit(&self, token: Option<&str>, source: IpAddr) -> Result<()> {
        match token {
            Some(token) => {
                let reply = self.validator.validate(token).await?;
                if reply.is_valid {
                    Ok(())
                } else {
                    Err(GatewayError::Unauthorized(reply.message))
                }
            }
            None => self
                .limiter
                .check(source)
                .map_err(|retry_after| GatewayError::RateLimited { retry_after }),
        }
    }
}

/// Source address for rate-limit keying: proxy headers first, then the peer
/// address.
pub fn extract_source(req: &HttpRequest) -> IpAddr {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip) = value.split(',').next().and_then(|s| s.trim().parse().ok()) {
                return ip;
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse() {
                return ip;
            }
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}
