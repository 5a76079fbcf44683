//! Token cache contract and key naming.
//!
//! The cache is the authoritative revocation oracle: a cryptographically
//! valid token whose cache entry is missing or mismatched is treated as
//! revoked. Deletions must be observable before the next `get` returns, which
//! holds for Redis per key.

pub mod keys;
pub mod redis;

pub use self::redis::RedisCache;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Per-identity key/value store with per-entry TTL. Eviction on TTL is
/// silent.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;
}
