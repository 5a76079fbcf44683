//! Credential store contract and its Postgres implementation.

pub mod postgres;

pub use postgres::PgStore;

use crate::error::Result;
use crate::models::{NewUser, User};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistent mapping from email to user record. Uniqueness on email is
/// enforced by the store itself; `insert` fails with a conflict when the
/// email is already taken.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Marks the user verified. The flag only ever transitions to true.
    async fn set_verified(&self, id: Uuid) -> Result<()>;
}
