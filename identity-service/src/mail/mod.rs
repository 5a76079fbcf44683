//! Verification mail dispatch.
//!
//! Delivery is fire-and-forget from the caller's point of view: sign-up logs
//! and swallows dispatch failures, the user record and verification key stand
//! either way.

pub mod smtp;

pub use smtp::SmtpMailer;

use async_trait::async_trait;

#[async_trait]
pub trait MailDispatcher: Send + Sync {
    /// Deliver the verification link for `key` to `recipient`.
    async fn send_verification(
        &self,
        recipient: &str,
        firstname: &str,
        key: &str,
    ) -> anyhow::Result<()>;
}
