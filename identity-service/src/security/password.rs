/// Password hashing and verification using bcrypt.
///
/// Both operations take tens of milliseconds at the default cost and run on
/// the blocking pool so they never starve request tasks. The plaintext is
/// never logged anywhere in this module.
use crate::error::{IdentityError, Result};
use tokio::task;

/// Adaptive salted hasher with configurable cost.
#[derive(Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a plaintext password. The salt and cost are embedded in the
    /// returned string, so verification is stable across restarts.
    pub async fn hash(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_string();
        let cost = self.cost;

        task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| IdentityError::Internal(format!("hash task failed: {}", e)))?
            .map_err(|e| IdentityError::Internal(format!("password hashing failed: {}", e)))
    }

    /// Verify a plaintext password against a stored hash.
    pub async fn verify(&self, plaintext: &str, hash: &str) -> Result<bool> {
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();

        task::spawn_blocking(move || bcrypt::verify(plaintext, &hash))
            .await
            .map_err(|e| IdentityError::Internal(format!("verify task failed: {}", e)))?
            .map_err(|e| IdentityError::Internal(format!("password verification failed: {}", e)))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
