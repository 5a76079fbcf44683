//! The identity service proper: sign-up, sign-in, verification and the
//! token lifecycle, orchestrated over the store, cache, hasher, codec and
//! mail dispatcher contracts.

mod account;
mod session;

use crate::cache::TokenCache;
use crate::db::CredentialStore;
use crate::mail::MailDispatcher;
use crate::security::PasswordHasher;
use std::sync::Arc;
use std::time::Duration;
use token_codec::TokenCodec;

/// Access token lifetime, the design default.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);
/// Refresh token lifetime, fixed. Also the TTL of the cached pair.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Verification key lifetime.
pub const VERIFICATION_KEY_TTL: Duration = Duration::from_secs(30 * 60);

pub struct IdentityService {
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) cache: Arc<dyn TokenCache>,
    pub(crate) mailer: Arc<dyn MailDispatcher>,
    pub(crate) codec: TokenCodec,
    pub(crate) hasher: PasswordHasher,
    pub(crate) access_ttl: Duration,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn TokenCache>,
        mailer: Arc<dyn MailDispatcher>,
        codec: TokenCodec,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            store,
            cache,
            mailer,
            codec,
            hasher,
            access_ttl: ACCESS_TOKEN_TTL,
        }
    }

    /// Override the access token lifetime. Refresh stays fixed at 24h.
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }
}
