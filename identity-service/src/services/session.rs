/// Sign-in and the token lifecycle.
///
/// The cache entry `jwt:<email>` is the single source of truth for the live
/// pair: issuing overwrites it, refresh deletes it before reissuing, and both
/// refresh and validate compare raw token bytes against it. A token that no
/// longer matches is revoked regardless of its cryptographic expiry.
use crate::cache::keys;
use crate::error::{IdentityError, Result};
use crate::services::{IdentityService, REFRESH_TOKEN_TTL};
use chrono::Duration as ChronoDuration;
use token_codec::{Claims, TokenRole};
use wire::{SignInRequest, TokenPairReply, ValidationReply};

impl IdentityService {
    /// Authenticate credentials and issue a fresh pair. Verification status
    /// does not block sign-in; it is surfaced at validate time.
    pub async fn sign_in(&self, req: &SignInRequest) -> Result<TokenPairReply> {
        let user = self
            .store
            .find_by_email(&req.email)
            .await?
            .ok_or_else(|| IdentityError::Conflict("User with such email does not exist".to_string()))?;

        if !self.hasher.verify(&req.password, &user.password_hash).await? {
            return Err(IdentityError::Conflict("Wrong password provided".to_string()));
        }

        let pair = self.issue_pair(&user.id.to_string(), &user.email).await?;

        tracing::info!(user_id = %user.id, "user signed in");

        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. Single-use: the cached pair
    /// is deleted before the new one is written, so replaying the same
    /// refresh token fails on the byte-equality check below.
    pub async fn refresh_token(&self, token: &str) -> Result<TokenPairReply> {
        let claims = self.codec.verify(token)?;

        let cache_key = keys::jwt(&claims.email);
        let cached = self
            .cache
            .get(&cache_key)
            .await?
            .ok_or(IdentityError::NotRefreshToken)?;

        let pair: TokenPairReply = serde_json::from_str(&cached)
            .map_err(|e| IdentityError::Internal(format!("corrupt cached pair: {}", e)))?;

        if pair.refresh_token != token {
            return Err(IdentityError::NotRefreshToken);
        }

        let cached_claims = self
            .codec
            .verify(&pair.refresh_token)
            .map_err(|_| IdentityError::NotRefreshToken)?;
        if cached_claims.role != TokenRole::Refresh {
            return Err(IdentityError::NotRefreshToken);
        }

        self.cache.del(&cache_key).await?;

        let pair = self.issue_pair(&cached_claims.sub, &claims.email).await?;

        tracing::info!(email = %claims.email, "token pair refreshed");

        Ok(pair)
    }

    /// Check an access token against the cache and report verification
    /// status.
    pub async fn validate_token(&self, token: &str) -> Result<ValidationReply> {
        let claims = self.codec.verify(token)?;

        let cached = self
            .cache
            .get(&keys::jwt(&claims.email))
            .await?
            .ok_or(IdentityError::NotAccessToken)?;

        let pair: TokenPairReply = serde_json::from_str(&cached)
            .map_err(|e| IdentityError::Internal(format!("corrupt cached pair: {}", e)))?;

        if pair.access_token != token || claims.role == TokenRole::Refresh {
            return Err(IdentityError::NotAccessToken);
        }

        let user = self
            .store
            .find_by_email(&claims.email)
            .await?
            .ok_or_else(|| IdentityError::Conflict("User with such email does not exist".to_string()))?;

        Ok(ValidationReply::valid(user.is_verified, "Token is valid"))
    }

    /// Issue an access/refresh pair and overwrite the cache entry for this
    /// identity. The entry lives as long as the refresh token does.
    async fn issue_pair(&self, sub: &str, email: &str) -> Result<TokenPairReply> {
        let access_ttl = ChronoDuration::from_std(self.access_ttl)
            .map_err(|e| IdentityError::Internal(format!("invalid access ttl: {}", e)))?;
        let refresh_ttl = ChronoDuration::from_std(REFRESH_TOKEN_TTL)
            .map_err(|e| IdentityError::Internal(format!("invalid refresh ttl: {}", e)))?;

        let access_token = self
            .codec
            .sign(&Claims::new(sub, email, TokenRole::Access, access_ttl))
            .map_err(|e| IdentityError::Internal(format!("failed to sign access token: {}", e)))?;
        let refresh_token = self
            .codec
            .sign(&Claims::new(sub, email, TokenRole::Refresh, refresh_ttl))
            .map_err(|e| IdentityError::Internal(format!("failed to sign refresh token: {}", e)))?;

        let pair = TokenPairReply {
            access_token,
            refresh_token,
        };

        let serialized = serde_json::to_string(&pair)
            .map_err(|e| IdentityError::Internal(format!("failed to serialize pair: {}", e)))?;
        self.cache
            .put(&keys::jwt(email), &serialized, REFRESH_TOKEN_TTL)
            .await?;

        Ok(pair)
    }
}
