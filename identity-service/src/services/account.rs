/// Sign-up and email verification.
use crate::cache::keys;
use crate::error::{IdentityError, Result};
use crate::models::NewUser;
use crate::services::{IdentityService, VERIFICATION_KEY_TTL};
use uuid::Uuid;
use wire::{SignUpRequest, StatusReply, VerifyRequest};

impl IdentityService {
    /// Register a new user and dispatch the verification mail.
    ///
    /// Write order matters: the verification key goes to the cache before the
    /// user row is inserted, so a crash between the two leaves only an
    /// orphaned cache entry that the TTL cleans up. Mail comes last so a user
    /// record always exists by the time a verification click arrives; a
    /// dispatch failure is logged and swallowed.
    pub async fn sign_up(&self, req: &SignUpRequest) -> Result<StatusReply> {
        if self.store.find_by_email(&req.email).await?.is_some() {
            return Err(IdentityError::Conflict(
                "User with such email already exists".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&req.password).await?;
        let key = Uuid::new_v4().to_string();

        self.cache
            .put(&keys::verify(&key), &req.email, VERIFICATION_KEY_TTL)
            .await?;

        let user = self
            .store
            .insert(NewUser {
                email: req.email.clone(),
                firstname: req.firstname.clone(),
                lastname: req.lastname.clone(),
                password_hash,
            })
            .await?;

        if let Err(err) = self
            .mailer
            .send_verification(&user.email, &user.firstname, &key)
            .await
        {
            tracing::warn!(email = %user.email, "verification mail dispatch failed: {err:#}");
        }

        tracing::info!(user_id = %user.id, "user registered");

        Ok(StatusReply::success(
            "User has been registered, verification link was sent via email",
        ))
    }

    /// Consume a verification key and mark its user verified.
    ///
    /// The key is deleted before the flag flips, so it is accepted at most
    /// once even when two clicks race.
    pub async fn verify_user(&self, req: &VerifyRequest) -> Result<StatusReply> {
        let cache_key = keys::verify(&req.key);

        let email = self
            .cache
            .get(&cache_key)
            .await?
            .ok_or(IdentityError::InvalidKey)?;

        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| IdentityError::Conflict("User with such email does not exist".to_string()))?;

        if user.is_verified {
            return Err(IdentityError::Conflict(
                "User has already been verified".to_string(),
            ));
        }

        self.cache.del(&cache_key).await?;
        self.store.set_verified(user.id).await?;

        tracing::info!(user_id = %user.id, "user verified");

        Ok(StatusReply::success("User has been verified"))
    }
}
