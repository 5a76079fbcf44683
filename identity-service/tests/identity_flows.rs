//! End-to-end flows over in-memory store/cache/mailer doubles.
//!
//! These exercise the full command surface: registration, verification,
//! sign-in, the single-use refresh protocol and cache-backed revocation.

use async_trait::async_trait;
use chrono::Utc;
use identity_service::cache::TokenCache;
use identity_service::db::CredentialStore;
use identity_service::error::{IdentityError, Result};
use identity_service::mail::MailDispatcher;
use identity_service::models::{NewUser, User};
use identity_service::rpc::handle_command;
use identity_service::security::PasswordHasher;
use identity_service::IdentityService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use token_codec::{Claims, TokenCodec, TokenRole};
use uuid::Uuid;
use wire::{
    AuthCommand, Envelope, ErrorKind, Reply, SignInRequest, SignUpRequest, TokenPairReply,
    TokenRequest, VerifyRequest,
};

#[derive(Default)]
struct MemStore {
    users: Mutex<HashMap<String, User>>,
}

#[async_trait]
impl CredentialStore for MemStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(email).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.email) {
            return Err(IdentityError::Conflict(
                "User with such email already exists".to_string(),
            ));
        }
        let record = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            firstname: user.firstname,
            lastname: user.lastname,
            password_hash: user.password_hash,
            is_verified: false,
            created_at: Utc::now(),
        };
        users.insert(user.email, record.clone());
        Ok(record)
    }

    async fn set_verified(&self, id: Uuid) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        for user in users.values_mut() {
            if user.id == id {
                user.is_verified = true;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl TokenCache for MemCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct MemMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl MemMailer {
    fn last_key(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, key)| key.clone())
            .expect("no mail was dispatched")
    }
}

#[async_trait]
impl MailDispatcher for MemMailer {
    async fn send_verification(
        &self,
        recipient: &str,
        _firstname: &str,
        key: &str,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), key.to_string()));
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl MailDispatcher for FailingMailer {
    async fn send_verification(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("smtp unreachable"))
    }
}

const SECRET: &str = "test-secret";

struct Harness {
    service: IdentityService,
    store: Arc<MemStore>,
    cache: Arc<MemCache>,
    mailer: Arc<MemMailer>,
    codec: TokenCodec,
}

fn harness() -> Harness {
    let store = Arc::new(MemStore::default());
    let cache = Arc::new(MemCache::default());
    let mailer = Arc::new(MemMailer::default());
    let service = IdentityService::new(
        store.clone(),
        cache.clone(),
        mailer.clone(),
        TokenCodec::new(SECRET),
        PasswordHasher::new(4),
    );
    Harness {
        service,
        store,
        cache,
        mailer,
        codec: TokenCodec::new(SECRET),
    }
}

fn sign_up_request() -> SignUpRequest {
    SignUpRequest {
        firstname: "John".to_string(),
        lastname: "Kowalski".to_string(),
        email: "example@gmail.com".to_string(),
        password: "StrongPassword123!".to_string(),
    }
}

fn sign_in_request() -> SignInRequest {
    SignInRequest {
        email: "example@gmail.com".to_string(),
        password: "StrongPassword123!".to_string(),
    }
}

#[tokio::test]
async fn happy_path_from_sign_up_to_verified_validation() {
    let h = harness();

    let reply = h.service.sign_up(&sign_up_request()).await.expect("sign-up");
    assert_eq!(reply.status, "success");
    assert!(reply.message.contains("registered"));

    let pair = h.service.sign_in(&sign_in_request()).await.expect("sign-in");

    let validation = h
        .service
        .validate_token(&pair.access_token)
        .await
        .expect("validate");
    assert!(validation.is_valid);
    assert!(!validation.is_verified);
    assert_eq!(validation.message, "Token is valid");

    let key = h.mailer.last_key();
    let verified = h
        .service
        .verify_user(&VerifyRequest { key })
        .await
        .expect("verify");
    assert_eq!(verified.message, "User has been verified");

    let validation = h
        .service
        .validate_token(&pair.access_token)
        .await
        .expect("validate after verify");
    assert!(validation.is_valid);
    assert!(validation.is_verified);
}

#[tokio::test]
async fn duplicate_sign_up_is_a_conflict() {
    let h = harness();

    h.service.sign_up(&sign_up_request()).await.expect("first sign-up");
    let err = h.service.sign_up(&sign_up_request()).await.unwrap_err();

    match err {
        IdentityError::Conflict(message) => {
            assert_eq!(message, "User with such email already exists")
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn sign_in_rejects_unknown_user_and_wrong_password() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");

    let err = h
        .service
        .sign_in(&SignInRequest {
            email: "nobody@gmail.com".to_string(),
            password: "StrongPassword123!".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));

    let err = h
        .service
        .sign_in(&SignInRequest {
            email: "example@gmail.com".to_string(),
            password: "WrongPassword123!".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");
    let first = h.service.sign_in(&sign_in_request()).await.expect("sign-in");

    let second = h
        .service
        .refresh_token(&first.refresh_token)
        .await
        .expect("first refresh");
    assert_ne!(second.access_token, first.access_token);
    assert_ne!(second.refresh_token, first.refresh_token);

    // Replaying the consumed refresh token fails: the cache entry no longer
    // matches its bytes.
    let err = h
        .service
        .refresh_token(&first.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::NotRefreshToken));

    // The pre-refresh access token is revoked even though it has not
    // cryptographically expired.
    let err = h
        .service
        .validate_token(&first.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::NotAccessToken));

    // The freshly issued pair works.
    let validation = h
        .service
        .validate_token(&second.access_token)
        .await
        .expect("validate new access");
    assert!(validation.is_valid);
}

#[tokio::test]
async fn wrong_role_tokens_are_rejected() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");
    let pair = h.service.sign_in(&sign_in_request()).await.expect("sign-in");

    let err = h.service.refresh_token(&pair.access_token).await.unwrap_err();
    assert!(matches!(err, IdentityError::NotRefreshToken));

    let err = h
        .service
        .validate_token(&pair.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::NotAccessToken));
}

#[tokio::test]
async fn malformed_and_expired_tokens_are_rejected() {
    let h = harness();

    let err = h.service.validate_token("invalid.token.jwt").await.unwrap_err();
    assert!(matches!(err, IdentityError::TokenMalformed));

    let mut claims = Claims::new(
        "user-1",
        "example@gmail.com",
        TokenRole::Access,
        chrono::Duration::hours(1),
    );
    claims.iat = Utc::now().timestamp() - 7200;
    claims.exp = Utc::now().timestamp() - 3600;
    let expired = h.codec.sign(&claims).expect("sign expired");

    let err = h.service.validate_token(&expired).await.unwrap_err();
    assert!(matches!(err, IdentityError::TokenExpired));
}

#[tokio::test]
async fn verification_key_is_consumed_on_first_use() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");

    let key = h.mailer.last_key();
    h.service
        .verify_user(&VerifyRequest { key: key.clone() })
        .await
        .expect("first verify");

    // The key was deleted on consumption.
    let err = h.service.verify_user(&VerifyRequest { key }).await.unwrap_err();
    assert!(matches!(err, IdentityError::InvalidKey));
}

#[tokio::test]
async fn verified_flag_never_reverts() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");
    h.service
        .verify_user(&VerifyRequest { key: h.mailer.last_key() })
        .await
        .expect("verify");

    // A re-sent key for an already verified user reports the conflict and
    // leaves the flag alone.
    let resent = Uuid::new_v4().to_string();
    h.cache
        .put(&format!("verify:{}", resent), "example@gmail.com", Duration::from_secs(60))
        .await
        .expect("seed resent key");

    let err = h
        .service
        .verify_user(&VerifyRequest { key: resent })
        .await
        .unwrap_err();
    match err {
        IdentityError::Conflict(message) => assert_eq!(message, "User has already been verified"),
        other => panic!("expected conflict, got {:?}", other),
    }

    let user = h
        .store
        .find_by_email("example@gmail.com")
        .await
        .expect("lookup")
        .expect("user exists");
    assert!(user.is_verified);
}

#[tokio::test]
async fn mail_failure_does_not_fail_sign_up() {
    let store = Arc::new(MemStore::default());
    let cache = Arc::new(MemCache::default());
    let service = IdentityService::new(
        store.clone(),
        cache.clone(),
        Arc::new(FailingMailer),
        TokenCodec::new(SECRET),
        PasswordHasher::new(4),
    );

    let reply = service.sign_up(&sign_up_request()).await.expect("sign-up");
    assert_eq!(reply.status, "success");

    // User record and verification key both stand.
    assert!(store
        .find_by_email("example@gmail.com")
        .await
        .expect("lookup")
        .is_some());
    let entries = cache.entries.lock().unwrap();
    assert!(entries.keys().any(|k| k.starts_with("verify:")));
}

// ---------------------------------------------------------------------------
// Wire-level shaping through the command dispatcher
// ---------------------------------------------------------------------------

fn body(reply: Reply) -> serde_json::Value {
    match reply {
        Reply::Ok(body) => body,
        Reply::Err { error } => panic!("expected in-band body, got wire error: {:?}", error),
    }
}

#[tokio::test]
async fn refresh_replay_is_an_in_band_rejection() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");
    let pair = h.service.sign_in(&sign_in_request()).await.expect("sign-in");
    h.service
        .refresh_token(&pair.refresh_token)
        .await
        .expect("first refresh");

    let reply = handle_command(
        &h.service,
        Envelope::new(
            AuthCommand::RefreshToken,
            &TokenRequest {
                token: pair.refresh_token.clone(),
            },
        )
        .expect("envelope"),
    )
    .await;

    let body = body(reply);
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["message"], "Provided token is not a refresh token");
}

#[tokio::test]
async fn validate_failures_carry_spec_messages() {
    let h = harness();

    let reply = handle_command(
        &h.service,
        Envelope::new(
            AuthCommand::ValidateToken,
            &TokenRequest {
                token: "invalid.token.jwt".to_string(),
            },
        )
        .expect("envelope"),
    )
    .await;
    let invalid = body(reply);
    assert_eq!(invalid["is_valid"], false);
    assert_eq!(invalid["is_verified"], false);
    assert_eq!(invalid["message"], "Invalid token");

    let mut claims = Claims::new(
        "user-1",
        "example@gmail.com",
        TokenRole::Access,
        chrono::Duration::hours(1),
    );
    claims.iat = Utc::now().timestamp() - 7200;
    claims.exp = Utc::now().timestamp() - 3600;
    let expired = h.codec.sign(&claims).expect("sign expired");

    let reply = handle_command(
        &h.service,
        Envelope::new(AuthCommand::ValidateToken, &TokenRequest { token: expired })
            .expect("envelope"),
    )
    .await;
    let expired_body = body(reply);
    assert_eq!(expired_body["is_valid"], false);
    assert_eq!(expired_body["message"], "Token expired");
}

#[tokio::test]
async fn verify_failures_are_error_status_bodies() {
    let h = harness();

    let reply = handle_command(
        &h.service,
        Envelope::new(
            AuthCommand::VerifyUser,
            &VerifyRequest {
                key: Uuid::new_v4().to_string(),
            },
        )
        .expect("envelope"),
    )
    .await;

    let body = body(reply);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Verification key is invalid or expired");
}

#[tokio::test]
async fn dispatcher_enforces_payload_validation() {
    let h = harness();

    let reply = handle_command(
        &h.service,
        Envelope::new(
            AuthCommand::SignUp,
            &SignUpRequest {
                firstname: "John3".to_string(),
                lastname: "Kowalski".to_string(),
                email: "example@gmail.com".to_string(),
                password: "weak".to_string(),
            },
        )
        .expect("envelope"),
    )
    .await;

    match reply {
        Reply::Err { error } => assert_eq!(error.kind, ErrorKind::Validation),
        Reply::Ok(body) => panic!("expected validation error, got {:?}", body),
    }
}

#[tokio::test]
async fn duplicate_sign_up_surfaces_as_wire_conflict() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");

    let reply = handle_command(
        &h.service,
        Envelope::new(AuthCommand::SignUp, &sign_up_request()).expect("envelope"),
    )
    .await;

    match reply {
        Reply::Err { error } => {
            assert_eq!(error.kind, ErrorKind::Conflict);
            assert_eq!(error.message, "User with such email already exists");
        }
        Reply::Ok(body) => panic!("expected conflict, got {:?}", body),
    }
}

#[tokio::test]
async fn concurrent_refreshes_let_exactly_one_win() {
    let h = harness();
    h.service.sign_up(&sign_up_request()).await.expect("sign-up");
    let pair = h.service.sign_in(&sign_in_request()).await.expect("sign-in");

    // Sequential model of the race: whoever reaches the delete-then-write
    // sequence first wins, the loser's bytes no longer match.
    let winner = h.service.refresh_token(&pair.refresh_token).await;
    let loser = h.service.refresh_token(&pair.refresh_token).await;

    assert!(winner.is_ok());
    assert!(matches!(loser.unwrap_err(), IdentityError::NotRefreshToken));

    // Exactly one live pair remains for the identity.
    let cached = h
        .cache
        .get("jwt:example@gmail.com")
        .await
        .expect("cache get")
        .expect("pair present");
    let live: TokenPairReply = serde_json::from_str(&cached).expect("cached pair parses");
    assert_eq!(live.access_token, winner.unwrap().access_token);
}
