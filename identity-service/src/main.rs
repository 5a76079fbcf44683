/// Identity service - main entry point.
/// Serves the five auth commands over the broker's request/reply queue.
use anyhow::Context;
use identity_service::cache::RedisCache;
use identity_service::db::PgStore;
use identity_service::mail::SmtpMailer;
use identity_service::rpc::RpcServer;
use identity_service::security::PasswordHasher;
use identity_service::{Config, IdentityService};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use token_codec::TokenCodec;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_service=info,lapin=warn,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!("starting identity service");

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url())
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("failed to run migrations")?;

    tracing::info!("database connection pool initialized");

    let redis_client = redis::Client::open(config.cache.url())?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    tracing::info!("redis connection initialized");

    let service = Arc::new(IdentityService::new(
        Arc::new(PgStore::new(db_pool)),
        Arc::new(RedisCache::new(redis_conn)),
        Arc::new(SmtpMailer::new(config.mail.clone())),
        TokenCodec::new(&config.jwt_secret),
        PasswordHasher::default(),
    ));

    RpcServer::new(config.broker.clone(), service).run().await
}
