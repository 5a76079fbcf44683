/// API gateway - main entry point.
/// Terminates HTTP, translates auth requests into broker RPCs and image
/// requests into gRPC calls behind the admission guard.
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use gateway::middleware::{rate_limit, AdmissionGuard, RateLimiter, TokenValidator};
use gateway::rpc::{AuthRpc, AuthRpcClient};
use gateway::vision::{CaptionBackend, VisionClient};
use gateway::{configure_routes, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,lapin=warn,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!(
        "starting gateway on {}:{}",
        config.http.host,
        config.http.port
    );

    let rpc = Arc::new(
        AuthRpcClient::connect(&config.broker)
            .await
            .context("failed to connect broker rpc client")?,
    );

    let vision = Arc::new(
        VisionClient::connect(&config.vision)
            .await
            .context("failed to connect vision client")?,
    );

    let limiter = Arc::new(RateLimiter::default());
    rate_limit::spawn_cleanup_task(Arc::clone(&limiter), Duration::from_secs(300));

    let guard = Arc::new(AdmissionGuard::new(
        Arc::clone(&rpc) as Arc<dyn TokenValidator>,
        limiter,
    ));

    let state = AppState {
        rpc: rpc as Arc<dyn AuthRpc>,
        vision: vision as Arc<dyn CaptionBackend>,
        guard,
    };

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind((config.http.host.as_str(), config.http.port))?
    .run()
    .await?;

    Ok(())
}
