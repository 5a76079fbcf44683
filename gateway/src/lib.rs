pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rpc;
pub mod vision;

pub use config::Config;
pub use error::{GatewayError, Result};

use crate::middleware::AdmissionGuard;
use crate::rpc::AuthRpc;
use crate::vision::CaptionBackend;
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

pub mod proto {
    tonic::include_proto!("computer_vision");
}

#[derive(Clone)]
pub struct AppState {
    pub rpc: Arc<dyn AuthRpc>,
    pub vision: Arc<dyn CaptionBackend>,
    pub guard: Arc<AdmissionGuard>,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

/// The public route table.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/signup", web::post().to(handlers::auth::signup))
            .route("/signin", web::post().to(handlers::auth::signin))
            .route("/refresh", web::post().to(handlers::auth::refresh))
            .route("/verify", web::get().to(handlers::auth::verify))
            .route("/verify", web::post().to(handlers::auth::verify)),
    )
    .service(
        web::scope("/vision")
            .route("/process-image", web::post().to(handlers::vision::process_image)),
    )
    .route("/health", web::get().to(health_check));
}
