/// Authentication handlers: validate the payload shape at the HTTP boundary,
/// package it into a broker request, await the reply and translate failures
/// to HTTP statuses. Token-flow rejections arrive as success-shaped bodies
/// and are relayed as-is.
use crate::error::{GatewayError, Result};
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use validator::Validate;
use wire::{AuthCommand, SignInRequest, SignUpRequest, TokenRequest, VerifyRequest};

fn to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| GatewayError::Internal(format!("failed to serialize request: {}", e)))
}

pub async fn signup(
    state: web::Data<AppState>,
    payload: web::Json<SignUpRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;

    let body = state
        .rpc
        .call(AuthCommand::SignUp, to_value(&payload.into_inner())?)
        .await?;

    Ok(HttpResponse::Ok().json(body))
}

pub async fn signin(
    state: web::Data<AppState>,
    payload: web::Json<SignInRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;

    let body = state
        .rpc
        .call(AuthCommand::SignIn, to_value(&payload.into_inner())?)
        .await?;

    Ok(HttpResponse::Ok().json(body))
}

pub async fn refresh(
    state: web::Data<AppState>,
    payload: web::Json<TokenRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;

    let body = state
        .rpc
        .call(AuthCommand::RefreshToken, to_value(&payload.into_inner())?)
        .await?;

    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    key: String,
}

/// Served for GET and POST: the link in the verification mail is clicked
/// from a browser. Repeat clicks get the in-band already-verified or
/// invalid-key body, never a failure status.
pub async fn verify(
    state: web::Data<AppState>,
    query: web::Query<VerifyQuery>,
) -> Result<HttpResponse> {
    let request = VerifyRequest {
        key: query.into_inner().key,
    };
    request.validate()?;

    let body = state
        .rpc
        .call(AuthCommand::VerifyUser, to_value(&request)?)
        .await?;

    Ok(HttpResponse::Ok().json(body))
}
