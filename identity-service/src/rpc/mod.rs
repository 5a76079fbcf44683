//! Broker RPC server.
//!
//! Requests arrive on a durable named queue as JSON envelopes, one command
//! per message, acknowledged manually once the reply has been published to
//! the request's `reply_to` queue under its `correlation_id`.

use crate::config::BrokerConfig;
use crate::error::IdentityError;
use crate::services::IdentityService;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use validator::Validate;
use wire::{
    AuthCommand, Envelope, ErrorKind, Reply, SignInRequest, SignUpRequest, StatusReply,
    TokenRejectedReply, TokenRequest, ValidationReply, VerifyRequest,
};

/// Prefetch window for the consumer; bounds the number of in-flight commands.
const PREFETCH: u16 = 16;
/// Reconnect backoff bounds.
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(500);
const MAX_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(30);

pub struct RpcServer {
    config: BrokerConfig,
    service: Arc<IdentityService>,
}

impl RpcServer {
    pub fn new(config: BrokerConfig, service: Arc<IdentityService>) -> Self {
        Self { config, service }
    }

    /// Serve forever, reconnecting with capped exponential backoff when the
    /// broker connection drops.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut backoff = RETRY_BACKOFF;
        loop {
            match self.serve().await {
                Ok(()) => {
                    tracing::warn!("consumer stream ended, reconnecting");
                    backoff = RETRY_BACKOFF;
                }
                Err(err) => {
                    tracing::error!("broker connection failed: {:#}, retrying in {:?}", err, backoff);
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
        }
    }

    /// Connect, declare the durable queue and serve until the broker
    /// connection drops.
    async fn serve(&self) -> anyhow::Result<()> {
        let connection = Connection::connect_with_config(
            &self.config.uri(),
            ConnectionProperties::default(),
            self.config.tls()?,
        )
        .await?;

        let channel = connection.create_channel().await?;
        channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await?;

        channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let mut consumer = channel
            .basic_consume(
                &self.config.queue,
                "identity-service",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue = %self.config.queue, "identity rpc server consuming");

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    tracing::error!("consumer error: {}", err);
                    continue;
                }
            };

            let channel = channel.clone();
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                if let Err(err) = handle_delivery(&channel, &service, delivery).await {
                    tracing::error!("failed to handle delivery: {:#}", err);
                }
            });
        }

        Ok(())
    }
}

async fn handle_delivery(
    channel: &Channel,
    service: &IdentityService,
    delivery: Delivery,
) -> anyhow::Result<()> {
    let reply = match serde_json::from_slice::<Envelope>(&delivery.data) {
        Ok(envelope) => handle_command(service, envelope).await,
        Err(err) => Reply::err(ErrorKind::Validation, format!("malformed envelope: {}", err)),
    };

    if let Some(reply_to) = delivery.properties.reply_to() {
        let body = serde_json::to_vec(&reply)?;
        let mut props = BasicProperties::default();
        if let Some(correlation_id) = delivery.properties.correlation_id() {
            props = props.with_correlation_id(correlation_id.clone());
        }

        channel
            .basic_publish(
                "",
                reply_to.as_str(),
                BasicPublishOptions::default(),
                &body,
                props,
            )
            .await?
            .await?;
    } else {
        tracing::warn!("request without reply_to, dropping reply");
    }

    delivery.ack(BasicAckOptions::default()).await?;

    Ok(())
}

/// Dispatch one command to the service and shape its outcome for the wire.
///
/// Token-flow rejections become success-shaped bodies, verification failures
/// become `{status: "error"}` bodies (the endpoint is reached from a
/// clickable link), and everything else maps onto typed wire errors.
pub async fn handle_command(service: &IdentityService, envelope: Envelope) -> Reply {
    match envelope.cmd {
        AuthCommand::SignUp => match parse::<SignUpRequest>(envelope.payload) {
            Ok(req) => match service.sign_up(&req).await {
                Ok(reply) => Reply::ok(&reply),
                Err(err) => fail(err),
            },
            Err(reply) => reply,
        },
        AuthCommand::SignIn => match parse::<SignInRequest>(envelope.payload) {
            Ok(req) => match service.sign_in(&req).await {
                Ok(pair) => Reply::ok(&pair),
                Err(err) => fail(err),
            },
            Err(reply) => reply,
        },
        AuthCommand::RefreshToken => match parse::<TokenRequest>(envelope.payload) {
            Ok(req) => match service.refresh_token(&req.token).await {
                Ok(pair) => Reply::ok(&pair),
                Err(err) if err.is_token_rejection() => {
                    Reply::ok(&TokenRejectedReply::new(err.token_message()))
                }
                Err(err) => fail(err),
            },
            Err(reply) => reply,
        },
        AuthCommand::ValidateToken => match parse::<TokenRequest>(envelope.payload) {
            Ok(req) => match service.validate_token(&req.token).await {
                Ok(reply) => Reply::ok(&reply),
                Err(err) if err.is_token_rejection() || matches!(err, IdentityError::Conflict(_)) => {
                    Reply::ok(&ValidationReply::invalid(err.token_message()))
                }
                Err(err) => fail(err),
            },
            Err(reply) => reply,
        },
        AuthCommand::VerifyUser => match parse::<VerifyRequest>(envelope.payload) {
            Ok(req) => match service.verify_user(&req).await {
                Ok(reply) => Reply::ok(&reply),
                Err(IdentityError::Conflict(message)) => Reply::ok(&StatusReply::error(message)),
                Err(IdentityError::InvalidKey) => Reply::ok(&StatusReply::error(
                    IdentityError::InvalidKey.to_string(),
                )),
                Err(err) => fail(err),
            },
            Err(reply) => reply,
        },
    }
}

fn parse<T: DeserializeOwned + Validate>(payload: serde_json::Value) -> Result<T, Reply> {
    let req: T = serde_json::from_value(payload)
        .map_err(|err| Reply::err(ErrorKind::Validation, format!("malformed payload: {}", err)))?;
    req.validate()
        .map_err(|err| Reply::err(ErrorKind::Validation, err.to_string()))?;
    Ok(req)
}

/// Map service failures onto wire errors, hiding internal detail.
fn fail(err: IdentityError) -> Reply {
    match err {
        IdentityError::Validation(message) => Reply::err(ErrorKind::Validation, message),
        IdentityError::Conflict(message) => Reply::err(ErrorKind::Conflict, message),
        IdentityError::InvalidKey => {
            Reply::err(ErrorKind::InvalidKey, "Verification key is invalid or expired")
        }
        other => {
            tracing::error!("command failed: {}", other);
            Reply::err(ErrorKind::Internal, "Internal server error")
        }
    }
}
