//! Broker RPC client.
//!
//! Requests are published to the identity queue with a `correlation_id` and
//! an exclusive callback queue as `reply_to`. A background task routes
//! callback deliveries to the pending request table; every call carries a
//! deadline, and a miss surfaces as an upstream failure rather than a retry.

use crate::config::BrokerConfig;
use crate::error::{GatewayError, Result};
use crate::middleware::TokenValidator;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;
use wire::{AuthCommand, Envelope, Reply, TokenRequest, ValidationReply};

/// Deadline for one broker round trip.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// One request/reply round trip against the identity queue. Implemented by
/// the broker client; stubbed in tests.
#[async_trait]
pub trait AuthRpc: Send + Sync {
    async fn call(&self, cmd: AuthCommand, payload: serde_json::Value)
        -> Result<serde_json::Value>;
}

type PendingTable = Arc<DashMap<String, oneshot::Sender<Vec<u8>>>>;

pub struct AuthRpcClient {
    // Held so the underlying connection outlives the channel.
    _connection: Connection,
    channel: Channel,
    queue: String,
    callback_queue: String,
    pending: PendingTable,
    timeout: Duration,
}

impl AuthRpcClient {
    /// Connect over TLS, declare the request queue and the private callback
    /// queue, and start routing replies.
    pub async fn connect(config: &BrokerConfig) -> anyhow::Result<Self> {
        let connection = Connection::connect_with_config(
            &config.uri(),
            ConnectionProperties::default(),
            config.tls()?,
        )
        .await?;

        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let callback = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        let callback_queue = callback.name().as_str().to_string();

        let mut consumer = channel
            .basic_consume(
                &callback_queue,
                "gateway-callback",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let pending: PendingTable = Arc::new(DashMap::new());
        let router = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        tracing::error!("callback consumer error: {}", err);
                        continue;
                    }
                };

                let Some(correlation_id) = delivery.properties.correlation_id() else {
                    tracing::warn!("reply without correlation_id, dropping");
                    continue;
                };

                if let Some((_, tx)) = router.remove(correlation_id.as_str()) {
                    let _ = tx.send(delivery.data);
                } else {
                    // Late reply after the caller's deadline fired.
                    tracing::debug!(correlation_id = %correlation_id, "unmatched reply dropped");
                }
            }
            tracing::warn!("callback consumer stream ended");
        });

        tracing::info!(queue = %config.queue, "broker rpc client connected");

        Ok(Self {
            _connection: connection,
            channel,
            queue: config.queue.clone(),
            callback_queue,
            pending,
            timeout: RPC_TIMEOUT,
        })
    }

    /// Wire-level errors become typed gateway failures; everything else is
    /// the command's reply body.
    async fn round_trip(
        &self,
        cmd: AuthCommand,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let envelope = Envelope { cmd, payload };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| GatewayError::Internal(format!("failed to serialize request: {}", e)))?;

        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        let properties = BasicProperties::default()
            .with_reply_to(self.callback_queue.clone().into())
            .with_correlation_id(correlation_id.clone().into());

        let publish = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await;

        if let Err(err) = publish {
            self.pending.remove(&correlation_id);
            return Err(GatewayError::Upstream(format!("broker publish failed: {}", err)));
        }

        let bytes = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(_)) | Err(_) => {
                self.pending.remove(&correlation_id);
                return Err(GatewayError::Upstream(
                    "identity service did not reply in time".to_string(),
                ));
            }
        };

        let reply: Reply = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::Upstream(format!("malformed reply: {}", e)))?;

        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Err { error } => Err(GatewayError::from(error)),
        }
    }
}

#[async_trait]
impl AuthRpc for AuthRpcClient {
    async fn call(
        &self,
        cmd: AuthCommand,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.round_trip(cmd, payload).await
    }
}

#[async_trait]
impl TokenValidator for AuthRpcClient {
    async fn validate(&self, token: &str) -> Result<ValidationReply> {
        let payload = serde_json::to_value(TokenRequest {
            token: token.to_string(),
        })
        .map_err(|e| GatewayError::Internal(format!("failed to serialize request: {}", e)))?;

        let value = self.round_trip(AuthCommand::ValidateToken, payload).await?;

        serde_json::from_value(value)
            .map_err(|e| GatewayError::Upstream(format!("malformed validate reply: {}", e)))
    }
}
