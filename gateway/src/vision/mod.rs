//! gRPC client for the vision backend.

use crate::config::VisionConfig;
use crate::error::{GatewayError, Result};
use crate::proto::computer_vision_client::ComputerVisionClient;
use crate::proto::{ImgProcRequest, ModelType};
use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::Channel;
use tonic::{Code, Status};

/// Deadline for a single caption; batches get this per stream.
const VISION_TIMEOUT: Duration = Duration::from_secs(60);

/// Caption generation behind the gRPC boundary. Implemented by the tonic
/// client; stubbed in tests.
#[async_trait]
pub trait CaptionBackend: Send + Sync {
    async fn caption(&self, model: ModelType, image: Vec<u8>) -> Result<String>;

    /// Captions for a batch, in input order.
    async fn caption_batch(&self, model: ModelType, images: Vec<Vec<u8>>) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct VisionClient {
    client: ComputerVisionClient<Channel>,
    timeout: Duration,
}

impl VisionClient {
    pub async fn connect(config: &VisionConfig) -> anyhow::Result<Self> {
        tracing::info!("connecting vision grpc client: {}", config.endpoint());

        let channel = Channel::from_shared(config.endpoint())?
            .connect_timeout(Duration::from_secs(5))
            .connect()
            .await?;

        tracing::info!("vision grpc client connected");

        Ok(Self {
            client: ComputerVisionClient::new(channel),
            timeout: VISION_TIMEOUT,
        })
    }
}

#[async_trait]
impl CaptionBackend for VisionClient {
    /// Caption a single image over the unary rpc.
    async fn caption(&self, model: ModelType, image: Vec<u8>) -> Result<String> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(ImgProcRequest {
            model: model as i32,
            image,
        });
        request.set_timeout(self.timeout);

        match client.process_image(request).await {
            Ok(response) => Ok(response.into_inner().description),
            Err(status) => Err(map_status(status)),
        }
    }

    /// Caption a batch over the bidirectional stream. Descriptions come back
    /// in input order.
    async fn caption_batch(
        &self,
        model: ModelType,
        images: Vec<Vec<u8>>,
    ) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let expected = images.len();

        let requests: Vec<ImgProcRequest> = images
            .into_iter()
            .map(|image| ImgProcRequest {
                model: model as i32,
                image,
            })
            .collect();

        let mut request = tonic::Request::new(tokio_stream::iter(requests));
        request.set_timeout(self.timeout);

        let mut stream = client
            .process_image_batch(request)
            .await
            .map_err(map_status)?
            .into_inner();

        let mut descriptions = Vec::with_capacity(expected);
        while let Some(response) = stream.message().await.map_err(map_status)? {
            descriptions.push(response.description);
        }

        Ok(descriptions)
    }
}

fn map_status(status: Status) -> GatewayError {
    match status.code() {
        Code::InvalidArgument => GatewayError::BadRequest(status.message().to_string()),
        Code::ResourceExhausted => GatewayError::RateLimited { retry_after: 1 },
        Code::Unavailable | Code::DeadlineExceeded => {
            GatewayError::Upstream(format!("vision backend: {}", status.message()))
        }
        _ => GatewayError::Internal(format!("vision backend: {}", status.message())),
    }
}

/// Parse the multipart `model` form field. Absent or empty picks the full
/// model.
pub fn parse_model(value: Option<&str>) -> Result<ModelType> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("blip") => Ok(ModelType::Blip),
        Some("blip_quantized") | Some("blip-quantized") => Ok(ModelType::BlipQuantized),
        Some(other) => Err(GatewayError::BadRequest(format!(
            "Unknown model '{}', expected 'blip' or 'blip_quantized'",
            other
        ))),
    }
}
