/// Image data-plane handler: admission guard, multipart parsing and the
/// unary-vs-streaming fan-out to the vision backend.
use crate::error::{GatewayError, Result};
use crate::middleware::admission::extract_source;
use crate::vision::parse_model;
use crate::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;

pub async fn process_image(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let token = req.headers().get("token").and_then(|v| v.to_str().ok());
    state.guard.admit(token, extract_source(&req)).await?;

    let (model, mut images) = read_multipart(payload).await?;
    let model = parse_model(model.as_deref())?;

    match images.len() {
        0 => Err(GatewayError::BadRequest("No image files provided".to_string())),
        1 => {
            let image = images.remove(0);
            let description = state.vision.caption(model, image).await?;
            Ok(HttpResponse::Ok().json(description))
        }
        _ => {
            let descriptions = state.vision.caption_batch(model, images).await?;
            Ok(HttpResponse::Ok().json(descriptions))
        }
    }
}

/// Drain the multipart body into the `model` field and the uploaded files.
/// Empty file parts are dropped so a bare form submit counts as zero files.
async fn read_multipart(mut payload: Multipart) -> Result<(Option<String>, Vec<Vec<u8>>)> {
    let mut model: Option<String> = None;
    let mut images: Vec<Vec<u8>> = Vec::new();

    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| GatewayError::BadRequest(format!("Multipart error: {}", e)))?;

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| GatewayError::BadRequest(format!("Multipart error: {}", e)))?;
            data.extend_from_slice(&chunk);
        }

        if field.name() == "model" {
            let value = String::from_utf8(data)
                .map_err(|_| GatewayError::BadRequest("model field must be text".to_string()))?;
            model = Some(value);
        } else if !data.is_empty() {
            images.push(data);
        }
    }

    Ok((model, images))
}
