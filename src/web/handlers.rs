use crate::{
    classify::{AsyncClassifier, BatchReport, ClassificationResult},
    image::RawImage,
    models::get_classifier,
    utils::error::VisionError,
    web::extractors::{RequestId, ValidatedJson},
    Config, Result,
};
use axum::{
    extract::{multipart::Field, Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// JSON request body (base64 mode)
#[derive(Debug, Deserialize)]
pub struct ClassifyJsonRequest {
    /// Base64 image data, optionally as a data URL
    pub image: String,

    /// Identifier echoed back in logs
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

pub async fn classify_json_handler(
    State(_config): State<Config>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ClassifyJsonRequest>,
) -> Result<Json<ApiResponse<ClassificationResult>>> {
    let start_time = Instant::now();
    let name = request.name.unwrap_or_else(|| "image".to_string());

    tracing::info!(
        "Processing JSON classify request: request_id={}, name={}",
        request_id,
        name
    );

    let image = RawImage::from_base64(name, &request.image)?;
    let result = get_classifier()?.classify_async(image).await?;

    tracing::info!(
        "JSON classify completed: request_id={}, label={}, confidence={:.4}, time={:.3}s",
        request_id,
        result.label,
        result.confidence,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(result, request_id)))
}

pub async fn classify_upload_handler(
    State(_config): State<Config>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ClassificationResult>>> {
    let start_time = Instant::now();
    tracing::info!("Processing multipart classify request: request_id={}", request_id);

    let mut image: Option<RawImage> = None;
    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().unwrap_or("unknown").to_string();
        match field_name.as_str() {
            "file" => {
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/") {
                        return Err(VisionError::InvalidInput(format!(
                            "Expected an image upload, got {}",
                            content_type
                        )));
                    }
                }
                let raw = read_image_field(field).await?;
                tracing::debug!("Received file '{}': {} bytes", raw.name, raw.len());
                image = Some(raw);
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let image =
        image.ok_or_else(|| VisionError::InvalidInput("No image file provided".to_string()))?;
    let result = get_classifier()?.classify_async(image).await?;

    tracing::info!(
        "Upload classify completed: request_id={}, label={}, time={:.3}s",
        request_id,
        result.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(result, request_id)))
}

/// Classifies every `files` field in upload order. Failed items are reported, not fatal.
pub async fn classify_batch_handler(
    State(config): State<Config>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<BatchReport>>> {
    let start_time = Instant::now();
    tracing::info!("Processing batch classify request: request_id={}", request_id);

    let max_items = config.server_config.max_batch_items;
    let mut images = Vec::new();
    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() != Some("files") {
            continue;
        }
        if images.len() == max_items {
            return Err(VisionError::InvalidInput(format!(
                "Too many files in batch, maximum is {}",
                max_items
            )));
        }
        images.push(read_image_field(field).await?);
    }

    if images.is_empty() {
        return Err(VisionError::InvalidInput("No image files provided".to_string()));
    }

    let report = get_classifier()?.classify_batch_async(images).await?;

    tracing::info!(
        "Batch classify completed: request_id={}, files={}, done={}, time={:.3}s",
        request_id,
        report.items.len(),
        report.statistics.as_ref().map_or(0, |s| s.done_count),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(report, request_id)))
}

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>> {
    multipart
        .next_field()
        .await
        .map_err(|e| VisionError::InvalidInput(format!("Failed to read multipart field: {}", e)))
}

async fn read_image_field(field: Field<'_>) -> Result<RawImage> {
    let name = field.file_name().unwrap_or("upload").to_string();
    let data = field
        .bytes()
        .await
        .map_err(|e| VisionError::InvalidInput(format!("Failed to read file data: {}", e)))?;
    Ok(RawImage::new(name, data.to_vec()))
}
