use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Malformed or unsupported image bytes.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty image data")]
    Empty,

    #[error("Image too large: {0} bytes, max allowed: {1} bytes")]
    TooLarge(usize, usize),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// The inference engine rejected the tensor or returned something unusable.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Model output '{name}' not found. Available outputs: {available:?}")]
    MissingOutput { name: String, available: Vec<String> },

    #[error("Model returned an empty output tensor")]
    EmptyOutput,

    #[error("Expected batch size 1 in model output, got shape {0:?}")]
    UnexpectedShape(Vec<usize>),

    #[error("Model output contains a non-finite logit at index {0}")]
    NonFinite(usize),

    #[error("Inference backend failed: {0}")]
    Backend(String),
}

/// Failure of a single classify call, wrapping the first stage that failed.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<DecodeError> for VisionError {
    fn from(err: DecodeError) -> Self {
        VisionError::Classification(err.into())
    }
}

impl From<InferenceError> for VisionError {
    fn from(err: InferenceError) -> Self {
        VisionError::Classification(err.into())
    }
}

impl VisionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VisionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            VisionError::Base64(_) => StatusCode::BAD_REQUEST,
            VisionError::Json(_) => StatusCode::BAD_REQUEST,
            VisionError::Classification(ClassificationError::Decode(e)) => match e {
                DecodeError::TooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
                DecodeError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::BAD_REQUEST,
            },
            VisionError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            VisionError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            VisionError::Classification(ClassificationError::Decode(_)) => "IMAGE_DECODE_ERROR",
            VisionError::Classification(ClassificationError::Inference(_)) => "INFERENCE_ERROR",
            VisionError::InvalidInput(_) => "INVALID_INPUT",
            VisionError::Config(_) => "CONFIG_ERROR",
            VisionError::Io(_) => "IO_ERROR",
            VisionError::Json(_) => "JSON_ERROR",
            VisionError::Base64(_) => "BASE64_DECODE_ERROR",
            VisionError::Ort(_) => "ORT_ERROR",
            VisionError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for VisionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "success": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_map_to_client_statuses() {
        let too_large: VisionError = DecodeError::TooLarge(10, 5).into();
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.error_code(), "IMAGE_DECODE_ERROR");

        let unsupported: VisionError = DecodeError::UnsupportedFormat("ico".into()).into();
        assert_eq!(unsupported.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let empty: VisionError = DecodeError::Empty.into();
        assert_eq!(empty.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn inference_errors_are_server_errors() {
        let err: VisionError = InferenceError::EmptyOutput.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "INFERENCE_ERROR");
    }

    #[test]
    fn classification_error_displays_underlying_cause() {
        let err = ClassificationError::from(InferenceError::NonFinite(3));
        assert_eq!(err.to_string(), "Model output contains a non-finite logit at index 3");
    }
}
