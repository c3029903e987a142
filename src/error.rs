//! Common error types for the image-to-3D serving core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Empty upload")]
    EmptyInput,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Upload too large: {0}")]
    UploadTooLarge(String),

    #[error("Pipeline load failed: {0}")]
    ResourceUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("{0}")]
    ArtifactMissing(String),

    #[error("Generation busy: {0}")]
    Busy(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status code, error type and machine-readable code for the response envelope
    pub fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_json")),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "backend_error", None),
            AppError::InputNotFound(_) => (StatusCode::NOT_FOUND, "invalid_request_error", Some("input_not_found")),
            AppError::EmptyInput => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("empty_input")),
            AppError::InvalidRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request_error", None),
            AppError::InvalidImage(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_image")),
            AppError::UploadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "invalid_request_error", Some("upload_too_large")),
            AppError::ResourceUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("resource_unavailable")),
            AppError::GenerationFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("generation_failed")),
            AppError::ExportFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("export_failed")),
            AppError::ArtifactMissing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("artifact_missing")),
            AppError::Busy(_) => (StatusCode::SERVICE_UNAVAILABLE, "server_error", Some("generation_busy")),
            AppError::Timeout(_) => (StatusCode::SERVICE_UNAVAILABLE, "timeout_error", Some("generation_lock_timeout")),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::InvalidImage(err.to_string())
    }
}

/// Error response format
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.classify();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
