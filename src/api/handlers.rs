//! HTTP request handlers

use crate::api::models::{
    GenerationStatus, HealthResponse, RootResponse, ENDPOINTS, MODE_RAW_MESH_OBJ,
};
use crate::error::{AppError, Result};
use crate::response::ArtifactResponse;
use crate::serving::UploadedImage;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Multipart field carrying the input image
pub const IMAGE_FIELD: &str = "image";

/// Liveness and pipeline status. Reads atomics only, so it answers while a
/// load or a generation is in progress.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pipeline = &state.pipeline;
    let serializer = &state.serializer;

    Json(HealthResponse {
        ok: true,
        model_loaded: pipeline.is_loaded(),
        mode: MODE_RAW_MESH_OBJ.to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        state: pipeline.state(),
        load_failures: pipeline.load_failures(),
        last_load_error: pipeline.last_error(),
        generation: GenerationStatus {
            active: serializer.active(),
            waiting: serializer.waiting(),
            completed: serializer.completed(),
        },
    })
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        ok: true,
        try_routes: vec!["/health".to_string(), "/generate-obj".to_string()],
    })
}

/// Generate an untextured OBJ from the uploaded `image` field
pub async fn generate_raw_obj(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ArtifactResponse> {
    let upload = read_image_field(multipart).await?;
    info!(
        filename = ?upload.filename,
        bytes = upload.data.len(),
        "Received raw OBJ generation request"
    );

    let artifact = state.service.generate_raw_obj(upload).await?;

    info!(
        job_id = %artifact.job_id,
        path = %artifact.path.display(),
        bytes = artifact.data.len(),
        "Raw OBJ generation completed"
    );
    Ok(ArtifactResponse::new(artifact.filename, artifact.data))
}

/// Alias of [`generate_raw_obj`]
pub async fn generate_obj(
    state: State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ArtifactResponse> {
    generate_raw_obj(state, multipart).await
}

async fn read_image_field(mut multipart: Multipart) -> Result<UploadedImage> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Malformed multipart body", e))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field.file_name().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read upload", e))?;

        return Ok(UploadedImage {
            filename,
            data: data.to_vec(),
        });
    }

    Err(AppError::InvalidRequest(format!(
        "Missing multipart field '{}'",
        IMAGE_FIELD
    )))
}

/// Body-limit rejections keep their 413; everything else is a malformed request
fn multipart_error(context: &str, err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge(err.body_text())
    } else {
        AppError::InvalidRequest(format!("{}: {}", context, err))
    }
}
