//! Request orchestration: validate, stage, acquire, generate, export

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::export::obj;
use crate::pipeline::ImageTo3dPipeline;
use crate::response::file;
use crate::serving::handle::PipelineHandle;
use crate::serving::serializer::GenerationSerializer;
use crate::serving::workspace::WorkspaceManager;

/// File name of the raw mesh artifact inside a job workspace
pub const RAW_OBJ_FILE: &str = "model.obj";

/// Progress of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Received,
    Validated,
    ResourceReady,
    Generating,
    Exported,
    Responded,
    Errored,
}

/// Image bytes as received from the client
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

/// Exported raw mesh ready to be returned
#[derive(Debug)]
pub struct JobArtifact {
    pub job_id: Uuid,
    pub path: PathBuf,
    pub filename: String,
    pub data: Vec<u8>,
}

/// Stage tracking with structured logging
struct JobTrace {
    job_id: Option<Uuid>,
    stage: JobStage,
    started_at: DateTime<Utc>,
}

impl JobTrace {
    fn new() -> Self {
        Self {
            job_id: None,
            stage: JobStage::Received,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, stage: JobStage) {
        self.stage = stage;
        info!(job_id = ?self.job_id, stage = ?stage, "Job stage");
    }

    fn fail<T>(&mut self, err: AppError) -> Result<T> {
        let failed_in = self.stage;
        self.stage = JobStage::Errored;
        warn!(
            job_id = ?self.job_id,
            failed_in = ?failed_in,
            elapsed_ms = (Utc::now() - self.started_at).num_milliseconds(),
            error = %err,
            "Job failed"
        );
        Err(err)
    }
}

/// Handles raw-mesh generation requests against the shared pipeline
#[derive(Clone)]
pub struct GenerationService {
    pipeline: PipelineHandle,
    serializer: GenerationSerializer,
    workspaces: Arc<WorkspaceManager>,
    seed: u64,
}

impl GenerationService {
    pub fn new(
        pipeline: PipelineHandle,
        serializer: GenerationSerializer,
        workspaces: Arc<WorkspaceManager>,
        seed: u64,
    ) -> Self {
        Self {
            pipeline,
            serializer,
            workspaces,
            seed,
        }
    }

    pub fn pipeline(&self) -> &PipelineHandle {
        &self.pipeline
    }

    pub fn serializer(&self) -> &GenerationSerializer {
        &self.serializer
    }

    /// Generate an untextured OBJ from one uploaded image
    pub async fn generate_raw_obj(&self, upload: UploadedImage) -> Result<JobArtifact> {
        let mut trace = JobTrace::new();

        if upload.data.is_empty() {
            return trace.fail(AppError::EmptyInput);
        }

        let workspace = match self.workspaces.new_workspace().await {
            Ok(workspace) => workspace,
            Err(e) => return trace.fail(e),
        };
        trace.job_id = Some(workspace.id());

        let input_path =
            match file::save_upload(workspace.path(), upload.filename.as_deref(), &upload.data)
                .await
            {
                Ok(path) => path,
                Err(e) => return trace.fail(e),
            };
        trace.advance(JobStage::Validated);

        let pipeline = match self.pipeline.acquire().await {
            Ok(pipeline) => pipeline,
            Err(e) => return trace.fail(e),
        };
        trace.advance(JobStage::ResourceReady);

        let out_path = workspace.join(RAW_OBJ_FILE);
        let job_id = workspace.id().to_string();
        let seed = self.seed;
        let target = out_path.clone();

        trace.advance(JobStage::Generating);
        let generated = self
            .serializer
            .with_generation_lock(&job_id, move || {
                generate_and_export(pipeline, input_path, target, seed)
            })
            .await;
        if let Err(e) = generated {
            return trace.fail(e);
        }
        trace.advance(JobStage::Exported);

        let data = match file::read_artifact(&out_path, "OBJ").await {
            Ok(data) => data,
            Err(e) => return trace.fail(e),
        };

        trace.advance(JobStage::Responded);
        Ok(JobArtifact {
            job_id: workspace.id(),
            path: out_path,
            filename: RAW_OBJ_FILE.to_string(),
            data,
        })
    }
}

/// Body of the critical section
async fn generate_and_export(
    pipeline: Arc<dyn ImageTo3dPipeline>,
    input_path: PathBuf,
    out_path: PathBuf,
    seed: u64,
) -> Result<()> {
    let image = decode_rgb(input_path).await?;

    let output = pipeline
        .run(image, seed)
        .await
        .map_err(as_generation_failure)?;
    let mesh = output.first_mesh()?.clone();

    tokio::task::spawn_blocking(move || write_raw(&mesh, &out_path))
        .await
        .map_err(|e| AppError::ExportFailed(format!("Export task failed: {}", e)))?
}

fn write_raw(mesh: &crate::pipeline::MeshData, path: &Path) -> Result<()> {
    obj::write_raw_obj(mesh, path).map_err(as_export_failure)
}

/// Decode failures happen inside the critical section and count as generation failures
async fn decode_rgb(path: PathBuf) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
        let image = image::io::Reader::open(&path)?
            .with_guessed_format()?
            .decode()?;
        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Decode task failed: {}", e)))?
    .map_err(as_generation_failure)
}

pub(crate) fn as_generation_failure(err: AppError) -> AppError {
    match err {
        AppError::GenerationFailed(_) => err,
        other => AppError::GenerationFailed(other.to_string()),
    }
}

fn as_export_failure(err: AppError) -> AppError {
    match err {
        AppError::ExportFailed(_) => err,
        other => AppError::ExportFailed(other.to_string()),
    }
}
