//! Image-to-3D Serving Core
//!
//! Serves a single, expensive image-to-3D pipeline: lazily loaded once per
//! process, shared by every request, and driven by one generation at a time.
//! Also hosts the export writers used by the command-line generators.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod response;
pub mod serving;

pub use error::{AppError, Result};

use std::sync::Arc;

use pipeline::{ManifestLoader, PipelineLoader};
use serving::{
    GenerationSerializer, GenerationService, PipelineHandle, SerializerConfig, WorkspaceManager,
};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: config::Settings,
    pub pipeline: PipelineHandle,
    pub serializer: GenerationSerializer,
    pub service: GenerationService,
}

impl AppState {
    /// Wire the shared handle, the generation lock and the workspace root
    pub fn new(settings: config::Settings, loader: Arc<dyn PipelineLoader>) -> Self {
        let pipeline = PipelineHandle::new(settings.model.clone(), loader);
        let serializer =
            GenerationSerializer::with_config(SerializerConfig::from(&settings.generation));
        let workspaces = Arc::new(WorkspaceManager::new(settings.storage.output_dir.clone()));
        let service = GenerationService::new(
            pipeline.clone(),
            serializer.clone(),
            workspaces,
            settings.generation.seed,
        );

        Self {
            settings,
            pipeline,
            serializer,
            service,
        }
    }

    /// State backed by the model-directory manifest loader
    pub fn from_settings(settings: config::Settings) -> Self {
        Self::new(settings, Arc::new(ManifestLoader))
    }
}
