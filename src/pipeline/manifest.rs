//! Model-directory loader driven by a `pipeline.json` manifest

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::pipeline::relief::{ReliefParams, ReliefPipeline};
use crate::pipeline::remote::{RemoteParams, RemotePipeline};
use crate::pipeline::traits::{ImageTo3dPipeline, PipelineLoader};

/// File name of the manifest inside a model directory
pub const MANIFEST_FILE: &str = "pipeline.json";

/// Describes which pipeline implementation a model directory holds
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineManifest {
    pub name: String,
    pub backend: BackendSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSpec {
    Relief(ReliefParams),
    Remote(RemoteParams),
}

impl PipelineManifest {
    /// Read and parse the manifest of a model directory
    pub fn read(model_dir: &Path) -> Result<Self> {
        if !model_dir.is_dir() {
            return Err(AppError::ResourceUnavailable(format!(
                "Model dir not found: {}",
                model_dir.display()
            )));
        }

        let path = model_dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| {
            AppError::ResourceUnavailable(format!(
                "Cannot read pipeline manifest {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            AppError::ResourceUnavailable(format!(
                "Invalid pipeline manifest {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Default loader: reads the manifest and builds the matching pipeline
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestLoader;

impl PipelineLoader for ManifestLoader {
    fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ImageTo3dPipeline>> {
        let manifest = PipelineManifest::read(&config.dir)?;
        let device = config
            .device()
            .map_err(|e| AppError::ResourceUnavailable(e.to_string()))?;

        info!(
            name = %manifest.name,
            model_dir = %config.dir.display(),
            device = %device,
            "Loading pipeline"
        );

        let pipeline: Arc<dyn ImageTo3dPipeline> = match manifest.backend {
            BackendSpec::Relief(params) => {
                params.validate()?;
                Arc::new(ReliefPipeline::new(manifest.name, params, device))
            }
            BackendSpec::Remote(params) => {
                let pipeline = RemotePipeline::new(manifest.name, &params, config, device)?;
                let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                    AppError::ResourceUnavailable(
                        "Remote pipeline must be loaded inside a tokio runtime".to_string(),
                    )
                })?;
                if !runtime.block_on(pipeline.health_check()) {
                    return Err(AppError::ResourceUnavailable(format!(
                        "Inference worker at {} is not healthy",
                        params.endpoint
                    )));
                }
                Arc::new(pipeline)
            }
        };

        Ok(pipeline)
    }
}
