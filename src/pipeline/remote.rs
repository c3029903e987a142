//! Pipeline hosted by an inference worker over HTTP

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::pipeline::traits::{Device, ImageTo3dPipeline, PipelineOutput};
use crate::response::base64;

/// Worker location read from the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteParams {
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_health_path")]
    pub health_check_path: String,
}

fn default_timeout_ms() -> u64 {
    600_000
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// Run request sent to the worker
#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    /// Base64 PNG per view, in order
    images: Vec<String>,
    seed: u64,
    multi_image: bool,
    device: String,
    attn_backend: &'a str,
    spconv_algo: &'a str,
}

pub struct RemotePipeline {
    name: String,
    client: Client,
    endpoint: String,
    health_check_path: String,
    device: Device,
    attn_backend: String,
    spconv_algo: String,
}

impl RemotePipeline {
    /// Create a new remote pipeline from manifest parameters
    pub fn new(
        name: impl Into<String>,
        params: &RemoteParams,
        model: &ModelConfig,
        device: Device,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(params.timeout_ms))
            .build()
            .map_err(|e| {
                AppError::ResourceUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            name: name.into(),
            client,
            endpoint: params.endpoint.trim_end_matches('/').to_string(),
            health_check_path: params.health_check_path.clone(),
            device,
            attn_backend: model.attn_backend.clone(),
            spconv_algo: model.spconv_algo.clone(),
        })
    }

    /// Check if the worker answers its health endpoint
    pub async fn health_check(&self) -> bool {
        let url = format!("{}{}", self.endpoint, self.health_check_path);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(pipeline = %self.name, endpoint = %self.endpoint, "Health check passed");
                true
            }
            Ok(response) => {
                warn!(
                    pipeline = %self.name,
                    endpoint = %self.endpoint,
                    status = %response.status(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                warn!(
                    pipeline = %self.name,
                    endpoint = %self.endpoint,
                    error = %e,
                    "Health check failed"
                );
                false
            }
        }
    }

    async fn post_run(
        &self,
        images: Vec<DynamicImage>,
        seed: u64,
        multi_image: bool,
    ) -> Result<PipelineOutput> {
        if images.is_empty() {
            return Err(AppError::GenerationFailed("No input images".to_string()));
        }

        let encoded = tokio::task::spawn_blocking(move || {
            images.iter().map(encode_png).collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| AppError::GenerationFailed(format!("Encoding task failed: {}", e)))??;

        let request = RunRequest {
            images: encoded,
            seed,
            multi_image,
            device: self.device.to_string(),
            attn_backend: &self.attn_backend,
            spconv_algo: &self.spconv_algo,
        };

        let url = format!("{}/run", self.endpoint);
        debug!(pipeline = %self.name, url = %url, views = request.images.len(), "Sending run request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationFailed(format!("Worker request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationFailed(format!(
                "Worker returned {}: {}",
                status, body
            )));
        }

        response
            .json::<PipelineOutput>()
            .await
            .map_err(|e| AppError::GenerationFailed(format!("Failed to parse worker output: {}", e)))
    }
}

fn encode_png(image: &DynamicImage) -> Result<String> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .map_err(|e| AppError::GenerationFailed(format!("Failed to encode view: {}", e)))?;
    Ok(base64::encode(&buf))
}

#[async_trait]
impl ImageTo3dPipeline for RemotePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        self.device
    }

    async fn run(&self, image: DynamicImage, seed: u64) -> Result<PipelineOutput> {
        self.post_run(vec![image], seed, false).await
    }

    async fn run_multi_image(
        &self,
        images: Vec<DynamicImage>,
        seed: u64,
    ) -> Result<PipelineOutput> {
        self.post_run(images, seed, true).await
    }
}
