//! Lazily constructed, shared pipeline handle
//!
//! The first [`PipelineHandle::acquire`] call loads the pipeline behind an
//! initialization guard; later calls clone the cached `Arc` without touching
//! the guard. A failed load leaves the handle uninitialized, so the next
//! caller tries again.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::pipeline::{ImageTo3dPipeline, ManifestLoader, PipelineLoader};

/// Lifecycle of the shared pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Uninitialized,
    Initializing,
    Ready,
}

struct HandleInner {
    config: ModelConfig,
    loader: Arc<dyn PipelineLoader>,
    pipeline: RwLock<Option<Arc<dyn ImageTo3dPipeline>>>,
    /// Held only while constructing the pipeline
    init_guard: Mutex<()>,
    initializing: AtomicBool,
    load_failures: AtomicU64,
    last_error: RwLock<Option<String>>,
}

/// Cloneable handle to the single pipeline instance of this process
#[derive(Clone)]
pub struct PipelineHandle {
    inner: Arc<HandleInner>,
}

impl PipelineHandle {
    /// Create a handle that loads with `loader` on first use
    pub fn new(config: ModelConfig, loader: Arc<dyn PipelineLoader>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                config,
                loader,
                pipeline: RwLock::new(None),
                init_guard: Mutex::new(()),
                initializing: AtomicBool::new(false),
                load_failures: AtomicU64::new(0),
                last_error: RwLock::new(None),
            }),
        }
    }

    /// Create a handle backed by the model-directory manifest loader
    pub fn from_config(config: ModelConfig) -> Self {
        Self::new(config, Arc::new(ManifestLoader))
    }

    /// Return the ready pipeline, constructing it on first use
    pub async fn acquire(&self) -> Result<Arc<dyn ImageTo3dPipeline>> {
        if let Some(pipeline) = self.get() {
            return Ok(pipeline);
        }

        // Initialization runs as its own task so a caller that goes away
        // mid-load cannot release the guard while the loader is still running
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.initialize().await })
            .await
            .map_err(|e| AppError::ResourceUnavailable(format!("Initialization task failed: {}", e)))?
    }

    /// The pipeline if it is already loaded; never blocks on the guard
    pub fn get(&self) -> Option<Arc<dyn ImageTo3dPipeline>> {
        self.inner.pipeline.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.pipeline.read().is_some()
    }

    pub fn state(&self) -> ResourceState {
        if self.is_loaded() {
            ResourceState::Ready
        } else if self.inner.initializing.load(Ordering::SeqCst) {
            ResourceState::Initializing
        } else {
            ResourceState::Uninitialized
        }
    }

    /// Number of failed load attempts so far
    pub fn load_failures(&self) -> u64 {
        self.inner.load_failures.load(Ordering::Relaxed)
    }

    /// Message of the most recent failed load, cleared on success
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.inner.config
    }
}

impl HandleInner {
    async fn initialize(&self) -> Result<Arc<dyn ImageTo3dPipeline>> {
        let _guard = self.init_guard.lock().await;

        // Another caller may have finished loading while we waited
        let existing = self.pipeline.read().clone();
        if let Some(pipeline) = existing {
            return Ok(pipeline);
        }

        self.initializing.store(true, Ordering::SeqCst);
        info!(model_dir = %self.config.dir.display(), "Initializing pipeline");

        let loader = self.loader.clone();
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || loader.load(&config))
            .await
            .map_err(|e| AppError::ResourceUnavailable(format!("Loader task failed: {}", e)))
            .and_then(|loaded| loaded);

        let outcome = match result {
            Ok(pipeline) => {
                *self.pipeline.write() = Some(pipeline.clone());
                *self.last_error.write() = None;
                info!(
                    pipeline = %pipeline.name(),
                    device = %pipeline.device(),
                    "Pipeline ready"
                );
                Ok(pipeline)
            }
            Err(e) => {
                let err = match e {
                    AppError::ResourceUnavailable(_) => e,
                    other => AppError::ResourceUnavailable(other.to_string()),
                };
                let failures = self.load_failures.fetch_add(1, Ordering::Relaxed) + 1;
                let message = match &err {
                    AppError::ResourceUnavailable(msg) => msg.clone(),
                    other => other.to_string(),
                };
                *self.last_error.write() = Some(message);
                warn!(error = %err, failures = failures, "Pipeline load failed");
                Err(err)
            }
        };

        self.initializing.store(false, Ordering::SeqCst);
        outcome
    }
}
