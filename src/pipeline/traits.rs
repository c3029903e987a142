//! Common traits and types for image-to-3D pipelines

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::error::{AppError, Result};

/// Compute device a pipeline is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda(u32),
}

impl FromStr for Device {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| AppError::InvalidRequest(format!("Unknown device '{}'", s))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

/// A set of 3D Gaussians (point splats)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaussianSplat {
    /// Centers
    pub positions: Vec<[f32; 3]>,
    /// Linear RGB in [0, 1]
    pub colors: Vec<[f32; 3]>,
    /// Opacity in [0, 1]
    pub opacities: Vec<f32>,
    /// Per-axis standard deviation
    pub scales: Vec<[f32; 3]>,
    /// Unit quaternions (w, x, y, z)
    pub rotations: Vec<[f32; 4]>,
}

impl GaussianSplat {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Check that every attribute array matches the number of centers
    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        if self.colors.len() != n
            || self.opacities.len() != n
            || self.scales.len() != n
            || self.rotations.len() != n
        {
            return Err(AppError::ExportFailed(format!(
                "Gaussian attribute length mismatch: {} positions, {} colors, {} opacities, {} scales, {} rotations",
                n,
                self.colors.len(),
                self.opacities.len(),
                self.scales.len(),
                self.rotations.len()
            )));
        }
        Ok(())
    }
}

/// Dense density grid over the unit cube centered at the origin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadianceField {
    pub resolution: u32,
    /// `resolution^3` densities, x fastest
    pub density: Vec<f32>,
}

impl RadianceField {
    /// Number of cells with non-zero density
    pub fn occupied(&self) -> usize {
        self.density.iter().filter(|d| **d > 0.0).count()
    }
}

/// Triangle mesh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl MeshData {
    /// Check that the mesh has geometry and all faces reference real vertices
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return Err(AppError::ExportFailed(format!(
                "Mesh is empty ({} vertices, {} faces)",
                self.vertices.len(),
                self.faces.len()
            )));
        }
        let count = self.vertices.len() as u32;
        if let Some(face) = self.faces.iter().find(|f| f.iter().any(|i| *i >= count)) {
            return Err(AppError::ExportFailed(format!(
                "Face {:?} references a vertex outside 0..{}",
                face, count
            )));
        }
        Ok(())
    }

    /// Axis-aligned bounds as (min, max)
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        (min, max)
    }
}

/// Result bundle of one generation call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    #[serde(default)]
    pub gaussian: Vec<GaussianSplat>,
    #[serde(default)]
    pub radiance_field: Vec<RadianceField>,
    #[serde(default)]
    pub mesh: Vec<MeshData>,
}

impl PipelineOutput {
    /// First mesh; only the first element of each collection is exported
    pub fn first_mesh(&self) -> Result<&MeshData> {
        self.mesh
            .first()
            .ok_or_else(|| AppError::GenerationFailed("Pipeline produced no mesh".to_string()))
    }

    pub fn first_gaussian(&self) -> Result<&GaussianSplat> {
        self.gaussian
            .first()
            .ok_or_else(|| AppError::GenerationFailed("Pipeline produced no Gaussians".to_string()))
    }

    /// Counts of each output collection
    pub fn summary(&self) -> OutputSummary {
        OutputSummary {
            gaussians: self.gaussian.len(),
            radiance_fields: self.radiance_field.len(),
            meshes: self.mesh.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSummary {
    pub gaussians: usize,
    pub radiance_fields: usize,
    pub meshes: usize,
}

/// An image-to-3D generative pipeline.
///
/// Implementations are not required to be reentrant. Callers that share one
/// instance across requests go through
/// [`GenerationSerializer`](crate::serving::GenerationSerializer).
#[async_trait]
pub trait ImageTo3dPipeline: Send + Sync {
    /// Get the pipeline name
    fn name(&self) -> &str;

    /// Device the pipeline was bound to at load time
    fn device(&self) -> Device;

    /// Generate 3D assets from a single image
    async fn run(&self, image: DynamicImage, seed: u64) -> Result<PipelineOutput>;

    /// Generate 3D assets from an ordered set of views of one object
    async fn run_multi_image(&self, images: Vec<DynamicImage>, seed: u64)
        -> Result<PipelineOutput>;
}

/// Constructs a pipeline from a model location. Loading is blocking.
pub trait PipelineLoader: Send + Sync {
    fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ImageTo3dPipeline>>;
}
