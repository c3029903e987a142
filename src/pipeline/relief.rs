//! CPU reference pipeline.
//!
//! Lifts the input view into a luminance relief: a two-sided height-field mesh
//! over the foreground pixels, one Gaussian per foreground pixel and an
//! occupancy grid as the radiance field. Multiview input averages the views
//! on a common grid before lifting.

use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::pipeline::traits::{
    Device, GaussianSplat, ImageTo3dPipeline, MeshData, PipelineOutput, RadianceField,
};

/// Tunables read from the manifest
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReliefParams {
    /// Samples per side of the height field
    pub grid_size: u32,
    /// Thickness of the relief at full luminance
    pub depth: f32,
    /// Minimum alpha (0-255) for a pixel to count as foreground
    pub alpha_threshold: u8,
    /// Cells per side of the occupancy grid
    pub voxel_resolution: u32,
}

impl Default for ReliefParams {
    fn default() -> Self {
        Self {
            grid_size: 64,
            depth: 0.25,
            alpha_threshold: 8,
            voxel_resolution: 32,
        }
    }
}

impl ReliefParams {
    pub fn validate(&self) -> Result<()> {
        if !(2..=1024).contains(&self.grid_size) {
            return Err(AppError::ResourceUnavailable(format!(
                "grid_size {} must be within 2..=1024",
                self.grid_size
            )));
        }
        if !(1..=256).contains(&self.voxel_resolution) {
            return Err(AppError::ResourceUnavailable(format!(
                "voxel_resolution {} must be within 1..=256",
                self.voxel_resolution
            )));
        }
        if !(self.depth.is_finite() && self.depth > 0.0) {
            return Err(AppError::ResourceUnavailable(format!(
                "depth {} must be positive",
                self.depth
            )));
        }
        Ok(())
    }
}

pub struct ReliefPipeline {
    name: String,
    params: ReliefParams,
}

impl ReliefPipeline {
    pub fn new(name: impl Into<String>, params: ReliefParams, requested: Device) -> Self {
        let name = name.into();
        if requested != Device::Cpu {
            warn!(
                pipeline = %name,
                requested = %requested,
                "Relief pipeline only runs on cpu; ignoring requested device"
            );
        }
        Self { name, params }
    }

    async fn generate(&self, images: Vec<DynamicImage>, seed: u64) -> Result<PipelineOutput> {
        if images.is_empty() {
            return Err(AppError::GenerationFailed("No input images".to_string()));
        }
        let params = self.params;
        tokio::task::spawn_blocking(move || {
            let views: Vec<ViewSample> = images
                .iter()
                .map(|image| ViewSample::from_image(image, params.grid_size))
                .collect();
            lift(&ViewSample::average(&views), &params, seed)
        })
        .await
        .map_err(|e| AppError::GenerationFailed(format!("Relief task failed: {}", e)))?
    }
}

#[async_trait]
impl ImageTo3dPipeline for ReliefPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    async fn run(&self, image: DynamicImage, seed: u64) -> Result<PipelineOutput> {
        self.generate(vec![image], seed).await
    }

    async fn run_multi_image(
        &self,
        images: Vec<DynamicImage>,
        seed: u64,
    ) -> Result<PipelineOutput> {
        self.generate(images, seed).await
    }
}

/// One view resampled to an `n x n` grid
struct ViewSample {
    size: usize,
    colors: Vec<[f32; 3]>,
    alpha: Vec<f32>,
}

impl ViewSample {
    fn from_image(image: &DynamicImage, size: u32) -> Self {
        let has_alpha = image.color().has_alpha();
        let resized = image.resize_exact(size, size, FilterType::Triangle);
        let mut colors = Vec::with_capacity((size * size) as usize);
        let mut alpha = Vec::with_capacity((size * size) as usize);

        for (_, _, pixel) in resized.pixels() {
            let [r, g, b, a] = pixel.0;
            colors.push([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]);
            alpha.push(if has_alpha { a as f32 / 255.0 } else { 1.0 });
        }

        Self {
            size: size as usize,
            colors,
            alpha,
        }
    }

    fn average(views: &[ViewSample]) -> ViewSample {
        let size = views[0].size;
        let count = views.len() as f32;
        let mut colors = vec![[0.0f32; 3]; size * size];
        let mut alpha = vec![0.0f32; size * size];

        for view in views {
            for (i, (c, a)) in view.colors.iter().zip(&view.alpha).enumerate() {
                for k in 0..3 {
                    colors[i][k] += c[k] / count;
                }
                alpha[i] += a / count;
            }
        }

        ViewSample {
            size,
            colors,
            alpha,
        }
    }
}

fn luminance(c: &[f32; 3]) -> f32 {
    0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2]
}

fn lift(view: &ViewSample, params: &ReliefParams, seed: u64) -> Result<PipelineOutput> {
    let n = view.size;
    let cell = 1.0 / n as f32;
    let threshold = params.alpha_threshold as f32 / 255.0;

    let mask: Vec<bool> = view.alpha.iter().map(|a| *a >= threshold).collect();
    // Half-thickness per sample; never zero so front and back stay apart
    let half: Vec<f32> = view
        .colors
        .iter()
        .map(|c| 0.5 * params.depth * (0.25 + 0.75 * luminance(c)))
        .collect();

    let foreground = mask.iter().filter(|m| **m).count();
    if foreground == 0 {
        return Err(AppError::GenerationFailed(
            "Input has no foreground pixels".to_string(),
        ));
    }

    let center = |i: usize, j: usize| -> (f32, f32) {
        ((i as f32 + 0.5) * cell - 0.5, 0.5 - (j as f32 + 0.5) * cell)
    };

    // Mesh: front sheet, then back sheet with flipped winding
    let mut index = vec![u32::MAX; n * n];
    let mut vertices = Vec::with_capacity(foreground * 2);
    for j in 0..n {
        for i in 0..n {
            let p = j * n + i;
            if mask[p] {
                index[p] = vertices.len() as u32;
                let (x, y) = center(i, j);
                vertices.push([x, y, half[p]]);
            }
        }
    }
    let back_offset = vertices.len() as u32;
    for p in 0..n * n {
        if mask[p] {
            let front = vertices[index[p] as usize];
            vertices.push([front[0], front[1], -front[2]]);
        }
    }

    let mut faces = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let v00 = index[j * n + i];
            let v10 = index[j * n + i + 1];
            let v01 = index[(j + 1) * n + i];
            let v11 = index[(j + 1) * n + i + 1];
            if [v00, v10, v01, v11].contains(&u32::MAX) {
                continue;
            }
            faces.push([v00, v01, v11]);
            faces.push([v00, v11, v10]);
            faces.push([v00 + back_offset, v11 + back_offset, v01 + back_offset]);
            faces.push([v00 + back_offset, v10 + back_offset, v11 + back_offset]);
        }
    }

    if faces.is_empty() {
        return Err(AppError::GenerationFailed(format!(
            "Foreground of {} pixels is too sparse to mesh",
            foreground
        )));
    }

    // Gaussians on the front sheet with seeded sub-cell jitter
    let mut rng = StdRng::seed_from_u64(seed);
    let mut splat = GaussianSplat::default();
    for j in 0..n {
        for i in 0..n {
            let p = j * n + i;
            if !mask[p] {
                continue;
            }
            let (x, y) = center(i, j);
            let jx = rng.gen_range(-0.25..0.25) * cell;
            let jy = rng.gen_range(-0.25..0.25) * cell;
            splat.positions.push([x + jx, y + jy, half[p]]);
            splat.colors.push(view.colors[p]);
            splat.opacities.push(view.alpha[p].clamp(0.0, 1.0));
            splat.scales.push([0.5 * cell, 0.5 * cell, 0.25 * cell]);
            splat.rotations.push([1.0, 0.0, 0.0, 0.0]);
        }
    }

    let field = occupancy(n, &mask, &half, params.voxel_resolution as usize);

    debug!(
        vertices = vertices.len(),
        faces = faces.len(),
        gaussians = splat.len(),
        occupied = field.occupied(),
        "Relief lifted"
    );

    Ok(PipelineOutput {
        gaussian: vec![splat],
        radiance_field: vec![field],
        mesh: vec![MeshData { vertices, faces }],
    })
}

fn occupancy(n: usize, mask: &[bool], half: &[f32], resolution: usize) -> RadianceField {
    let mut density = vec![0.0f32; resolution * resolution * resolution];
    let step = 1.0 / resolution as f32;

    for z in 0..resolution {
        let zc = (z as f32 + 0.5) * step - 0.5;
        for y in 0..resolution {
            // grid rows run top to bottom
            let j = ((resolution - 1 - y) * n) / resolution;
            for x in 0..resolution {
                let i = (x * n) / resolution;
                let p = j * n + i;
                if mask[p] && zc.abs() <= half[p] {
                    density[(z * resolution + y) * resolution + x] = 1.0;
                }
            }
        }
    }

    RadianceField {
        resolution: resolution as u32,
        density,
    }
}
