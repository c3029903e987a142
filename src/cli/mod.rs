//! Command-line generators: one image or a directory of views to a set of
//! exported artifacts

use clap::{Args, Parser};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{ExportConfig, ModelConfig, Settings};
use crate::error::{AppError, Result};
use crate::export::{self, ExportReport, ExportTargets};
use crate::pipeline::{OutputSummary, PipelineLoader};
use crate::serving::job::as_generation_failure;
use crate::serving::PipelineHandle;

/// Extensions accepted as views by the multiview generator
pub const VIEW_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Options shared by both generators
#[derive(Args, Debug, Clone)]
pub struct GenerateOptions {
    /// Model directory holding `pipeline.json`
    #[arg(long, default_value = "./TRELLIS-image-large")]
    pub model_dir: PathBuf,

    /// Device to bind the pipeline to (cuda, cuda:N or cpu)
    #[arg(long, default_value = "cuda")]
    pub device: String,

    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Fraction of triangles removed before texturing
    #[arg(long, default_value_t = 0.95)]
    pub simplify: f32,

    #[arg(long, default_value_t = 1024)]
    pub texture_size: u32,

    /// Log format: json or pretty
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl GenerateOptions {
    /// Model configuration; attention and sparse-conv settings come from the
    /// `ATTN_BACKEND` / `SPCONV_ALGO` environment when set
    pub fn model_config(&self) -> ModelConfig {
        let mut config = ModelConfig::with_dir(self.model_dir.clone());
        config.device = self.device.clone();
        if let Ok(attn_backend) = std::env::var("ATTN_BACKEND") {
            config.attn_backend = attn_backend;
        }
        if let Ok(spconv_algo) = std::env::var("SPCONV_ALGO") {
            config.spconv_algo = spconv_algo;
        }
        config
    }

    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            simplify: self.simplify,
            texture_size: self.texture_size,
        }
    }

    /// Reject options the server configuration would also reject
    pub fn validate(&self) -> Result<()> {
        let settings = Settings {
            model: self.model_config(),
            export: self.export_config(),
            ..Settings::default()
        };
        settings
            .validate()
            .map_err(|e| AppError::InvalidRequest(e.to_string()))
    }
}

/// Generate 3D assets from a single image
#[derive(Parser, Debug, Clone)]
#[command(name = "img3d-generate", about = "Generate 3D assets from a single image")]
pub struct SingleArgs {
    /// Input image
    pub image_path: PathBuf,

    /// Output prefix; `.ply`, `.glb`, `.obj` and `_raw.obj` are derived from it
    pub output_prefix: PathBuf,

    #[command(flatten)]
    pub options: GenerateOptions,
}

/// Generate 3D assets from a directory of views of one object
#[derive(Parser, Debug, Clone)]
#[command(
    name = "img3d-generate-multi",
    about = "Generate 3D assets from multiple views of one object"
)]
pub struct MultiArgs {
    /// Directory of view images, used in file-name order
    pub image_dir: PathBuf,

    pub output_prefix: PathBuf,

    #[command(flatten)]
    pub options: GenerateOptions,
}

/// Outcome of a CLI run that got as far as exporting
#[derive(Debug)]
pub struct CliReport {
    pub pipeline: String,
    pub summary: OutputSummary,
    pub exports: ExportReport,
}

impl CliReport {
    /// 0 when any export succeeded, 2 when all of them failed
    pub fn exit_code(&self) -> i32 {
        if self.exports.any_succeeded() {
            0
        } else {
            2
        }
    }

    /// Human-readable summary for stdout
    pub fn render(&self) -> String {
        let mut out = format!(
            "Pipeline: {}\nOutputs: gaussian={} radiance_field={} mesh={}\n",
            self.pipeline,
            self.summary.gaussians,
            self.summary.radiance_fields,
            self.summary.meshes
        );
        for (format, outcome) in self.exports.iter() {
            match outcome {
                Ok(paths) => {
                    let files: Vec<String> =
                        paths.iter().map(|p| p.display().to_string()).collect();
                    out.push_str(&format!("Saved {}: {}\n", format, files.join(", ")));
                }
                Err(reason) => out.push_str(&format!("{} export failed: {}\n", format, reason)),
            }
        }
        out
    }
}

/// Image files in `dir` with a view extension, sorted by file name
pub fn collect_view_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(AppError::InputNotFound(format!(
            "Image directory not found: {}",
            dir.display()
        )));
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_view_extension(path))
        .collect();

    if images.is_empty() {
        return Err(AppError::InputNotFound(format!(
            "No images found in {}",
            dir.display()
        )));
    }

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

fn has_view_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIEW_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Single-image generation followed by best-effort export
pub async fn run_single(args: &SingleArgs, loader: Arc<dyn PipelineLoader>) -> Result<CliReport> {
    if !args.image_path.is_file() {
        return Err(AppError::InputNotFound(format!(
            "Image not found: {}",
            args.image_path.display()
        )));
    }
    args.options.validate()?;

    let handle = PipelineHandle::new(args.options.model_config(), loader);
    let pipeline = handle.acquire().await?;
    info!(pipeline = %pipeline.name(), device = %pipeline.device(), "Pipeline ready");

    let image = load_image(args.image_path.clone()).await?;
    let output = pipeline
        .run(image, args.options.seed)
        .await
        .map_err(as_generation_failure)?;

    let exports = export_outputs(&output, &args.output_prefix, &args.options).await?;
    Ok(CliReport {
        pipeline: pipeline.name().to_string(),
        summary: output.summary(),
        exports,
    })
}

/// Multiview generation followed by best-effort export
pub async fn run_multi(args: &MultiArgs, loader: Arc<dyn PipelineLoader>) -> Result<CliReport> {
    let paths = collect_view_images(&args.image_dir)?;
    args.options.validate()?;
    info!(views = paths.len(), dir = %args.image_dir.display(), "Collected views");

    let handle = PipelineHandle::new(args.options.model_config(), loader);
    let pipeline = handle.acquire().await?;
    info!(pipeline = %pipeline.name(), device = %pipeline.device(), "Pipeline ready");

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(load_image(path).await?);
    }

    let output = pipeline
        .run_multi_image(images, args.options.seed)
        .await
        .map_err(as_generation_failure)?;

    let exports = export_outputs(&output, &args.output_prefix, &args.options).await?;
    Ok(CliReport {
        pipeline: pipeline.name().to_string(),
        summary: output.summary(),
        exports,
    })
}

/// Decoded as stored; an alpha channel reaches the pipeline as a foreground mask
async fn load_image(path: PathBuf) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || {
        image::io::Reader::open(&path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| AppError::InvalidImage(format!("{}: {}", path.display(), e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Decode task failed: {}", e)))?
}

async fn export_outputs(
    output: &crate::pipeline::PipelineOutput,
    prefix: &Path,
    options: &GenerateOptions,
) -> Result<ExportReport> {
    if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let output = output.clone();
    let targets = ExportTargets::from_prefix(prefix);
    let config = options.export_config();
    tokio::task::spawn_blocking(move || export::export_all(&output, &targets, &config))
        .await
        .map_err(|e| AppError::Internal(format!("Export task failed: {}", e)))
}
