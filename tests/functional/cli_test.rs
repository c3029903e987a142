//! Functional tests for the command-line generators

use async_trait::async_trait;
use clap::Parser;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
use img_to_3d_serving::{
    cli::{self, MultiArgs, SingleArgs},
    config::ModelConfig,
    error::{AppError, Result},
    export::ExportFormat,
    pipeline::{
        Device, GaussianSplat, ImageTo3dPipeline, ManifestLoader, MeshData, PipelineLoader,
        PipelineOutput,
    },
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn write_png(path: &Path, width: u32, height: u32) {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

/// Opaque square centered on a fully transparent border
fn write_cutout_png(path: &Path, size: u32, border: u32) {
    let image = RgbaImage::from_fn(size, size, |x, y| {
        let inside = (border..size - border).contains(&x) && (border..size - border).contains(&y);
        if inside {
            Rgba([200, 120, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

fn splat() -> GaussianSplat {
    GaussianSplat {
        positions: vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.0]],
        colors: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        opacities: vec![0.8, 0.8],
        scales: vec![[0.05; 3]; 2],
        rotations: vec![[1.0, 0.0, 0.0, 0.0]; 2],
    }
}

/// Pipeline returning a fixed output and recording the views it saw
struct FixedPipeline {
    output: PipelineOutput,
    seen_widths: Mutex<Vec<u32>>,
    seen_alpha: Mutex<Vec<bool>>,
}

impl FixedPipeline {
    fn new(output: PipelineOutput) -> Arc<Self> {
        Arc::new(Self {
            output,
            seen_widths: Mutex::new(Vec::new()),
            seen_alpha: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageTo3dPipeline for FixedPipeline {
    fn name(&self) -> &str {
        "fixed"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    async fn run(&self, image: DynamicImage, _seed: u64) -> Result<PipelineOutput> {
        self.seen_widths.lock().push(image.dimensions().0);
        self.seen_alpha.lock().push(image.color().has_alpha());
        Ok(self.output.clone())
    }

    async fn run_multi_image(&self, images: Vec<DynamicImage>, _seed: u64) -> Result<PipelineOutput> {
        self.seen_widths
            .lock()
            .extend(images.iter().map(|image| image.dimensions().0));
        Ok(self.output.clone())
    }
}

struct FixedLoader {
    calls: AtomicUsize,
    pipeline: Arc<FixedPipeline>,
}

impl FixedLoader {
    fn new(pipeline: Arc<FixedPipeline>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            pipeline,
        })
    }
}

impl PipelineLoader for FixedLoader {
    fn load(&self, _config: &ModelConfig) -> Result<Arc<dyn ImageTo3dPipeline>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pipeline.clone())
    }
}

struct FailingLoader;

impl PipelineLoader for FailingLoader {
    fn load(&self, _config: &ModelConfig) -> Result<Arc<dyn ImageTo3dPipeline>> {
        Err(AppError::ResourceUnavailable("out of device memory".to_string()))
    }
}

fn single_args(image: &Path, prefix: &Path) -> SingleArgs {
    SingleArgs::parse_from([
        "img3d-generate".to_string(),
        image.display().to_string(),
        prefix.display().to_string(),
        "--device".to_string(),
        "cpu".to_string(),
        "--texture-size".to_string(),
        "64".to_string(),
    ])
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FixedLoader::new(FixedPipeline::new(PipelineOutput::default()));
    let args = single_args(&dir.path().join("missing.png"), &dir.path().join("out"));

    let err = cli::run_single(&args, loader.clone()).await.err().unwrap();
    assert!(matches!(err, AppError::InputNotFound(_)));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_load_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("in.png");
    write_png(&image, 16, 16);
    let args = single_args(&image, &dir.path().join("out"));

    let err = cli::run_single(&args, Arc::new(FailingLoader)).await.err().unwrap();
    match err {
        AppError::ResourceUnavailable(msg) => assert!(msg.contains("out of device memory")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_export_keeps_ply() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("in.png");
    write_png(&image, 16, 16);
    let prefix = dir.path().join("nested").join("chair");

    let output = PipelineOutput {
        gaussian: vec![splat()],
        radiance_field: Vec::new(),
        mesh: vec![MeshData {
            vertices: vec![[0.0; 3]; 3],
            faces: vec![[0, 1, 9]],
        }],
    };
    let loader = FixedLoader::new(FixedPipeline::new(output));

    let report = cli::run_single(&single_args(&image, &prefix), loader)
        .await
        .unwrap();

    assert!(report.exports.get(ExportFormat::GaussianPly).unwrap().is_ok());
    assert!(report.exports.get(ExportFormat::TexturedMesh).unwrap().is_err());
    assert!(report.exports.get(ExportFormat::RawObj).unwrap().is_err());
    assert_eq!(report.exit_code(), 0);
    assert!(dir.path().join("nested").join("chair.ply").is_file());
    assert!(!dir.path().join("nested").join("chair_raw.obj").exists());

    let rendered = report.render();
    assert!(rendered.contains("gaussian=1"));
    assert!(rendered.contains("raw OBJ export failed"));
}

#[tokio::test]
async fn test_all_exports_failing_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("in.png");
    write_png(&image, 16, 16);

    let loader = FixedLoader::new(FixedPipeline::new(PipelineOutput::default()));
    let report = cli::run_single(&single_args(&image, &dir.path().join("empty")), loader)
        .await
        .unwrap();

    assert_eq!(report.exports.failed(), 3);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("in.png");
    write_png(&image, 16, 16);

    let mut args = single_args(&image, &dir.path().join("out"));
    args.options.texture_size = 100;
    let loader = FixedLoader::new(FixedPipeline::new(PipelineOutput::default()));

    assert!(cli::run_single(&args, loader.clone()).await.is_err());
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_multiview_uses_sorted_views() {
    let dir = tempfile::tempdir().unwrap();
    let views = dir.path().join("views");
    std::fs::create_dir(&views).unwrap();
    write_png(&views.join("view_c.png"), 30, 8);
    write_png(&views.join("view_a.PNG"), 10, 8);
    write_png(&views.join("view_b.png"), 20, 8);
    std::fs::write(views.join("readme.txt"), b"not a view").unwrap();

    let pipeline = FixedPipeline::new(PipelineOutput {
        gaussian: vec![splat()],
        radiance_field: Vec::new(),
        mesh: Vec::new(),
    });
    let loader = FixedLoader::new(pipeline.clone());

    let args = MultiArgs::parse_from([
        "img3d-generate-multi".to_string(),
        views.display().to_string(),
        dir.path().join("multi").display().to_string(),
        "--device".to_string(),
        "cpu".to_string(),
    ]);
    let report = cli::run_multi(&args, loader).await.unwrap();

    assert_eq!(*pipeline.seen_widths.lock(), vec![10, 20, 30]);
    assert_eq!(report.summary.gaussians, 1);
    assert_eq!(report.summary.meshes, 0);
    assert!(report.exports.get(ExportFormat::GaussianPly).unwrap().is_ok());
}

#[tokio::test]
async fn test_multiview_without_images_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), b"x").unwrap();
    let loader = FixedLoader::new(FixedPipeline::new(PipelineOutput::default()));

    let args = MultiArgs::parse_from([
        "img3d-generate-multi".to_string(),
        dir.path().display().to_string(),
        dir.path().join("out").display().to_string(),
    ]);
    let err = cli::run_multi(&args, loader.clone()).await.err().unwrap();
    assert!(matches!(err, AppError::InputNotFound(_)));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_relief_model_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model");
    std::fs::create_dir(&model).unwrap();
    std::fs::write(
        model.join("pipeline.json"),
        r#"{"name": "relief-cli", "backend": {"kind": "relief", "grid_size": 24}}"#,
    )
    .unwrap();
    let image = dir.path().join("in.png");
    write_png(&image, 48, 48);
    let prefix = dir.path().join("out").join("chair");

    let args = SingleArgs::parse_from([
        "img3d-generate".to_string(),
        image.display().to_string(),
        prefix.display().to_string(),
        "--model-dir".to_string(),
        model.display().to_string(),
        "--device".to_string(),
        "cpu".to_string(),
        "--texture-size".to_string(),
        "64".to_string(),
    ]);
    let report = cli::run_single(&args, Arc::new(ManifestLoader)).await.unwrap();

    assert_eq!(report.pipeline, "relief-cli");
    assert_eq!(report.exports.succeeded(), 3, "{}", report.render());
    for name in [
        "chair.ply",
        "chair.glb",
        "chair.obj",
        "chair.mtl",
        "chair_texture.png",
        "chair_raw.obj",
    ] {
        assert!(dir.path().join("out").join(name).is_file(), "missing {}", name);
    }
}

#[tokio::test]
async fn test_alpha_channel_reaches_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("cutout.png");
    write_cutout_png(&image, 32, 8);

    let pipeline = FixedPipeline::new(PipelineOutput {
        gaussian: vec![splat()],
        radiance_field: Vec::new(),
        mesh: Vec::new(),
    });
    let loader = FixedLoader::new(pipeline.clone());
    cli::run_single(&single_args(&image, &dir.path().join("out")), loader)
        .await
        .unwrap();

    assert_eq!(*pipeline.seen_alpha.lock(), vec![true]);

    // Opaque input still arrives without alpha
    let opaque = dir.path().join("opaque.png");
    write_png(&opaque, 16, 16);
    let loader = FixedLoader::new(pipeline.clone());
    cli::run_single(&single_args(&opaque, &dir.path().join("out2")), loader)
        .await
        .unwrap();
    assert_eq!(*pipeline.seen_alpha.lock(), vec![true, false]);
}

#[tokio::test]
async fn test_relief_masks_transparent_border() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model");
    std::fs::create_dir(&model).unwrap();
    std::fs::write(
        model.join("pipeline.json"),
        r#"{"name": "relief-cutout", "backend": {"kind": "relief", "grid_size": 16}}"#,
    )
    .unwrap();
    let image = dir.path().join("cutout.png");
    write_cutout_png(&image, 64, 16);
    let prefix = dir.path().join("cutout");

    let args = SingleArgs::parse_from([
        "img3d-generate".to_string(),
        image.display().to_string(),
        prefix.display().to_string(),
        "--model-dir".to_string(),
        model.display().to_string(),
        "--device".to_string(),
        "cpu".to_string(),
        "--texture-size".to_string(),
        "64".to_string(),
    ]);
    let report = cli::run_single(&args, Arc::new(ManifestLoader)).await.unwrap();
    assert!(report.exports.get(ExportFormat::RawObj).unwrap().is_ok());

    let raw = std::fs::read_to_string(dir.path().join("cutout_raw.obj")).unwrap();
    let vertices = raw.lines().filter(|l| l.starts_with("v ")).count();
    assert!(vertices > 0);
    assert!(vertices < 2 * 16 * 16, "border was meshed: {} vertices", vertices);
}
