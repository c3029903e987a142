//! Export module - artifact writers and best-effort multi-format export

pub mod glb;
pub mod obj;
pub mod ply;
pub mod simplify;
pub mod texture;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ExportConfig;
use crate::error::{AppError, Result};
use crate::pipeline::PipelineOutput;

pub(crate) fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data)
        .map_err(|e| AppError::ExportFailed(format!("Cannot write {}: {}", path.display(), e)))
}

/// `prefix` with `suffix` appended to its file name (`out/chair` + `_raw.obj`
/// is `out/chair_raw.obj`)
pub fn sibling_path(prefix: &Path, suffix: &str) -> PathBuf {
    let stem = prefix
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    prefix.with_file_name(format!("{}{}", stem, suffix))
}

/// The three independent CLI export steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    GaussianPly,
    TexturedMesh,
    RawObj,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::GaussianPly => write!(f, "Gaussian PLY"),
            ExportFormat::TexturedMesh => write!(f, "GLB/OBJ"),
            ExportFormat::RawObj => write!(f, "raw OBJ"),
        }
    }
}

/// Output paths derived from an output prefix.
///
/// Extensions replace the prefix's last extension, so `out/chair.v1` writes
/// `out/chair.ply`.
#[derive(Debug, Clone)]
pub struct ExportTargets {
    pub ply: PathBuf,
    pub glb: PathBuf,
    pub obj: PathBuf,
    pub raw_obj: PathBuf,
}

impl ExportTargets {
    pub fn from_prefix(prefix: &Path) -> Self {
        Self {
            ply: prefix.with_extension("ply"),
            glb: prefix.with_extension("glb"),
            obj: prefix.with_extension("obj"),
            raw_obj: prefix.with_file_name(format!(
                "{}_raw.obj",
                prefix
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            )),
        }
    }
}

/// Per-format outcome of a best-effort export
#[derive(Debug, Default)]
pub struct ExportReport {
    outcomes: BTreeMap<ExportFormat, std::result::Result<Vec<PathBuf>, String>>,
}

impl ExportReport {
    pub fn record(&mut self, format: ExportFormat, result: Result<Vec<PathBuf>>) {
        match &result {
            Ok(paths) => info!(format = %format, files = ?paths, "Export succeeded"),
            Err(e) => warn!(format = %format, error = %e, "Export failed"),
        }
        self.outcomes
            .insert(format, result.map_err(|e| e.to_string()));
    }

    pub fn get(&self, format: ExportFormat) -> Option<&std::result::Result<Vec<PathBuf>, String>> {
        self.outcomes.get(&format)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&ExportFormat, &std::result::Result<Vec<PathBuf>, String>)> {
        self.outcomes.iter()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.values().filter(|r| r.is_err()).count()
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded() > 0
    }
}

/// Run all three export steps; a failing step never stops the others
pub fn export_all(
    output: &PipelineOutput,
    targets: &ExportTargets,
    options: &ExportConfig,
) -> ExportReport {
    let mut report = ExportReport::default();

    report.record(
        ExportFormat::GaussianPly,
        output
            .first_gaussian()
            .and_then(|splat| ply::write_gaussian_ply(splat, &targets.ply))
            .map(|_| vec![targets.ply.clone()]),
    );

    report.record(ExportFormat::TexturedMesh, export_textured(output, targets, options));

    report.record(
        ExportFormat::RawObj,
        output
            .first_mesh()
            .and_then(|mesh| obj::write_raw_obj(mesh, &targets.raw_obj))
            .map(|_| vec![targets.raw_obj.clone()]),
    );

    report
}

fn export_textured(
    output: &PipelineOutput,
    targets: &ExportTargets,
    options: &ExportConfig,
) -> Result<Vec<PathBuf>> {
    let splat = output.first_gaussian()?;
    let mesh = output.first_mesh()?;
    mesh.validate()?;

    let simplified = simplify::simplify(mesh, options.simplify);
    let textured = texture::bake(&simplified, splat, options.texture_size)?;

    glb::write_glb(&textured, &targets.glb)?;
    let mut written = vec![targets.glb.clone()];
    written.extend(obj::write_textured_obj(&textured, &targets.obj)?);
    Ok(written)
}
