//! Upload staging and artifact reads inside a job workspace

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, Result};

/// Name of the stored upload: the client's file name without any directory
/// part, or `input.<detected format>` when none is usable
pub fn upload_file_name(client_name: Option<&str>, data: &[u8]) -> String {
    let sanitized = client_name
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..");

    match sanitized {
        Some(name) => name.to_string(),
        None => format!("input.{}", detect_image_format(data).unwrap_or("png")),
    }
}

/// Save uploaded bytes into `dir`, returning the written path
pub async fn save_upload(dir: &Path, client_name: Option<&str>, data: &[u8]) -> Result<PathBuf> {
    let file_path = dir.join(upload_file_name(client_name, data));

    fs::write(&file_path, data).await?;

    debug!(path = ?file_path, size = data.len(), "Saved upload");

    Ok(file_path)
}

/// Read an exported artifact; a missing file is `ArtifactMissing`
pub async fn read_artifact(path: &Path, what: &str) -> Result<Vec<u8>> {
    match fs::read(path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::ArtifactMissing(format!("{} export failed", what)))
        }
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Detect image format from binary data using magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }

    // GIF: GIF87a or GIF89a
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("gif");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("webp");
    }

    // BMP: BM
    if data.starts_with(b"BM") {
        return Some("bmp");
    }

    None
}
