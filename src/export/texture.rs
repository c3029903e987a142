//! Texture baking from Gaussian colors onto a planar-projected mesh

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::error::{AppError, Result};
use crate::pipeline::{GaussianSplat, MeshData};

/// Mesh with per-vertex UVs (glTF convention: origin at the top-left) and
/// its base color texture
#[derive(Debug, Clone)]
pub struct TexturedMesh {
    pub mesh: MeshData,
    pub uvs: Vec<[f32; 2]>,
    pub texture: RgbaImage,
}

impl TexturedMesh {
    pub fn texture_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(self.texture.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .map_err(|e| AppError::ExportFailed(format!("Failed to encode texture: {}", e)))?;
        Ok(buf)
    }
}

/// Project the mesh onto the XY plane for UVs and splat Gaussian colors into
/// a `size x size` texture. Texels no Gaussian reaches take the mean color.
pub fn bake(mesh: &MeshData, splat: &GaussianSplat, size: u32) -> Result<TexturedMesh> {
    mesh.validate()?;
    splat.validate()?;
    if splat.is_empty() {
        return Err(AppError::ExportFailed(
            "No Gaussians to bake a texture from".to_string(),
        ));
    }
    if size == 0 {
        return Err(AppError::ExportFailed("Texture size must be positive".to_string()));
    }

    let (min, max) = mesh.bounds();
    let width = (max[0] - min[0]).max(1e-6);
    let height = (max[1] - min[1]).max(1e-6);
    let project = |x: f32, y: f32| -> [f32; 2] {
        [
            ((x - min[0]) / width).clamp(0.0, 1.0),
            (1.0 - (y - min[1]) / height).clamp(0.0, 1.0),
        ]
    };

    let uvs = mesh.vertices.iter().map(|v| project(v[0], v[1])).collect();

    let n = size as usize;
    let mut accum = vec![[0.0f32; 4]; n * n];
    let mut mean = [0.0f32; 3];
    let mut mean_weight = 0.0f32;

    for i in 0..splat.len() {
        let p = splat.positions[i];
        let color = splat.colors[i];
        let opacity = splat.opacities[i].clamp(0.0, 1.0);
        if opacity <= 0.0 {
            continue;
        }
        for k in 0..3 {
            mean[k] += color[k] * opacity;
        }
        mean_weight += opacity;

        let uv = project(p[0], p[1]);
        let cx = uv[0] * size as f32;
        let cy = uv[1] * size as f32;
        let sigma = (splat.scales[i][0] / width * size as f32).clamp(0.5, 16.0);
        let radius = (3.0 * sigma).ceil() as i64;

        for ty in (cy as i64 - radius)..=(cy as i64 + radius) {
            if ty < 0 || ty >= n as i64 {
                continue;
            }
            for tx in (cx as i64 - radius)..=(cx as i64 + radius) {
                if tx < 0 || tx >= n as i64 {
                    continue;
                }
                let dx = tx as f32 + 0.5 - cx;
                let dy = ty as f32 + 0.5 - cy;
                let w = opacity * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                let texel = &mut accum[ty as usize * n + tx as usize];
                for k in 0..3 {
                    texel[k] += color[k] * w;
                }
                texel[3] += w;
            }
        }
    }

    let fill = if mean_weight > 0.0 {
        [mean[0] / mean_weight, mean[1] / mean_weight, mean[2] / mean_weight]
    } else {
        [0.5; 3]
    };

    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let texture = RgbaImage::from_fn(size, size, |x, y| {
        let texel = accum[y as usize * n + x as usize];
        let rgb = if texel[3] > 1e-4 {
            [texel[0] / texel[3], texel[1] / texel[3], texel[2] / texel[3]]
        } else {
            fill
        };
        Rgba([to_byte(rgb[0]), to_byte(rgb[1]), to_byte(rgb[2]), 255])
    });

    Ok(TexturedMesh {
        mesh: mesh.clone(),
        uvs,
        texture,
    })
}
