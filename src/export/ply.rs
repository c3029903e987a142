//! Gaussian splat PLY writer (binary little endian, 3DGS property layout)

use std::path::Path;

use crate::error::{AppError, Result};
use crate::export::write_file;
use crate::pipeline::GaussianSplat;

/// Zeroth-order spherical harmonic basis constant
const SH_C0: f32 = 0.282_094_8;

const PROPERTIES: [&str; 17] = [
    "x", "y", "z", "nx", "ny", "nz", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0",
    "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
];

fn inverse_sigmoid(x: f32) -> f32 {
    let x = x.clamp(1e-6, 1.0 - 1e-6);
    (x / (1.0 - x)).ln()
}

/// Encode splats with colors as SH DC terms, opacity as logits and
/// scales as logs
pub fn encode_gaussian_ply(splat: &GaussianSplat) -> Result<Vec<u8>> {
    splat.validate()?;
    if splat.is_empty() {
        return Err(AppError::ExportFailed("No Gaussians to export".to_string()));
    }

    let mut header = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\n",
        splat.len()
    );
    for property in PROPERTIES {
        header.push_str("property float ");
        header.push_str(property);
        header.push('\n');
    }
    header.push_str("end_header\n");

    let mut out = Vec::with_capacity(header.len() + splat.len() * PROPERTIES.len() * 4);
    out.extend_from_slice(header.as_bytes());

    for i in 0..splat.len() {
        let p = splat.positions[i];
        let c = splat.colors[i];
        let s = splat.scales[i];
        let r = splat.rotations[i];
        let row = [
            p[0],
            p[1],
            p[2],
            0.0,
            0.0,
            0.0,
            (c[0] - 0.5) / SH_C0,
            (c[1] - 0.5) / SH_C0,
            (c[2] - 0.5) / SH_C0,
            inverse_sigmoid(splat.opacities[i]),
            s[0].max(1e-8).ln(),
            s[1].max(1e-8).ln(),
            s[2].max(1e-8).ln(),
            r[0],
            r[1],
            r[2],
            r[3],
        ];
        for value in row {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    Ok(out)
}

pub fn write_gaussian_ply(splat: &GaussianSplat, path: &Path) -> Result<()> {
    let data = encode_gaussian_ply(splat)?;
    write_file(path, &data)
}
