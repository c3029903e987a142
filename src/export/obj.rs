//! Wavefront OBJ writers

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::export::texture::TexturedMesh;
use crate::export::{sibling_path, write_file};
use crate::pipeline::MeshData;

const MATERIAL_NAME: &str = "material_0";

/// Untextured OBJ: positions and triangles only
pub fn encode_raw_obj(mesh: &MeshData) -> Result<String> {
    mesh.validate()?;

    let mut out = String::with_capacity(mesh.vertices.len() * 32 + mesh.faces.len() * 24);
    for v in &mesh.vertices {
        let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v[0], v[1], v[2]);
    }
    for f in &mesh.faces {
        let _ = writeln!(out, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1);
    }
    Ok(out)
}

pub fn write_raw_obj(mesh: &MeshData, path: &Path) -> Result<()> {
    let obj = encode_raw_obj(mesh)?;
    write_file(path, obj.as_bytes())
}

/// Textured OBJ referencing `mtl_file`. UVs are stored with OBJ's
/// bottom-left origin.
pub fn encode_textured_obj(textured: &TexturedMesh, mtl_file: &str) -> Result<String> {
    let mesh = &textured.mesh;
    mesh.validate()?;

    let mut out = String::new();
    let _ = writeln!(out, "mtllib {}", mtl_file);
    for v in &mesh.vertices {
        let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v[0], v[1], v[2]);
    }
    for uv in &textured.uvs {
        let _ = writeln!(out, "vt {:.6} {:.6}", uv[0], 1.0 - uv[1]);
    }
    let _ = writeln!(out, "usemtl {}", MATERIAL_NAME);
    for f in &mesh.faces {
        let (a, b, c) = (f[0] + 1, f[1] + 1, f[2] + 1);
        let _ = writeln!(out, "f {a}/{a} {b}/{b} {c}/{c}");
    }
    Ok(out)
}

pub fn encode_mtl(texture_file: &str) -> String {
    format!(
        "newmtl {}\nKa 1.000000 1.000000 1.000000\nKd 1.000000 1.000000 1.000000\nKs 0.000000 0.000000 0.000000\nd 1.000000\nillum 1\nmap_Kd {}\n",
        MATERIAL_NAME, texture_file
    )
}

/// Write `<stem>.obj` with its `<stem>.mtl` and `<stem>_texture.png`
/// sidecars, returning every written path
pub fn write_textured_obj(textured: &TexturedMesh, obj_path: &Path) -> Result<Vec<PathBuf>> {
    let mtl_path = obj_path.with_extension("mtl");
    let texture_path = sibling_path(obj_path, "_texture.png");

    let mtl_name = file_name(&mtl_path);
    let texture_name = file_name(&texture_path);

    let obj = encode_textured_obj(textured, &mtl_name)?;
    let png = textured.texture_png()?;

    write_file(obj_path, obj.as_bytes())?;
    write_file(&mtl_path, encode_mtl(&texture_name).as_bytes())?;
    write_file(&texture_path, &png)?;

    Ok(vec![obj_path.to_path_buf(), mtl_path, texture_path])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
