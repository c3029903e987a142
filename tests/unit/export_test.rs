//! Unit tests for artifact writers and best-effort export

use img_to_3d_serving::config::ExportConfig;
use img_to_3d_serving::export::{
    export_all, obj, ply, simplify::simplify, texture, ExportFormat, ExportTargets,
};
use img_to_3d_serving::pipeline::{GaussianSplat, MeshData, PipelineOutput};

/// `n x n` grid of quads in the XY plane
fn grid_mesh(n: u32) -> MeshData {
    let mut vertices = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            vertices.push([x as f32 / n as f32, y as f32 / n as f32, 0.0]);
        }
    }
    let row = n + 1;
    let mut faces = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = y * row + x;
            faces.push([i, i + 1, i + row]);
            faces.push([i + 1, i + row + 1, i + row]);
        }
    }
    MeshData { vertices, faces }
}

fn splat(count: usize) -> GaussianSplat {
    GaussianSplat {
        positions: (0..count).map(|i| [i as f32 / count as f32, 0.5, 0.0]).collect(),
        colors: vec![[0.2, 0.4, 0.6]; count],
        opacities: vec![0.9; count],
        scales: vec![[0.02; 3]; count],
        rotations: vec![[1.0, 0.0, 0.0, 0.0]; count],
    }
}

fn output(mesh: MeshData) -> PipelineOutput {
    PipelineOutput {
        gaussian: vec![splat(16)],
        radiance_field: Vec::new(),
        mesh: vec![mesh],
    }
}

fn small_export() -> ExportConfig {
    ExportConfig {
        simplify: 0.5,
        texture_size: 32,
    }
}

#[test]
fn test_raw_obj_is_one_based() {
    let obj = obj::encode_raw_obj(&grid_mesh(1)).unwrap();
    let lines: Vec<&str> = obj.lines().collect();
    assert_eq!(lines.iter().filter(|l| l.starts_with("v ")).count(), 4);
    assert!(lines.contains(&"f 1 2 3"));
    assert!(lines.contains(&"f 2 4 3"));
}

#[test]
fn test_out_of_range_face_fails() {
    let mesh = MeshData {
        vertices: vec![[0.0; 3]; 3],
        faces: vec![[0, 1, 3]],
    };
    assert!(obj::encode_raw_obj(&mesh).is_err());
}

#[test]
fn test_ply_header_and_size() {
    let data = ply::encode_gaussian_ply(&splat(5)).unwrap();
    let header_end = data
        .windows(b"end_header\n".len())
        .position(|w| w == b"end_header\n")
        .unwrap()
        + b"end_header\n".len();
    let header = std::str::from_utf8(&data[..header_end]).unwrap();

    assert!(header.starts_with("ply\nformat binary_little_endian 1.0\n"));
    assert!(header.contains("element vertex 5\n"));
    assert!(header.contains("property float f_dc_0\n"));
    assert!(header.contains("property float rot_3\n"));
    assert_eq!(data.len() - header_end, 5 * 17 * 4);
}

#[test]
fn test_empty_splat_is_rejected() {
    assert!(ply::encode_gaussian_ply(&splat(0)).is_err());
}

#[test]
fn test_simplify_reduces_faces() {
    let mesh = grid_mesh(16);
    let simplified = simplify(&mesh, 0.9);

    assert!(simplified.faces.len() < mesh.faces.len());
    assert!(!simplified.faces.is_empty());
    assert!(simplified.validate().is_ok());
    assert!(simplified.faces.len() <= (mesh.faces.len() as f32 * 0.1).ceil() as usize);
}

#[test]
fn test_simplify_zero_keeps_mesh() {
    let mesh = grid_mesh(4);
    let simplified = simplify(&mesh, 0.0);
    assert_eq!(simplified.faces.len(), mesh.faces.len());
}

#[test]
fn test_bake_texture_size() {
    let textured = texture::bake(&grid_mesh(2), &splat(4), 64).unwrap();
    assert_eq!(textured.texture.dimensions(), (64, 64));
    assert_eq!(textured.uvs.len(), 9);
    assert!(textured
        .uvs
        .iter()
        .all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1])));
}

#[test]
fn test_export_all_writes_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let targets = ExportTargets::from_prefix(&dir.path().join("chair"));

    let report = export_all(&output(grid_mesh(8)), &targets, &small_export());

    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 0);
    for path in [
        dir.path().join("chair.ply"),
        dir.path().join("chair.glb"),
        dir.path().join("chair.obj"),
        dir.path().join("chair.mtl"),
        dir.path().join("chair_texture.png"),
        dir.path().join("chair_raw.obj"),
    ] {
        assert!(path.is_file(), "missing {}", path.display());
    }

    let mtl = std::fs::read_to_string(dir.path().join("chair.mtl")).unwrap();
    assert!(mtl.contains("map_Kd chair_texture.png"));
    let textured_obj = std::fs::read_to_string(dir.path().join("chair.obj")).unwrap();
    assert!(textured_obj.starts_with("mtllib chair.mtl\n"));
    assert!(textured_obj.lines().any(|l| l.starts_with("vt ")));
}

#[test]
fn test_failing_mesh_does_not_block_ply() {
    let dir = tempfile::tempdir().unwrap();
    let targets = ExportTargets::from_prefix(&dir.path().join("broken"));
    let bad_mesh = MeshData {
        vertices: vec![[0.0; 3]; 3],
        faces: vec![[0, 1, 7]],
    };

    let report = export_all(&output(bad_mesh), &targets, &small_export());

    assert!(report.get(ExportFormat::GaussianPly).unwrap().is_ok());
    assert!(report.get(ExportFormat::TexturedMesh).unwrap().is_err());
    assert!(report.get(ExportFormat::RawObj).unwrap().is_err());
    assert!(report.any_succeeded());
    assert!(targets.ply.is_file());
    assert!(!targets.raw_obj.exists());
}

#[test]
fn test_missing_gaussians_only_fail_their_formats() {
    let dir = tempfile::tempdir().unwrap();
    let targets = ExportTargets::from_prefix(&dir.path().join("mesh_only"));
    let output = PipelineOutput {
        gaussian: Vec::new(),
        radiance_field: Vec::new(),
        mesh: vec![grid_mesh(2)],
    };

    let report = export_all(&output, &targets, &small_export());

    assert!(report.get(ExportFormat::GaussianPly).unwrap().is_err());
    assert!(report.get(ExportFormat::TexturedMesh).unwrap().is_err());
    assert!(report.get(ExportFormat::RawObj).unwrap().is_ok());
    assert_eq!(report.succeeded(), 1);
}
