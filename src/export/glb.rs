//! Binary glTF 2.0 writer for textured meshes

use serde_json::json;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::export::texture::TexturedMesh;
use crate::export::write_file;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;

fn pad_to_four(buf: &mut Vec<u8>, byte: u8) {
    while buf.len() % 4 != 0 {
        buf.push(byte);
    }
}

/// Encode a single-primitive scene with an embedded PNG base color texture
pub fn encode_glb(textured: &TexturedMesh) -> Result<Vec<u8>> {
    let mesh = &textured.mesh;
    mesh.validate()?;
    if textured.uvs.len() != mesh.vertices.len() {
        return Err(AppError::ExportFailed(format!(
            "{} UVs for {} vertices",
            textured.uvs.len(),
            mesh.vertices.len()
        )));
    }

    let png = textured.texture_png()?;
    let (min, max) = mesh.bounds();

    let mut bin = Vec::new();
    let positions_offset = bin.len();
    for v in &mesh.vertices {
        for c in v {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    let uvs_offset = bin.len();
    for uv in &textured.uvs {
        for c in uv {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    let indices_offset = bin.len();
    for f in &mesh.faces {
        for i in f {
            bin.extend_from_slice(&i.to_le_bytes());
        }
    }
    let image_offset = bin.len();
    bin.extend_from_slice(&png);
    let image_len = png.len();
    pad_to_four(&mut bin, 0);

    let vertex_count = mesh.vertices.len();
    let index_count = mesh.faces.len() * 3;

    let document = json!({
        "asset": { "version": "2.0", "generator": env!("CARGO_PKG_NAME") },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": 0, "TEXCOORD_0": 1 },
                "indices": 2,
                "material": 0,
            }]
        }],
        "materials": [{
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": 0 },
                "metallicFactor": 0.0,
                "roughnessFactor": 1.0,
            },
            "doubleSided": true,
        }],
        "textures": [{ "sampler": 0, "source": 0 }],
        "samplers": [{ "magFilter": 9729, "minFilter": 9987, "wrapS": 33071, "wrapT": 33071 }],
        "images": [{ "bufferView": 3, "mimeType": "image/png" }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": positions_offset, "byteLength": vertex_count * 12, "target": ARRAY_BUFFER },
            { "buffer": 0, "byteOffset": uvs_offset, "byteLength": vertex_count * 8, "target": ARRAY_BUFFER },
            { "buffer": 0, "byteOffset": indices_offset, "byteLength": index_count * 4, "target": ELEMENT_ARRAY_BUFFER },
            { "buffer": 0, "byteOffset": image_offset, "byteLength": image_len },
        ],
        "accessors": [
            { "bufferView": 0, "componentType": FLOAT, "count": vertex_count, "type": "VEC3", "min": min, "max": max },
            { "bufferView": 1, "componentType": FLOAT, "count": vertex_count, "type": "VEC2" },
            { "bufferView": 2, "componentType": UNSIGNED_INT, "count": index_count, "type": "SCALAR" },
        ],
    });

    let mut json_chunk = serde_json::to_vec(&document)?;
    pad_to_four(&mut json_chunk, b' ');

    let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_chunk);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);

    Ok(out)
}

pub fn write_glb(textured: &TexturedMesh, path: &Path) -> Result<()> {
    let data = encode_glb(textured)?;
    write_file(path, &data)
}
