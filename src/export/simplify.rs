//! Vertex-clustering mesh decimation

use std::collections::{HashMap, HashSet};

use crate::pipeline::MeshData;

const MAX_RESOLUTION: u32 = 2048;

/// Remove roughly `ratio` of the triangles (0.95 keeps about 5%).
///
/// Vertices are snapped to a uniform grid and merged per cell; the grid is
/// the finest one whose result fits the triangle budget. Falls back to the
/// input when no grid yields a non-empty mesh within budget.
pub fn simplify(mesh: &MeshData, ratio: f32) -> MeshData {
    let ratio = ratio.clamp(0.0, 1.0);
    let target = ((mesh.faces.len() as f32) * (1.0 - ratio)).ceil().max(1.0) as usize;
    if mesh.faces.len() <= target || mesh.vertices.is_empty() {
        return mesh.clone();
    }

    let (min, max) = mesh.bounds();
    let extent = [
        (max[0] - min[0]).max(1e-6),
        (max[1] - min[1]).max(1e-6),
        (max[2] - min[2]).max(1e-6),
    ];

    // Largest resolution whose clustered face count fits the budget
    let (mut lo, mut hi) = (1u32, MAX_RESOLUTION);
    let mut best: Option<MeshData> = None;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let candidate = cluster(mesh, &min, &extent, mid);
        if candidate.faces.len() <= target {
            if !candidate.faces.is_empty() {
                best = Some(candidate);
            }
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }

    best.unwrap_or_else(|| mesh.clone())
}

fn cluster(mesh: &MeshData, min: &[f32; 3], extent: &[f32; 3], resolution: u32) -> MeshData {
    let cell_of = |v: &[f32; 3]| -> (u32, u32, u32) {
        let axis = |k: usize| {
            let t = (v[k] - min[k]) / extent[k];
            ((t * resolution as f32) as u32).min(resolution - 1)
        };
        (axis(0), axis(1), axis(2))
    };

    let mut cells: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut sums: Vec<([f32; 3], u32)> = Vec::new();
    let mut remap = Vec::with_capacity(mesh.vertices.len());

    for v in &mesh.vertices {
        let key = cell_of(v);
        let index = *cells.entry(key).or_insert_with(|| {
            sums.push(([0.0; 3], 0));
            (sums.len() - 1) as u32
        });
        let entry = &mut sums[index as usize];
        for k in 0..3 {
            entry.0[k] += v[k];
        }
        entry.1 += 1;
        remap.push(index);
    }

    let vertices = sums
        .iter()
        .map(|(sum, count)| {
            let n = *count as f32;
            [sum[0] / n, sum[1] / n, sum[2] / n]
        })
        .collect();

    let mut seen = HashSet::new();
    let mut faces = Vec::new();
    for f in &mesh.faces {
        let mapped = [
            remap[f[0] as usize],
            remap[f[1] as usize],
            remap[f[2] as usize],
        ];
        if mapped[0] == mapped[1] || mapped[1] == mapped[2] || mapped[0] == mapped[2] {
            continue;
        }
        // Keep one of two coincident faces per orientation
        let mut key = mapped;
        let rotate = key.iter().enumerate().min_by_key(|(_, v)| **v).map(|(i, _)| i).unwrap_or(0);
        key.rotate_left(rotate);
        if seen.insert(key) {
            faces.push(mapped);
        }
    }

    MeshData { vertices, faces }
}
