use std::collections::HashMap;

use cad_core::vector::{cross, dot};
use serde::{Deserialize, Serialize};

use crate::Mesh;

/// Geometry facts recorded alongside each persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSummary {
    pub triangle_count: usize,
    pub volume: f64,
    pub bounds_min: [f64; 3],
    pub bounds_max: [f64; 3],
    pub watertight: bool,
}

pub fn analyze(mesh: &Mesh) -> MeshSummary {
    let (bounds_min, bounds_max) = bounding_box(mesh).unwrap_or(([0.0; 3], [0.0; 3]));
    MeshSummary {
        triangle_count: mesh.triangles.len(),
        volume: signed_volume(mesh).abs(),
        bounds_min,
        bounds_max,
        watertight: is_watertight(mesh),
    }
}

/// Every undirected edge is shared by exactly two triangles.
pub fn is_watertight(mesh: &Mesh) -> bool {
    if mesh.triangles.is_empty() {
        return false;
    }

    let mut edge_counts = HashMap::<(u32, u32), usize>::new();
    for tri in &mesh.triangles {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            *edge_counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }
    edge_counts.values().all(|&count| count == 2)
}

/// Divergence-theorem volume; positive for outward-facing triangles.
pub fn signed_volume(mesh: &Mesh) -> f64 {
    mesh.triangles
        .iter()
        .map(|tri| {
            let a = mesh.vertices[tri[0] as usize];
            let b = mesh.vertices[tri[1] as usize];
            let c = mesh.vertices[tri[2] as usize];
            dot(a, cross(b, c)) / 6.0
        })
        .sum()
}

pub fn bounding_box(mesh: &Mesh) -> Option<([f64; 3], [f64; 3])> {
    let first = *mesh.vertices.first()?;
    Some(
        mesh.vertices
            .iter()
            .fold((first, first), |(mut min, mut max), v| {
                for axis in 0..3 {
                    min[axis] = min[axis].min(v[axis]);
                    max[axis] = max[axis].max(v[axis]);
                }
                (min, max)
            }),
    )
}
