use std::fmt::Write as _;

use cad_core::vector::{cross, normalize, sub};
use serde::{Deserialize, Serialize};

use crate::Mesh;

/// Mesh interchange encodings written to artifact files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    #[default]
    BinaryStl,
    AsciiStl,
}

impl MeshFormat {
    pub fn extension(self) -> &'static str {
        "stl"
    }
}

pub fn export(mesh: &Mesh, format: MeshFormat, name: &str) -> Vec<u8> {
    match format {
        MeshFormat::BinaryStl => to_binary_stl(mesh, name),
        MeshFormat::AsciiStl => to_ascii_stl(mesh, name).into_bytes(),
    }
}

fn facet(mesh: &Mesh, tri: &[u32; 3]) -> [[f64; 3]; 4] {
    let [a, b, c] = tri.map(|i| mesh.vertices[i as usize]);
    [normalize(cross(sub(b, a), sub(c, a))), a, b, c]
}

/// 80-byte header, little-endian triangle count, then 50 bytes per facet.
pub fn to_binary_stl(mesh: &Mesh, name: &str) -> Vec<u8> {
    let mut bytes = Vec::<u8>::with_capacity(84 + mesh.triangles.len() * 50);

    let mut header = [0u8; 80];
    let name_bytes = name.as_bytes();
    let header_len = name_bytes.len().min(80);
    header[..header_len].copy_from_slice(&name_bytes[..header_len]);
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&(mesh.triangles.len() as u32).to_le_bytes());

    for tri in &mesh.triangles {
        for vector in facet(mesh, tri) {
            for component in vector {
                bytes.extend_from_slice(&(component as f32).to_le_bytes());
            }
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
    }

    bytes
}

pub fn to_ascii_stl(mesh: &Mesh, name: &str) -> String {
    let mut out = format!("solid {name}\n");
    for tri in &mesh.triangles {
        let [n, a, b, c] = facet(mesh, tri);
        // Writing to a String cannot fail.
        let _ = writeln!(out, "  facet normal {} {} {}", n[0], n[1], n[2]);
        out.push_str("    outer loop\n");
        for v in [a, b, c] {
            let _ = writeln!(out, "      vertex {} {} {}", v[0], v[1], v[2]);
        }
        out.push_str("    endloop\n  endfacet\n");
    }
    let _ = writeln!(out, "endsolid {name}");
    out
}
