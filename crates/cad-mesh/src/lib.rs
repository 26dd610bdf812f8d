pub mod analysis;
pub mod export;
pub mod tetrahedra;

pub use analysis::{MeshSummary, analyze, is_watertight, signed_volume};
pub use export::{MeshFormat, export, to_ascii_stl, to_binary_stl};
pub use tetrahedra::{Grid, MeshingConfig, extract_surface, mesh_solid};

/// Indexed triangle mesh produced by surface extraction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("solid has empty bounds")]
    EmptyBounds,

    #[error("mesh resolution must be at least 2, got {0}")]
    InvalidResolution(usize),

    #[error("sampling grid of {samples} points exceeds the limit of {limit}")]
    GridTooLarge { samples: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::Mesh;

    #[test]
    fn empty_mesh_has_no_geometry() {
        let mesh = Mesh::empty();
        assert!(mesh.vertices.is_empty());
        assert!(mesh.is_empty());
        assert_eq!(mesh.triangle_count(), 0);
    }
}
