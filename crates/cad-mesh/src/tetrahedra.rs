use std::collections::HashMap;

use cad_core::vector::{add, cross, dot, mul, sub};
use cad_core::{Aabb, Point3, Solid};
use tracing::debug;

use crate::{Mesh, MeshError};

/// Cube corners as bit masks: bit 0 = +x, bit 1 = +y, bit 2 = +z.
const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Kuhn decomposition of a cube into six tetrahedra sharing the main diagonal.
/// The same split in every cell makes shared faces agree, so the surface closes.
const KUHN_TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

#[derive(Debug, Clone, Copy)]
pub struct MeshingConfig {
    /// Cells along the longest axis of the solid's bounds.
    pub resolution: usize,
    /// Empty cells kept around the bounds on every side.
    pub margin_cells: usize,
    pub max_samples: usize,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            margin_cells: 2,
            max_samples: 16_777_216,
        }
    }
}

impl MeshingConfig {
    pub fn with_resolution(resolution: usize) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }
}

/// Uniform sampling grid with cubic cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub origin: Point3,
    pub cell: f64,
    pub cells: [usize; 3],
}

impl Grid {
    pub fn covering(bounds: &Aabb, config: &MeshingConfig) -> Result<Grid, MeshError> {
        if config.resolution < 2 {
            return Err(MeshError::InvalidResolution(config.resolution));
        }
        let longest = bounds.longest_extent();
        if bounds.is_empty() || !longest.is_finite() || longest <= 0.0 {
            return Err(MeshError::EmptyBounds);
        }

        let cell = longest / config.resolution as f64;
        let extent = bounds.extent();
        let margin = config.margin_cells;
        let cells = extent.map(|e| (e / cell).ceil().max(1.0) as usize + 2 * margin);
        let origin = sub(bounds.min, [cell * margin as f64; 3]);

        let grid = Grid {
            origin,
            cell,
            cells,
        };
        let samples = grid.sample_count();
        if samples > config.max_samples {
            return Err(MeshError::GridTooLarge {
                samples,
                limit: config.max_samples,
            });
        }
        Ok(grid)
    }

    pub fn sample_count(&self) -> usize {
        self.cells.iter().map(|c| c + 1).product()
    }

    fn dims(&self) -> [usize; 3] {
        self.cells.map(|c| c + 1)
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.dims();
        x + nx * (y + ny * z)
    }

    fn point(&self, x: usize, y: usize, z: usize) -> Point3 {
        add(self.origin, mul([x as f64, y as f64, z as f64], self.cell))
    }
}

/// Meshes `solid` on a grid sized from its bounds.
pub fn mesh_solid(solid: &Solid, config: &MeshingConfig) -> Result<Mesh, MeshError> {
    let grid = Grid::covering(&solid.bounds(), config)?;
    debug!(cells = ?grid.cells, cell = grid.cell, "meshing solid");
    Ok(extract_surface(&grid, |point| solid.distance(point)))
}

/// Extracts the zero level set of `sample` with marching tetrahedra.
///
/// Vertices are shared per grid edge, so as long as every boundary sample is
/// outside the surface the result is closed.
pub fn extract_surface<F>(grid: &Grid, mut sample: F) -> Mesh
where
    F: FnMut(Point3) -> f64,
{
    let [nx, ny, nz] = grid.dims();
    let mut field = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                field.push(sample(grid.point(x, y, z)));
            }
        }
    }

    let mut builder = SurfaceBuilder::default();
    let mut ids = [0usize; 8];
    let mut points = [[0.0; 3]; 8];

    for z in 0..grid.cells[2] {
        for y in 0..grid.cells[1] {
            for x in 0..grid.cells[0] {
                for (corner, offset) in CORNER_OFFSETS.iter().enumerate() {
                    let (cx, cy, cz) = (x + offset[0], y + offset[1], z + offset[2]);
                    ids[corner] = grid.index(cx, cy, cz);
                    points[corner] = grid.point(cx, cy, cz);
                }

                let inside_count = ids.iter().filter(|&&id| field[id] < 0.0).count();
                if inside_count == 0 || inside_count == 8 {
                    continue;
                }

                for tet in &KUHN_TETRAHEDRA {
                    let corners = tet.map(|c| Corner {
                        id: ids[c],
                        point: points[c],
                        value: field[ids[c]],
                    });
                    builder.polygonize(&corners);
                }
            }
        }
    }

    builder.mesh
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    id: usize,
    point: Point3,
    value: f64,
}

#[derive(Debug, Default)]
struct SurfaceBuilder {
    mesh: Mesh,
    edge_vertices: HashMap<(usize, usize), u32>,
}

impl SurfaceBuilder {
    fn polygonize(&mut self, corners: &[Corner; 4]) {
        let (inside, outside): (Vec<Corner>, Vec<Corner>) =
            corners.iter().copied().partition(|corner| corner.value < 0.0);

        let outward = sub(centroid(&outside), centroid(&inside));
        match (inside.as_slice(), outside.as_slice()) {
            ([lone], [a, b, c]) | ([a, b, c], [lone]) => {
                let tri = [
                    self.edge_vertex(lone, a),
                    self.edge_vertex(lone, b),
                    self.edge_vertex(lone, c),
                ];
                self.push_oriented(tri, outward);
            }
            ([i0, i1], [o0, o1]) => {
                let quad = [
                    self.edge_vertex(i0, o0),
                    self.edge_vertex(i0, o1),
                    self.edge_vertex(i1, o1),
                    self.edge_vertex(i1, o0),
                ];
                self.push_oriented([quad[0], quad[1], quad[2]], outward);
                self.push_oriented([quad[0], quad[2], quad[3]], outward);
            }
            _ => {}
        }
    }

    fn edge_vertex(&mut self, a: &Corner, b: &Corner) -> u32 {
        let key = (a.id.min(b.id), a.id.max(b.id));
        if let Some(&index) = self.edge_vertices.get(&key) {
            return index;
        }

        let denom = b.value - a.value;
        let t = if denom.abs() <= f64::EPSILON {
            0.5
        } else {
            (-a.value / denom).clamp(0.0, 1.0)
        };
        let position = add(a.point, mul(sub(b.point, a.point), t));

        let index = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(position);
        self.edge_vertices.insert(key, index);
        index
    }

    fn push_oriented(&mut self, tri: [u32; 3], outward: Point3) {
        let [a, b, c] = tri.map(|i| self.mesh.vertices[i as usize]);
        let normal = cross(sub(b, a), sub(c, a));
        if dot(normal, outward) < 0.0 {
            self.mesh.triangles.push([tri[0], tri[2], tri[1]]);
        } else {
            self.mesh.triangles.push(tri);
        }
    }
}

fn centroid(corners: &[Corner]) -> Point3 {
    let sum = corners
        .iter()
        .fold([0.0; 3], |acc, corner| add(acc, corner.point));
    mul(sum, 1.0 / corners.len().max(1) as f64)
}

#[cfg(test)]
mod tests {
    use cad_core::{Aabb, Solid};

    use super::{Grid, MeshingConfig, mesh_solid};
    use crate::{MeshError, analyze};

    #[test]
    fn sphere_mesh_is_closed_with_expected_volume() {
        let sphere = Solid::sphere(10.0).expect("sphere");
        let mesh = mesh_solid(&sphere, &MeshingConfig::with_resolution(32)).expect("mesh");
        let summary = analyze(&mesh);

        assert!(summary.watertight);
        let expected = 4.0 / 3.0 * std::f64::consts::PI * 1000.0;
        let error = (summary.volume - expected).abs() / expected;
        assert!(error < 0.05, "volume {} vs {expected}", summary.volume);
    }

    #[test]
    fn plate_with_hole_meshes_to_its_size() {
        let plate = Solid::cuboid(10.0, 20.0, 2.0)
            .and_then(|s| s.hole(5.0))
            .expect("plate");
        let mesh = mesh_solid(&plate, &MeshingConfig::with_resolution(80)).expect("mesh");
        let summary = analyze(&mesh);

        assert!(summary.watertight);
        let size = [
            summary.bounds_max[0] - summary.bounds_min[0],
            summary.bounds_max[1] - summary.bounds_min[1],
            summary.bounds_max[2] - summary.bounds_min[2],
        ];
        assert!((size[0] - 10.0).abs() < 0.5, "width {}", size[0]);
        assert!((size[1] - 20.0).abs() < 0.5, "depth {}", size[1]);
        assert!((size[2] - 2.0).abs() < 0.5, "height {}", size[2]);

        let solid_volume = 10.0 * 20.0 * 2.0 - std::f64::consts::PI * 2.5 * 2.5 * 2.0;
        assert!((summary.volume - solid_volume).abs() / solid_volume < 0.1);
    }

    #[test]
    fn grid_keeps_margin_around_bounds() {
        let bounds = Aabb::symmetric([5.0, 5.0, 1.0]);
        let grid = Grid::covering(&bounds, &MeshingConfig::with_resolution(10)).expect("grid");
        assert_eq!(grid.cell, 1.0);
        assert_eq!(grid.cells, [14, 14, 6]);
        assert_eq!(grid.origin, [-7.0, -7.0, -3.0]);
    }

    #[test]
    fn grid_rejects_empty_and_oversized_requests() {
        let config = MeshingConfig::with_resolution(16);
        assert_eq!(
            Grid::covering(&Aabb::EMPTY, &config),
            Err(MeshError::EmptyBounds)
        );
        assert_eq!(
            Grid::covering(
                &Aabb::symmetric([1.0; 3]),
                &MeshingConfig::with_resolution(1)
            ),
            Err(MeshError::InvalidResolution(1))
        );

        let limited = MeshingConfig {
            max_samples: 100,
            ..config
        };
        assert!(matches!(
            Grid::covering(&Aabb::symmetric([1.0; 3]), &limited),
            Err(MeshError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn vanishing_intersection_yields_no_triangles() {
        let a = Solid::sphere(1.0).expect("a");
        let b = Solid::sphere(1.0)
            .and_then(|s| s.translate([1.5, 0.0, 0.0]))
            .expect("b");
        let lens = Solid::intersection(vec![a.clone(), b]).expect("lens");
        assert!(!mesh_solid(&lens, &MeshingConfig::with_resolution(24))
            .expect("mesh")
            .is_empty());

        let shell_of_nothing = a.clone().difference(a);
        let mesh = mesh_solid(&shell_of_nothing, &MeshingConfig::with_resolution(16))
            .expect("mesh");
        assert!(mesh.is_empty());
    }
}
