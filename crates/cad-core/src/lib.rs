//! Solid modelling kernel for cadloop.
//!
//! Solids are signed distance fields assembled from primitives, booleans and
//! transforms. Every node reports a conservative [`Aabb`] so that meshing can size
//! its sampling grid without guessing.

mod bounds;
mod error;
mod solid;
pub mod vector;

pub type Point3 = [f64; 3];

pub use bounds::Aabb;
pub use error::GeometryError;
pub use solid::{Axis, Solid, mirror_point, rotate_point};
