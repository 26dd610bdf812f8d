use crate::Point3;
use crate::bounds::Aabb;
use crate::error::GeometryError;
use crate::vector::{dot, length, length2, mul, normalize, sub};

/// Principal axis used by rotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// A solid described by its signed distance field.
///
/// Primitives are centered on the origin; cylinders, cones and tori are aligned with Z.
/// Negative distances are inside the solid.
#[derive(Debug, Clone, PartialEq)]
pub enum Solid {
    Sphere {
        radius: f64,
    },
    /// `rounding` is applied inside `half_extents`, so the outer size is unchanged.
    Cuboid {
        half_extents: Point3,
        rounding: f64,
    },
    Cylinder {
        radius: f64,
        half_height: f64,
    },
    /// `bottom_radius` applies at `z = -height / 2`.
    Cone {
        bottom_radius: f64,
        top_radius: f64,
        height: f64,
    },
    Torus {
        major_radius: f64,
        minor_radius: f64,
    },
    Capsule {
        a: Point3,
        b: Point3,
        radius: f64,
    },
    Union(Vec<Solid>),
    Intersection(Vec<Solid>),
    Difference {
        base: Box<Solid>,
        cutter: Box<Solid>,
    },
    SmoothUnion {
        a: Box<Solid>,
        b: Box<Solid>,
        k: f64,
    },
    /// Hollows the solid inward, leaving a wall of `thickness`.
    Shell {
        inner: Box<Solid>,
        thickness: f64,
    },
    Translate {
        inner: Box<Solid>,
        offset: Point3,
    },
    Rotate {
        inner: Box<Solid>,
        axis: Axis,
        angle: f64,
    },
    Scale {
        inner: Box<Solid>,
        factor: f64,
    },
    /// Reflection across the plane `dot(p, normal) = offset`.
    Mirror {
        inner: Box<Solid>,
        normal: Point3,
        offset: f64,
    },
}

fn positive(name: &'static str, value: f64) -> Result<f64, GeometryError> {
    if !value.is_finite() {
        return Err(GeometryError::NonFinite { name });
    }
    if value <= 0.0 {
        return Err(GeometryError::NonPositive { name, value });
    }
    Ok(value)
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, GeometryError> {
    if !value.is_finite() {
        return Err(GeometryError::NonFinite { name });
    }
    if value < 0.0 {
        return Err(GeometryError::Negative { name, value });
    }
    Ok(value)
}

fn finite_point(name: &'static str, point: Point3) -> Result<Point3, GeometryError> {
    if point.iter().all(|v| v.is_finite()) {
        Ok(point)
    } else {
        Err(GeometryError::NonFinite { name })
    }
}

impl Solid {
    pub fn sphere(radius: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::Sphere {
            radius: positive("sphere radius", radius)?,
        })
    }

    /// Box from full width (X), depth (Y) and height (Z).
    pub fn cuboid(width: f64, depth: f64, height: f64) -> Result<Solid, GeometryError> {
        Self::rounded_cuboid(width, depth, height, 0.0)
    }

    pub fn rounded_cuboid(
        width: f64,
        depth: f64,
        height: f64,
        radius: f64,
    ) -> Result<Solid, GeometryError> {
        let half_extents = [
            positive("box width", width)? * 0.5,
            positive("box depth", depth)? * 0.5,
            positive("box height", height)? * 0.5,
        ];
        let rounding = non_negative("rounding radius", radius)?;
        let smallest = half_extents[0].min(half_extents[1]).min(half_extents[2]);
        if rounding > smallest {
            return Err(GeometryError::Constraint(format!(
                "rounding radius {rounding} exceeds half of the smallest box side ({smallest})"
            )));
        }
        Ok(Solid::Cuboid {
            half_extents,
            rounding,
        })
    }

    pub fn cylinder(radius: f64, height: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::Cylinder {
            radius: positive("cylinder radius", radius)?,
            half_height: positive("cylinder height", height)? * 0.5,
        })
    }

    pub fn cone(bottom_radius: f64, top_radius: f64, height: f64) -> Result<Solid, GeometryError> {
        let bottom_radius = non_negative("cone bottom radius", bottom_radius)?;
        let top_radius = non_negative("cone top radius", top_radius)?;
        if bottom_radius == 0.0 && top_radius == 0.0 {
            return Err(GeometryError::Constraint(
                "cone needs at least one non-zero radius".to_string(),
            ));
        }
        Ok(Solid::Cone {
            bottom_radius,
            top_radius,
            height: positive("cone height", height)?,
        })
    }

    pub fn torus(major_radius: f64, minor_radius: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::Torus {
            major_radius: positive("torus major radius", major_radius)?,
            minor_radius: positive("torus minor radius", minor_radius)?,
        })
    }

    pub fn capsule(a: Point3, b: Point3, radius: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::Capsule {
            a: finite_point("capsule start", a)?,
            b: finite_point("capsule end", b)?,
            radius: positive("capsule radius", radius)?,
        })
    }

    /// Union of all `parts`; a single part is returned unchanged.
    pub fn union(mut parts: Vec<Solid>) -> Result<Solid, GeometryError> {
        match parts.len() {
            0 => Err(GeometryError::Constraint(
                "union needs at least one solid".to_string(),
            )),
            1 => Ok(parts.remove(0)),
            _ => Ok(Solid::Union(parts)),
        }
    }

    pub fn intersection(mut parts: Vec<Solid>) -> Result<Solid, GeometryError> {
        match parts.len() {
            0 => Err(GeometryError::Constraint(
                "intersection needs at least one solid".to_string(),
            )),
            1 => Ok(parts.remove(0)),
            _ => Ok(Solid::Intersection(parts)),
        }
    }

    pub fn difference(self, cutter: Solid) -> Solid {
        Solid::Difference {
            base: Box::new(self),
            cutter: Box::new(cutter),
        }
    }

    pub fn smooth_union(self, other: Solid, k: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::SmoothUnion {
            a: Box::new(self),
            b: Box::new(other),
            k: non_negative("blend radius", k)?,
        })
    }

    pub fn shell(self, thickness: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::Shell {
            inner: Box::new(self),
            thickness: positive("shell thickness", thickness)?,
        })
    }

    /// Drills a through-hole along Z, centered on the solid's bounding box.
    pub fn hole(self, diameter: f64) -> Result<Solid, GeometryError> {
        let radius = positive("hole diameter", diameter)? * 0.5;
        let bounds = self.bounds();
        if bounds.is_empty() {
            return Err(GeometryError::Constraint(
                "cannot drill a hole in an empty solid".to_string(),
            ));
        }
        let center = bounds.center();
        let cutter = Solid::Cylinder {
            radius,
            half_height: bounds.extent()[2] * 0.5 + 1.0,
        }
        .translate(center)?;
        Ok(self.difference(cutter))
    }

    pub fn translate(self, offset: Point3) -> Result<Solid, GeometryError> {
        Ok(Solid::Translate {
            inner: Box::new(self),
            offset: finite_point("translation", offset)?,
        })
    }

    pub fn rotate(self, axis: Axis, angle: f64) -> Result<Solid, GeometryError> {
        if !angle.is_finite() {
            return Err(GeometryError::NonFinite {
                name: "rotation angle",
            });
        }
        Ok(Solid::Rotate {
            inner: Box::new(self),
            axis,
            angle,
        })
    }

    pub fn scale(self, factor: f64) -> Result<Solid, GeometryError> {
        Ok(Solid::Scale {
            inner: Box::new(self),
            factor: positive("scale factor", factor)?,
        })
    }

    pub fn mirror(self, normal: Point3, offset: f64) -> Result<Solid, GeometryError> {
        let normal = normalize(finite_point("mirror normal", normal)?);
        if length(normal) == 0.0 {
            return Err(GeometryError::Constraint(
                "mirror normal must not be zero".to_string(),
            ));
        }
        if !offset.is_finite() {
            return Err(GeometryError::NonFinite {
                name: "mirror offset",
            });
        }
        Ok(Solid::Mirror {
            inner: Box::new(self),
            normal,
            offset,
        })
    }

    /// Signed distance from `point` to the surface.
    pub fn distance(&self, point: Point3) -> f64 {
        match self {
            Solid::Sphere { radius } => length(point) - radius,
            Solid::Cuboid {
                half_extents,
                rounding,
            } => box_distance(point, half_extents.map(|h| h - rounding)) - rounding,
            Solid::Cylinder {
                radius,
                half_height,
            } => {
                let dx = length2(point[0], point[1]) - radius;
                let dz = point[2].abs() - half_height;
                length2(dx.max(0.0), dz.max(0.0)) + dx.max(dz).min(0.0)
            }
            Solid::Cone {
                bottom_radius,
                top_radius,
                height,
            } => cone_distance(point, *bottom_radius, *top_radius, *height),
            Solid::Torus {
                major_radius,
                minor_radius,
            } => length2(length2(point[0], point[1]) - major_radius, point[2]) - minor_radius,
            Solid::Capsule { a, b, radius } => {
                let pa = sub(point, *a);
                let ba = sub(*b, *a);
                let ba_len2 = dot(ba, ba);
                if ba_len2 <= f64::EPSILON {
                    return length(pa) - radius;
                }
                let h = (dot(pa, ba) / ba_len2).clamp(0.0, 1.0);
                length(sub(pa, mul(ba, h))) - radius
            }
            Solid::Union(parts) => parts
                .iter()
                .map(|part| part.distance(point))
                .fold(f64::INFINITY, f64::min),
            Solid::Intersection(parts) => parts
                .iter()
                .map(|part| part.distance(point))
                .fold(f64::NEG_INFINITY, f64::max),
            Solid::Difference { base, cutter } => {
                base.distance(point).max(-cutter.distance(point))
            }
            Solid::SmoothUnion { a, b, k } => {
                let (da, db) = (a.distance(point), b.distance(point));
                if *k <= 0.0 {
                    return da.min(db);
                }
                let h = (0.5 + 0.5 * (db - da) / k).clamp(0.0, 1.0);
                db + (da - db) * h - k * h * (1.0 - h)
            }
            Solid::Shell { inner, thickness } => {
                let d = inner.distance(point);
                d.max(-d - thickness)
            }
            Solid::Translate { inner, offset } => inner.distance(sub(point, *offset)),
            Solid::Rotate { inner, axis, angle } => {
                inner.distance(rotate_point(point, *axis, -angle))
            }
            Solid::Scale { inner, factor } => inner.distance(mul(point, 1.0 / factor)) * factor,
            Solid::Mirror {
                inner,
                normal,
                offset,
            } => inner.distance(mirror_point(point, *normal, *offset)),
        }
    }

    /// Conservative bounding box of the solid.
    pub fn bounds(&self) -> Aabb {
        match self {
            Solid::Sphere { radius } => Aabb::symmetric([*radius; 3]),
            Solid::Cuboid { half_extents, .. } => Aabb::symmetric(*half_extents),
            Solid::Cylinder {
                radius,
                half_height,
            } => Aabb::symmetric([*radius, *radius, *half_height]),
            Solid::Cone {
                bottom_radius,
                top_radius,
                height,
            } => {
                let r = bottom_radius.max(*top_radius);
                Aabb::symmetric([r, r, height * 0.5])
            }
            Solid::Torus {
                major_radius,
                minor_radius,
            } => {
                let r = major_radius + minor_radius;
                Aabb::symmetric([r, r, *minor_radius])
            }
            Solid::Capsule { a, b, radius } => Aabb::from_points([*a, *b]).expand(*radius),
            Solid::Union(parts) => parts
                .iter()
                .fold(Aabb::EMPTY, |acc, part| acc.union(&part.bounds())),
            Solid::Intersection(parts) => {
                let mut iter = parts.iter();
                let first = iter.next().map(Solid::bounds).unwrap_or(Aabb::EMPTY);
                iter.fold(first, |acc, part| acc.intersection(&part.bounds()))
            }
            Solid::Difference { base, .. } => base.bounds(),
            Solid::SmoothUnion { a, b, k } => a.bounds().union(&b.bounds()).expand(*k),
            Solid::Shell { inner, .. } => inner.bounds(),
            Solid::Translate { inner, offset } => inner.bounds().translate(*offset),
            Solid::Rotate { inner, axis, angle } => inner
                .bounds()
                .map_corners(|corner| rotate_point(corner, *axis, *angle)),
            Solid::Scale { inner, factor } => {
                inner.bounds().map_corners(|corner| mul(corner, *factor))
            }
            Solid::Mirror {
                inner,
                normal,
                offset,
            } => inner
                .bounds()
                .map_corners(|corner| mirror_point(corner, *normal, *offset)),
        }
    }

    /// Number of nodes in the solid tree.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Solid::Union(parts) | Solid::Intersection(parts) => {
                parts.iter().map(Solid::node_count).sum()
            }
            Solid::Difference { base: a, cutter: b } | Solid::SmoothUnion { a, b, .. } => {
                a.node_count() + b.node_count()
            }
            Solid::Shell { inner, .. }
            | Solid::Translate { inner, .. }
            | Solid::Rotate { inner, .. }
            | Solid::Scale { inner, .. }
            | Solid::Mirror { inner, .. } => inner.node_count(),
            _ => 0,
        }
    }
}

fn box_distance(point: Point3, half_extents: Point3) -> f64 {
    let q = [
        point[0].abs() - half_extents[0],
        point[1].abs() - half_extents[1],
        point[2].abs() - half_extents[2],
    ];
    let outside = length([q[0].max(0.0), q[1].max(0.0), q[2].max(0.0)]);
    let inside = q[0].max(q[1]).max(q[2]).min(0.0);
    outside + inside
}

fn cone_distance(point: Point3, r1: f64, r2: f64, height: f64) -> f64 {
    let h = height * 0.5;
    let q = [length2(point[0], point[1]), point[2]];
    let k1 = [r2, h];
    let k2 = [r2 - r1, 2.0 * h];
    let cap_radius = if q[1] < 0.0 { r1 } else { r2 };
    let ca = [q[0] - q[0].min(cap_radius), q[1].abs() - h];
    let k2_len2 = k2[0] * k2[0] + k2[1] * k2[1];
    let t = ((k1[0] - q[0]) * k2[0] + (k1[1] - q[1]) * k2[1]) / k2_len2;
    let t = t.clamp(0.0, 1.0);
    let cb = [q[0] - k1[0] + k2[0] * t, q[1] - k1[1] + k2[1] * t];
    let sign = if cb[0] < 0.0 && ca[1] < 0.0 { -1.0 } else { 1.0 };
    let ca2 = ca[0] * ca[0] + ca[1] * ca[1];
    let cb2 = cb[0] * cb[0] + cb[1] * cb[1];
    sign * ca2.min(cb2).sqrt()
}

/// Rotates `point` by `angle` radians about `axis` (right-handed).
pub fn rotate_point(point: Point3, axis: Axis, angle: f64) -> Point3 {
    let (s, c) = angle.sin_cos();
    let [x, y, z] = point;
    match axis {
        Axis::X => [x, c * y - s * z, s * y + c * z],
        Axis::Y => [c * x + s * z, y, -s * x + c * z],
        Axis::Z => [c * x - s * y, s * x + c * y, z],
    }
}

/// Reflects `point` across the plane `dot(p, normal) = offset`; `normal` must be unit length.
pub fn mirror_point(point: Point3, normal: Point3, offset: f64) -> Point3 {
    let distance = dot(point, normal) - offset;
    sub(point, mul(normal, 2.0 * distance))
}
