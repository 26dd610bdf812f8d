use crate::Point3;

#[inline]
pub fn add(a: Point3, b: Point3) -> Point3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: Point3, b: Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn mul(v: Point3, scalar: f64) -> Point3 {
    [v[0] * scalar, v[1] * scalar, v[2] * scalar]
}

#[inline]
pub fn dot(a: Point3, b: Point3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: Point3, b: Point3) -> Point3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn length(v: Point3) -> f64 {
    dot(v, v).sqrt()
}

/// Returns the zero vector for degenerate input.
#[inline]
pub fn normalize(v: Point3) -> Point3 {
    let len = length(v);
    if len <= f64::EPSILON {
        [0.0, 0.0, 0.0]
    } else {
        mul(v, 1.0 / len)
    }
}

#[inline]
pub(crate) fn length2(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}
