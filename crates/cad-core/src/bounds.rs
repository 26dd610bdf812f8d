use crate::Point3;

/// Axis-aligned bounding box. A box whose `min` exceeds its `max` on any axis is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: [f64::INFINITY; 3],
        max: [f64::NEG_INFINITY; 3],
    };

    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Box centered on the origin.
    pub fn symmetric(half_extents: Point3) -> Self {
        Self {
            min: [-half_extents[0], -half_extents[1], -half_extents[2]],
            max: half_extents,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Point3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| Self {
            min: [acc.min[0].min(p[0]), acc.min[1].min(p[1]), acc.min[2].min(p[2])],
            max: [acc.max[0].max(p[0]), acc.max[1].max(p[1]), acc.max[2].max(p[2])],
        })
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Aabb::from_points([self.min, self.max, other.min, other.max])
    }

    pub fn intersection(&self, other: &Aabb) -> Aabb {
        let min = [
            self.min[0].max(other.min[0]),
            self.min[1].max(other.min[1]),
            self.min[2].max(other.min[2]),
        ];
        let max = [
            self.max[0].min(other.max[0]),
            self.max[1].min(other.max[1]),
            self.max[2].min(other.max[2]),
        ];
        Aabb { min, max }
    }

    pub fn expand(&self, margin: f64) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb {
            min: self.min.map(|v| v - margin),
            max: self.max.map(|v| v + margin),
        }
    }

    pub fn translate(&self, offset: Point3) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb {
            min: crate::vector::add(self.min, offset),
            max: crate::vector::add(self.max, offset),
        }
    }

    /// Maps all eight corners through `f` and re-fits a box around them.
    pub fn map_corners(&self, f: impl Fn(Point3) -> Point3) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb::from_points(self.corners().map(f))
    }

    pub fn corners(&self) -> [Point3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            [lo[0], lo[1], lo[2]],
            [hi[0], lo[1], lo[2]],
            [lo[0], hi[1], lo[2]],
            [hi[0], hi[1], lo[2]],
            [lo[0], lo[1], hi[2]],
            [hi[0], lo[1], hi[2]],
            [lo[0], hi[1], hi[2]],
            [hi[0], hi[1], hi[2]],
        ]
    }

    pub fn extent(&self) -> Point3 {
        if self.is_empty() {
            return [0.0; 3];
        }
        crate::vector::sub(self.max, self.min)
    }

    pub fn center(&self) -> Point3 {
        crate::vector::mul(crate::vector::add(self.min, self.max), 0.5)
    }

    pub fn longest_extent(&self) -> f64 {
        let e = self.extent();
        e[0].max(e[1]).max(e[2])
    }
}
