//! The closed set of operations a script may call.
//!
//! Both the validator and the interpreter resolve calls through [`lookup`], so a
//! name that is not listed here can never run.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Solid,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => f.write_str("a number"),
            ValueKind::Solid => f.write_str("a solid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Primitive,
    Boolean,
    Feature,
    Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ValueKind,
}

/// Call signature of one operation. Every operation returns a solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub group: Group,
    pub params: &'static [Param],
    /// The last parameter may repeat.
    pub variadic: bool,
    pub summary: &'static str,
}

impl Signature {
    pub fn accepts(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }

    /// Kind expected for the argument at `index`.
    pub fn param(&self, index: usize) -> Option<&Param> {
        self.params.get(index).or_else(|| {
            self.variadic
                .then(|| self.params.last())
                .flatten()
        })
    }

    pub fn usage(&self) -> String {
        let names: Vec<&str> = self.params.iter().map(|p| p.name).collect();
        let tail = if self.variadic { ", ..." } else { "" };
        format!("{}({}{tail})", self.name, names.join(", "))
    }
}

const fn num(name: &'static str) -> Param {
    Param {
        name,
        kind: ValueKind::Number,
    }
}

const fn solid(name: &'static str) -> Param {
    Param {
        name,
        kind: ValueKind::Solid,
    }
}

pub const OPERATIONS: &[Signature] = &[
    Signature {
        name: "sphere",
        group: Group::Primitive,
        params: &[num("radius")],
        variadic: false,
        summary: "sphere centered on the origin",
    },
    Signature {
        name: "box",
        group: Group::Primitive,
        params: &[num("width"), num("depth"), num("height")],
        variadic: false,
        summary: "box centered on the origin; full sizes along X, Y, Z",
    },
    Signature {
        name: "rounded_box",
        group: Group::Primitive,
        params: &[num("width"), num("depth"), num("height"), num("radius")],
        variadic: false,
        summary: "box with rounded edges, outer size unchanged",
    },
    Signature {
        name: "cylinder",
        group: Group::Primitive,
        params: &[num("radius"), num("height")],
        variadic: false,
        summary: "cylinder along Z, centered on the origin",
    },
    Signature {
        name: "cone",
        group: Group::Primitive,
        params: &[num("bottom_radius"), num("top_radius"), num("height")],
        variadic: false,
        summary: "cone frustum along Z; a radius may be 0",
    },
    Signature {
        name: "torus",
        group: Group::Primitive,
        params: &[num("major_radius"), num("minor_radius")],
        variadic: false,
        summary: "ring in the XY plane",
    },
    Signature {
        name: "capsule",
        group: Group::Primitive,
        params: &[
            num("ax"),
            num("ay"),
            num("az"),
            num("bx"),
            num("by"),
            num("bz"),
            num("radius"),
        ],
        variadic: false,
        summary: "rounded rod between two points",
    },
    Signature {
        name: "union",
        group: Group::Boolean,
        params: &[solid("a"), solid("b")],
        variadic: true,
        summary: "joins two or more solids",
    },
    Signature {
        name: "intersection",
        group: Group::Boolean,
        params: &[solid("a"), solid("b")],
        variadic: true,
        summary: "keeps the volume common to all solids",
    },
    Signature {
        name: "difference",
        group: Group::Boolean,
        params: &[solid("base"), solid("cutter")],
        variadic: false,
        summary: "removes cutter from base",
    },
    Signature {
        name: "smooth_union",
        group: Group::Boolean,
        params: &[solid("a"), solid("b"), num("blend")],
        variadic: false,
        summary: "joins two solids with a blended seam",
    },
    Signature {
        name: "shell",
        group: Group::Feature,
        params: &[solid("shape"), num("thickness")],
        variadic: false,
        summary: "hollows a solid inward leaving walls of the given thickness",
    },
    Signature {
        name: "hole",
        group: Group::Feature,
        params: &[solid("shape"), num("diameter")],
        variadic: false,
        summary: "drills a through-hole along Z at the center of the shape",
    },
    Signature {
        name: "translate",
        group: Group::Transform,
        params: &[solid("shape"), num("x"), num("y"), num("z")],
        variadic: false,
        summary: "moves a solid",
    },
    Signature {
        name: "rotate_x",
        group: Group::Transform,
        params: &[solid("shape"), num("angle")],
        variadic: false,
        summary: "rotates about the X axis",
    },
    Signature {
        name: "rotate_y",
        group: Group::Transform,
        params: &[solid("shape"), num("angle")],
        variadic: false,
        summary: "rotates about the Y axis",
    },
    Signature {
        name: "rotate_z",
        group: Group::Transform,
        params: &[solid("shape"), num("angle")],
        variadic: false,
        summary: "rotates about the Z axis",
    },
    Signature {
        name: "scale",
        group: Group::Transform,
        params: &[solid("shape"), num("factor")],
        variadic: false,
        summary: "uniform scale about the origin",
    },
    Signature {
        name: "mirror",
        group: Group::Transform,
        params: &[solid("shape"), num("nx"), num("ny"), num("nz"), num("offset")],
        variadic: false,
        summary: "reflects across the plane dot(p, n) = offset",
    },
];

pub fn lookup(name: &str) -> Option<&'static Signature> {
    OPERATIONS.iter().find(|op| op.name == name)
}

/// Closest registered operation name, if any is near enough to be a typo.
pub fn suggest(name: &str) -> Option<&'static str> {
    closest(name, OPERATIONS.iter().map(|op| op.name))
}

pub(crate) fn closest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let max_distance = (name.len() / 3).max(2);
    candidates
        .into_iter()
        .map(|candidate| (levenshtein(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(substitution);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// One line per operation, grouped, for prompts and help text.
pub fn catalog() -> String {
    let mut out = String::new();
    for (group, title) in [
        (Group::Primitive, "Primitives"),
        (Group::Boolean, "Booleans"),
        (Group::Feature, "Features"),
        (Group::Transform, "Transforms"),
    ] {
        out.push_str(title);
        out.push_str(":\n");
        for op in OPERATIONS.iter().filter(|op| op.group == group) {
            out.push_str(&format!("- {}: {}\n", op.usage(), op.summary));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{OPERATIONS, ValueKind, catalog, levenshtein, lookup, suggest};

    #[test]
    fn names_are_unique() {
        for (index, op) in OPERATIONS.iter().enumerate() {
            assert!(
                OPERATIONS[index + 1..].iter().all(|other| other.name != op.name),
                "duplicate operation {}",
                op.name
            );
        }
    }

    #[test]
    fn variadic_union_accepts_many_solids() {
        let union = lookup("union").expect("union registered");
        assert!(!union.accepts(1));
        assert!(union.accepts(2));
        assert!(union.accepts(5));
        assert_eq!(union.param(4).map(|p| p.kind), Some(ValueKind::Solid));

        let sphere = lookup("sphere").expect("sphere registered");
        assert!(!sphere.accepts(2));
        assert_eq!(sphere.param(1), None);
    }

    #[test]
    fn suggestions_catch_typos_only() {
        assert_eq!(suggest("sphre"), Some("sphere"));
        assert_eq!(suggest("cylnder"), Some("cylinder"));
        assert_eq!(suggest("import"), None);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn catalog_lists_every_operation() {
        let text = catalog();
        for op in OPERATIONS {
            assert!(text.contains(&op.usage()), "{} missing", op.name);
        }
        assert!(text.contains("- union(a, b, ...): joins two or more solids"));
    }
}
