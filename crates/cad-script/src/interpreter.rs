use std::collections::HashMap;

use cad_core::{Axis, GeometryError, Solid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::{BinaryOp, Expr, ExprKind, Position, Program, Statement};
use crate::capability;
use crate::error::ExecutionError;

/// Binding name given to the artifact when it comes from a trailing expression.
pub const TRAILING_EXPRESSION: &str = "<final expression>";

/// Name a script uses to mark its artifact.
pub const RESULT_BINDING: &str = "result";

/// How to pick the artifact when a script has neither a `result` binding nor a
/// trailing shape expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSelection {
    /// A single solid binding is accepted; several are an error.
    #[default]
    Explicit,
    /// The first solid binding in declaration order wins.
    FirstDeclared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    pub max_operations: usize,
    pub max_nodes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_operations: 10_000,
            max_nodes: 4_096,
        }
    }
}

/// The solid a script produced, with the binding it was taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub binding: String,
    pub solid: Solid,
}

#[derive(Debug, Clone)]
enum Value {
    Number(f64),
    Solid(Solid),
}

/// Interprets validated programs against the operation registry.
///
/// The interpreter only holds its own namespace; scripts cannot reach files,
/// the network or the process because the language has no way to name them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sandbox {
    limits: ExecutionLimits,
    selection: ArtifactSelection,
}

impl Sandbox {
    pub fn new(limits: ExecutionLimits, selection: ArtifactSelection) -> Self {
        Self { limits, selection }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn selection(&self) -> ArtifactSelection {
        self.selection
    }

    pub fn execute(&self, program: &Program) -> Result<Artifact, ExecutionError> {
        let mut frame = Frame {
            limits: self.limits,
            values: HashMap::new(),
            declared_solids: Vec::new(),
            operations: 0,
        };

        for decl in &program.params {
            let value = frame.number(&decl.value)?;
            frame.values.insert(decl.name.clone(), Value::Number(value));
        }

        let mut trailing = None;
        for (index, statement) in program.statements.iter().enumerate() {
            match statement {
                Statement::Assign { name, expr, .. } => {
                    let value = frame.eval(expr)?;
                    if matches!(value, Value::Solid(_)) && !frame.declared_solids.contains(name) {
                        frame.declared_solids.push(name.clone());
                    }
                    frame.values.insert(name.clone(), value);
                }
                Statement::Expr(expr) => {
                    let value = frame.eval(expr)?;
                    if index + 1 == program.statements.len()
                        && let Value::Solid(solid) = value
                    {
                        trailing = Some(solid);
                    }
                }
            }
        }

        let artifact = frame.select(trailing, self.selection)?;
        debug!(
            binding = %artifact.binding,
            nodes = artifact.solid.node_count(),
            operations = frame.operations,
            "script executed"
        );
        Ok(artifact)
    }
}

struct Frame {
    limits: ExecutionLimits,
    values: HashMap<String, Value>,
    declared_solids: Vec<String>,
    operations: usize,
}

impl Frame {
    fn select(
        &mut self,
        trailing: Option<Solid>,
        selection: ArtifactSelection,
    ) -> Result<Artifact, ExecutionError> {
        match self.values.remove(RESULT_BINDING) {
            Some(Value::Solid(solid)) => {
                return Ok(Artifact {
                    binding: RESULT_BINDING.to_string(),
                    solid,
                });
            }
            Some(Value::Number(_)) => {
                return Err(ExecutionError::RuntimeFailure {
                    message: format!("'{RESULT_BINDING}' is bound to a number, not a solid"),
                    position: None,
                });
            }
            None => {}
        }

        if let Some(solid) = trailing {
            return Ok(Artifact {
                binding: TRAILING_EXPRESSION.to_string(),
                solid,
            });
        }

        // a name rebound to a number later no longer counts
        let candidates: Vec<String> = self
            .declared_solids
            .iter()
            .filter(|name| matches!(self.values.get(*name), Some(Value::Solid(_))))
            .cloned()
            .collect();

        let chosen = match (candidates.len(), selection) {
            (0, _) => return Err(ExecutionError::NoArtifactProduced),
            (1, _) | (_, ArtifactSelection::FirstDeclared) => candidates[0].clone(),
            _ => return Err(ExecutionError::AmbiguousArtifact { candidates }),
        };
        match self.values.remove(&chosen) {
            Some(Value::Solid(solid)) => Ok(Artifact {
                binding: chosen,
                solid,
            }),
            _ => Err(ExecutionError::NoArtifactProduced),
        }
    }

    fn tick(&mut self, position: Position) -> Result<(), ExecutionError> {
        self.operations += 1;
        if self.operations > self.limits.max_operations {
            return Err(ExecutionError::runtime(
                position,
                format!(
                    "operation limit of {} exceeded",
                    self.limits.max_operations
                ),
            ));
        }
        Ok(())
    }

    fn number(&mut self, expr: &Expr) -> Result<f64, ExecutionError> {
        match self.eval(expr)? {
            Value::Number(value) => Ok(value),
            Value::Solid(_) => Err(ExecutionError::runtime(
                expr.position,
                "expected a number, got a solid",
            )),
        }
    }

    fn solid(&mut self, expr: &Expr) -> Result<Solid, ExecutionError> {
        match self.eval(expr)? {
            Value::Solid(solid) => Ok(solid),
            Value::Number(_) => Err(ExecutionError::runtime(
                expr.position,
                "expected a solid, got a number",
            )),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ExecutionError> {
        match &expr.kind {
            ExprKind::Number(number) => Ok(Value::Number(number.resolved())),
            ExprKind::Variable(name) => self.values.get(name).cloned().ok_or_else(|| {
                ExecutionError::runtime(expr.position, format!("unknown name '{name}'"))
            }),
            ExprKind::Negate(operand) => Ok(Value::Number(-self.number(operand)?)),
            ExprKind::Binary { lhs, op, rhs } => {
                self.tick(expr.position)?;
                let (a, b) = (self.number(lhs)?, self.number(rhs)?);
                let value = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div if b == 0.0 => {
                        return Err(ExecutionError::runtime(expr.position, "division by zero"));
                    }
                    BinaryOp::Div => a / b,
                };
                if !value.is_finite() {
                    return Err(ExecutionError::runtime(
                        expr.position,
                        "arithmetic produced a non-finite number",
                    ));
                }
                Ok(Value::Number(value))
            }
            ExprKind::Call { name, args } => {
                self.tick(expr.position)?;
                let solid = self.call(name, args, expr.position)?;
                let nodes = solid.node_count();
                if nodes > self.limits.max_nodes {
                    return Err(ExecutionError::runtime(
                        expr.position,
                        format!(
                            "solid has {nodes} nodes, more than the limit of {}",
                            self.limits.max_nodes
                        ),
                    ));
                }
                Ok(Value::Solid(solid))
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], position: Position) -> Result<Solid, ExecutionError> {
        let Some(signature) = capability::lookup(name) else {
            return Err(ExecutionError::runtime(
                position,
                format!("unknown operation '{name}'"),
            ));
        };
        if !signature.accepts(args.len()) {
            return Err(ExecutionError::runtime(
                position,
                format!("wrong number of arguments; usage: {}", signature.usage()),
            ));
        }

        let geometry = |result: Result<Solid, GeometryError>| {
            result.map_err(|err| ExecutionError::runtime(position, format!("{name}: {err}")))
        };

        let solid = match name {
            "sphere" => geometry(Solid::sphere(self.number(&args[0])?))?,
            "box" => {
                let [w, d, h] = self.numbers::<3>(args)?;
                geometry(Solid::cuboid(w, d, h))?
            }
            "rounded_box" => {
                let [w, d, h, r] = self.numbers::<4>(args)?;
                geometry(Solid::rounded_cuboid(w, d, h, r))?
            }
            "cylinder" => {
                let [r, h] = self.numbers::<2>(args)?;
                geometry(Solid::cylinder(r, h))?
            }
            "cone" => {
                let [r1, r2, h] = self.numbers::<3>(args)?;
                geometry(Solid::cone(r1, r2, h))?
            }
            "torus" => {
                let [major, minor] = self.numbers::<2>(args)?;
                geometry(Solid::torus(major, minor))?
            }
            "capsule" => {
                let [ax, ay, az, bx, by, bz, r] = self.numbers::<7>(args)?;
                geometry(Solid::capsule([ax, ay, az], [bx, by, bz], r))?
            }
            "union" | "intersection" => {
                let parts = args
                    .iter()
                    .map(|arg| self.solid(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                if name == "union" {
                    geometry(Solid::union(parts))?
                } else {
                    geometry(Solid::intersection(parts))?
                }
            }
            "difference" => {
                let base = self.solid(&args[0])?;
                base.difference(self.solid(&args[1])?)
            }
            "smooth_union" => {
                let a = self.solid(&args[0])?;
                let b = self.solid(&args[1])?;
                geometry(a.smooth_union(b, self.number(&args[2])?))?
            }
            _ => {
                // remaining operations take a solid followed by numbers
                let shape = self.solid(&args[0])?;
                let rest = &args[1..];
                match name {
                    "shell" => geometry(shape.shell(self.number(&rest[0])?))?,
                    "hole" => geometry(shape.hole(self.number(&rest[0])?))?,
                    "translate" => {
                        let offset = self.numbers::<3>(rest)?;
                        geometry(shape.translate(offset))?
                    }
                    "rotate_x" => geometry(shape.rotate(Axis::X, self.number(&rest[0])?))?,
                    "rotate_y" => geometry(shape.rotate(Axis::Y, self.number(&rest[0])?))?,
                    "rotate_z" => geometry(shape.rotate(Axis::Z, self.number(&rest[0])?))?,
                    "scale" => geometry(shape.scale(self.number(&rest[0])?))?,
                    "mirror" => {
                        let [nx, ny, nz, offset] = self.numbers::<4>(rest)?;
                        geometry(shape.mirror([nx, ny, nz], offset))?
                    }
                    other => {
                        return Err(ExecutionError::runtime(
                            position,
                            format!("operation '{other}' is registered but not implemented"),
                        ));
                    }
                }
            }
        };
        Ok(solid)
    }

    fn numbers<const N: usize>(&mut self, args: &[Expr]) -> Result<[f64; N], ExecutionError> {
        let mut out = [0.0; N];
        for (slot, arg) in out.iter_mut().zip(args) {
            *slot = self.number(arg)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ArtifactSelection, ExecutionLimits, Sandbox, TRAILING_EXPRESSION};
    use crate::error::ExecutionError;
    use crate::validate::validate;

    fn run(source: &str) -> Result<super::Artifact, ExecutionError> {
        run_with(source, Sandbox::default())
    }

    fn run_with(source: &str, sandbox: Sandbox) -> Result<super::Artifact, ExecutionError> {
        let program = validate(source).expect("script should validate");
        sandbox.execute(&program)
    }

    #[test]
    fn explicit_result_is_the_artifact() {
        let artifact = run(
            "params {\n  width = 10mm\n}\nplate = box(width, width * 2, 2mm)\nresult = plate |> hole(5mm)",
        )
        .expect("executes");
        assert_eq!(artifact.binding, "result");
        assert!(artifact.solid.distance([0.0, 0.0, 0.0]) > 0.0, "hole at center");
        assert!(artifact.solid.distance([4.0, 8.0, 0.0]) < 0.0);
    }

    #[test]
    fn trailing_expression_counts_as_explicit() {
        let artifact = run("a = sphere(1)\nb = sphere(2)\nunion(a, translate(b, 5, 0, 0))")
            .expect("executes");
        assert_eq!(artifact.binding, TRAILING_EXPRESSION);
    }

    #[test]
    fn single_binding_is_selected() {
        let artifact = run("part = cylinder(3, 10)").expect("executes");
        assert_eq!(artifact.binding, "part");
    }

    #[test]
    fn several_bindings_are_ambiguous_by_default() {
        let err = run("base = box(10, 10, 1)\npeg = cylinder(1, 5)").expect_err("ambiguous");
        assert_eq!(
            err,
            ExecutionError::AmbiguousArtifact {
                candidates: vec!["base".to_string(), "peg".to_string()],
            }
        );
    }

    #[test]
    fn first_declared_policy_picks_declaration_order() {
        let sandbox = Sandbox::new(ExecutionLimits::default(), ArtifactSelection::FirstDeclared);
        let artifact =
            run_with("peg = cylinder(1, 5)\nbase = box(10, 10, 1)", sandbox).expect("executes");
        assert_eq!(artifact.binding, "peg");
    }

    #[test]
    fn no_solid_binding_means_no_artifact() {
        assert_eq!(
            run("params { size = 4 }").expect_err("nothing"),
            ExecutionError::NoArtifactProduced
        );
        assert_eq!(
            run("params { size = 4 }\ndouble = size * 2").expect_err("nothing"),
            ExecutionError::NoArtifactProduced
        );
    }

    #[test]
    fn rebinding_to_a_number_drops_the_candidate() {
        let artifact = run("a = sphere(1)\nb = sphere(2)\nb = 3").expect("executes");
        assert_eq!(artifact.binding, "a");
    }

    #[test]
    fn numeric_result_is_a_runtime_failure() {
        let err = run("shape = sphere(1)\nresult = 4").expect_err("numeric result");
        assert!(matches!(err, ExecutionError::RuntimeFailure { .. }));
    }

    #[test]
    fn geometry_errors_surface_with_position() {
        let err = run("params { r = 0 }\nresult = sphere(r)").expect_err("zero radius");
        let ExecutionError::RuntimeFailure { message, position } = err else {
            panic!("expected runtime failure");
        };
        assert_eq!(message, "sphere: sphere radius must be positive, got 0");
        assert_eq!(position.map(|p| p.line), Some(2));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = run("params { gap = 0 }\nresult = sphere(10 / gap)").expect_err("div by zero");
        assert!(err.to_string().starts_with("division by zero at line 2"));
    }

    #[test]
    fn degrees_are_converted_to_radians() {
        let artifact = run("result = box(10, 2, 2) |> rotate_z(90deg)").expect("executes");
        assert!(artifact.solid.distance([0.0, 4.5, 0.0]) < 0.0);
        assert!(artifact.solid.distance([4.5, 0.0, 0.0]) > 0.0);
    }

    #[test]
    fn operation_limit_stops_runaway_scripts() {
        let limits = ExecutionLimits {
            max_operations: 5,
            max_nodes: 4_096,
        };
        let sandbox = Sandbox::new(limits, ArtifactSelection::Explicit);
        let err = run_with(
            "result = union(sphere(1), sphere(2), sphere(3), sphere(4), sphere(5))",
            sandbox,
        )
        .expect_err("limit");
        assert!(err.to_string().contains("operation limit of 5 exceeded"));
    }

    #[test]
    fn node_limit_caps_solid_size() {
        let limits = ExecutionLimits {
            max_operations: 100,
            max_nodes: 3,
        };
        let sandbox = Sandbox::new(limits, ArtifactSelection::Explicit);
        let err = run_with("result = box(4, 4, 4) |> hole(1)", sandbox).expect_err("limit");
        assert!(err.to_string().contains("more than the limit of 3"));
    }
}
