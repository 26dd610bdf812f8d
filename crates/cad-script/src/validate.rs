use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, ExprKind, Program, Statement};
use crate::capability::{self, ValueKind};
use crate::error::ValidationError;
use crate::parser::parse_program;

/// Checks that `source` is a well-formed script without running any of it.
///
/// On success the parsed program is returned so that it can be handed to the
/// interpreter without parsing twice.
pub fn validate(source: &str) -> Result<Program, ValidationError> {
    let program = parse_program(source)?;
    check_program(&program)?;
    Ok(program)
}

/// Structural checks on an already parsed program: names, arity and kinds.
pub fn check_program(program: &Program) -> Result<(), ValidationError> {
    let mut scope = Scope::default();

    for decl in &program.params {
        if scope.params.contains(&decl.name) {
            return Err(ValidationError::at(
                decl.position,
                format!("duplicate parameter '{}'", decl.name),
            ));
        }
        let kind = scope.kind_of(&decl.value)?;
        if kind != ValueKind::Number {
            return Err(ValidationError::at(
                decl.value.position,
                format!("parameter '{}' must be a number, got {kind}", decl.name),
            ));
        }
        scope.params.insert(decl.name.clone());
        scope.bindings.insert(decl.name.clone(), ValueKind::Number);
    }

    for statement in &program.statements {
        match statement {
            Statement::Assign {
                name,
                expr,
                position,
            } => {
                if scope.params.contains(name) {
                    return Err(ValidationError::at(
                        *position,
                        format!("'{name}' is a parameter and cannot be reassigned"),
                    ));
                }
                let kind = scope.kind_of(expr)?;
                scope.bindings.insert(name.clone(), kind);
            }
            Statement::Expr(expr) => {
                let kind = scope.kind_of(expr)?;
                if kind != ValueKind::Solid {
                    return Err(ValidationError::at(
                        expr.position,
                        "a statement on its own must be a shape expression",
                    ));
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Scope {
    params: HashSet<String>,
    bindings: HashMap<String, ValueKind>,
}

impl Scope {
    fn kind_of(&self, expr: &Expr) -> Result<ValueKind, ValidationError> {
        match &expr.kind {
            ExprKind::Number(_) => Ok(ValueKind::Number),
            ExprKind::Variable(name) => self.bindings.get(name).copied().ok_or_else(|| {
                let hint = capability::closest(name, self.bindings.keys().map(String::as_str))
                    .map(|near| format!(", did you mean '{near}'?"))
                    .unwrap_or_default();
                ValidationError::at(expr.position, format!("unknown name '{name}'{hint}"))
            }),
            ExprKind::Negate(operand) => {
                self.expect_number(operand, "unary '-'")?;
                Ok(ValueKind::Number)
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let context = format!("operator '{}'", op.symbol());
                self.expect_number(lhs, &context)?;
                self.expect_number(rhs, &context)?;
                Ok(ValueKind::Number)
            }
            ExprKind::Call { name, args } => {
                let Some(signature) = capability::lookup(name) else {
                    let hint = capability::suggest(name)
                        .map(|near| format!(", did you mean '{near}'?"))
                        .unwrap_or_default();
                    return Err(ValidationError::at(
                        expr.position,
                        format!("unknown operation '{name}'{hint}"),
                    ));
                };
                if !signature.accepts(args.len()) {
                    let expected = if signature.variadic {
                        format!("at least {}", signature.params.len())
                    } else {
                        signature.params.len().to_string()
                    };
                    return Err(ValidationError::at(
                        expr.position,
                        format!(
                            "'{name}' expects {expected} arguments, got {}; usage: {}",
                            args.len(),
                            signature.usage()
                        ),
                    ));
                }
                for (index, arg) in args.iter().enumerate() {
                    let actual = self.kind_of(arg)?;
                    if let Some(param) = signature.param(index)
                        && param.kind != actual
                    {
                        return Err(ValidationError::at(
                            arg.position,
                            format!(
                                "argument '{}' of '{name}' must be {}, got {actual}",
                                param.name, param.kind
                            ),
                        ));
                    }
                }
                Ok(ValueKind::Solid)
            }
        }
    }

    fn expect_number(&self, expr: &Expr, context: &str) -> Result<(), ValidationError> {
        match self.kind_of(expr)? {
            ValueKind::Number => Ok(()),
            ValueKind::Solid => Err(ValidationError::at(
                expr.position,
                format!("{context} needs a number, got a solid"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::ast::Position;

    const PLATE: &str = "// 10 x 20 x 2 plate with a 5 mm hole\nparams {\n  width = 10mm\n  depth = 20mm\n  thickness = 2mm\n}\nresult = box(width, depth, thickness) |> hole(5mm)\n";

    #[test]
    fn accepts_well_formed_script() {
        let program = validate(PLATE).expect("valid");
        assert_eq!(program.param_names(), vec!["width", "depth", "thickness"]);
    }

    #[test]
    fn accepts_params_only_script() {
        // producing nothing is the interpreter's call, not a structural defect
        assert!(validate("params { size = 4 }").is_ok());
    }

    #[test]
    fn unknown_operation_gets_a_suggestion() {
        let err = validate("result = sphre(4)").expect_err("invalid");
        assert_eq!(err.position, Position::new(1, 10));
        assert_eq!(err.message, "unknown operation 'sphre', did you mean 'sphere'?");
    }

    #[test]
    fn host_language_constructs_are_not_operations() {
        let err = validate("result = open(\"/etc/passwd\")").expect_err("invalid");
        assert!(err.message.contains("unexpected character"));

        let err = validate("result = system(1)").expect_err("invalid");
        assert_eq!(err.message, "unknown operation 'system'");
    }

    #[test]
    fn arity_is_checked_against_the_registry() {
        let err = validate("result = box(10, 20)").expect_err("invalid");
        assert_eq!(
            err.message,
            "'box' expects 3 arguments, got 2; usage: box(width, depth, height)"
        );

        let err = validate("result = union(sphere(1))").expect_err("invalid");
        assert!(err.message.starts_with("'union' expects at least 2 arguments"));
    }

    #[test]
    fn argument_kinds_are_checked() {
        let err = validate("result = sphere(box(1, 1, 1))").expect_err("invalid");
        assert_eq!(
            err.message,
            "argument 'radius' of 'sphere' must be a number, got a solid"
        );
        assert_eq!(err.position, Position::new(1, 17));

        let err = validate("a = sphere(1)\nresult = a + 1").expect_err("invalid");
        assert_eq!(err.message, "operator '+' needs a number, got a solid");
    }

    #[test]
    fn names_must_be_declared_before_use() {
        let err = validate("result = sphere(radius)\nradius = 3").expect_err("invalid");
        assert_eq!(err.message, "unknown name 'radius'");

        let err = validate("params { radius = 3 }\nresult = sphere(radus)").expect_err("invalid");
        assert_eq!(err.message, "unknown name 'radus', did you mean 'radius'?");
    }

    #[test]
    fn params_are_unique_and_read_only() {
        let err = validate("params {\n  a = 1\n  a = 2\n}").expect_err("invalid");
        assert_eq!(err.position, Position::new(3, 3));

        let err = validate("params { a = 1 }\na = sphere(1)").expect_err("invalid");
        assert!(err.message.contains("cannot be reassigned"));
    }

    #[test]
    fn deeply_nested_scripts_are_invalid_not_fatal() {
        let nested = format!("result = sphere({}1{})", "(".repeat(3000), ")".repeat(3000));
        let err = validate(&nested).expect_err("invalid");
        assert_eq!(err.message, "expression is nested too deeply");

        let terms = vec!["1"; 3000].join(" + ");
        let err = validate(&format!("params {{ n = {terms} }}\nresult = sphere(2)"))
            .expect_err("invalid");
        assert_eq!(err.message, "expression is nested too deeply");
    }

    #[test]
    fn bare_numeric_statement_is_rejected() {
        let err = validate("params { a = 1 }\na * 2").expect_err("invalid");
        assert_eq!(err.message, "a statement on its own must be a shape expression");
    }
}
