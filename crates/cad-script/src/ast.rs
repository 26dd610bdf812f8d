use std::fmt;

/// 1-based source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    None,
    Mm,
    Deg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberLiteral {
    pub value: f64,
    pub unit: Unit,
}

impl NumberLiteral {
    /// Value in model units: millimeters for lengths, radians for angles.
    pub fn resolved(&self) -> f64 {
        match self.unit {
            Unit::None | Unit::Mm => self.value,
            Unit::Deg => self.value.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(NumberLiteral),
    Variable(String),
    Negate(Box<Expr>),
    Binary {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub value: Expr,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        name: String,
        expr: Expr,
        position: Position,
    },
    Expr(Expr),
}

impl Statement {
    pub fn position(&self) -> Position {
        match self {
            Statement::Assign { position, .. } => *position,
            Statement::Expr(expr) => expr.position,
        }
    }

    pub fn expr(&self) -> &Expr {
        match self {
            Statement::Assign { expr, .. } | Statement::Expr(expr) => expr,
        }
    }
}

/// A parsed script: an optional parameter block followed by statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub params: Vec<ParamDecl>,
    pub statements: Vec<Statement>,
}

impl Program {
    /// Canonical source text; parsing it yields an equivalent program.
    pub fn to_source(&self) -> String {
        self.to_string()
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|decl| decl.name.as_str()).collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            writeln!(f, "params {{")?;
            for decl in &self.params {
                writeln!(f, "  {} = {}", decl.name, decl.value)?;
            }
            writeln!(f, "}}")?;
        }
        for statement in &self.statements {
            match statement {
                Statement::Assign { name, expr, .. } => writeln!(f, "{name} = {expr}")?,
                Statement::Expr(expr) => writeln!(f, "{expr}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Number(number) => {
                if number.value.fract() == 0.0 && number.value.abs() < 1e15 {
                    write!(f, "{}", number.value as i64)?;
                } else {
                    write!(f, "{}", number.value)?;
                }
                match number.unit {
                    Unit::None => Ok(()),
                    Unit::Mm => f.write_str("mm"),
                    Unit::Deg => f.write_str("deg"),
                }
            }
            ExprKind::Variable(name) => f.write_str(name),
            ExprKind::Negate(inner) => write!(f, "(-{inner})"),
            ExprKind::Binary { lhs, op, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            ExprKind::Call { name, args } => {
                write!(f, "{name}(")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
