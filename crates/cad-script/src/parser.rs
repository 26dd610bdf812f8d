use std::mem::discriminant;

use crate::ast::{BinaryOp, Expr, ExprKind, ParamDecl, Position, Program, Statement};
use crate::error::ValidationError;
use crate::lexer::{Token, TokenKind, tokenize};

/// Deepest expression tree the parser will build. Operator chains count one level per operator.
pub const MAX_DEPTH: usize = 128;

/// Parses `source` into a [`Program`] without checking names or arity.
pub fn parse_program(source: &str) -> Result<Program, ValidationError> {
    Parser {
        tokens: tokenize(source)?,
        index: 0,
        depth: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Program, ValidationError> {
        if self.check(&TokenKind::Eof) {
            return Err(self.error_here("empty program"));
        }

        let mut params = Vec::new();
        if self.at_params_block() {
            self.advance();
            self.expect(&TokenKind::LBrace, "expected '{' after params")?;
            while !self.check(&TokenKind::RBrace) {
                if self.check(&TokenKind::Eof) {
                    return Err(self.error_here("unterminated params block"));
                }
                let position = self.peek().position;
                let name = self.ident("expected parameter name")?;
                self.expect(&TokenKind::Eq, "expected '=' in params block")?;
                let value = self.expression()?;
                self.skip_semicolons();
                params.push(ParamDecl {
                    name,
                    value,
                    position,
                });
            }
            self.expect(&TokenKind::RBrace, "expected '}' to close params block")?;
        }

        let mut statements = Vec::new();
        self.skip_semicolons();
        while !self.check(&TokenKind::Eof) {
            if self.at_params_block() {
                return Err(self.error_here("params block must come before any statement"));
            }
            let position = self.peek().position;
            if self.next_is_assignment() {
                let name = self.ident("expected assignment target")?;
                self.expect(&TokenKind::Eq, "expected '=' in assignment")?;
                let expr = self.expression()?;
                statements.push(Statement::Assign {
                    name,
                    expr,
                    position,
                });
            } else {
                statements.push(Statement::Expr(self.expression()?));
            }
            self.skip_semicolons();
        }

        Ok(Program { params, statements })
    }

    fn expression(&mut self) -> Result<Expr, ValidationError> {
        let start = self.depth;
        self.descend(self.peek().position)?;
        let mut expr = self.additive()?;
        while self.check(&TokenKind::Pipe) {
            self.advance();
            let position = self.peek().position;
            self.descend(position)?;
            let name = self.ident("expected operation name after '|>'")?;
            self.expect(&TokenKind::LParen, "expected '(' after pipe stage name")?;
            let mut args = vec![expr];
            args.extend(self.arguments()?);
            expr = Expr::new(ExprKind::Call { name, args }, position);
        }
        self.depth = start;
        Ok(expr)
    }

    fn additive(&mut self) -> Result<Expr, ValidationError> {
        let start = self.depth;
        let mut expr = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let position = self.advance().position;
            self.descend(position)?;
            let rhs = self.multiplicative()?;
            expr = binary(expr, op, rhs, position);
        }
        self.depth = start;
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr, ValidationError> {
        let start = self.depth;
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            let position = self.advance().position;
            self.descend(position)?;
            let rhs = self.unary()?;
            expr = binary(expr, op, rhs, position);
        }
        self.depth = start;
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ValidationError> {
        if self.check(&TokenKind::Minus) {
            let start = self.depth;
            let position = self.advance().position;
            self.descend(position)?;
            let operand = self.unary()?;
            self.depth = start;
            return Ok(Expr::new(ExprKind::Negate(Box::new(operand)), position));
        }
        self.primary()
    }

    /// Claims one level of nesting; every caller restores `depth` once its subtree is built.
    fn descend(&mut self, position: Position) -> Result<(), ValidationError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ValidationError::at(position, "expression is nested too deeply"));
        }
        Ok(())
    }

    fn primary(&mut self) -> Result<Expr, ValidationError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(number) => Ok(Expr::new(ExprKind::Number(number), token.position)),
            TokenKind::Ident(name) => {
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let args = self.arguments()?;
                    Ok(Expr::new(ExprKind::Call { name, args }, token.position))
                } else {
                    Ok(Expr::new(ExprKind::Variable(name), token.position))
                }
            }
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "expected ')' to close group")?;
                Ok(expr)
            }
            other => Err(ValidationError::at(
                token.position,
                format!("expected expression, found {}", other.describe()),
            )),
        }
    }

    /// Parses a comma-separated list after an opening parenthesis, including the `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, ValidationError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(&TokenKind::RParen, "expected ')' after arguments")?;
        Ok(args)
    }

    fn at_params_block(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == "params")
            && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::LBrace)
    }

    fn next_is_assignment(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Ident(_))
            && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::Eq)
    }

    fn skip_semicolons(&mut self) {
        while self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn ident(&mut self, message: &str) -> Result<String, ValidationError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(message)),
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<(), ValidationError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(message))
        }
    }

    fn error_here(&self, message: &str) -> ValidationError {
        let token = self.peek();
        let message = if token.kind == TokenKind::Eof {
            message.to_string()
        } else {
            format!("{message}, found {}", token.kind.describe())
        };
        ValidationError::at(token.position, message)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        discriminant(&self.peek().kind) == discriminant(kind)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset)
    }

    /// Returns the current token and moves past it; the trailing `Eof` is never passed.
    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }
}

fn binary(lhs: Expr, op: BinaryOp, rhs: Expr, position: Position) -> Expr {
    Expr::new(
        ExprKind::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        },
        position,
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::parse_program;
    use crate::ast::{ExprKind, Position, Statement};

    #[test]
    fn parses_params_and_statements() {
        let program = parse_program(
            "// plate\nparams {\n  width = 10mm\n  depth = width * 2\n}\nplate = box(width, depth, 2mm)\nresult = plate |> hole(5mm)\n",
        )
        .expect("parse");

        assert_eq!(program.param_names(), vec!["width", "depth"]);
        assert_eq!(program.statements.len(), 2);
        let Statement::Assign { name, expr, position } = &program.statements[1] else {
            panic!("expected assignment");
        };
        assert_eq!(name, "result");
        assert_eq!(*position, Position::new(7, 1));
        let ExprKind::Call { name, args } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(name, "hole");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn canonical_source_round_trips() {
        let source = "params {\n  r = 4mm\n}\nball = sphere(r * 2)\ntranslate(ball, -r, 0, 45deg)\n";
        let program = parse_program(source).expect("parse");
        let reparsed = parse_program(&program.to_source()).expect("reparse");
        assert_eq!(program.to_source(), reparsed.to_source());
        assert!(program.to_source().contains("ball = sphere((r * 2))"));
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let program = parse_program("x = 1 + 2 * 3").expect("parse");
        assert_eq!(program.statements[0].expr().to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn semicolons_are_optional_separators() {
        let program = parse_program("a = sphere(1);; b = sphere(2);").expect("parse");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn deep_parenthesis_nesting_is_rejected() {
        let source = format!("result = sphere({}1{})", "(".repeat(3000), ")".repeat(3000));
        let err = parse_program(&source).expect_err("too deep");
        assert_eq!(err.message, "expression is nested too deeply");
        assert_eq!(err.position.line, 1);

        let source = format!("x = {}1", "-".repeat(3000));
        let err = parse_program(&source).expect_err("too deep");
        assert_eq!(err.message, "expression is nested too deeply");
    }

    #[test]
    fn long_operator_chains_count_toward_depth() {
        let terms = vec!["1"; 3000].join(" + ");
        let err = parse_program(&format!("params {{ n = {terms} }}\nresult = sphere(2)"))
            .expect_err("too deep");
        assert_eq!(err.message, "expression is nested too deeply");

        let products = vec!["2"; 3000].join(" * ");
        assert!(parse_program(&format!("x = {products}")).is_err());
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let source = format!("result = sphere({}1{})", "(".repeat(40), ")".repeat(40));
        assert!(parse_program(&source).is_ok());

        let terms = vec!["1"; 60].join(" + ");
        let program = parse_program(&format!("x = {terms}")).expect("parse");
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn reports_missing_parenthesis_with_position() {
        let err = parse_program("result = box(1, 2, 3").expect_err("should fail");
        assert_eq!(err.message, "expected ')' after arguments");
        assert_eq!(err.position, Position::new(1, 21));
    }

    #[test]
    fn rejects_empty_and_misplaced_params() {
        let err = parse_program("  \n// nothing\n").expect_err("empty");
        assert_eq!(err.message, "empty program");

        let err = parse_program("a = sphere(1)\nparams { r = 1 }").expect_err("late params");
        assert_eq!(err.position, Position::new(2, 1));
        assert!(err.message.starts_with("params block must come before"));
    }

    #[test]
    fn reports_unexpected_token() {
        let err = parse_program("result = sphere(1) )").expect_err("stray paren");
        assert_eq!(err.message, "expected expression, found ')'");
        assert_eq!(err.position, Position::new(1, 20));
    }
}
