use crate::ast::{NumberLiteral, Position, Unit};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Number(NumberLiteral),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Pipe,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Number(number) => format!("number {}", number.value),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Pipe => "'|>'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ValidationError> {
    Lexer {
        source,
        index: 0,
        line: 1,
        column: 1,
    }
    .run()
}

struct Lexer<'a> {
    source: &'a str,
    index: usize,
    line: usize,
    column: usize,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Token>, ValidationError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
                continue;
            }
            if self.rest().starts_with("//") {
                while let Some(ch) = self.bump() {
                    if ch == '\n' {
                        break;
                    }
                }
                continue;
            }
            if self.rest().starts_with("/*") {
                self.skip_block_comment()?;
                continue;
            }

            let position = self.position();
            let single = match ch {
                '(' => Some(TokenKind::LParen),
                ')' => Some(TokenKind::RParen),
                '{' => Some(TokenKind::LBrace),
                '}' => Some(TokenKind::RBrace),
                ',' => Some(TokenKind::Comma),
                ';' => Some(TokenKind::Semicolon),
                '=' => Some(TokenKind::Eq),
                '+' => Some(TokenKind::Plus),
                '-' => Some(TokenKind::Minus),
                '*' => Some(TokenKind::Star),
                '/' => Some(TokenKind::Slash),
                _ => None,
            };

            let kind = if let Some(kind) = single {
                self.bump();
                kind
            } else if self.rest().starts_with("|>") {
                self.bump();
                self.bump();
                TokenKind::Pipe
            } else if ch == '_' || ch.is_ascii_alphabetic() {
                TokenKind::Ident(self.take_while(|c| c == '_' || c.is_ascii_alphanumeric()))
            } else if ch.is_ascii_digit() || (ch == '.' && self.second_is_digit()) {
                TokenKind::Number(self.number(position)?)
            } else {
                return Err(ValidationError::at(
                    position,
                    format!("unexpected character '{ch}'"),
                ));
            };
            tokens.push(Token { kind, position });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            position: self.position(),
        });
        Ok(tokens)
    }

    fn number(&mut self, position: Position) -> Result<NumberLiteral, ValidationError> {
        let start = self.index;
        self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.bump();
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.take_while(|c| c.is_ascii_digit()).is_empty() {
                return Err(ValidationError::at(position, "invalid exponent in number"));
            }
        }

        let text = &self.source[start..self.index];
        let value = text.parse::<f64>().map_err(|err| {
            ValidationError::at(position, format!("invalid number literal '{text}': {err}"))
        })?;

        let unit = if self.eat_unit("mm") {
            Unit::Mm
        } else if self.eat_unit("deg") {
            Unit::Deg
        } else {
            Unit::None
        };
        Ok(NumberLiteral { value, unit })
    }

    /// Consumes `unit` only when it is not the prefix of a longer identifier.
    fn eat_unit(&mut self, unit: &str) -> bool {
        let Some(after) = self.rest().strip_prefix(unit) else {
            return false;
        };
        if after
            .chars()
            .next()
            .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
        {
            return false;
        }
        for _ in 0..unit.len() {
            self.bump();
        }
        true
    }

    fn skip_block_comment(&mut self) -> Result<(), ValidationError> {
        let start = self.position();
        self.bump();
        self.bump();
        while !self.rest().is_empty() {
            if self.rest().starts_with("*/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            self.bump();
        }
        Err(ValidationError::at(start, "unterminated block comment"))
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.index;
        while self.peek().is_some_and(&keep) {
            self.bump();
        }
        self.source[start..self.index].to_string()
    }

    fn rest(&self) -> &str {
        &self.source[self.index..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn second_is_digit(&self) -> bool {
        self.rest().chars().nth(1).is_some_and(|c| c.is_ascii_digit())
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenKind, tokenize};
    use crate::ast::{NumberLiteral, Position, Unit};

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn numbers_carry_units() {
        assert_eq!(
            kinds("10mm 45deg 2.5 1e3"),
            vec![
                TokenKind::Number(NumberLiteral {
                    value: 10.0,
                    unit: Unit::Mm
                }),
                TokenKind::Number(NumberLiteral {
                    value: 45.0,
                    unit: Unit::Deg
                }),
                TokenKind::Number(NumberLiteral {
                    value: 2.5,
                    unit: Unit::None
                }),
                TokenKind::Number(NumberLiteral {
                    value: 1000.0,
                    unit: Unit::None
                }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unit_suffix_needs_a_word_boundary() {
        // `5mmx` is not a millimeter literal
        let tokens = kinds("5mmx");
        assert_eq!(tokens[1], TokenKind::Ident("mmx".to_string()));
    }

    #[test]
    fn comments_are_skipped_and_positions_tracked() {
        let tokens = tokenize("// heading\n/* block\n */ a |> b").expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Ident("a".to_string()));
        assert_eq!(tokens[0].position, Position::new(3, 5));
        assert_eq!(tokens[1].kind, TokenKind::Pipe);
        assert_eq!(tokens[2].position, Position::new(3, 10));
    }

    #[test]
    fn rejects_stray_characters_with_location() {
        let err = tokenize("a = 1\nb = $").expect_err("should fail");
        assert_eq!(err.position, Position::new(2, 5));
        assert!(err.message.contains("'$'"));

        let err = tokenize("/* open").expect_err("should fail");
        assert_eq!(err.message, "unterminated block comment");
    }
}
