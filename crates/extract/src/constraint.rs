//! Build constraint expressions.
//!
//! Two syntaxes exist: the current `//go:build` boolean expressions and the
//! legacy `// +build` lines (space means OR, comma means AND, lines are ANDed
//! together). Both parse into the same [`Expr`] tree.

use crate::context::BuildContext;
use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, ctx: BuildContext) -> bool {
        match self {
            Self::Tag(tag) => ctx.matches_tag(tag),
            Self::Not(inner) => !inner.eval(ctx),
            Self::And(lhs, rhs) => lhs.eval(ctx) && rhs.eval(ctx),
            Self::Or(lhs, rhs) => lhs.eval(ctx) || rhs.eval(ctx),
        }
    }

    fn and(lhs: Expr, rhs: Expr) -> Expr {
        Self::And(Box::new(lhs), Box::new(rhs))
    }

    fn or(lhs: Expr, rhs: Expr) -> Expr {
        Self::Or(Box::new(lhs), Box::new(rhs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' => i += 1,
            b'!' => {
                tokens.push(Token::Not);
                i += 1;
            },
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            },
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            },
            b'&' if bytes.get(i + 1) == Some(&b'&') => {
                tokens.push(Token::And);
                i += 2;
            },
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                tokens.push(Token::Or);
                i += 2;
            },
            _ if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.') {
                    i += 1;
                }
                tokens.push(Token::Tag(text[start..i].to_string()));
            },
            _ => exn::bail!(ErrorKind::InvalidConstraint(text.to_string())),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn fail<T>(&self) -> Result<T> {
        exn::bail!(ErrorKind::InvalidConstraint(self.source.to_string()))
    }

    fn or(&mut self) -> Result<Expr> {
        let mut expr = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Expr::or(expr, self.and()?);
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut expr = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Expr::and(expr, self.not()?);
        }
        Ok(expr)
    }

    fn not(&mut self) -> Result<Expr> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.not()?)))
            },
            Some(Token::Open) => {
                self.pos += 1;
                let expr = self.or()?;
                if self.peek() != Some(&Token::Close) {
                    return self.fail();
                }
                self.pos += 1;
                Ok(expr)
            },
            Some(Token::Tag(tag)) => {
                self.pos += 1;
                Ok(Expr::Tag(tag))
            },
            _ => self.fail(),
        }
    }
}

/// Parse the expression following `//go:build`.
pub fn parse_go_build(expr: &str) -> Result<Expr> {
    let mut parser = Parser { source: expr, tokens: tokenize(expr)?, pos: 0 };
    let parsed = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return parser.fail();
    }
    Ok(parsed)
}

/// Parse the bodies of one or more `// +build` lines (text after `+build`).
///
/// Returns `None` when no line contained any option.
pub fn parse_plus_build<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Option<Expr>> {
    let mut result: Option<Expr> = None;
    for line in lines {
        let mut line_expr: Option<Expr> = None;
        for option in line.split_whitespace() {
            let mut option_expr: Option<Expr> = None;
            for term in option.split(',') {
                let (negated, tag) = match term.strip_prefix('!') {
                    Some(tag) => (true, tag),
                    None => (false, term),
                };
                if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.') {
                    exn::bail!(ErrorKind::InvalidConstraint(line.to_string()));
                }
                let mut term_expr = Expr::Tag(tag.to_string());
                if negated {
                    term_expr = Expr::Not(Box::new(term_expr));
                }
                option_expr = Some(match option_expr {
                    Some(prev) => Expr::and(prev, term_expr),
                    None => term_expr,
                });
            }
            if let Some(option_expr) = option_expr {
                line_expr = Some(match line_expr {
                    Some(prev) => Expr::or(prev, option_expr),
                    None => option_expr,
                });
            }
        }
        if let Some(line_expr) = line_expr {
            result = Some(match result {
                Some(prev) => Expr::and(prev, line_expr),
                None => line_expr,
            });
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn eval_all(expr: &Expr) -> [bool; 4] {
        BuildContext::ALL.map(|ctx| expr.eval(ctx))
    }

    #[rstest]
    #[case("linux", [true, false, false, false])]
    #[case("!windows", [true, false, true, true])]
    #[case("linux || darwin", [true, false, true, false])]
    #[case("unix && !darwin", [true, false, false, false])]
    #[case("(windows || js) && !cgo", [false, false, false, true])]
    #[case("!(linux || windows)", [false, false, true, true])]
    #[case("ignore", [false, false, false, false])]
    #[case("go1.18 && amd64", [true, true, true, false])]
    fn go_build(#[case] expr: &str, #[case] expected: [bool; 4]) {
        assert_eq!(eval_all(&parse_go_build(expr).unwrap()), expected);
    }

    #[rstest]
    #[case("")]
    #[case("linux &&")]
    #[case("(linux")]
    #[case("linux darwin")]
    #[case("linux & darwin")]
    fn go_build_rejects(#[case] expr: &str) {
        assert!(parse_go_build(expr).is_err());
    }

    #[test]
    fn plus_build_semantics() {
        // Space is OR, comma is AND.
        let expr = parse_plus_build(["linux,amd64 darwin"]).unwrap().unwrap();
        assert_eq!(eval_all(&expr), [true, false, true, false]);
        // Separate lines are ANDed.
        let expr = parse_plus_build(["linux darwin", "!cgo"]).unwrap().unwrap();
        assert_eq!(eval_all(&expr), [false, false, false, false]);
        let expr = parse_plus_build(["!windows"]).unwrap().unwrap();
        assert_eq!(eval_all(&expr), [true, false, true, true]);
        assert_eq!(parse_plus_build([""]).unwrap(), None);
        assert!(parse_plus_build(["linux,"]).is_err());
    }
}
