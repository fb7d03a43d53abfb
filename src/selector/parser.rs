use crate::Properties;

use super::{
    SelectorError,
    lexer::{Token, TokenKind},
};

/// Deepest nesting of parentheses and `not` a selector may use.
pub(super) const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CompareOp {
    Eq,
    NotEq,
}

/// Selector expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Expr {
    Compare {
        key: String,
        op: CompareOp,
        value: String,
    },
    In {
        key: String,
        values: Vec<String>,
        negated: bool,
    },
    IsNull {
        key: String,
        negated: bool,
    },
    Not(Box<Expr>),
    /// Operands of a chain of `and`, flattened.
    And(Vec<Expr>),
    /// Operands of a chain of `or`, flattened.
    Or(Vec<Expr>),
}

impl Expr {
    /// Three-valued evaluation: `None` means unknown (a referenced property is missing).
    pub fn evaluate(&self, properties: &Properties) -> Option<bool> {
        match self {
            Expr::Compare { key, op, value } => properties.get(key).map(|actual| match op {
                CompareOp::Eq => actual == value,
                CompareOp::NotEq => actual != value,
            }),
            Expr::In {
                key,
                values,
                negated,
            } => properties
                .get(key)
                .map(|actual| values.iter().any(|v| v == actual) != *negated),
            Expr::IsNull { key, negated } => Some(properties.contains_key(key) == *negated),
            Expr::Not(inner) => inner.evaluate(properties).map(|v| !v),
            Expr::And(operands) => {
                let mut result = Some(true);
                for operand in operands {
                    match operand.evaluate(properties) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => result = None,
                    }
                }
                result
            }
            Expr::Or(operands) => {
                let mut result = Some(false);
                for operand in operands {
                    match operand.evaluate(properties) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => result = None,
                    }
                }
                result
            }
        }
    }
}

/// Recursive descent parser. Precedence from loosest: `or`, `and`, `not`, predicate.
///
/// `and`/`or` chains are collected into flat operand lists, so recursion only
/// grows with nesting, which is capped at [`MAX_DEPTH`].
pub(super) struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            cursor: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr, SelectorError> {
        let expr = self.or_expr()?;
        match self.peek() {
            TokenKind::Eof => Ok(expr),
            _ => Err(self.unexpected("expected 'and', 'or' or end of selector")),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, SelectorError> {
        let mut operands = vec![self.and_expr()?];
        while self.eat(&TokenKind::Or) {
            operands.push(self.and_expr()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Expr::Or(operands),
        })
    }

    fn and_expr(&mut self) -> Result<Expr, SelectorError> {
        let mut operands = vec![self.not_expr()?];
        while self.eat(&TokenKind::And) {
            operands.push(self.not_expr()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Expr::And(operands),
        })
    }

    fn not_expr(&mut self) -> Result<Expr, SelectorError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let inner = self.not_expr();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, SelectorError> {
        match self.peek().clone() {
            TokenKind::LParen => {
                self.enter()?;
                self.advance();
                let expr = self.or_expr();
                self.depth -= 1;
                let expr = expr?;
                self.expect(&TokenKind::RParen, "expected ')'")?;
                Ok(expr)
            }
            TokenKind::Ident(key) => {
                self.advance();
                self.predicate(key)
            }
            _ => Err(self.unexpected("expected property name or '('")),
        }
    }

    fn predicate(&mut self, key: String) -> Result<Expr, SelectorError> {
        match self.peek() {
            TokenKind::Eq => {
                self.advance();
                let value = self.literal()?;
                Ok(Expr::Compare {
                    key,
                    op: CompareOp::Eq,
                    value,
                })
            }
            TokenKind::NotEq => {
                self.advance();
                let value = self.literal()?;
                Ok(Expr::Compare {
                    key,
                    op: CompareOp::NotEq,
                    value,
                })
            }
            TokenKind::Is => {
                self.advance();
                let negated = self.eat(&TokenKind::Not);
                self.expect(&TokenKind::Null, "expected 'null'")?;
                Ok(Expr::IsNull { key, negated })
            }
            TokenKind::Not => {
                self.advance();
                self.expect(&TokenKind::In, "expected 'in'")?;
                self.in_list(key, true)
            }
            TokenKind::In => {
                self.advance();
                self.in_list(key, false)
            }
            _ => Err(self.unexpected("expected '=', '<>', 'is' or 'in' after property name")),
        }
    }

    fn in_list(&mut self, key: String, negated: bool) -> Result<Expr, SelectorError> {
        self.expect(&TokenKind::LParen, "expected '('")?;
        let mut values = vec![self.literal()?];
        while self.eat(&TokenKind::Comma) {
            values.push(self.literal()?);
        }
        self.expect(&TokenKind::RParen, "expected ')'")?;
        Ok(Expr::In {
            key,
            values,
            negated,
        })
    }

    fn literal(&mut self) -> Result<String, SelectorError> {
        match self.peek().clone() {
            TokenKind::Literal(value) => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected("expected quoted literal")),
        }
    }

    fn enter(&mut self) -> Result<(), SelectorError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.unexpected("selector is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn current(&self) -> &Token {
        // tokenize always terminates the stream with Eof, and the cursor never passes it
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<(), SelectorError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(message))
        }
    }

    fn unexpected(&self, message: &str) -> SelectorError {
        let token = self.current();
        SelectorError::new(token.position, token.kind.to_string(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::lexer::tokenize;

    fn parse(input: &str) -> Result<Expr, SelectorError> {
        Parser::new(tokenize(input)?).parse()
    }

    fn eq(key: &str, value: &str) -> Expr {
        Expr::Compare {
            key: key.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("A = '1' or B = '2' and C = '3'").unwrap();
        assert_eq!(
            expr,
            Expr::Or(vec![
                eq("A", "1"),
                Expr::And(vec![eq("B", "2"), eq("C", "3")])
            ])
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = parse("(A = '1' or B = '2') and C = '3'").unwrap();
        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::Or(vec![eq("A", "1"), eq("B", "2")]),
                eq("C", "3")
            ])
        );
    }

    #[test]
    fn test_not_in_and_is_not_null() {
        let expr = parse("A not in ('x', 'y') and B is not null").unwrap();
        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::In {
                    key: "A".into(),
                    values: vec!["x".into(), "y".into()],
                    negated: true
                },
                Expr::IsNull {
                    key: "B".into(),
                    negated: true
                }
            ])
        );
    }

    #[test]
    fn test_missing_literal_reports_position() {
        let err = parse("CI_TYPE = and").unwrap_err();
        assert_eq!(err.position(), 10);
        assert_eq!(err.token(), "and");
        assert_eq!(err.message(), "expected quoted literal");
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        let err = parse("(A = 'x'").unwrap_err();
        assert_eq!(err.token(), "end of input");
        assert_eq!(err.message(), "expected ')'");
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse("A = 'x' B = 'y'").unwrap_err();
        assert_eq!(err.token(), "B");
    }

    #[test]
    fn test_three_valued_logic() {
        let mut props = Properties::new();
        props.insert("A".into(), "1".into());

        let missing = parse("B = '2'").unwrap();
        assert_eq!(missing.evaluate(&props), None);

        let negated = parse("not B = '2'").unwrap();
        assert_eq!(negated.evaluate(&props), None);

        let or_true = parse("B = '2' or A = '1'").unwrap();
        assert_eq!(or_true.evaluate(&props), Some(true));

        let and_false = parse("B = '2' and A = '9'").unwrap();
        assert_eq!(and_false.evaluate(&props), Some(false));
    }

    #[test]
    fn test_chains_are_flattened() {
        let expr = parse("A = '1' or A = '2' or A = '3'").unwrap();
        assert_eq!(expr, Expr::Or(vec![eq("A", "1"), eq("A", "2"), eq("A", "3")]));
    }

    #[test]
    fn test_long_chain_evaluates_without_deep_recursion() {
        let text = (0..50_000)
            .map(|i| format!("A = '{i}'"))
            .collect::<Vec<_>>()
            .join(" or ");
        let expr = parse(&text).unwrap();

        let mut props = Properties::new();
        props.insert("A".into(), "49999".into());
        assert_eq!(expr.evaluate(&props), Some(true));
        props.insert("A".into(), "none".into());
        assert_eq!(expr.evaluate(&props), Some(false));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}A = 'x'{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse(&nested(MAX_DEPTH)).is_ok());

        let err = parse(&nested(100_000)).unwrap_err();
        assert_eq!(err.message(), "selector is nested too deeply");
        assert_eq!(err.position(), MAX_DEPTH);

        let nots = format!("{}A = 'x'", "not ".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&nots).unwrap_err().message(), "selector is nested too deeply");
    }
}
