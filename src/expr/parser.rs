//! Expression Parser
//!
//! Recursive-descent parser from tokens to [`Node`] trees. Precedence from
//! loosest to tightest: `OR`, `AND`, `NOT`, comparisons, `+ -`,
//! `* / MOD %`, unary minus.

use super::ast::{BinaryOperator, Node, UnaryOperator};
use super::lexer::Lexer;
use super::token::Token;
use super::value::Value;
use crate::error::{Error, Result};

/// Deepest nesting accepted before parsing fails
pub const MAX_DEPTH: usize = 256;

/// Parse expression text into an AST
pub fn parse_expression(text: &str) -> Result<Node> {
    if text.trim().is_empty() {
        return Err(Error::NullParam("expression".to_string()));
    }
    let mut parser = Parser::new(text)?;
    parser.parse()
}

/// Expression parser
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    /// Create a new parser from expression text
    pub fn new(text: &str) -> Result<Self> {
        let mut lexer = Lexer::new(text);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
            depth: 0,
        })
    }

    /// Parse one complete expression
    pub fn parse(&mut self) -> Result<Node> {
        let node = self.parse_or_expr()?;
        if !self.is_at_end() {
            return Err(Error::UnexpectedToken {
                expected: "end of expression".to_string(),
                found: format!("{}", self.current()),
            });
        }
        Ok(node)
    }

    fn parse_or_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_and_expr()?;
        let base = self.depth;

        while self.check(&Token::Or) {
            self.advance();
            self.descend()?;
            let right = self.parse_and_expr()?;
            left = Node::binary(left, BinaryOperator::Or, right);
        }

        self.depth = base;
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_not_expr()?;
        let base = self.depth;

        while self.check(&Token::And) {
            self.advance();
            self.descend()?;
            let right = self.parse_not_expr()?;
            left = Node::binary(left, BinaryOperator::And, right);
        }

        self.depth = base;
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Node> {
        if self.check(&Token::Not) {
            self.advance();
            let expr = self.nested(Self::parse_not_expr)?;
            Ok(Node::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            })
        } else {
            self.parse_comparison_expr()
        }
    }

    fn parse_comparison_expr(&mut self) -> Result<Node> {
        let left = self.parse_additive_expr()?;

        let op = match self.current() {
            Token::Eq => Some(BinaryOperator::Eq),
            Token::Neq => Some(BinaryOperator::Neq),
            Token::Lt => Some(BinaryOperator::Lt),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::Lte => Some(BinaryOperator::Lte),
            Token::Gte => Some(BinaryOperator::Gte),
            _ => None,
        };

        match op {
            Some(op) => {
                self.advance();
                let right = self.parse_additive_expr()?;
                Ok(Node::binary(left, op, right))
            }
            None => Ok(left),
        }
    }

    fn parse_additive_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_multiplicative_expr()?;
        let base = self.depth;

        loop {
            let op = match self.current() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_multiplicative_expr()?;
            left = Node::binary(left, op, right);
        }

        self.depth = base;
        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_unary_expr()?;
        let base = self.depth;

        loop {
            let op = match self.current() {
                Token::Asterisk => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                Token::Mod | Token::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_unary_expr()?;
            left = Node::binary(left, op, right);
        }

        self.depth = base;
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Node> {
        match self.current() {
            Token::Minus => {
                self.advance();
                let expr = self.nested(Self::parse_unary_expr)?;
                // Fold negative numeric constants so `-3` stays a Long literal
                Ok(match expr {
                    Node::Literal(Value::Long(l)) => Node::Literal(Value::Long(-l)),
                    Node::Literal(Value::Double(d)) => Node::Literal(Value::Double(-d)),
                    other => Node::UnaryOp {
                        op: UnaryOperator::Neg,
                        expr: Box::new(other),
                    },
                })
            }
            Token::Plus => {
                self.advance();
                self.nested(Self::parse_unary_expr)
            }
            _ => self.parse_primary_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Node> {
        match self.current().clone() {
            Token::IntegerLiteral(n) => {
                self.advance();
                Ok(Node::Literal(Value::Long(n)))
            }
            Token::FloatLiteral(n) => {
                self.advance();
                Ok(Node::Literal(Value::Double(n)))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Node::Literal(Value::Str(s)))
            }
            Token::Placeholder(n) => {
                self.advance();
                Ok(Node::Variable(format!("?{}", n)))
            }
            Token::LParen => {
                self.advance();
                let expr = self.nested(Self::parse_or_expr)?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Identifier(name) => {
                self.advance();

                if self.check(&Token::LParen) {
                    self.advance();
                    let args = if self.check(&Token::RParen) {
                        Vec::new()
                    } else {
                        self.parse_expr_list()?
                    };
                    self.expect(&Token::RParen)?;
                    return Ok(Node::FunctionCall { name, args });
                }

                // Hierarchical name: frag.field
                let mut full = name;
                while self.check(&Token::Dot) {
                    self.advance();
                    full.push('.');
                    full.push_str(&self.expect_identifier()?);
                }
                Ok(Node::Variable(full))
            }
            _ => Err(Error::UnexpectedToken {
                expected: "expression".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Node>> {
        let mut exprs = Vec::new();

        loop {
            exprs.push(self.nested(Self::parse_or_expr)?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(exprs)
    }

    // ========== Helper functions ==========

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::ParseError(format!(
                "expression nested too deeply (limit {})",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    /// Run `parse` one nesting level deeper
    fn nested(&mut self, parse: fn(&mut Self) -> Result<Node>) -> Result<Node> {
        self.descend()?;
        let node = parse(self)?;
        self.depth -= 1;
        Ok(node)
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(Error::UnexpectedToken {
                expected: format!("{}", token),
                found: format!("{}", self.current()),
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(Error::UnexpectedToken {
                expected: "identifier".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 = 7  ->  (1 + (2 * 3)) = 7
        let node = parse_expression("1 + 2 * 3 = 7").unwrap();
        match node {
            Node::BinaryOp { op, left, .. } => {
                assert_eq!(op, BinaryOperator::Eq);
                assert!(matches!(
                    *left,
                    Node::BinaryOp {
                        op: BinaryOperator::Add,
                        ..
                    }
                ));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_function_call_preserves_argument_order() {
        let node = parse_expression("oph_id2(f.id_dim, 4, ?1)").unwrap();
        assert_eq!(
            node,
            Node::FunctionCall {
                name: "oph_id2".to_string(),
                args: vec![
                    Node::var("f.id_dim"),
                    Node::Literal(Value::Long(4)),
                    Node::var("?1"),
                ],
            }
        );
    }

    #[test]
    fn test_negative_literal_folding() {
        assert_eq!(
            parse_expression("-3").unwrap(),
            Node::Literal(Value::Long(-3))
        );
        assert!(matches!(
            parse_expression("-x").unwrap(),
            Node::UnaryOp {
                op: UnaryOperator::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        assert!(matches!(
            parse_expression("a b"),
            Err(Error::UnexpectedToken { .. })
        ));
        assert!(matches!(parse_expression("  "), Err(Error::NullParam(_))));
        assert!(parse_expression("f(1,").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(parse_expression(&deep), Err(Error::ParseError(_))));

        let negations = format!("{}x", "- ".repeat(10_000));
        assert!(matches!(parse_expression(&negations), Err(Error::ParseError(_))));

        let nots = format!("{}1", "NOT ".repeat(10_000));
        assert!(matches!(parse_expression(&nots), Err(Error::ParseError(_))));

        let chain = vec!["1"; 10_000].join(" + ");
        assert!(matches!(parse_expression(&chain), Err(Error::ParseError(_))));

        let calls = format!("{}1{}", "f(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse_expression(&calls), Err(Error::ParseError(_))));

        let ok = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse_expression(&ok).unwrap(), Node::Literal(Value::Long(1)));
        assert!(parse_expression(&vec!["1"; 100].join(" + ")).is_ok());
    }
}
