//! Expression token definitions

use std::fmt;

/// Expression token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // ========== Keywords ==========
    And,
    Or,
    Not,
    Mod,

    // ========== Literals ==========
    Identifier(String),
    /// Positional argument placeholder, e.g. `?2`
    Placeholder(usize),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),

    // ========== Operators ==========
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,

    // ========== Punctuation ==========
    LParen,
    RParen,
    Comma,
    Dot,

    Eof,
}

impl Token {
    /// Convert a keyword string to a token (case-insensitive)
    pub fn from_keyword(s: &str) -> Option<Token> {
        match s.to_uppercase().as_str() {
            "AND" => Some(Token::And),
            "OR" => Some(Token::Or),
            "NOT" => Some(Token::Not),
            "MOD" => Some(Token::Mod),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::Mod => write!(f, "MOD"),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Placeholder(n) => write!(f, "?{}", n),
            Token::IntegerLiteral(n) => write!(f, "{}", n),
            Token::FloatLiteral(n) => write!(f, "{}", n),
            Token::StringLiteral(s) => write!(f, "'{}'", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "="),
            Token::Neq => write!(f, "<>"),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Lte => write!(f, "<="),
            Token::Gte => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Eof => write!(f, "end of input"),
        }
    }
}
