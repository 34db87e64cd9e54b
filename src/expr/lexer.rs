//! Expression Lexer (Tokenizer)
//!
//! Converts expression text into a stream of tokens.

use super::token::Token;
use crate::error::{Error, Result};

/// Expression lexer
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();
        let single = match ch {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '.' => Some(Token::Dot),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Asterisk),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '<' => {
                self.advance();
                match self.peek_current() {
                    Some('=') => {
                        self.advance();
                        Ok(Token::Lte)
                    }
                    Some('>') => {
                        self.advance();
                        Ok(Token::Neq)
                    }
                    _ => Ok(Token::Lt),
                }
            }
            '>' => {
                self.advance();
                if self.peek_current() == Some('=') {
                    self.advance();
                    return Ok(Token::Gte);
                }
                Ok(Token::Gt)
            }
            '!' => {
                self.advance();
                if self.peek_current() == Some('=') {
                    self.advance();
                    return Ok(Token::Neq);
                }
                Err(Error::UnexpectedCharacter('!', self.position))
            }
            '?' => self.read_placeholder(),
            '\'' | '"' => self.read_string(ch),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
            c => Err(Error::UnexpectedCharacter(c, self.position)),
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    /// Read `?N`
    fn read_placeholder(&mut self) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip ?

        let mut digits = String::new();
        while let Some(c) = self.peek_current() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.advance();
        }

        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Token::Placeholder(n)),
            _ => Err(Error::InvalidNumber(start_pos)),
        }
    }

    /// Read a quoted string; a doubled quote escapes itself
    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip opening quote

        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch == quote {
                if self.peek_char() == Some(quote) {
                    value.push(quote);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    return Ok(Token::StringLiteral(value));
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(Error::UnterminatedString(start_pos))
    }

    /// Read a number (integer or float)
    fn read_number(&mut self) -> Result<Token> {
        let start_pos = self.position;
        let mut value = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_ascii_digit() {
                value.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                match self.peek_char() {
                    Some(next) if next.is_ascii_digit() => {
                        is_float = true;
                        value.push(ch);
                        self.advance();
                    }
                    _ => break,
                }
            } else if ch == 'e' || ch == 'E' {
                // Scientific notation
                is_float = true;
                value.push(ch);
                self.advance();

                if let Some(sign @ ('+' | '-')) = self.peek_current() {
                    value.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        if is_float {
            value
                .parse::<f64>()
                .map(Token::FloatLiteral)
                .map_err(|_| Error::InvalidNumber(start_pos))
        } else {
            value
                .parse::<i64>()
                .map(Token::IntegerLiteral)
                .map_err(|_| Error::InvalidNumber(start_pos))
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut value = String::new();

        while let Some(ch) = self.peek_current() {
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::from_keyword(&value).unwrap_or(Token::Identifier(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_clause() {
        let mut lexer = Lexer::new("frag.v > 15 AND id <> ?2");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Identifier("frag".to_string()),
                Token::Dot,
                Token::Identifier("v".to_string()),
                Token::Gt,
                Token::IntegerLiteral(15),
                Token::And,
                Token::Identifier("id".to_string()),
                Token::Neq,
                Token::Placeholder(2),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let mut lexer = Lexer::new("a mod b or not c");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!(tokens[1], Token::Mod);
        assert_eq!(tokens[3], Token::Or);
        assert_eq!(tokens[4], Token::Not);
    }

    #[test]
    fn test_string_and_float_literals() {
        let mut lexer = Lexer::new("'it''s' 2.5 1e3");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!(tokens[0], Token::StringLiteral("it's".to_string()));
        assert_eq!(tokens[1], Token::FloatLiteral(2.5));
        assert_eq!(tokens[2], Token::FloatLiteral(1000.0));
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(
            Lexer::new("'open").tokenize(),
            Err(Error::UnterminatedString(0))
        ));
        assert!(matches!(
            Lexer::new("a # b").tokenize(),
            Err(Error::UnexpectedCharacter('#', 2))
        ));
        assert!(Lexer::new("?0").tokenize().is_err());
    }
}
