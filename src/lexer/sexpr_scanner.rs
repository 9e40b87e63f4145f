use super::token::{Token, TokenKind};
use crate::error::{Error, Result};

/// Scanner for S-expression script syntax
pub struct SExprScanner {
    /// Source code as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start position of current token
    start: usize,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Column where the current token starts
    start_column: usize,
}

impl SExprScanner {
    /// Creates a new S-expression scanner from source code
    pub fn new(source: &str) -> Self {
        SExprScanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_column: 1,
        }
    }

    /// Scans all tokens from source code and returns them as a vector
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
            }

            // Comments run to end of line
            ';' => self.skip_line_comment(),

            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '.' => self.add_token(TokenKind::Dot),

            '+' => self.add_token(TokenKind::Plus),
            '-' => {
                if self.peek().is_ascii_digit() {
                    self.scan_number()?;
                } else {
                    self.add_token(TokenKind::Minus);
                }
            }
            '*' => self.add_token(TokenKind::Star),
            '/' => self.add_token(TokenKind::Slash),
            '%' => self.add_token(TokenKind::Percent),

            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Eq);
                } else {
                    self.add_token(TokenKind::Assign);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq);
                } else {
                    return Err(self.error("Unexpected character '!'; did you mean '!='?"));
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LtEq);
                } else {
                    self.add_token(TokenKind::Lt);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GtEq);
                } else {
                    self.add_token(TokenKind::Gt);
                }
            }

            '"' => self.scan_string()?,

            c if c.is_ascii_digit() => self.scan_number()?,

            c if c.is_alphabetic() || c == '_' || c == '?' || c == '&' => {
                self.scan_identifier();
            }

            _ => {
                return Err(self.error(format!("Unexpected character '{}'", c)));
            }
        }

        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self) -> Result<()> {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
                let escaped = self.advance();
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    _ => {
                        return Err(self.error(format!("Invalid escape sequence \\{}", escaped)));
                    }
                }
            } else {
                let c = self.advance();
                if c == '\n' {
                    self.line += 1;
                    self.column = 1;
                }
                value.push(c);
            }
        }

        if self.is_at_end() {
            return Err(self.error("Unterminated string"));
        }

        self.advance(); // Closing "

        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn scan_number(&mut self) -> Result<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance(); // consume .
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("Invalid float: {}", text)))?;
            self.add_token(TokenKind::Float(value));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(format!("Integer literal out of range: {}", text)))?;
            self.add_token(TokenKind::Integer(value));
        }

        Ok(())
    }

    fn scan_identifier(&mut self) {
        while self.peek().is_alphanumeric()
            || self.peek() == '_'
            || self.peek() == '-'
            || self.peek() == '?'
            || self.peek() == '!'
        {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        let token_kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" | "null" => TokenKind::Null,
            _ => TokenKind::Identifier(text),
        };

        self.add_token(token_kind);
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::LexicalError {
            line: self.line,
            col: self.start_column,
            message: message.into(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens
            .push(Token::new(kind, lexeme, self.line, self.start_column));
    }
}
