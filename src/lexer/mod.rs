pub mod token;

use log::debug;

use token::{Token, TokenKind};

/// Scans `source` into the flat token stream consumed by the parser.
///
/// Scanning never fails: anything unrecognised becomes a `TokenKind::Error`
/// token carrying the offending text, and the stream always ends with `Eof`.
/// String literal lexemes hold the decoded contents without the quotes.
pub fn lex(source: &str) -> Vec<Token> {
    let tokens = Lexer::new(source).lex();
    debug!("scanned {} tokens", tokens.len());
    tokens
}

struct Lexer {
    chars: Vec<char>,
    current: usize,
    start: usize,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start_token();
            self.scan_token();
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        self.tokens
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            ':' => self.add_token(TokenKind::Colon),
            ';' => self.add_token(TokenKind::Semicolon),
            '+' => self.with_equal(TokenKind::PlusEqual, TokenKind::Plus),
            '-' => self.with_equal(TokenKind::MinusEqual, TokenKind::Minus),
            '*' => self.with_equal(TokenKind::StarEqual, TokenKind::Star),
            '!' => self.with_equal(TokenKind::BangEqual, TokenKind::Bang),
            '=' => self.with_equal(TokenKind::EqualEqual, TokenKind::Equal),
            '<' => self.with_equal(TokenKind::LessEqual, TokenKind::Less),
            '>' => self.with_equal(TokenKind::GreaterEqual, TokenKind::Greater),
            '&' => {
                if self.matches('&') {
                    self.add_token(TokenKind::AndAnd);
                } else {
                    self.add_token(TokenKind::Error);
                }
            }
            '|' => {
                if self.matches('|') {
                    self.add_token(TokenKind::OrOr);
                } else {
                    self.add_token(TokenKind::Error);
                }
            }
            '/' => {
                if self.matches('/') {
                    self.skip_line_comment();
                } else {
                    self.with_equal(TokenKind::SlashEqual, TokenKind::Slash);
                }
            }
            '"' => self.string(),
            ' ' | '\r' | '\t' | '\n' => {}
            d if d.is_ascii_digit() => self.number(),
            a if is_ident_start(a) => self.identifier(),
            _ => self.add_token(TokenKind::Error),
        }
    }

    fn with_equal(&mut self, compound: TokenKind, single: TokenKind) {
        if self.matches('=') {
            self.add_token(compound);
        } else {
            self.add_token(single);
        }
    }

    fn string(&mut self) {
        let mut value = String::new();
        let mut closed = false;

        while !self.is_at_end() && self.peek() != '\n' {
            let c = self.advance();
            match c {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' => {
                    if self.is_at_end() {
                        break;
                    }
                    let escaped = self.advance();
                    match escaped {
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        '0' => value.push('\0'),
                        other => value.push(other),
                    }
                }
                _ => value.push(c),
            }
        }

        if !closed {
            self.add_token(TokenKind::Error);
            return;
        }

        self.tokens.push(Token::new(
            TokenKind::StringLiteral,
            value,
            self.token_line,
            self.token_column,
        ));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            self.add_token(TokenKind::FloatLiteral);
        } else {
            self.add_token(TokenKind::IntLiteral);
        }
    }

    fn identifier(&mut self) {
        while is_ident_continue(self.peek()) {
            self.advance();
        }

        let lexeme = self.current_lexeme();
        let kind = TokenKind::keyword(&lexeme).unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.current_lexeme();
        self.tokens
            .push(Token::new(kind, lexeme, self.token_line, self.token_column));
    }

    fn start_token(&mut self) {
        self.start = self.current;
        self.token_line = self.line;
        self.token_column = self.column;
    }

    fn current_lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }
        self.advance();
        true
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.chars.len() {
            '\0'
        } else {
            self.chars[self.current + 1]
        }
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}
