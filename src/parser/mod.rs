pub mod ast;
mod expr;

use log::{debug, trace};
use thiserror::Error;

use crate::errors::{Diagnostics, Stage};
use crate::lexer::token::{Token, TokenKind};
use crate::semantic::types::{BaseType, Type};
use ast::{Block, Expr, ExprId, ExprKind, FunctionDecl, Location, Param, Program, Stmt};

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

/// Parses a token stream into a program, reporting problems to `diagnostics`.
pub fn parse(tokens: Vec<Token>, diagnostics: &mut Diagnostics) -> Program {
    Parser::new(tokens).parse_program(diagnostics)
}

pub struct Parser {
    tokens: Vec<Token>,
    rejected: Vec<Token>,
    current: usize,
    next_id: u32,
    depth: usize,
    max_depth: usize,
    errors: Vec<ParseError>,
    abandoned: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let (rejected, mut tokens): (Vec<Token>, Vec<Token>) = tokens
            .into_iter()
            .partition(|token| token.kind == TokenKind::Error);

        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column + t.lexeme.chars().count()))
                .unwrap_or((1, 1));
            tokens.retain(|t| t.kind != TokenKind::Eof);
            tokens.push(Token::new(TokenKind::Eof, String::new(), line, column));
        }

        Self {
            tokens,
            rejected,
            current: 0,
            next_id: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            errors: Vec::new(),
            abandoned: false,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Always returns a program; anything that could not be parsed is
    /// reported and skipped.
    pub fn parse_program(&mut self, diagnostics: &mut Diagnostics) -> Program {
        for token in std::mem::take(&mut self.rejected) {
            let message = if token.lexeme.starts_with('"') {
                "unterminated string literal".to_string()
            } else {
                format!("unexpected character '{}'", token.lexeme)
            };
            diagnostics.report(Stage::Lexical, token.line, token.column, message);
        }

        let mut functions = Vec::new();
        while !self.is_at_end() {
            let start = self.current;
            if self.matches_symbol(TokenKind::Fn) {
                match self.function() {
                    Ok(function) => {
                        trace!("parsed function '{}'", function.name);
                        functions.push(function);
                    }
                    Err(err) => {
                        self.record(err);
                        self.synchronize();
                    }
                }
            } else {
                let err = ParseError::new(
                    format!("expected 'fn', found {}", describe(self.peek())),
                    self.peek(),
                );
                self.record(err);
                self.synchronize();
            }

            if self.current == start {
                self.advance();
            }
        }

        debug!(
            "parsed {} functions with {} syntax errors",
            functions.len(),
            self.errors.len()
        );
        for err in self.errors.drain(..) {
            diagnostics.report(Stage::Syntax, err.line, err.column, err.message);
        }

        Program { functions }
    }

    fn function(&mut self) -> Result<FunctionDecl, ParseError> {
        let loc = location(self.previous());
        let return_type = self.parse_type("expected return type after 'fn'")?;
        let name = self.consume_identifier("expected function name")?;
        self.consume_symbol(TokenKind::LeftParen, "expected '(' after function name")?;

        let mut params = Vec::new();
        if !self.check_kind(TokenKind::RightParen) {
            loop {
                let loc = location(self.peek());
                let name = self.consume_identifier("expected parameter name")?;
                self.consume_symbol(TokenKind::Colon, "expected ':' after parameter name")?;
                let ty = self.parse_type("expected parameter type")?;
                params.push(Param { name, ty, loc });

                if !self.matches_symbol(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume_symbol(TokenKind::RightParen, "expected ')' after parameter list")?;
        self.consume_symbol(TokenKind::LeftBrace, "expected '{' before function body")?;
        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            return_type,
            params,
            body,
            loc,
        })
    }

    // The opening brace has already been consumed.
    fn block(&mut self) -> Result<Block, ParseError> {
        let loc = location(self.previous());
        let mut statements = Vec::new();

        loop {
            if self.matches_symbol(TokenKind::RightBrace) {
                break;
            }
            if self.is_at_end() || self.check_kind(TokenKind::Fn) {
                let err = ParseError::new(
                    format!("expected '}}' to close block, found {}", describe(self.peek())),
                    self.peek(),
                );
                self.record(err);
                break;
            }

            let start = self.current;
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.record(err);
                    self.synchronize();
                }
            }

            if self.current == start
                && !self.check_kind(TokenKind::RightBrace)
                && !self.check_kind(TokenKind::Fn)
            {
                self.advance();
            }
        }

        Ok(Block { statements, loc })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        self.nested(|parser| {
            if parser.matches_symbol(TokenKind::Var) {
                return parser.var_declaration();
            }
            if parser.matches_symbol(TokenKind::If) {
                return parser.if_statement();
            }
            if parser.matches_symbol(TokenKind::While) {
                return parser.while_statement();
            }
            if parser.matches_symbol(TokenKind::Return) {
                return parser.return_statement();
            }
            if parser.matches_symbol(TokenKind::LeftBrace) {
                return Ok(Stmt::Block(parser.block()?));
            }

            let expr = parser.expression()?;
            parser.consume_symbol(TokenKind::Semicolon, "expected ';' after expression")?;
            Ok(Stmt::Expr(expr))
        })
    }

    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let loc = location(self.previous());
        let name = self.consume_identifier("expected variable name after 'var'")?;
        self.consume_symbol(TokenKind::Colon, "expected ':' after variable name")?;
        let ty = self.parse_type("expected type after ':'")?;

        let initializer = if self.matches_symbol(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume_symbol(
            TokenKind::Semicolon,
            "expected ';' after variable declaration",
        )?;

        Ok(Stmt::VarDecl {
            name,
            ty,
            initializer,
            loc,
        })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = location(self.previous());
        let condition = self.expression()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches_symbol(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            loc,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = location(self.previous());
        let condition = self.expression()?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While {
            condition,
            body,
            loc,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = location(self.previous());
        let value = if self.check_kind(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume_symbol(TokenKind::Semicolon, "expected ';' after return")?;
        Ok(Stmt::Return { value, loc })
    }

    /// `int`, `float[3]` or `str[]`.
    pub(crate) fn parse_type(&mut self, message: &str) -> Result<Type, ParseError> {
        let base = self.consume_base_type(message)?;
        if !self.matches_symbol(TokenKind::LeftBracket) {
            return Ok(Type::scalar(base));
        }

        if self.check_kind(TokenKind::IntLiteral) {
            let token = self.advance().clone();
            let len = token
                .lexeme
                .parse::<usize>()
                .map_err(|_| ParseError::new("array size out of range", &token))?;
            self.consume_symbol(TokenKind::RightBracket, "expected ']' after array size")?;
            Ok(Type::fixed(base, len))
        } else {
            self.consume_symbol(TokenKind::RightBracket, "expected ']' in array type")?;
            Ok(Type::dynamic(base))
        }
    }

    pub(crate) fn consume_base_type(&mut self, message: &str) -> Result<BaseType, ParseError> {
        let base = match self.peek().kind {
            TokenKind::IntType => BaseType::Int,
            TokenKind::FloatType => BaseType::Float,
            TokenKind::BoolType => BaseType::Bool,
            TokenKind::StrType => BaseType::Str,
            TokenKind::VoidType => BaseType::Void,
            _ => {
                return Err(ParseError::new(
                    format!("{}, found {}", message, describe(self.peek())),
                    self.peek(),
                ))
            }
        };
        self.advance();
        Ok(base)
    }

    /// Discards tokens up to the next statement boundary. A `;` is consumed;
    /// `}` and statement keywords are left for the caller.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.matches_symbol(TokenKind::Semicolon) {
                return;
            }
            match self.peek().kind {
                TokenKind::RightBrace
                | TokenKind::Fn
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.too_deep());
        }

        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Loops that fold operators build trees without recursing, so the
    /// tree they return is measured against the limit instead.
    pub(crate) fn check_height(&mut self, expr: &Expr) -> Result<(), ParseError> {
        if self.depth + expr.height > self.max_depth {
            return Err(self.too_deep());
        }
        Ok(())
    }

    /// Reports the depth limit once and abandons the rest of the input.
    fn too_deep(&mut self) -> ParseError {
        let err = ParseError::new(
            format!("nesting exceeds the maximum depth of {}", self.max_depth),
            self.peek(),
        );
        self.record(err.clone());
        self.abandoned = true;
        self.current = self.tokens.len() - 1;
        err
    }

    fn record(&mut self, err: ParseError) {
        if self.abandoned {
            return;
        }
        let repeated = self
            .errors
            .last()
            .map(|last| last.line == err.line && last.column == err.column)
            .unwrap_or(false);
        if !repeated {
            self.errors.push(err);
        }
    }

    pub(crate) fn make_expr(&mut self, kind: ExprKind, loc: Location) -> Expr {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        let height = kind.child_height() + 1;
        Expr {
            id,
            kind,
            loc,
            height,
        }
    }

    pub(crate) fn matches_symbol(&mut self, kind: TokenKind) -> bool {
        if self.check_kind(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume_symbol(&mut self, kind: TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check_kind(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(
                format!("{}, found {}", message, describe(self.peek())),
                self.peek(),
            ))
        }
    }

    pub(crate) fn consume_identifier(&mut self, message: &str) -> Result<String, ParseError> {
        if self.check_kind(TokenKind::Identifier) {
            Ok(self.advance().lexeme.clone())
        } else {
            Err(ParseError::new(
                format!("{}, found {}", message, describe(self.peek())),
                self.peek(),
            ))
        }
    }

    pub(crate) fn check_kind(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(crate) fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
}

pub(crate) fn location(token: &Token) -> Location {
    Location::new(token.line, token.column)
}

pub(crate) fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::StringLiteral => format!("\"{}\"", token.lexeme),
        _ => format!("'{}'", token.lexeme),
    }
}
