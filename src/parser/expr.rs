use crate::lexer::token::TokenKind;
use crate::semantic::types::Type;

use super::ast::{AssignOp, BinaryOp, Expr, ExprKind, Location, Number, UnaryOp};
use super::{describe, location, ParseError, Parser};

impl Parser {
    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(|parser| parser.assignment())
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.logic_or()?;

        let op = match self.peek().kind {
            TokenKind::Equal => AssignOp::Assign,
            TokenKind::PlusEqual => AssignOp::Add,
            TokenKind::MinusEqual => AssignOp::Subtract,
            TokenKind::StarEqual => AssignOp::Multiply,
            TokenKind::SlashEqual => AssignOp::Divide,
            _ => return Ok(expr),
        };
        let op_token = self.advance().clone();
        let value = self.expression()?;

        match expr.kind {
            ExprKind::Variable(_) | ExprKind::ArrayAccess { .. } => {
                let loc = location(&op_token);
                Ok(self.make_expr(
                    ExprKind::Assign {
                        target: Box::new(expr),
                        op,
                        value: Box::new(value),
                    },
                    loc,
                ))
            }
            _ => Err(ParseError::new("invalid assignment target", &op_token)),
        }
    }

    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        self.fold(Self::logic_and, |kind| match kind {
            TokenKind::OrOr => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        self.fold(Self::equality, |kind| match kind {
            TokenKind::AndAnd => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.fold(Self::comparison, |kind| match kind {
            TokenKind::EqualEqual => Some(BinaryOp::Equal),
            TokenKind::BangEqual => Some(BinaryOp::NotEqual),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.fold(Self::term, |kind| match kind {
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::LessEqual => Some(BinaryOp::LessEqual),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.fold(Self::factor, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Subtract),
            _ => None,
        })
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.fold(Self::unary, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Multiply),
            TokenKind::Slash => Some(BinaryOp::Divide),
            _ => None,
        })
    }

    /// Left-associative chain of `operand (op operand)*`.
    fn fold(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
        operator: fn(TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expr, ParseError> {
        let mut expr = operand(self)?;
        while let Some(op) = operator(self.peek().kind) {
            let loc = location(self.advance());
            let rhs = operand(self)?;
            expr = self.binary(expr, op, rhs, loc);
            self.check_height(&expr)?;
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.postfix(),
        };

        let loc = location(self.advance());
        let operand = self.nested(|parser| parser.unary())?;
        Ok(self.make_expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            loc,
        ))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.check_kind(TokenKind::LeftParen) {
                let paren = self.advance().clone();
                let ExprKind::Variable(callee) = &expr.kind else {
                    return Err(ParseError::new("only named functions can be called", &paren));
                };
                let callee = callee.clone();

                let mut args = Vec::new();
                if !self.check_kind(TokenKind::RightParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.matches_symbol(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume_symbol(TokenKind::RightParen, "expected ')' after arguments")?;
                let loc = expr.loc;
                expr = self.make_expr(ExprKind::Call { callee, args }, loc);
                continue;
            }

            if self.check_kind(TokenKind::LeftBracket) {
                let loc = location(self.advance());
                let index = self.expression()?;
                self.consume_symbol(TokenKind::RightBracket, "expected ']' after index")?;
                expr = self.make_expr(
                    ExprKind::ArrayAccess {
                        array: Box::new(expr),
                        index: Box::new(index),
                    },
                    loc,
                );
                self.check_height(&expr)?;
                continue;
            }

            break;
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let loc = location(&token);

        let kind = match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<i32>()
                    .map_err(|_| ParseError::new("integer literal out of range", &token))?;
                ExprKind::Number(Number::Int(value))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| ParseError::new("malformed float literal", &token))?;
                ExprKind::Number(Number::Float(value))
            }
            TokenKind::StringLiteral => {
                self.advance();
                ExprKind::String(token.lexeme)
            }
            TokenKind::BoolLiteral => {
                self.advance();
                ExprKind::Bool(token.lexeme == "true")
            }
            TokenKind::Identifier if token.lexeme == "new" && self.next_is_type_keyword() => {
                self.advance();
                let elem = self.consume_base_type("expected element type after 'new'")?;
                self.consume_symbol(TokenKind::LeftBracket, "expected '[' after element type")?;
                let size = self.expression()?;
                self.consume_symbol(TokenKind::RightBracket, "expected ']' after allocation size")?;
                ExprKind::ArrayAlloc {
                    elem: Type::scalar(elem),
                    size: Box::new(size),
                }
            }
            TokenKind::Identifier => {
                self.advance();
                ExprKind::Variable(token.lexeme)
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume_symbol(TokenKind::RightParen, "expected ')' after expression")?;
                return Ok(expr);
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check_kind(TokenKind::RightBrace) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.matches_symbol(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume_symbol(TokenKind::RightBrace, "expected '}' after array elements")?;
                ExprKind::ArrayLiteral(elements)
            }
            kind if kind.is_type_keyword() => {
                let ty = self.parse_type("expected type")?;
                ExprKind::TypeRef(ty)
            }
            _ => {
                return Err(ParseError::new(
                    format!("expected expression, found {}", describe(&token)),
                    &token,
                ))
            }
        };

        Ok(self.make_expr(kind, loc))
    }

    fn next_is_type_keyword(&self) -> bool {
        self.peek_next()
            .map(|token| token.kind.is_type_keyword())
            .unwrap_or(false)
    }

    fn binary(&mut self, lhs: Expr, op: BinaryOp, rhs: Expr, loc: Location) -> Expr {
        self.make_expr(
            ExprKind::Binary {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
            },
            loc,
        )
    }
}
