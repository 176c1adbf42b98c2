use super::Parser;
use crate::ast::{AssignOp, BinaryOp, Expression, Span, UnaryOp};
use crate::error::ExprError;
use crate::lexer::{unescape, Keyword, Punct, Token, TokenKind};

enum Infix {
    Binary(BinaryOp),
    Range,
}

fn infix_op(p: Punct) -> Option<Infix> {
    let op = match p {
        Punct::DotDot => return Some(Infix::Range),
        Punct::Plus => BinaryOp::Add,
        Punct::Minus => BinaryOp::Sub,
        Punct::Star => BinaryOp::Mul,
        Punct::Slash => BinaryOp::Div,
        Punct::Percent => BinaryOp::Rem,
        Punct::EqEq => BinaryOp::Eq,
        Punct::NotEq => BinaryOp::Ne,
        Punct::Gt => BinaryOp::Gt,
        Punct::Lt => BinaryOp::Lt,
        Punct::Ge => BinaryOp::Ge,
        Punct::Le => BinaryOp::Le,
        Punct::AndAnd => BinaryOp::And,
        Punct::OrOr => BinaryOp::Or,
        Punct::Amp => BinaryOp::BitAnd,
        Punct::Pipe => BinaryOp::BitOr,
        Punct::Caret => BinaryOp::BitXor,
        _ => return None,
    };
    Some(Infix::Binary(op))
}

fn unary_op(p: Punct) -> Option<UnaryOp> {
    match p {
        Punct::Star => Some(UnaryOp::Deref),
        Punct::Amp => Some(UnaryOp::AddressOf),
        Punct::Bang => Some(UnaryOp::Not),
        Punct::Minus => Some(UnaryOp::Negate),
        Punct::Tilde => Some(UnaryOp::BitNot),
        _ => None,
    }
}

fn assign_op(p: Punct) -> Option<AssignOp> {
    match p {
        Punct::Assign => Some(AssignOp::Assign),
        Punct::PlusAssign => Some(AssignOp::AddAssign),
        Punct::MinusAssign => Some(AssignOp::SubAssign),
        _ => None,
    }
}

/// A structural keyword opening a line ends any expression in progress.
fn is_boundary_word(t: &Token) -> bool {
    t.line_start && t.keyword.is_some_and(Keyword::is_structural)
}

impl<'a> Parser<'a> {
    // -- Entry --------------------------------------------------

    /// Parse one value expression. Assignment binds loosest and groups to
    /// the right; every infix operator, `..` included, shares one level
    /// and groups to the left; prefix operators bind tighter; postfix
    /// calls, subscripts and field accesses bind tightest.
    pub(super) fn parse_expression(&mut self) -> Result<Expression, ExprError> {
        self.parse_assignment()
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    /// `open` is the span of the opening bracket.
    pub(super) fn parse_expression_list(
        &mut self,
        close: Punct,
        open: Span,
        allow_empty: bool,
    ) -> Result<Vec<Expression>, ExprError> {
        let mut items = Vec::new();
        if allow_empty && self.eat_punct(close).is_some() {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.eat_punct(Punct::Comma).is_some() {
                continue;
            }
            if self.eat_punct(close).is_some() {
                return Ok(items);
            }
            return Err(self.unmatched(open, close));
        }
    }

    // -- Helpers ------------------------------------------------

    fn cur_punct(&self) -> Option<Punct> {
        match self.cur().kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the token `n` ahead can begin an operand.
    fn operand_at(&self, n: usize) -> bool {
        let t = self.peek_at(n);
        match t.kind {
            TokenKind::Word => !is_boundary_word(t),
            TokenKind::Number | TokenKind::Str | TokenKind::Char => true,
            TokenKind::Punct(p) => p == Punct::LParen || unary_op(p).is_some(),
            _ => false,
        }
    }

    fn dangling(&self, op: &Token) -> ExprError {
        ExprError::new(
            op.span,
            format!(
                "dangling operator `{}`: expected an operand, found {}",
                op.text,
                self.cur().describe()
            ),
        )
    }

    fn unmatched(&self, open: Span, close: Punct) -> ExprError {
        ExprError::new(
            open,
            format!(
                "unmatched bracket: expected `{}`, found {}",
                close.as_str(),
                self.cur().describe()
            ),
        )
    }

    // -- Levels -------------------------------------------------

    fn parse_assignment(&mut self) -> Result<Expression, ExprError> {
        let target = self.parse_binary()?;
        let Some(op) = self.cur_punct().and_then(assign_op) else {
            return Ok(target);
        };
        let op_tok = self.bump();
        if !target.is_assignable() {
            return Err(ExprError::new(
                op_tok.span,
                format!("left side of `{}` is not assignable", op.symbol()),
            ));
        }
        if !self.operand_at(0) {
            return Err(self.dangling(op_tok));
        }
        let value = self.parse_assignment()?;
        let span = target.span().to(value.span());
        Ok(Expression::Assignment {
            op,
            target: Box::new(target),
            value: Box::new(value),
            span,
        })
    }

    fn parse_binary(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.parse_unary()?;
        while let Some(infix) = self.cur_punct().and_then(infix_op) {
            // `%` with no operand after it on its line is a percent suffix
            // (DELTA = 5 %).
            if matches!(infix, Infix::Binary(BinaryOp::Rem))
                && (!self.operand_at(1) || self.peek_at(1).line_start)
            {
                break;
            }
            let op_tok = self.bump();
            if !self.operand_at(0) {
                return Err(self.dangling(op_tok));
            }
            let right = self.parse_unary()?;
            let span = left.span().to(right.span());
            left = match infix {
                Infix::Range => Expression::Range {
                    start: Box::new(left),
                    end: Box::new(right),
                    span,
                },
                Infix::Binary(op) => Expression::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ExprError> {
        self.descend(self.cur().span)?;
        let result = self.parse_prefixed();
        self.ascend();
        result
    }

    fn parse_prefixed(&mut self) -> Result<Expression, ExprError> {
        let Some(op) = self.cur_punct().and_then(unary_op) else {
            return self.parse_postfix();
        };
        let op_tok = self.bump();
        if !self.operand_at(0) {
            return Err(self.dangling(op_tok));
        }
        let operand = self.parse_unary()?;
        let span = op_tok.span.to(operand.span());
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.cur_punct() {
                Some(Punct::LParen) => {
                    let open = self.bump().span;
                    let arguments = self.parse_expression_list(Punct::RParen, open, true)?;
                    let span = self.span_from(expr.span());
                    expr = Expression::Call {
                        function: Box::new(expr),
                        arguments,
                        span,
                    };
                }
                Some(Punct::LBracket) => {
                    let open = self.bump().span;
                    let index = self.parse_expression()?;
                    if self.eat_punct(Punct::RBracket).is_none() {
                        return Err(self.unmatched(open, Punct::RBracket));
                    }
                    let span = self.span_from(expr.span());
                    expr = Expression::Subscript {
                        argument: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                Some(p @ (Punct::Dot | Punct::Arrow)) => {
                    let op_tok = self.bump();
                    let field = self.cur();
                    if field.kind != TokenKind::Word {
                        return Err(ExprError::new(
                            op_tok.span,
                            format!(
                                "expected a field name after `{}`, found {}",
                                op_tok.text,
                                field.describe()
                            ),
                        ));
                    }
                    self.advance();
                    let span = expr.span().to(field.span);
                    expr = Expression::FieldAccess {
                        argument: Box::new(expr),
                        field: field.text.clone(),
                        arrow: p == Punct::Arrow,
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ExprError> {
        let tok = self.cur();
        match tok.kind {
            TokenKind::Word if !is_boundary_word(tok) => {
                self.advance();
                Ok(Expression::Identifier {
                    name: tok.text.clone(),
                    span: tok.span,
                })
            }
            TokenKind::Number => {
                self.advance();
                Ok(Expression::Number {
                    text: tok.text.clone(),
                    span: tok.span,
                })
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expression::String {
                    raw: tok.text.clone(),
                    value: unescape(&tok.text),
                    span: tok.span,
                })
            }
            TokenKind::Char => {
                self.advance();
                Ok(Expression::CharLiteral {
                    raw: tok.text.clone(),
                    span: tok.span,
                })
            }
            TokenKind::Punct(Punct::LParen) => {
                let open = self.bump().span;
                let inner = self.parse_expression()?;
                if self.eat_punct(Punct::RParen).is_none() {
                    return Err(self.unmatched(open, Punct::RParen));
                }
                Ok(Expression::Parenthesized {
                    inner: Box::new(inner),
                    span: self.span_from(open),
                })
            }
            _ => Err(ExprError::new(
                self.error_span(),
                format!("expected an expression, found {}", tok.describe()),
            )),
        }
    }
}
