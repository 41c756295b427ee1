//! Expression parsing.
//!
//! Precedence, lowest to highest: assignment (right-associative),
//! channel send `<-` (left-associative), null-coalescing `?:`, `or`,
//! `and`, equality, relational, `|`, `^`, `&`, shifts, additive,
//! multiplicative, unary prefix, postfix chain.

use tocin_lex::TokenKind;
use tocin_util::diagnostic::codes;
use tocin_util::CompileResult;

use crate::ast::{BinaryOp, Expr, ExprKind, InterpPart, Param, TypeExpr, TypeExprKind, UnaryOp};
use crate::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expr(&mut self) -> CompileResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> CompileResult<Expr> {
        let lhs = self.parse_chan_send()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => None,
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Sub),
            TokenKind::StarEq => Some(BinaryOp::Mul),
            TokenKind::SlashEq => Some(BinaryOp::Div),
            TokenKind::PercentEq => Some(BinaryOp::Rem),
            _ => return Ok(lhs),
        };
        self.advance();
        if !is_assign_target(&lhs) {
            self.handler.error(
                codes::P004_INVALID_ASSIGNMENT_TARGET,
                "assignment target must be a variable, field access, or index",
                lhs.span,
            );
        }
        // Right-associative.
        let value = self.parse_assignment()?;
        let span = lhs.span.to(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(lhs),
                op,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_chan_send(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_null_coalesce()?;
        while self.eat(TokenKind::LArrow).is_some() {
            let rhs = self.parse_null_coalesce()?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr::new(
                ExprKind::ChanSend {
                    chan: Box::new(lhs),
                    value: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    /// The precedence level just below channel send; also the entry
    /// point for contexts where `<-` belongs to the surrounding grammar
    /// (select case guards).
    pub(crate) fn parse_expr_no_send(&mut self) -> CompileResult<Expr> {
        self.parse_null_coalesce()
    }

    fn parse_null_coalesce(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_or()?;
        while self.eat(TokenKind::QuestionColon).is_some() {
            let rhs = self.parse_or()?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr::new(
                ExprKind::NullCoalesce {
                    value: Box::new(lhs),
                    fallback: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_binary<F>(
        &mut self,
        mut next: F,
        table: &[(TokenKind, BinaryOp)],
    ) -> CompileResult<Expr>
    where
        F: FnMut(&mut Self) -> CompileResult<Expr>,
    {
        let mut lhs = next(self)?;
        'outer: loop {
            for &(kind, op) in table {
                if self.check(kind) {
                    self.advance();
                    let rhs = next(self)?;
                    let span = lhs.span.to(rhs.span);
                    lhs = Expr::new(
                        ExprKind::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        span,
                    );
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_and, &[(TokenKind::Or, BinaryOp::Or)])
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_equality, &[(TokenKind::And, BinaryOp::And)])
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_relational,
            &[
                (TokenKind::EqEq, BinaryOp::Eq),
                (TokenKind::NotEq, BinaryOp::Ne),
            ],
        )
    }

    fn parse_relational(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_bitor,
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Ge, BinaryOp::Ge),
            ],
        )
    }

    fn parse_bitor(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_bitxor, &[(TokenKind::Pipe, BinaryOp::BitOr)])
    }

    fn parse_bitxor(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_bitand, &[(TokenKind::Caret, BinaryOp::BitXor)])
    }

    fn parse_bitand(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_shift, &[(TokenKind::Amp, BinaryOp::BitAnd)])
    }

    fn parse_shift(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_additive,
            &[
                (TokenKind::Shl, BinaryOp::Shl),
                (TokenKind::Shr, BinaryOp::Shr),
            ],
        )
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_multiplicative,
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
        )
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_unary,
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
        )
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        let prefix = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang | TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = prefix {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        match self.peek_kind() {
            TokenKind::Move => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(ExprKind::Move(Box::new(operand)), span))
            }
            TokenKind::LArrow => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(ExprKind::ChanRecv(Box::new(operand)), span))
            }
            TokenKind::Await => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(ExprKind::Await(Box::new(operand)), span))
            }
            TokenKind::Delete => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(ExprKind::Delete(Box::new(operand)), span))
            }
            TokenKind::New => self.parse_new(),
            _ => self.parse_postfix(),
        }
    }

    fn parse_new(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        self.advance(); // new
        let name_tok = self.expect(TokenKind::Ident, "class name after `new`")?;
        let mut args_ty = Vec::new();
        if self.check(TokenKind::Lt) {
            self.advance();
            loop {
                args_ty.push(self.parse_type()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect_closing_angle()?;
        }
        let class = TypeExpr::new(
            TypeExprKind::Named {
                name: name_tok.text,
                args: args_ty,
            },
            name_tok.span,
        );
        self.expect(TokenKind::LParen, "`(` after class name")?;
        let args = self.parse_call_args()?;
        let span = start.to(self.prev_span());
        Ok(Expr::new(ExprKind::New { class, args }, span))
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    let span = expr.span.to(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            generic_args: Vec::new(),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Lt if self.looks_like_generic_call() => {
                    self.advance();
                    let mut generic_args = Vec::new();
                    loop {
                        generic_args.push(self.parse_type()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    self.expect_closing_angle()?;
                    self.expect(TokenKind::LParen, "`(` after generic arguments")?;
                    let args = self.parse_call_args()?;
                    let span = expr.span.to(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            generic_args,
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    let span = expr.span.to(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect(TokenKind::Ident, "field or method name")?;
                    let span = expr.span.to(name.span);
                    expr = Expr::new(
                        ExprKind::Field {
                            object: Box::new(expr),
                            name: name.text,
                        },
                        span,
                    );
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    let name = self.expect(TokenKind::Ident, "field or method name after `?.`")?;
                    let span = expr.span.to(name.span);
                    expr = Expr::new(
                        ExprKind::SafeField {
                            object: Box::new(expr),
                            name: name.text,
                        },
                        span,
                    );
                }
                TokenKind::BangBang => {
                    let tok = self.advance();
                    let span = expr.span.to(tok.span);
                    expr = Expr::new(ExprKind::NullAssert(Box::new(expr)), span);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> CompileResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Int => {
                self.advance();
                let value = tok.text.as_str().parse::<i64>().unwrap_or_else(|_| {
                    self.handler.error(
                        codes::P002_UNEXPECTED_TOKEN,
                        "integer literal out of range",
                        tok.span,
                    );
                    0
                });
                Ok(Expr::new(ExprKind::Int(value), tok.span))
            }
            TokenKind::Float => {
                self.advance();
                let value = tok.text.as_str().parse::<f64>().unwrap_or(0.0);
                Ok(Expr::new(ExprKind::Float(value), tok.span))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(tok.text), tok.span))
            }
            TokenKind::CharLit => {
                self.advance();
                let c = tok.text.as_str().chars().next().unwrap_or('\0');
                Ok(Expr::new(ExprKind::Char(c), tok.span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), tok.span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), tok.span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::new(ExprKind::Nil, tok.span))
            }
            TokenKind::FStringStart => self.parse_interpolation(),
            TokenKind::Ident => self.parse_name_expr(),
            TokenKind::Lambda => self.parse_lambda(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                let span = tok.span.to(self.prev_span());
                Ok(Expr::new(ExprKind::Group(Box::new(inner)), span))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "`]`")?;
                let span = tok.span.to(self.prev_span());
                Ok(Expr::new(ExprKind::List(elems), span))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(TokenKind::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect(TokenKind::Colon, "`:` between key and value")?;
                        let value = self.parse_expr()?;
                        entries.push((key, value));
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace, "`}`")?;
                let span = tok.span.to(self.prev_span());
                Ok(Expr::new(ExprKind::Dict(entries), span))
            }
            _ => Err(self.report_unexpected("expected an expression")),
        }
    }

    /// Identifier-led primaries: plain variables, `module::name`, and
    /// the Option/Result constructors.
    fn parse_name_expr(&mut self) -> CompileResult<Expr> {
        let tok = self.advance();
        let name = tok.text;
        match name.as_str() {
            "Some" | "Ok" | "Err" if self.check(TokenKind::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                let span = tok.span.to(self.prev_span());
                let kind = match name.as_str() {
                    "Some" => ExprKind::OptionSome(Box::new(inner)),
                    "Ok" => ExprKind::ResultOk(Box::new(inner)),
                    _ => ExprKind::ResultErr(Box::new(inner)),
                };
                return Ok(Expr::new(kind, span));
            }
            "None" => return Ok(Expr::new(ExprKind::OptionNone, tok.span)),
            _ => {}
        }
        if self.eat(TokenKind::ColonColon).is_some() {
            let member = self.expect(TokenKind::Ident, "name after `::`")?;
            let span = tok.span.to(member.span);
            return Ok(Expr::new(
                ExprKind::Qualified {
                    module: name,
                    name: member.text,
                },
                span,
            ));
        }
        Ok(Expr::new(ExprKind::Var(name), tok.span))
    }

    /// `lambda (x: int, y: int) -> int: x + y`
    fn parse_lambda(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        self.advance(); // lambda
        self.expect(TokenKind::LParen, "`(` after `lambda`")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let is_move = self.eat(TokenKind::Move).is_some();
                let name = self.expect(TokenKind::Ident, "parameter name")?;
                self.expect(TokenKind::Colon, "`:` before parameter type")?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name: name.text,
                    ty,
                    is_move,
                    span: name.span,
                });
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        let ret = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon, "`:` before lambda body")?;
        let body = self.parse_expr()?;
        let span = start.to(body.span);
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                ret,
                body: Box::new(body),
            },
            span,
        ))
    }

    /// Reassemble the lexer's pre-split f-string pieces into an
    /// interpolation node.
    fn parse_interpolation(&mut self) -> CompileResult<Expr> {
        let start_tok = self.advance();
        let mut parts = Vec::new();
        if !start_tok.text.is_empty() {
            parts.push(InterpPart::Text(start_tok.text));
        }
        loop {
            let expr = self.parse_expr()?;
            parts.push(InterpPart::Expr(expr));
            match self.peek_kind() {
                TokenKind::FStringMid => {
                    let tok = self.advance();
                    if !tok.text.is_empty() {
                        parts.push(InterpPart::Text(tok.text));
                    }
                }
                TokenKind::FStringEnd => {
                    let tok = self.advance();
                    if !tok.text.is_empty() {
                        parts.push(InterpPart::Text(tok.text));
                    }
                    let span = start_tok.span.to(tok.span);
                    return Ok(Expr::new(ExprKind::Interp(parts), span));
                }
                _ => {
                    return Err(self.report_unexpected("expected rest of interpolated string"));
                }
            }
        }
    }
}

/// Only variables, field accesses, and index expressions may be
/// assigned to.
fn is_assign_target(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Var(_)
            | ExprKind::Qualified { .. }
            | ExprKind::Field { .. }
            | ExprKind::Index { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;
    use crate::ast::StmtKind;
    use tocin_util::Handler;

    fn expr_of(source: &str) -> Expr {
        let handler = Handler::new();
        let module = parse_source(source, "test", &handler);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        match module.body.into_iter().next().unwrap().kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_chan_send_precedence() {
        // `ch <- a or b` sends the whole disjunction.
        let e = expr_of("ch <- a or b\n");
        let ExprKind::ChanSend { value, .. } = e.kind else {
            panic!("expected send");
        };
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_prefix_recv() {
        let e = expr_of("<-ch\n");
        assert!(matches!(e.kind, ExprKind::ChanRecv(_)));
    }

    #[test]
    fn test_postfix_chain() {
        let e = expr_of("a.b[0].c(1)\n");
        let ExprKind::Call { callee, args, .. } = e.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(callee.kind, ExprKind::Field { .. }));
    }

    #[test]
    fn test_generic_call_vs_relational() {
        // Generic call: `id<int>(1)`.
        let e = expr_of("id<int>(1)\n");
        let ExprKind::Call { generic_args, .. } = e.kind else {
            panic!("expected call, got {:?}", e.kind);
        };
        assert_eq!(generic_args.len(), 1);

        // Relational chain stays relational.
        let e = expr_of("a < b\n");
        assert!(matches!(
            e.kind,
            ExprKind::Binary {
                op: BinaryOp::Lt,
                ..
            }
        ));
    }

    #[test]
    fn test_null_operators() {
        let e = expr_of("a?.b ?: c\n");
        let ExprKind::NullCoalesce { value, .. } = e.kind else {
            panic!("expected coalesce");
        };
        assert!(matches!(value.kind, ExprKind::SafeField { .. }));

        let e = expr_of("x!!\n");
        assert!(matches!(e.kind, ExprKind::NullAssert(_)));
    }

    #[test]
    fn test_option_result_constructors() {
        assert!(matches!(expr_of("Some(1)\n").kind, ExprKind::OptionSome(_)));
        assert!(matches!(expr_of("None\n").kind, ExprKind::OptionNone));
        assert!(matches!(expr_of("Ok(1)\n").kind, ExprKind::ResultOk(_)));
        assert!(matches!(expr_of("Err(1)\n").kind, ExprKind::ResultErr(_)));
    }

    #[test]
    fn test_interpolation_parts() {
        let e = expr_of("f\"x = {x}!\"\n");
        let ExprKind::Interp(parts) = e.kind else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[0], InterpPart::Text(_)));
        assert!(matches!(parts[1], InterpPart::Expr(_)));
        assert!(matches!(parts[2], InterpPart::Text(_)));
    }

    #[test]
    fn test_lambda() {
        let e = expr_of("lambda (x: int) -> int: x + 1\n");
        let ExprKind::Lambda { params, ret, .. } = e.kind else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 1);
        assert!(ret.is_some());
    }

    #[test]
    fn test_new_and_delete() {
        assert!(matches!(expr_of("new Point(1, 2)\n").kind, ExprKind::New { .. }));
        assert!(matches!(expr_of("delete p\n").kind, ExprKind::Delete(_)));
    }

    #[test]
    fn test_dict_and_list_literals() {
        assert!(matches!(expr_of("[1, 2, 3]\n").kind, ExprKind::List(_)));
        let ExprKind::Dict(entries) = expr_of("{\"a\": 1, \"b\": 2}\n").kind else {
            panic!("expected dict");
        };
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_compound_assignment() {
        let e = expr_of("x += 1\n");
        let ExprKind::Assign { op, .. } = e.kind else {
            panic!("expected assignment");
        };
        assert_eq!(op, Some(BinaryOp::Add));
    }
}
