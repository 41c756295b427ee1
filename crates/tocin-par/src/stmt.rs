//! Statement parsing.
//!
//! Statement bodies are "suites": a colon followed either by NEWLINE,
//! INDENT, statements, DEDENT, or by simple statements on the same line
//! separated by semicolons (`if x: return 1; else: return 0`).

use tocin_lex::TokenKind;
use tocin_util::diagnostic::codes;
use tocin_util::{CompileResult, ErrorReported, Symbol};

use crate::ast::{ExprKind, MatchCase, PatternKind, SelectCase, SelectOp, Stmt, StmtKind};
use crate::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_statement(&mut self) -> CompileResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Let | TokenKind::Const => self.parse_let(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Go => self.parse_go(),
            TokenKind::Select => self.parse_select(),
            TokenKind::Def | TokenKind::Async | TokenKind::Pure => {
                let start = self.current_span();
                let func = self.parse_function()?;
                let span = start.to(self.prev_span());
                Ok(Stmt::new(StmtKind::Function(func), span))
            }
            TokenKind::Class => self.parse_class(),
            TokenKind::Trait => self.parse_trait(),
            TokenKind::Impl => self.parse_impl(),
            TokenKind::Import | TokenKind::From => self.parse_import(),
            TokenKind::Export => {
                let start = self.current_span();
                self.advance();
                let inner = self.parse_statement()?;
                let span = start.to(inner.span);
                Ok(Stmt::new(StmtKind::Export(Box::new(inner)), span))
            }
            TokenKind::Module => self.parse_module_decl(),
            _ => {
                let expr = self.parse_expr()?;
                let span = expr.span;
                Ok(Stmt::new(StmtKind::Expr(expr), span))
            }
        }
    }

    /// Parse a `:`-introduced suite, indented or inline.
    pub(crate) fn parse_suite(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon, "`:`")?;
        if self.eat(TokenKind::Newline).is_some() {
            self.expect(TokenKind::Indent, "an indented block")?;
            let mut stmts = Vec::new();
            self.skip_newlines();
            while !self.check(TokenKind::Dedent) && !self.at_end() {
                match self.parse_statement() {
                    Ok(stmt) => {
                        stmts.push(stmt);
                        if !self.statement_terminated() {
                            self.report_unexpected("expected end of statement");
                            self.synchronize();
                        }
                    }
                    Err(ErrorReported) => self.synchronize(),
                }
                self.skip_newlines();
            }
            self.expect(TokenKind::Dedent, "end of block")?;
            Ok(stmts)
        } else {
            // Inline suite: simple statements separated by `;`.
            let mut stmts = Vec::new();
            loop {
                stmts.push(self.parse_statement()?);
                if self.check(TokenKind::Semicolon) {
                    match self.nth_kind(1) {
                        TokenKind::Newline
                        | TokenKind::Eof
                        | TokenKind::Dedent
                        | TokenKind::Elif
                        | TokenKind::Else => {
                            self.advance();
                            break;
                        }
                        _ => {
                            self.advance();
                            continue;
                        }
                    }
                }
                break;
            }
            Ok(stmts)
        }
    }

    fn parse_let(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        let mutable = self.advance().kind == TokenKind::Let;
        let name = self.expect(TokenKind::Ident, "binding name")?;
        let ty = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Assign).is_some() {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if !mutable && init.is_none() {
            self.handler.error(
                codes::P005_CONST_WITHOUT_INIT,
                format!("constant `{}` must have an initializer", name.text),
                name.span,
            );
        }
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::Let {
                name: name.text,
                ty,
                init,
                mutable,
                resolved: None,
            },
            span,
        ))
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // if
        let cond = self.parse_expr()?;
        let then_body = self.parse_suite()?;
        let mut elifs = Vec::new();
        while self.check(TokenKind::Elif) {
            self.advance();
            let elif_cond = self.parse_expr()?;
            let elif_body = self.parse_suite()?;
            elifs.push((elif_cond, elif_body));
        }
        let else_body = if self.eat(TokenKind::Else).is_some() {
            Some(self.parse_suite()?)
        } else {
            None
        };
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_body,
                elifs,
                else_body,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_suite()?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(StmtKind::While { cond, body }, span))
    }

    fn parse_for(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let var = self.expect(TokenKind::Ident, "loop variable")?;
        self.expect(TokenKind::In, "`in`")?;
        let iterable = self.parse_expr()?;
        let body = self.parse_suite()?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::For {
                var: var.text,
                iterable,
                body,
            },
            span,
        ))
    }

    fn parse_return(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let value = if matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Dedent | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let span = start.to(self.prev_span());
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn parse_match(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // match
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "a newline")?;
        self.expect(TokenKind::Indent, "an indented block of cases")?;
        let mut cases = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Dedent) && !self.at_end() {
            let case_start = self.current_span();
            let pattern = if self.eat(TokenKind::Default).is_some() {
                crate::ast::Pattern {
                    kind: PatternKind::Wildcard,
                    span: case_start,
                }
            } else {
                self.expect(TokenKind::Case, "`case`")?;
                self.parse_pattern()?
            };
            let body = self.parse_suite()?;
            let span = case_start.to(self.prev_span());
            cases.push(MatchCase {
                pattern,
                body,
                span,
            });
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of match block")?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(StmtKind::Match { scrutinee, cases }, span))
    }

    fn parse_go(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        // The spawned expression must be a call; the analyzer checks
        // that (T010) once the callee is resolved.
        let call = self.parse_expr()?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(StmtKind::Go(call), span))
    }

    fn parse_select(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // select
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "a newline")?;
        self.expect(TokenKind::Indent, "an indented block of cases")?;
        let mut cases = Vec::new();
        let mut default = None;
        self.skip_newlines();
        while !self.check(TokenKind::Dedent) && !self.at_end() {
            if self.eat(TokenKind::Default).is_some() {
                let body = self.parse_suite()?;
                if default.is_some() {
                    self.handler.error(
                        codes::P002_UNEXPECTED_TOKEN,
                        "select may have at most one `default` case",
                        self.prev_span(),
                    );
                }
                default = Some(body);
                self.skip_newlines();
                continue;
            }
            let case_start = self.expect(TokenKind::Case, "`case` or `default`")?.span;
            let op = self.parse_select_op()?;
            let body = self.parse_suite()?;
            let span = case_start.to(self.prev_span());
            cases.push(SelectCase { op, body, span });
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of select block")?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(StmtKind::Select { cases, default }, span))
    }

    /// `<-ch`, `v = <-ch`, or `ch <- e` (the guard of one select case).
    /// Operands parse below the send level so the `<-` and `=` here
    /// belong to the case grammar, not the expression.
    fn parse_select_op(&mut self) -> CompileResult<SelectOp> {
        if self.eat(TokenKind::LArrow).is_some() {
            let chan = self.parse_expr_no_send()?;
            return Ok(SelectOp::Recv {
                chan,
                binding: None,
            });
        }
        let first = self.parse_expr_no_send()?;
        if self.eat(TokenKind::Assign).is_some() {
            let binding = match first.kind {
                ExprKind::Var(name) => Some(name),
                _ => {
                    self.handler.error(
                        codes::P004_INVALID_ASSIGNMENT_TARGET,
                        "receive binding must be a plain name",
                        first.span,
                    );
                    None
                }
            };
            self.expect(TokenKind::LArrow, "`<-`")?;
            let chan = self.parse_expr_no_send()?;
            return Ok(SelectOp::Recv { chan, binding });
        }
        if self.eat(TokenKind::LArrow).is_some() {
            let value = self.parse_expr_no_send()?;
            return Ok(SelectOp::Send { chan: first, value });
        }
        Err(self.report_unexpected("expected a channel send or receive"))
    }

    fn parse_module_decl(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // module
        let path = self.parse_dotted_path()?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(StmtKind::Module(path), span))
    }

    pub(crate) fn parse_dotted_path(&mut self) -> CompileResult<Vec<Symbol>> {
        let mut path = vec![self.expect(TokenKind::Ident, "module name")?.text];
        while self.eat(TokenKind::Dot).is_some() {
            path.push(self.expect(TokenKind::Ident, "module name")?.text);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;
    use tocin_util::Handler;

    fn stmts(source: &str) -> Vec<Stmt> {
        let handler = Handler::new();
        let module = parse_source(source, "test", &handler);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        module.body
    }

    #[test]
    fn test_if_elif_else() {
        let body = stmts("if a:\n    x\nelif b:\n    y\nelse:\n    z\n");
        let StmtKind::If { elifs, else_body, .. } = &body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(elifs.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_inline_suite_with_else() {
        let body = stmts("def g(x: int?) -> int: if x != null: return x!!; else: return 0\n");
        let StmtKind::Function(func) = &body[0].kind else {
            panic!("expected function");
        };
        let StmtKind::If { then_body, else_body, .. } = &func.body[0].kind else {
            panic!("expected if, got {:?}", func.body[0].kind);
        };
        assert_eq!(then_body.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_while_and_for() {
        let body = stmts("while a:\n    x\nfor i in xs:\n    y\n");
        assert!(matches!(body[0].kind, StmtKind::While { .. }));
        assert!(matches!(body[1].kind, StmtKind::For { .. }));
    }

    #[test]
    fn test_match_cases() {
        let body = stmts("match opt:\n    case Some(v):\n        v\n    case None:\n        0\n");
        let StmtKind::Match { cases, .. } = &body[0].kind else {
            panic!("expected match");
        };
        assert_eq!(cases.len(), 2);
        assert!(matches!(
            &cases[0].pattern.kind,
            PatternKind::Constructor { name, args } if name.as_str() == "Some" && args.len() == 1
        ));
    }

    #[test]
    fn test_go_statement() {
        let body = stmts("go worker(1)\n");
        let StmtKind::Go(expr) = &body[0].kind else {
            panic!("expected go");
        };
        assert!(matches!(expr.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn test_select_cases() {
        let source = "select:\n    case v = <-ch:\n        use(v)\n    case out <- 1:\n        sent()\n    default:\n        idle()\n";
        let body = stmts(source);
        let StmtKind::Select { cases, default } = &body[0].kind else {
            panic!("expected select");
        };
        assert_eq!(cases.len(), 2);
        assert!(default.is_some());
        assert!(matches!(
            &cases[0].op,
            SelectOp::Recv { binding: Some(b), .. } if b.as_str() == "v"
        ));
        assert!(matches!(&cases[1].op, SelectOp::Send { .. }));
    }

    #[test]
    fn test_module_and_import() {
        let body = stmts("module app.core\nimport util.strings as s\nfrom util.math import abs, ceil as c\n");
        assert!(matches!(&body[0].kind, StmtKind::Module(path) if path.len() == 2));
        let StmtKind::Import(import) = &body[1].kind else {
            panic!("expected import");
        };
        assert_eq!(import.alias.map(|s| s.as_str().to_string()), Some("s".into()));
        let StmtKind::Import(from_import) = &body[2].kind else {
            panic!("expected from-import");
        };
        let items = from_import.items.as_ref().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].1.map(|s| s.as_str().to_string()), Some("c".into()));
    }

    #[test]
    fn test_export_wraps_statement() {
        let body = stmts("export def f():\n    return 1\n");
        let StmtKind::Export(inner) = &body[0].kind else {
            panic!("expected export");
        };
        assert!(matches!(inner.kind, StmtKind::Function(_)));
    }
}
