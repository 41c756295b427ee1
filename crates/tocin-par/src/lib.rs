//! tocin-par - Recursive-descent parser for Tocin.
//!
//! Consumes the lexer's token vector and produces one [`ast::Module`]
//! per source file. Statements and declarations are parsed by functions
//! named for the grammar rule they recognize; binary expressions use
//! precedence climbing. Error recovery is panic-mode: on an unexpected
//! token the parser reports a diagnostic, skips to the next
//! statement-starter after a NEWLINE (or to a DEDENT), and resumes, so
//! one malformed statement does not hide errors in its neighbors.

pub mod ast;
mod expr;
mod items;
mod pattern;
mod pretty;
mod stmt;
mod types;

#[cfg(test)]
mod edge_cases;

pub use pretty::pretty_print;

use tocin_lex::{Token, TokenKind};
use tocin_util::diagnostic::codes;
use tocin_util::{CompileResult, ErrorReported, Handler, Span, Symbol};

use ast::Module;

/// The parser. One instance consumes one token vector.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    handler: &'a Handler,
    /// Set when `>>` was split in two while closing nested generic
    /// argument lists; the second `>` is still pending.
    pub(crate) pending_gt: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, handler: &'a Handler) -> Self {
        assert!(
            matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof),
            "token stream must end with EOF"
        );
        Self {
            tokens,
            pos: 0,
            handler,
            pending_gt: false,
        }
    }

    /// Parse the whole stream into a module named `name`.
    pub fn parse_module(&mut self, name: Symbol) -> Module {
        let start = self.peek().span;
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.at_end() {
            match self.parse_statement() {
                Ok(stmt) => {
                    body.push(stmt);
                    if !self.statement_terminated() {
                        self.report_unexpected("expected end of statement");
                        self.synchronize();
                    }
                }
                Err(ErrorReported) => {
                    self.synchronize();
                    // A stray DEDENT at module level has no suite to
                    // close; consume it so recovery makes progress.
                    while self.eat(TokenKind::Dedent).is_some() {}
                }
            }
            self.skip_newlines();
        }
        let end = self.peek().span;
        Module {
            name,
            body,
            span: start.to(end),
        }
    }

    // ----- token access -------------------------------------------------

    pub(crate) fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> Token {
        self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    pub(crate) fn nth_kind(&self, n: usize) -> TokenKind {
        self.peek_ahead(n).kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> CompileResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let found = self.peek();
        let code = if found.kind == TokenKind::Eof {
            codes::P006_UNEXPECTED_EOF
        } else {
            codes::P003_EXPECTED_TOKEN
        };
        self.handler.error(
            code,
            format!("expected {what}, found {}", describe(found)),
            found.span,
        );
        Err(ErrorReported)
    }

    pub(crate) fn report_unexpected(&self, context: &str) -> ErrorReported {
        let found = self.peek();
        let code = if found.kind == TokenKind::Eof {
            codes::P006_UNEXPECTED_EOF
        } else {
            codes::P002_UNEXPECTED_TOKEN
        };
        self.handler.error(
            code,
            format!("{context}, found {}", describe(found)),
            found.span,
        );
        ErrorReported
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn prev_span(&self) -> Span {
        if self.pos == 0 {
            self.peek().span
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    // ----- layout helpers -----------------------------------------------

    pub(crate) fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Consume the terminator after a statement. Block-shaped statements
    /// are self-terminated by the DEDENT that closed their suite.
    pub(crate) fn statement_terminated(&mut self) -> bool {
        if self.pos > 0 && self.tokens[self.pos - 1].kind == TokenKind::Dedent {
            self.skip_newlines();
            return true;
        }
        let mut any = false;
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
            any = true;
        }
        any || matches!(
            self.peek_kind(),
            TokenKind::Dedent
                | TokenKind::Eof
                | TokenKind::Elif
                | TokenKind::Else
                | TokenKind::Case
                | TokenKind::Default
        )
    }

    /// Panic-mode recovery: advance to the next statement boundary.
    pub(crate) fn synchronize(&mut self) {
        self.pending_gt = false;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Dedent => return,
                TokenKind::Newline => {
                    self.advance();
                    if self.peek_kind().starts_statement() || self.check(TokenKind::Dedent) {
                        return;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ----- save/restore for bounded lookahead ---------------------------

    pub(crate) fn save(&self) -> usize {
        self.pos
    }

    pub(crate) fn restore(&mut self, pos: usize) {
        self.pos = pos;
        self.pending_gt = false;
    }

    pub(crate) fn token_at(&self, pos: usize) -> Token {
        self.tokens[pos.min(self.tokens.len() - 1)]
    }
}

/// Human-readable token description for diagnostics.
fn describe(token: Token) -> String {
    use TokenKind::*;
    match token.kind {
        Eof => "end of file".to_string(),
        Newline => "end of line".to_string(),
        Indent => "indented block".to_string(),
        Dedent => "end of block".to_string(),
        Ident => format!("`{}`", token.text),
        Int | Float => format!("`{}`", token.text),
        Str => "string literal".to_string(),
        _ => {
            let text = token.text.as_str();
            if text.is_empty() {
                format!("{:?}", token.kind)
            } else {
                format!("`{text}`")
            }
        }
    }
}

/// Convenience for tests and the driver: lex and parse one source
/// buffer.
pub fn parse_source(source: &str, name: &str, handler: &Handler) -> Module {
    use tocin_lex::Lexer;
    use tocin_util::FileId;
    let tokens = Lexer::new(source.as_bytes(), handler, FileId::DUMMY).tokenize();
    let mut parser = Parser::new(tokens, handler);
    parser.parse_module(Symbol::intern(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{ExprKind, StmtKind};

    fn parse_ok(source: &str) -> Module {
        let handler = Handler::new();
        let module = parse_source(source, "test", &handler);
        let rendered: Vec<String> = handler
            .diagnostics()
            .iter()
            .map(|d| format!("{}: {}", d.code, d.message))
            .collect();
        assert!(!handler.has_errors(), "unexpected errors: {rendered:?}");
        module
    }

    #[test]
    fn test_function_with_return() {
        let module = parse_ok("def f():\n    return 1\n");
        assert_eq!(module.body.len(), 1);
        let StmtKind::Function(func) = &module.body[0].kind else {
            panic!("expected function, got {:?}", module.body[0].kind);
        };
        assert_eq!(func.name.as_str(), "f");
        assert_eq!(func.body.len(), 1);
        let StmtKind::Return(Some(value)) = &func.body[0].kind else {
            panic!("expected return statement");
        };
        assert_eq!(value.kind, ExprKind::Int(1));
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let module = parse_ok("let x = 1 + 2 * 3\n");
        let StmtKind::Let { init: Some(init), .. } = &module.body[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op, rhs, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, ast::BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: ast::BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_error_recovery_continues() {
        let handler = Handler::new();
        let module = parse_source("let = broken\nlet y = 2\n", "test", &handler);
        assert!(handler.has_errors());
        // The second statement still parses.
        assert!(module
            .body
            .iter()
            .any(|s| matches!(&s.kind, StmtKind::Let { name, .. } if name.as_str() == "y")));
    }

    #[test]
    fn test_assignment_target_validation() {
        let handler = Handler::new();
        parse_source("1 + 2 = 3\n", "test", &handler);
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::P004_INVALID_ASSIGNMENT_TARGET));
    }

    #[test]
    fn test_const_requires_initializer() {
        let handler = Handler::new();
        parse_source("const k: int\n", "test", &handler);
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::P005_CONST_WITHOUT_INIT));
    }
}
