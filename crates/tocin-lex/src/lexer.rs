//! The Tocin lexer.
//!
//! Scanning is greedy longest-match: multi-character operators win over
//! their single-character prefixes (`<-` over `<`, `==` over `=`).
//! Block structure comes from a stack of indentation widths, initially
//! `[0]`; growing the width pushes and emits one INDENT, shrinking pops
//! and emits one DEDENT per popped level. Blank lines and `#` comment
//! lines never touch the stack, and bracket nesting suspends layout
//! entirely so expressions can span lines.
//!
//! The lexer consumes the raw byte buffer. Bytes that are not valid
//! UTF-8 pass through verbatim inside string literals (the literal's
//! value keeps them exactly); outside string literals they are lexer
//! errors.

use tocin_util::diagnostic::codes;
use tocin_util::{FileId, Handler, Span, Symbol};

use crate::cursor::Cursor;
use crate::token::{keyword_from_str, Token, TokenKind};

/// Default width a tab character expands to in leading whitespace.
pub const DEFAULT_TAB_WIDTH: u32 = 4;

/// The lexer. Restartable: [`Lexer::tokenize`] resets all state and may
/// be called again over the same input.
pub struct Lexer<'a> {
    source: &'a [u8],
    cursor: Cursor<'a>,
    handler: &'a Handler,
    file: FileId,
    tab_width: u32,
    indent_stack: Vec<u32>,
    bracket_depth: u32,
    at_line_start: bool,
    tokens: Vec<Token>,
    tok_start: usize,
    tok_line: u32,
    tok_col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a [u8], handler: &'a Handler, file: FileId) -> Self {
        Self {
            source,
            cursor: Cursor::new(source),
            handler,
            file,
            tab_width: DEFAULT_TAB_WIDTH,
            indent_stack: vec![0],
            bracket_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
            tok_start: 0,
            tok_line: 1,
            tok_col: 1,
        }
    }

    pub fn with_tab_width(mut self, width: u32) -> Self {
        self.tab_width = width.max(1);
        self
    }

    /// Lex the whole input. The result always ends with EOF, preceded by
    /// one DEDENT per indentation level still open.
    pub fn tokenize(&mut self) -> Vec<Token> {
        self.cursor = Cursor::new(self.source);
        self.indent_stack = vec![0];
        self.bracket_depth = 0;
        self.at_line_start = true;
        self.tokens = Vec::new();
        self.skip_bom();

        loop {
            if self.at_line_start && self.bracket_depth == 0 {
                self.lex_line_start();
                if self.at_line_start && !self.cursor.is_at_end() {
                    continue;
                }
            }

            if self.cursor.is_at_end() {
                self.finish();
                break;
            }

            self.skip_inline_trivia();
            if self.cursor.is_at_end() {
                continue;
            }

            self.begin_token();
            if self.cursor.at_invalid_utf8() {
                self.lex_invalid_bytes();
                continue;
            }
            let c = self.cursor.current();
            if c == '\n' {
                self.cursor.advance();
                if self.bracket_depth == 0 {
                    self.push(TokenKind::Newline, "");
                    self.at_line_start = true;
                }
                continue;
            }

            if c.is_ascii_digit() {
                self.lex_number();
            } else if c == 'f' && self.cursor.peek(1) == '"' {
                self.lex_fstring();
            } else if c == '"' {
                self.lex_string();
            } else if c == '\'' {
                self.lex_char();
            } else if is_ident_start(c) {
                self.lex_ident();
            } else {
                self.lex_operator();
            }
        }

        std::mem::take(&mut self.tokens)
    }

    fn skip_bom(&mut self) {
        self.cursor.eat('\u{feff}');
    }

    /// Consume leading whitespace at a logical line start and reconcile
    /// the indentation stack. Blank and comment-only lines are swallowed
    /// without touching the stack.
    fn lex_line_start(&mut self) {
        let mut width = 0u32;
        let mut seen_space = false;
        let mut seen_tab = false;
        let line = self.cursor.line();
        let col = self.cursor.column();
        let start = self.cursor.position();

        loop {
            match self.cursor.current() {
                ' ' => {
                    width += 1;
                    seen_space = true;
                    self.cursor.advance();
                }
                '\t' => {
                    width += self.tab_width;
                    seen_tab = true;
                    self.cursor.advance();
                }
                _ => break,
            }
        }

        match self.cursor.current() {
            // Blank line: consume and stay at line start.
            '\n' => {
                self.cursor.advance();
                return;
            }
            '\r' if self.cursor.peek(1) == '\n' => {
                self.cursor.advance();
                self.cursor.advance();
                return;
            }
            // Comment-only line: discard through the newline.
            '#' => {
                while !self.cursor.is_at_end() && self.cursor.current() != '\n' {
                    self.cursor.advance();
                }
                self.cursor.eat('\n');
                return;
            }
            '\0' if self.cursor.is_at_end() => return,
            _ => {}
        }

        if seen_space && seen_tab {
            self.handler.error(
                codes::L004_MIXED_INDENTATION,
                "mixed tabs and spaces in indentation",
                Span::with_file(start, self.cursor.position(), self.file, line, col),
            );
        }

        let top = *self.indent_stack.last().unwrap();
        if width > top {
            self.indent_stack.push(width);
            self.push_at(TokenKind::Indent, line, col);
        } else if width < top {
            while *self.indent_stack.last().unwrap() > width {
                self.indent_stack.pop();
                self.push_at(TokenKind::Dedent, line, col);
            }
            if *self.indent_stack.last().unwrap() != width {
                self.handler.error(
                    codes::L005_INCONSISTENT_INDENTATION,
                    format!("unindent to column {width} matches no outer indentation level"),
                    Span::with_file(start, self.cursor.position(), self.file, line, col),
                );
            }
        }
        self.at_line_start = false;
    }

    /// Skip spaces, tabs, and a trailing `#` comment, but not the
    /// newline that ends it.
    fn skip_inline_trivia(&mut self) {
        loop {
            match self.cursor.current() {
                ' ' | '\t' | '\r' => self.cursor.advance(),
                '#' => {
                    while !self.cursor.is_at_end() && self.cursor.current() != '\n' {
                        self.cursor.advance();
                    }
                }
                _ => return,
            }
        }
    }

    /// Emit trailing NEWLINE, close open indentation levels, emit EOF.
    fn finish(&mut self) {
        if !self.at_line_start && self.bracket_depth == 0 {
            self.begin_token();
            self.push(TokenKind::Newline, "");
        }
        let line = self.cursor.line();
        let col = self.cursor.column();
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push_at(TokenKind::Dedent, line, col);
        }
        self.begin_token();
        self.push(TokenKind::Eof, "");
    }

    fn begin_token(&mut self) {
        self.tok_start = self.cursor.position();
        self.tok_line = self.cursor.line();
        self.tok_col = self.cursor.column();
    }

    fn push(&mut self, kind: TokenKind, text: &str) {
        self.push_bytes(kind, text.as_bytes());
    }

    fn push_bytes(&mut self, kind: TokenKind, bytes: &[u8]) {
        let span = Span::with_file(
            self.tok_start,
            self.cursor.position(),
            self.file,
            self.tok_line,
            self.tok_col,
        );
        self.tokens
            .push(Token::new(kind, Symbol::intern_bytes(bytes), span));
    }

    fn push_at(&mut self, kind: TokenKind, line: u32, col: u32) {
        let pos = self.cursor.position();
        let span = Span::with_file(pos, pos, self.file, line, col);
        self.tokens.push(Token::new(kind, Symbol::intern(""), span));
    }

    fn error_span(&self) -> Span {
        Span::with_file(
            self.tok_start,
            self.cursor.position(),
            self.file,
            self.tok_line,
            self.tok_col,
        )
    }

    /// Bytes outside any valid UTF-8 sequence are only legal inside
    /// string literals; anywhere else they are lexer errors.
    fn lex_invalid_bytes(&mut self) {
        while self.cursor.at_invalid_utf8() {
            self.cursor.advance();
        }
        self.handler.error(
            codes::L001_UNEXPECTED_CHARACTER,
            "invalid UTF-8 byte sequence outside a string literal",
            self.error_span(),
        );
        self.push(TokenKind::Error, "");
    }

    fn lex_number(&mut self) {
        let start = self.cursor.position();
        let mut is_float = false;

        while self.cursor.current().is_ascii_digit() {
            self.cursor.advance();
        }
        if self.cursor.current() == '.' && self.cursor.peek(1).is_ascii_digit() {
            is_float = true;
            self.cursor.advance();
            while self.cursor.current().is_ascii_digit() {
                self.cursor.advance();
            }
        }
        if matches!(self.cursor.current(), 'e' | 'E') {
            is_float = true;
            self.cursor.advance();
            if matches!(self.cursor.current(), '+' | '-') {
                self.cursor.advance();
            }
            if !self.cursor.current().is_ascii_digit() {
                self.handler.error(
                    codes::L003_INVALID_NUMBER_FORMAT,
                    "exponent has no digits",
                    self.error_span(),
                );
                self.push_bytes(TokenKind::Error, self.cursor.slice_from(start));
                return;
            }
            while self.cursor.current().is_ascii_digit() {
                self.cursor.advance();
            }
        }

        // Number lexemes are pure ASCII.
        self.push_bytes(
            if is_float {
                TokenKind::Float
            } else {
                TokenKind::Int
            },
            self.cursor.slice_from(start),
        );
    }

    /// Scan the body of a quoted literal up to (not including) the
    /// closing quote, processing escapes. Bytes outside valid UTF-8
    /// sequences pass through verbatim. Returns `None` on an
    /// unterminated literal.
    fn scan_quoted(&mut self, quote: char) -> Option<Vec<u8>> {
        let mut value = Vec::new();
        loop {
            if self.cursor.at_invalid_utf8() {
                if let Some(b) = self.cursor.current_byte() {
                    value.push(b);
                }
                self.cursor.advance();
                continue;
            }
            match self.cursor.current() {
                c if c == quote => return Some(value),
                '\n' => {
                    self.handler.error(
                        codes::L002_UNTERMINATED_STRING,
                        "unterminated string literal",
                        self.error_span(),
                    );
                    return None;
                }
                '\0' if self.cursor.is_at_end() => {
                    self.handler.error(
                        codes::L002_UNTERMINATED_STRING,
                        "unterminated string literal",
                        self.error_span(),
                    );
                    return None;
                }
                '\\' => {
                    self.cursor.advance();
                    let esc = self.cursor.current();
                    match esc {
                        'n' => value.push(b'\n'),
                        'r' => value.push(b'\r'),
                        't' => value.push(b'\t'),
                        '"' => value.push(b'"'),
                        '\'' => value.push(b'\''),
                        '\\' => value.push(b'\\'),
                        _ => {
                            self.handler.error(
                                codes::L006_INVALID_ESCAPE,
                                format!("unknown escape sequence `\\{esc}`"),
                                self.error_span(),
                            );
                            push_char(&mut value, esc);
                        }
                    }
                    self.cursor.advance();
                }
                _ => {
                    let start = self.cursor.position();
                    self.cursor.advance();
                    value.extend_from_slice(self.cursor.slice_from(start));
                }
            }
        }
    }

    fn lex_string(&mut self) {
        self.cursor.advance(); // opening quote
        match self.scan_quoted('"') {
            Some(value) => {
                self.cursor.advance(); // closing quote
                self.push_bytes(TokenKind::Str, &value);
            }
            None => self.push(TokenKind::Error, ""),
        }
    }

    fn lex_char(&mut self) {
        self.cursor.advance(); // opening quote
        match self.scan_quoted('\'') {
            Some(value) => {
                self.cursor.advance(); // closing quote
                if String::from_utf8_lossy(&value).chars().count() != 1 {
                    self.handler.error(
                        codes::L001_UNEXPECTED_CHARACTER,
                        "character literal must contain exactly one character",
                        self.error_span(),
                    );
                    self.push_bytes(TokenKind::Error, &value);
                } else {
                    self.push_bytes(TokenKind::CharLit, &value);
                }
            }
            None => self.push(TokenKind::Error, ""),
        }
    }

    /// Lex an interpolated string `f"a{x}b"`, pre-splitting it into an
    /// alternation of text fragments and expression token runs:
    /// `FStringStart("a")`, the tokens of `x`, `FStringEnd("b")`, with
    /// `FStringMid` fragments between consecutive holes. Invalid bytes
    /// pass through in the text fragments; inside a hole they are
    /// expression source and the sub-lexer rejects them.
    fn lex_fstring(&mut self) {
        self.cursor.advance(); // f
        self.cursor.advance(); // opening quote

        let mut fragments: Vec<Vec<u8>> = Vec::new();
        let mut holes: Vec<Vec<u8>> = Vec::new();
        let mut text: Vec<u8> = Vec::new();
        let mut terminated = true;

        loop {
            if self.cursor.at_invalid_utf8() {
                if let Some(b) = self.cursor.current_byte() {
                    text.push(b);
                }
                self.cursor.advance();
                continue;
            }
            match self.cursor.current() {
                '"' => {
                    self.cursor.advance();
                    break;
                }
                '\n' => {
                    self.handler.error(
                        codes::L002_UNTERMINATED_STRING,
                        "unterminated string literal",
                        self.error_span(),
                    );
                    terminated = false;
                    break;
                }
                '\0' if self.cursor.is_at_end() => {
                    self.handler.error(
                        codes::L002_UNTERMINATED_STRING,
                        "unterminated string literal",
                        self.error_span(),
                    );
                    terminated = false;
                    break;
                }
                '\\' => {
                    self.cursor.advance();
                    let esc = self.cursor.current();
                    match esc {
                        'n' => text.push(b'\n'),
                        'r' => text.push(b'\r'),
                        't' => text.push(b'\t'),
                        '"' => text.push(b'"'),
                        '\'' => text.push(b'\''),
                        '\\' => text.push(b'\\'),
                        _ => {
                            self.handler.error(
                                codes::L006_INVALID_ESCAPE,
                                format!("unknown escape sequence `\\{esc}`"),
                                self.error_span(),
                            );
                            push_char(&mut text, esc);
                        }
                    }
                    self.cursor.advance();
                }
                '{' => {
                    self.cursor.advance();
                    let mut depth = 1u32;
                    let mut hole: Vec<u8> = Vec::new();
                    loop {
                        if self.cursor.at_invalid_utf8() {
                            if let Some(b) = self.cursor.current_byte() {
                                hole.push(b);
                            }
                            self.cursor.advance();
                            continue;
                        }
                        match self.cursor.current() {
                            '{' => {
                                depth += 1;
                                hole.push(b'{');
                                self.cursor.advance();
                            }
                            '}' => {
                                depth -= 1;
                                self.cursor.advance();
                                if depth == 0 {
                                    break;
                                }
                                hole.push(b'}');
                            }
                            '\n' => {
                                self.handler.error(
                                    codes::L002_UNTERMINATED_STRING,
                                    "unterminated interpolation in string literal",
                                    self.error_span(),
                                );
                                terminated = false;
                                break;
                            }
                            '\0' if self.cursor.is_at_end() => {
                                self.handler.error(
                                    codes::L002_UNTERMINATED_STRING,
                                    "unterminated interpolation in string literal",
                                    self.error_span(),
                                );
                                terminated = false;
                                break;
                            }
                            _ => {
                                let start = self.cursor.position();
                                self.cursor.advance();
                                hole.extend_from_slice(self.cursor.slice_from(start));
                            }
                        }
                    }
                    if !terminated {
                        break;
                    }
                    fragments.push(std::mem::take(&mut text));
                    holes.push(hole);
                }
                _ => {
                    let start = self.cursor.position();
                    self.cursor.advance();
                    text.extend_from_slice(self.cursor.slice_from(start));
                }
            }
        }
        fragments.push(text);

        if !terminated {
            self.push(TokenKind::Error, "");
            return;
        }
        if holes.is_empty() {
            // No interpolation: an f-string is just a string.
            self.push_bytes(TokenKind::Str, &fragments[0]);
            return;
        }

        self.push_bytes(TokenKind::FStringStart, &fragments[0]);
        let count = holes.len();
        for (i, hole) in holes.into_iter().enumerate() {
            let mut sub = Lexer::new(&hole, self.handler, self.file);
            for tok in sub.tokenize() {
                if !matches!(
                    tok.kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
                ) {
                    self.tokens.push(tok);
                }
            }
            let fragment = &fragments[i + 1];
            if i + 1 < count {
                self.push_bytes(TokenKind::FStringMid, fragment);
            } else {
                self.push_bytes(TokenKind::FStringEnd, fragment);
            }
        }
    }

    fn lex_ident(&mut self) {
        let start = self.cursor.position();
        while is_ident_continue(self.cursor.current()) && !self.cursor.at_invalid_utf8() {
            self.cursor.advance();
        }
        // Identifier characters only advance over validly-decoded
        // text.
        let text = std::str::from_utf8(self.cursor.slice_from(start)).unwrap_or("");
        match keyword_from_str(text) {
            Some(kind) => self.push(kind, text),
            None => self.push(TokenKind::Ident, text),
        }
    }

    fn lex_operator(&mut self) {
        use TokenKind::*;
        let c = self.cursor.current();
        self.cursor.advance();
        let kind = match c {
            '(' => {
                self.bracket_depth += 1;
                LParen
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                RParen
            }
            '[' => {
                self.bracket_depth += 1;
                LBracket
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                RBracket
            }
            '{' => {
                self.bracket_depth += 1;
                LBrace
            }
            '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                RBrace
            }
            ',' => Comma,
            '.' => Dot,
            ';' => Semicolon,
            '~' => Tilde,
            '^' => Caret,
            '&' => Amp,
            '|' => Pipe,
            ':' => {
                if self.cursor.eat(':') {
                    ColonColon
                } else {
                    Colon
                }
            }
            '-' => {
                if self.cursor.eat('>') {
                    Arrow
                } else if self.cursor.eat('-') {
                    MinusMinus
                } else if self.cursor.eat('=') {
                    MinusEq
                } else {
                    Minus
                }
            }
            '+' => {
                if self.cursor.eat('+') {
                    PlusPlus
                } else if self.cursor.eat('=') {
                    PlusEq
                } else {
                    Plus
                }
            }
            '*' => {
                if self.cursor.eat('=') {
                    StarEq
                } else {
                    Star
                }
            }
            '/' => {
                if self.cursor.eat('=') {
                    SlashEq
                } else {
                    Slash
                }
            }
            '%' => {
                if self.cursor.eat('=') {
                    PercentEq
                } else {
                    Percent
                }
            }
            '=' => {
                if self.cursor.eat('=') {
                    EqEq
                } else {
                    Assign
                }
            }
            '!' => {
                if self.cursor.eat('=') {
                    NotEq
                } else if self.cursor.eat('!') {
                    BangBang
                } else {
                    Bang
                }
            }
            '?' => {
                if self.cursor.eat('.') {
                    QuestionDot
                } else if self.cursor.eat(':') {
                    QuestionColon
                } else {
                    Question
                }
            }
            '<' => {
                if self.cursor.eat('-') {
                    LArrow
                } else if self.cursor.eat('<') {
                    Shl
                } else if self.cursor.eat('=') {
                    Le
                } else {
                    Lt
                }
            }
            '>' => {
                if self.cursor.eat('>') {
                    Shr
                } else if self.cursor.eat('=') {
                    Ge
                } else {
                    Gt
                }
            }
            other => {
                self.handler.error(
                    codes::L001_UNEXPECTED_CHARACTER,
                    format!("unexpected character `{other}`"),
                    self.error_span(),
                );
                Error
            }
        };
        let text = self.cursor.slice_from(self.tok_start).to_vec();
        self.push_bytes(kind, &text);
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Handler) {
        lex_bytes(source.as_bytes())
    }

    fn lex_bytes(source: &[u8]) -> (Vec<Token>, Handler) {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler, FileId::DUMMY).tokenize();
        (tokens, handler)
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_function_layout() {
        use TokenKind::*;
        assert_eq!(
            kinds("def f():\n    return 1\n"),
            vec![
                Def, Ident, LParen, RParen, Colon, Newline, Indent, Return, Int, Newline, Dedent,
                Eof
            ]
        );
    }

    #[test]
    fn test_indent_dedent_balance() {
        let (tokens, handler) = lex("if a:\n    if b:\n        x\n    y\nz\n");
        assert!(!handler.has_errors());
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, dedents);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_dedents_flushed_at_eof() {
        use TokenKind::*;
        // No trailing newline and two open levels.
        assert_eq!(
            kinds("if a:\n    if b:\n        x"),
            vec![
                If, Ident, Colon, Newline, Indent, If, Ident, Colon, Newline, Indent, Ident,
                Newline, Dedent, Dedent, Eof
            ]
        );
    }

    #[test]
    fn test_blank_and_comment_lines_ignore_indentation() {
        use TokenKind::*;
        let source = "if a:\n    x\n\n    # a comment\n    y\n";
        assert_eq!(
            kinds(source),
            vec![
                If, Ident, Colon, Newline, Indent, Ident, Newline, Ident, Newline, Dedent, Eof
            ]
        );
    }

    #[test]
    fn test_inconsistent_dedent_reports() {
        let (_, handler) = lex("if a:\n        x\n    y\n");
        let diags = handler.diagnostics();
        assert!(diags
            .iter()
            .any(|d| d.code == codes::L005_INCONSISTENT_INDENTATION));
    }

    #[test]
    fn test_mixed_tabs_and_spaces_reports() {
        let (_, handler) = lex("if a:\n \tx\n");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::L004_MIXED_INDENTATION));
    }

    #[test]
    fn test_multi_char_operators_win() {
        use TokenKind::*;
        assert_eq!(
            kinds("a <- b << c <= d < e\n"),
            vec![Ident, LArrow, Ident, Shl, Ident, Le, Ident, Lt, Ident, Newline, Eof]
        );
    }

    #[test]
    fn test_null_safety_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a?.b ?: c!!\n"),
            vec![Ident, QuestionDot, Ident, QuestionColon, Ident, BangBang, Newline, Eof]
        );
    }

    #[test]
    fn test_number_literals() {
        let (tokens, handler) = lex("1 42 3.5 2e10 1.5e-3\n");
        assert!(!handler.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        use TokenKind::*;
        assert_eq!(
            kinds,
            vec![Int, Int, Float, Float, Float, Newline, Eof]
        );
    }

    #[test]
    fn test_malformed_exponent() {
        let (_, handler) = lex("let x = 1e+\n");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::L003_INVALID_NUMBER_FORMAT));
    }

    #[test]
    fn test_string_escapes() {
        let (tokens, handler) = lex("\"a\\tb\\n\"\n");
        assert!(!handler.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text.as_str(), "a\tb\n");
    }

    #[test]
    fn test_unterminated_string() {
        let (_, handler) = lex("\"no end\nnext\n");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::L002_UNTERMINATED_STRING));
    }

    #[test]
    fn test_invalid_bytes_in_string_pass_through_verbatim() {
        let (tokens, handler) = lex_bytes(b"let s = \"a\xff\xfeb\"\n");
        assert!(
            !handler.has_errors(),
            "bytes inside quotes are not errors: {:?}",
            handler.diagnostics()
        );
        let string_tok = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Str)
            .expect("string token");
        assert_eq!(string_tok.text.as_bytes(), b"a\xff\xfeb");
    }

    #[test]
    fn test_invalid_bytes_outside_string_are_errors() {
        let (tokens, handler) = lex_bytes(b"let x \xff\xfe= 1\n");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::L001_UNEXPECTED_CHARACTER));
        // The stream stays well-formed.
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_invalid_bytes_in_fstring_text_pass_through() {
        let (tokens, handler) = lex_bytes(b"f\"a\xffb{x}c\"\n");
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        assert_eq!(tokens[0].kind, TokenKind::FStringStart);
        assert_eq!(tokens[0].text.as_bytes(), b"a\xffb");
    }

    #[test]
    fn test_invalid_bytes_in_fstring_hole_are_errors() {
        // The hole holds expression source, not string text.
        let (_, handler) = lex_bytes(b"f\"a{\xff}b\"\n");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::L001_UNEXPECTED_CHARACTER));
    }

    #[test]
    fn test_fstring_splits_into_parts() {
        use TokenKind::*;
        let (tokens, handler) = lex("f\"x = {x}, y = {y}!\"\n");
        assert!(!handler.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![FStringStart, Ident, FStringMid, Ident, FStringEnd, Newline, Eof]
        );
        assert_eq!(tokens[0].text.as_str(), "x = ");
        assert_eq!(tokens[2].text.as_str(), ", y = ");
        assert_eq!(tokens[4].text.as_str(), "!");
    }

    #[test]
    fn test_fstring_without_holes_is_plain_string() {
        let (tokens, _) = lex("f\"plain\"\n");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text.as_str(), "plain");
    }

    #[test]
    fn test_keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("match move mover\n"),
            vec![Match, Move, Ident, Newline, Eof]
        );
    }

    #[test]
    fn test_brackets_suspend_layout() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = [1,\n    2,\n    3]\n"),
            vec![
                Let, Ident, Assign, LBracket, Int, Comma, Int, Comma, Int, RBracket, Newline, Eof
            ]
        );
    }

    #[test]
    fn test_bom_is_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("\u{feff}let x = 1\n"), vec![Let, Ident, Assign, Int, Newline, Eof]);
    }

    #[test]
    fn test_unexpected_character() {
        let (_, handler) = lex("let $ = 1\n");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::L001_UNEXPECTED_CHARACTER));
    }

    #[test]
    fn test_restartable() {
        let handler = Handler::new();
        let mut lexer = Lexer::new(b"let x = 1\n", &handler, FileId::DUMMY);
        let first = lexer.tokenize();
        let second = lexer.tokenize();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].kind, second[0].kind);
    }

    #[test]
    fn test_spans_are_one_based() {
        let (tokens, _) = lex("let x = 1\n");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.column, 1);
        assert_eq!(tokens[1].span.column, 5);
    }
}
