//! tocin-lex - Lexical analysis for Tocin source code.
//!
//! Turns a raw source byte buffer into a token vector terminated by
//! [`TokenKind::Eof`]. Block structure is significant indentation:
//! the lexer synthesizes [`TokenKind::Indent`] and [`TokenKind::Dedent`]
//! tokens from leading-whitespace changes, so the parser never sees
//! braces or column numbers. Source is UTF-8 with the BOM tolerated;
//! bytes outside any valid UTF-8 sequence pass through verbatim inside
//! string literals and are errors anywhere else.
//!
//! Lexical errors are pushed to the shared diagnostic [`Handler`] rather
//! than returned; the produced stream stays well-formed (every INDENT is
//! balanced by a DEDENT and EOF is always last) even for broken input.
//!
//! [`Handler`]: tocin_util::Handler

mod cursor;
mod lexer;
mod token;

#[cfg(test)]
mod edge_cases;

pub use cursor::Cursor;
pub use lexer::Lexer;
pub use token::{keyword_from_str, Token, TokenKind};
