//! Stream-shape invariants checked over generated inputs.

use proptest::prelude::*;

use tocin_util::{FileId, Handler};

use crate::lexer::Lexer;
use crate::token::TokenKind;

fn counts(tokens: &[crate::token::Token]) -> (usize, usize) {
    let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
    let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
    (indents, dedents)
}

proptest! {
    /// INDENT and DEDENT counts match and EOF is last, for arbitrary
    /// block shapes including ill-formed dedents.
    #[test]
    fn indents_and_dedents_balance(
        lines in proptest::collection::vec((0usize..5, "[a-z]{1,4}"), 0..16)
    ) {
        let mut src = String::new();
        for (level, word) in &lines {
            src.push_str(&"    ".repeat(*level));
            src.push_str(word);
            src.push('\n');
        }
        let handler = Handler::new();
        let tokens = Lexer::new(src.as_bytes(), &handler, FileId::DUMMY).tokenize();
        let (indents, dedents) = counts(&tokens);
        prop_assert_eq!(indents, dedents);
        prop_assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    /// The stream invariants hold even for arbitrary printable garbage.
    #[test]
    fn eof_is_always_last(src in "[ -~\n]{0,200}") {
        let handler = Handler::new();
        let tokens = Lexer::new(src.as_bytes(), &handler, FileId::DUMMY).tokenize();
        let (indents, dedents) = counts(&tokens);
        prop_assert_eq!(indents, dedents);
        prop_assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        prop_assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::Eof).count(),
            1
        );
    }

    /// The lexer consumes raw bytes: completely arbitrary byte soup
    /// (including invalid UTF-8) still yields a balanced stream ending
    /// in EOF.
    #[test]
    fn stream_invariants_hold_for_arbitrary_bytes(
        src in proptest::collection::vec(any::<u8>(), 0..200)
    ) {
        let handler = Handler::new();
        let tokens = Lexer::new(&src, &handler, FileId::DUMMY).tokenize();
        let (indents, dedents) = counts(&tokens);
        prop_assert_eq!(indents, dedents);
        prop_assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }
}
