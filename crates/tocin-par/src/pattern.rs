//! Match pattern parsing.
//!
//! Patterns are constructor applications `Name(p, …)`, literals, the
//! wildcard `_`, and binding names. Bare `None` is a constructor.

use tocin_lex::TokenKind;
use tocin_util::CompileResult;

use crate::ast::{LiteralPat, Pattern, PatternKind};
use crate::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_pattern(&mut self) -> CompileResult<Pattern> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Ident => {
                self.advance();
                let name = tok.text;
                if name.as_str() == "_" {
                    return Ok(Pattern {
                        kind: PatternKind::Wildcard,
                        span: tok.span,
                    });
                }
                if self.eat(TokenKind::LParen).is_some() {
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_pattern()?);
                            if self.eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "`)`")?;
                    let span = tok.span.to(self.prev_span());
                    return Ok(Pattern {
                        kind: PatternKind::Constructor { name, args },
                        span,
                    });
                }
                if name.as_str() == "None" {
                    return Ok(Pattern {
                        kind: PatternKind::Constructor {
                            name,
                            args: Vec::new(),
                        },
                        span: tok.span,
                    });
                }
                Ok(Pattern {
                    kind: PatternKind::Binding(name),
                    span: tok.span,
                })
            }
            TokenKind::Int => {
                self.advance();
                let value = tok.text.as_str().parse::<i64>().unwrap_or(0);
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Int(value)),
                    span: tok.span,
                })
            }
            TokenKind::Float => {
                self.advance();
                let value = tok.text.as_str().parse::<f64>().unwrap_or(0.0);
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Float(value)),
                    span: tok.span,
                })
            }
            TokenKind::Minus if self.nth_kind(1) == TokenKind::Int => {
                self.advance();
                let int_tok = self.advance();
                let value = int_tok.text.as_str().parse::<i64>().unwrap_or(0);
                let span = tok.span.to(int_tok.span);
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Int(-value)),
                    span,
                })
            }
            TokenKind::Str => {
                self.advance();
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Str(tok.text)),
                    span: tok.span,
                })
            }
            TokenKind::CharLit => {
                self.advance();
                let c = tok.text.as_str().chars().next().unwrap_or('\0');
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Char(c)),
                    span: tok.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Bool(tok.kind == TokenKind::True)),
                    span: tok.span,
                })
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Pattern {
                    kind: PatternKind::Literal(LiteralPat::Nil),
                    span: tok.span,
                })
            }
            _ => Err(self.report_unexpected("expected a pattern")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tocin_lex::Lexer;
    use tocin_util::{FileId, Handler};

    fn pattern_of(source: &str) -> Pattern {
        let handler = Handler::new();
        let tokens = Lexer::new(source.as_bytes(), &handler, FileId::DUMMY).tokenize();
        let mut parser = Parser::new(tokens, &handler);
        let pattern = parser.parse_pattern().expect("pattern should parse");
        assert!(!handler.has_errors());
        pattern
    }

    #[test]
    fn test_constructor_with_binding() {
        let p = pattern_of("Some(v)");
        let PatternKind::Constructor { name, args } = p.kind else {
            panic!("expected constructor");
        };
        assert_eq!(name.as_str(), "Some");
        assert!(matches!(&args[0].kind, PatternKind::Binding(b) if b.as_str() == "v"));
    }

    #[test]
    fn test_bare_none_is_constructor() {
        let p = pattern_of("None");
        assert!(matches!(p.kind, PatternKind::Constructor { ref args, .. } if args.is_empty()));
    }

    #[test]
    fn test_wildcard() {
        assert!(matches!(pattern_of("_").kind, PatternKind::Wildcard));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(
            pattern_of("42").kind,
            PatternKind::Literal(LiteralPat::Int(42))
        ));
        assert!(matches!(
            pattern_of("-3").kind,
            PatternKind::Literal(LiteralPat::Int(-3))
        ));
        assert!(matches!(
            pattern_of("true").kind,
            PatternKind::Literal(LiteralPat::Bool(true))
        ));
        assert!(matches!(
            pattern_of("nil").kind,
            PatternKind::Literal(LiteralPat::Nil)
        ));
    }

    #[test]
    fn test_nested_constructor() {
        let p = pattern_of("Ok(Some(x))");
        let PatternKind::Constructor { args, .. } = p.kind else {
            panic!("expected constructor");
        };
        assert!(matches!(
            &args[0].kind,
            PatternKind::Constructor { name, .. } if name.as_str() == "Some"
        ));
    }
}
