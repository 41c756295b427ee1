//! Type expression parsing.
//!
//! Grammar:
//!
//! ```text
//! type       = prefix { "?" }
//! prefix     = "*" prefix
//!            | "&" [ "mut" ] prefix
//!            | "(" [ type { "," type } ] ")" [ "->" type ]
//!            | "[" type [ ";" INT ] "]"
//!            | "{" type ":" type "}"
//!            | IDENT [ "<" type { "," type } ">" ]
//! ```

use tocin_lex::TokenKind;
use tocin_util::{CompileResult, Symbol};

use crate::ast::{TypeExpr, TypeExprKind};
use crate::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_type(&mut self) -> CompileResult<TypeExpr> {
        let mut ty = self.parse_type_prefix()?;
        while self.eat(TokenKind::Question).is_some() {
            let span = ty.span.to(self.prev_span());
            ty = TypeExpr::new(TypeExprKind::Nullable(Box::new(ty)), span);
        }
        Ok(ty)
    }

    fn parse_type_prefix(&mut self) -> CompileResult<TypeExpr> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Star => {
                self.advance();
                let inner = self.parse_type_prefix()?;
                let span = start.to(inner.span);
                Ok(TypeExpr::new(TypeExprKind::Pointer(Box::new(inner)), span))
            }
            TokenKind::Amp => {
                self.advance();
                let mutable = matches!(self.peek_kind(), TokenKind::Ident if self.peek().text.as_str() == "mut");
                if mutable {
                    self.advance();
                }
                let inner = self.parse_type_prefix()?;
                let span = start.to(inner.span);
                Ok(TypeExpr::new(
                    TypeExprKind::Reference {
                        inner: Box::new(inner),
                        mutable,
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        elems.push(self.parse_type()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "`)`")?;
                if self.eat(TokenKind::Arrow).is_some() {
                    let ret = self.parse_type()?;
                    let span = start.to(ret.span);
                    return Ok(TypeExpr::new(
                        TypeExprKind::Func {
                            params: elems,
                            ret: Box::new(ret),
                        },
                        span,
                    ));
                }
                let span = start.to(self.prev_span());
                match elems.len() {
                    1 => Ok(elems.into_iter().next().unwrap()),
                    _ => Ok(TypeExpr::new(TypeExprKind::Tuple(elems), span)),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let elem = self.parse_type()?;
                let len = if self.eat(TokenKind::Semicolon).is_some() {
                    let tok = self.expect(TokenKind::Int, "array length")?;
                    Some(tok.text.as_str().parse::<u64>().unwrap_or(0))
                } else {
                    None
                };
                self.expect(TokenKind::RBracket, "`]`")?;
                let span = start.to(self.prev_span());
                Ok(TypeExpr::new(
                    TypeExprKind::Array {
                        elem: Box::new(elem),
                        len,
                    },
                    span,
                ))
            }
            TokenKind::LBrace => {
                self.advance();
                let key = self.parse_type()?;
                self.expect(TokenKind::Colon, "`:` between key and value types")?;
                let value = self.parse_type()?;
                self.expect(TokenKind::RBrace, "`}`")?;
                let span = start.to(self.prev_span());
                Ok(TypeExpr::new(
                    TypeExprKind::Dict {
                        key: Box::new(key),
                        value: Box::new(value),
                    },
                    span,
                ))
            }
            TokenKind::Ident => {
                let tok = self.advance();
                if tok.text.as_str() == "Self" {
                    return Ok(TypeExpr::new(TypeExprKind::SelfType, tok.span));
                }
                let mut args = Vec::new();
                if self.check(TokenKind::Lt) {
                    self.advance();
                    loop {
                        args.push(self.parse_type()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    self.expect_closing_angle()?;
                }
                let span = tok.span.to(self.prev_span());
                Ok(TypeExpr::new(
                    TypeExprKind::Named {
                        name: tok.text,
                        args,
                    },
                    span,
                ))
            }
            _ => Err(self.report_unexpected("expected a type")),
        }
    }

    /// Close a generic argument list, splitting `>>` into two `>` so
    /// nested generics like `Map<string, List<int>>` parse.
    pub(crate) fn expect_closing_angle(&mut self) -> CompileResult<()> {
        if self.pending_gt {
            self.pending_gt = false;
            return Ok(());
        }
        if self.eat(TokenKind::Gt).is_some() {
            return Ok(());
        }
        if self.check(TokenKind::Shr) {
            self.advance();
            self.pending_gt = true;
            return Ok(());
        }
        self.expect(TokenKind::Gt, "`>`").map(|_| ())
    }

    /// Token-level scan deciding whether the `<` at the current position
    /// opens a generic argument list followed by a call — the only
    /// position where `<` is ambiguous with the relational operator.
    pub(crate) fn looks_like_generic_call(&self) -> bool {
        debug_assert!(self.check(TokenKind::Lt));
        let mut depth: i32 = 0;
        let mut i = self.save();
        loop {
            let tok = self.token_at(i);
            match tok.kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return self.token_at(i + 1).kind == TokenKind::LParen;
                    }
                }
                TokenKind::Shr => {
                    depth -= 2;
                    if depth <= 0 {
                        return depth == 0 && self.token_at(i + 1).kind == TokenKind::LParen;
                    }
                }
                TokenKind::Ident
                | TokenKind::Comma
                | TokenKind::Question
                | TokenKind::Star
                | TokenKind::Amp
                | TokenKind::LBracket
                | TokenKind::RBracket
                | TokenKind::LBrace
                | TokenKind::RBrace
                | TokenKind::Semicolon
                | TokenKind::Colon
                | TokenKind::Int
                | TokenKind::Arrow
                | TokenKind::LParen
                | TokenKind::RParen => {}
                _ => return false,
            }
            i += 1;
            if i >= self.save() + 64 {
                // Generic argument lists are short; give up rather than
                // scan an arbitrarily long relational chain.
                return false;
            }
        }
    }

    /// Parse `<T, U>` in a declaration position (no ambiguity).
    pub(crate) fn parse_generic_params(&mut self) -> CompileResult<Vec<crate::ast::GenericParam>> {
        let mut params = Vec::new();
        if self.eat(TokenKind::Lt).is_none() {
            return Ok(params);
        }
        loop {
            let name_tok = self.expect(TokenKind::Ident, "type parameter name")?;
            let mut bounds: Vec<Symbol> = Vec::new();
            if self.eat(TokenKind::Colon).is_some() {
                loop {
                    let bound = self.expect(TokenKind::Ident, "trait bound")?;
                    bounds.push(bound.text);
                    if self.eat(TokenKind::Plus).is_none() {
                        break;
                    }
                }
            }
            params.push(crate::ast::GenericParam {
                name: name_tok.text,
                bounds,
                span: name_tok.span,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_closing_angle()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tocin_lex::Lexer;
    use tocin_util::{FileId, Handler};

    fn parse_type_str(source: &str) -> TypeExpr {
        let handler = Handler::new();
        let tokens = Lexer::new(source.as_bytes(), &handler, FileId::DUMMY).tokenize();
        let mut parser = Parser::new(tokens, &handler);
        let ty = parser.parse_type().expect("type should parse");
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        ty
    }

    #[test]
    fn test_primitive_named() {
        let ty = parse_type_str("int");
        assert!(
            matches!(ty.kind, TypeExprKind::Named { name, ref args } if name.as_str() == "int" && args.is_empty())
        );
    }

    #[test]
    fn test_nullable_suffix() {
        let ty = parse_type_str("string?");
        assert!(matches!(ty.kind, TypeExprKind::Nullable(_)));
    }

    #[test]
    fn test_nested_generics_with_shr() {
        let ty = parse_type_str("Map<string, List<int>>");
        let TypeExprKind::Named { name, args } = ty.kind else {
            panic!("expected named type");
        };
        assert_eq!(name.as_str(), "Map");
        assert_eq!(args.len(), 2);
        assert!(
            matches!(&args[1].kind, TypeExprKind::Named { name, args } if name.as_str() == "List" && args.len() == 1)
        );
    }

    #[test]
    fn test_function_type() {
        let ty = parse_type_str("(int, string) -> bool");
        let TypeExprKind::Func { params, .. } = ty.kind else {
            panic!("expected function type");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_array_types() {
        assert!(matches!(
            parse_type_str("[int]").kind,
            TypeExprKind::Array { len: None, .. }
        ));
        assert!(matches!(
            parse_type_str("[int; 4]").kind,
            TypeExprKind::Array { len: Some(4), .. }
        ));
    }

    #[test]
    fn test_dict_type() {
        assert!(matches!(
            parse_type_str("{string: int}").kind,
            TypeExprKind::Dict { .. }
        ));
    }

    #[test]
    fn test_tuple_and_grouping() {
        assert!(matches!(
            parse_type_str("(int, bool)").kind,
            TypeExprKind::Tuple(_)
        ));
        // A single parenthesized type is just that type.
        assert!(matches!(
            parse_type_str("(int)").kind,
            TypeExprKind::Named { .. }
        ));
    }

    #[test]
    fn test_reference_and_pointer() {
        assert!(matches!(
            parse_type_str("&mut int").kind,
            TypeExprKind::Reference { mutable: true, .. }
        ));
        assert!(matches!(
            parse_type_str("*int").kind,
            TypeExprKind::Pointer(_)
        ));
    }
}
