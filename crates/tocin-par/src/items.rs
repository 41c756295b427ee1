//! Declaration parsing: functions, classes, traits, impls, imports.

use tocin_lex::TokenKind;
use tocin_util::{CompileResult, Symbol};

use crate::ast::{
    ClassDecl, FieldDecl, FunctionDecl, ImplDecl, ImportDecl, Param, Stmt, StmtKind, TraitDecl,
    TraitMethod, TypeExpr, TypeExprKind,
};
use crate::Parser;

impl<'a> Parser<'a> {
    /// `[async] [pure] def name[<T: Bound>](params) [-> type]: suite`
    pub(crate) fn parse_function(&mut self) -> CompileResult<FunctionDecl> {
        let start = self.current_span();
        let mut is_async = false;
        let mut is_pure = false;
        loop {
            match self.peek_kind() {
                TokenKind::Async if !is_async => {
                    self.advance();
                    is_async = true;
                }
                TokenKind::Pure if !is_pure => {
                    self.advance();
                    is_pure = true;
                }
                _ => break,
            }
        }
        self.expect(TokenKind::Def, "`def`")?;
        let name = self.expect(TokenKind::Ident, "function name")?;
        let generics = self.parse_generic_params()?;
        let params = self.parse_params()?;
        let ret = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_suite()?;
        let span = start.to(self.prev_span());
        Ok(FunctionDecl {
            name: name.text,
            generics,
            params,
            ret,
            body,
            is_async,
            is_pure,
            span,
        })
    }

    /// `(self, move name: type, …)` — `self` is only legal first and
    /// only inside class/trait/impl bodies; the analyzer enforces that.
    fn parse_params(&mut self) -> CompileResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let is_move = self.eat(TokenKind::Move).is_some();
                let name = self.expect(TokenKind::Ident, "parameter name")?;
                if name.text.as_str() == "self" && params.is_empty() && !is_move {
                    params.push(Param {
                        name: name.text,
                        ty: TypeExpr::new(TypeExprKind::SelfType, name.span),
                        is_move: false,
                        span: name.span,
                    });
                } else {
                    self.expect(TokenKind::Colon, "`:` before parameter type")?;
                    let ty = self.parse_type()?;
                    params.push(Param {
                        name: name.text,
                        ty,
                        is_move,
                        span: name.span,
                    });
                }
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(params)
    }

    /// `class Name[<T>] [(Superclass)] [implements Tr1, Tr2]:` with a
    /// body of `name: type` fields and `def` methods.
    pub(crate) fn parse_class(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // class
        let name = self.expect(TokenKind::Ident, "class name")?;
        let generics = self.parse_generic_params()?;
        let superclass = if self.eat(TokenKind::LParen).is_some() {
            let base = self.parse_type()?;
            self.expect(TokenKind::RParen, "`)`")?;
            Some(base)
        } else {
            None
        };
        let mut traits = Vec::new();
        if self.eat(TokenKind::Implements).is_some() {
            loop {
                traits.push(self.parse_type()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "a newline")?;
        self.expect(TokenKind::Indent, "an indented class body")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Dedent) && !self.at_end() {
            match self.peek_kind() {
                TokenKind::Def | TokenKind::Async | TokenKind::Pure => {
                    methods.push(self.parse_function()?);
                }
                TokenKind::Ident => {
                    let field_name = self.advance();
                    self.expect(TokenKind::Colon, "`:` before field type")?;
                    let ty = self.parse_type()?;
                    let span = field_name.span.to(self.prev_span());
                    fields.push(FieldDecl {
                        name: field_name.text,
                        ty,
                        span,
                    });
                }
                _ => {
                    let err = self.report_unexpected("expected a field or method");
                    self.synchronize();
                    let _ = err;
                }
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of class body")?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::Class(ClassDecl {
                name: name.text,
                generics,
                superclass,
                traits,
                fields,
                methods,
                span,
            }),
            span,
        ))
    }

    /// `trait Name:` with required signatures and optional default
    /// bodies.
    pub(crate) fn parse_trait(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // trait
        let name = self.expect(TokenKind::Ident, "trait name")?;
        let generics = self.parse_generic_params()?;
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "a newline")?;
        self.expect(TokenKind::Indent, "an indented trait body")?;

        let mut trait_methods = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Dedent) && !self.at_end() {
            trait_methods.push(self.parse_trait_method()?);
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of trait body")?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::Trait(TraitDecl {
                name: name.text,
                generics,
                methods: trait_methods,
                span,
            }),
            span,
        ))
    }

    /// A trait method: `def m(self, x: int) -> int` (required) or the
    /// same followed by `:` and a suite (default body).
    fn parse_trait_method(&mut self) -> CompileResult<TraitMethod> {
        let start = self.current_span();
        let mut is_async = false;
        if self.check(TokenKind::Async) {
            self.advance();
            is_async = true;
        }
        self.expect(TokenKind::Def, "`def`")?;
        let name = self.expect(TokenKind::Ident, "method name")?;
        let generics = self.parse_generic_params()?;
        let params = self.parse_params()?;
        let ret = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let (body, has_default) = if self.check(TokenKind::Colon) {
            (self.parse_suite()?, true)
        } else {
            (Vec::new(), false)
        };
        let span = start.to(self.prev_span());
        Ok(TraitMethod {
            decl: FunctionDecl {
                name: name.text,
                generics,
                params,
                ret,
                body,
                is_async,
                is_pure: false,
                span,
            },
            has_default,
        })
    }

    /// `impl Trait for Type:` or `impl Type:` (extension methods).
    pub(crate) fn parse_impl(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // impl
        let first = self.parse_type()?;
        let (trait_name, target) = if self.eat(TokenKind::For).is_some() {
            let trait_name = named_type_symbol(&first).ok_or_else(|| {
                self.report_unexpected("expected a trait name before `for`")
            })?;
            let target = self.parse_type()?;
            (Some(trait_name), target)
        } else {
            (None, first)
        };
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "a newline")?;
        self.expect(TokenKind::Indent, "an indented impl body")?;

        let mut methods = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Dedent) && !self.at_end() {
            methods.push(self.parse_function()?);
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of impl body")?;
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::Impl(ImplDecl {
                trait_name,
                target,
                methods,
                span,
            }),
            span,
        ))
    }

    /// `import a.b [as c]` or `from a.b import x [as y], …` or
    /// `from a.b import *`.
    pub(crate) fn parse_import(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        if self.eat(TokenKind::Import).is_some() {
            let path = self.parse_dotted_path()?;
            let alias = if self.eat(TokenKind::As).is_some() {
                Some(self.expect(TokenKind::Ident, "alias name")?.text)
            } else {
                None
            };
            let span = start.to(self.prev_span());
            return Ok(Stmt::new(
                StmtKind::Import(ImportDecl {
                    path,
                    items: None,
                    alias,
                    span,
                }),
                span,
            ));
        }

        self.expect(TokenKind::From, "`from`")?;
        let path = self.parse_dotted_path()?;
        self.expect(TokenKind::Import, "`import`")?;
        let items = if self.eat(TokenKind::Star).is_some() {
            Vec::new()
        } else {
            let mut items: Vec<(Symbol, Option<Symbol>)> = Vec::new();
            loop {
                let item = self.expect(TokenKind::Ident, "imported name")?;
                let alias = if self.eat(TokenKind::As).is_some() {
                    Some(self.expect(TokenKind::Ident, "alias name")?.text)
                } else {
                    None
                };
                items.push((item.text, alias));
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            items
        };
        let span = start.to(self.prev_span());
        Ok(Stmt::new(
            StmtKind::Import(ImportDecl {
                path,
                items: Some(items),
                alias: None,
                span,
            }),
            span,
        ))
    }
}

/// The symbol of a bare named type, if that is what the type is.
fn named_type_symbol(ty: &TypeExpr) -> Option<Symbol> {
    match &ty.kind {
        TypeExprKind::Named { name, args } if args.is_empty() => Some(*name),
        _ => None,
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
    fn test_generic_function_with_bounds() {
        let body = stmts("def largest<T: Ord + Clone>(items: [T]) -> T:\n    return items[0]\n");
        let StmtKind::Function(func) = &body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(func.generics.len(), 1);
        assert_eq!(func.generics[0].bounds.len(), 2);
        assert_eq!(func.params.len(), 1);
    }

    #[test]
    fn test_async_and_move_params() {
        let body = stmts("async def send_all(move data: string) -> int:\n    return 0\n");
        let StmtKind::Function(func) = &body[0].kind else {
            panic!("expected function");
        };
        assert!(func.is_async);
        assert!(func.params[0].is_move);
    }

    #[test]
    fn test_class_with_fields_and_methods() {
        let source = "class Point implements Printable:\n    x: int\n    y: int\n    def norm(self) -> int:\n        return self.x * self.x + self.y * self.y\n";
        let body = stmts(source);
        let StmtKind::Class(class) = &body[0].kind else {
            panic!("expected class");
        };
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.traits.len(), 1);
        assert!(class.superclass.is_none());
    }

    #[test]
    fn test_class_with_superclass() {
        let body = stmts("class Dog(Animal):\n    def bark(self):\n        return\n");
        let StmtKind::Class(class) = &body[0].kind else {
            panic!("expected class");
        };
        assert!(class.superclass.is_some());
    }

    #[test]
    fn test_trait_with_default_body() {
        let source = "trait Greet:\n    def name(self) -> string\n    def greet(self) -> string:\n        return \"hi\"\n";
        let body = stmts(source);
        let StmtKind::Trait(tr) = &body[0].kind else {
            panic!("expected trait");
        };
        assert_eq!(tr.methods.len(), 2);
        assert!(!tr.methods[0].has_default);
        assert!(tr.methods[1].has_default);
    }

    #[test]
    fn test_impl_trait_for_type() {
        let source = "impl Greet for Dog:\n    def name(self) -> string:\n        return \"dog\"\n";
        let body = stmts(source);
        let StmtKind::Impl(im) = &body[0].kind else {
            panic!("expected impl");
        };
        assert_eq!(im.trait_name.map(|s| s.as_str().to_string()), Some("Greet".into()));
        assert_eq!(im.methods.len(), 1);
    }

    #[test]
    fn test_extension_impl() {
        let source = "impl string:\n    def shout(self) -> string:\n        return self\n";
        let body = stmts(source);
        let StmtKind::Impl(im) = &body[0].kind else {
            panic!("expected impl");
        };
        assert!(im.trait_name.is_none());
    }

    #[test]
    fn test_import_star() {
        let body = stmts("from util.text import *\n");
        let StmtKind::Import(import) = &body[0].kind else {
            panic!("expected import");
        };
        assert_eq!(import.items.as_deref(), Some(&[][..]));
    }
}
