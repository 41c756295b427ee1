//! AST pretty-printer.
//!
//! Renders a module back to surface syntax. The output is canonical
//! (indented suites, one statement per line) and re-parses to a
//! structurally equal AST; `--dump-ast` and the round-trip tests both
//! go through here.

use crate::ast::*;

/// Render a module as canonical source text.
pub fn pretty_print(module: &Module) -> String {
    let mut p = Printer::new();
    for stmt in &module.body {
        p.stmt(stmt);
    }
    p.out
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn newline(&mut self) {
        self.out.push('\n');
    }

    fn suite(&mut self, body: &[Stmt]) {
        self.write(":");
        self.newline();
        self.indent += 1;
        if body.is_empty() {
            // An empty suite still needs a statement to re-parse.
            self.line_start();
            self.write("0");
            self.newline();
        }
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.line_start();
                self.expr(e);
                self.newline();
            }
            StmtKind::Let {
                name,
                ty,
                init,
                mutable,
                ..
            } => {
                self.line_start();
                self.write(if *mutable { "let " } else { "const " });
                self.write(name.as_str());
                if let Some(ty) = ty {
                    self.write(": ");
                    self.type_expr(ty);
                }
                if let Some(init) = init {
                    self.write(" = ");
                    self.expr(init);
                }
                self.newline();
            }
            StmtKind::If {
                cond,
                then_body,
                elifs,
                else_body,
            } => {
                self.line_start();
                self.write("if ");
                self.expr(cond);
                self.suite(then_body);
                for (elif_cond, elif_body) in elifs {
                    self.line_start();
                    self.write("elif ");
                    self.expr(elif_cond);
                    self.suite(elif_body);
                }
                if let Some(else_body) = else_body {
                    self.line_start();
                    self.write("else");
                    self.suite(else_body);
                }
            }
            StmtKind::While { cond, body } => {
                self.line_start();
                self.write("while ");
                self.expr(cond);
                self.suite(body);
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                self.line_start();
                self.write("for ");
                self.write(var.as_str());
                self.write(" in ");
                self.expr(iterable);
                self.suite(body);
            }
            StmtKind::Function(func) => self.function(func),
            StmtKind::Return(value) => {
                self.line_start();
                self.write("return");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value);
                }
                self.newline();
            }
            StmtKind::Class(class) => self.class(class),
            StmtKind::Trait(tr) => self.trait_decl(tr),
            StmtKind::Impl(im) => self.impl_decl(im),
            StmtKind::Import(import) => self.import(import),
            StmtKind::Export(inner) => {
                // `export` prefixes the inner statement's first line.
                self.line_start();
                self.write("export ");
                let mark = self.out.len();
                self.stmt(inner);
                // Drop the duplicated indentation the inner statement
                // emitted.
                let inner_text = self.out.split_off(mark);
                let trimmed = inner_text.trim_start_matches(' ');
                let trimmed = trimmed.to_string();
                self.out.push_str(&trimmed);
            }
            StmtKind::Module(path) => {
                self.line_start();
                self.write("module ");
                let dotted: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
                self.write(&dotted.join("."));
                self.newline();
            }
            StmtKind::Match { scrutinee, cases } => {
                self.line_start();
                self.write("match ");
                self.expr(scrutinee);
                self.write(":");
                self.newline();
                self.indent += 1;
                for case in cases {
                    self.line_start();
                    self.write("case ");
                    self.pattern(&case.pattern);
                    self.suite(&case.body);
                }
                self.indent -= 1;
            }
            StmtKind::Go(call) => {
                self.line_start();
                self.write("go ");
                self.expr(call);
                self.newline();
            }
            StmtKind::Select { cases, default } => {
                self.line_start();
                self.write("select:");
                self.newline();
                self.indent += 1;
                for case in cases {
                    self.line_start();
                    self.write("case ");
                    match &case.op {
                        SelectOp::Recv { chan, binding } => {
                            if let Some(binding) = binding {
                                self.write(binding.as_str());
                                self.write(" = ");
                            }
                            self.write("<-");
                            self.expr(chan);
                        }
                        SelectOp::Send { chan, value } => {
                            self.expr(chan);
                            self.write(" <- ");
                            self.expr(value);
                        }
                    }
                    self.suite(&case.body);
                }
                if let Some(default) = default {
                    self.line_start();
                    self.write("default");
                    self.suite(default);
                }
                self.indent -= 1;
            }
            StmtKind::Error => {
                self.line_start();
                self.write("0");
                self.newline();
            }
        }
    }

    fn function(&mut self, func: &FunctionDecl) {
        self.line_start();
        if func.is_async {
            self.write("async ");
        }
        if func.is_pure {
            self.write("pure ");
        }
        self.write("def ");
        self.write(func.name.as_str());
        self.generics(&func.generics);
        self.params(&func.params);
        if let Some(ret) = &func.ret {
            self.write(" -> ");
            self.type_expr(ret);
        }
        self.suite(&func.body);
    }

    fn generics(&mut self, generics: &[GenericParam]) {
        if generics.is_empty() {
            return;
        }
        self.write("<");
        for (i, g) in generics.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write(g.name.as_str());
            if !g.bounds.is_empty() {
                self.write(": ");
                for (j, b) in g.bounds.iter().enumerate() {
                    if j > 0 {
                        self.write(" + ");
                    }
                    self.write(b.as_str());
                }
            }
        }
        self.write(">");
    }

    fn params(&mut self, params: &[Param]) {
        self.write("(");
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            if p.is_move {
                self.write("move ");
            }
            self.write(p.name.as_str());
            if !matches!(p.ty.kind, TypeExprKind::SelfType) {
                self.write(": ");
                self.type_expr(&p.ty);
            }
        }
        self.write(")");
    }

    fn class(&mut self, class: &ClassDecl) {
        self.line_start();
        self.write("class ");
        self.write(class.name.as_str());
        self.generics(&class.generics);
        if let Some(superclass) = &class.superclass {
            self.write("(");
            self.type_expr(superclass);
            self.write(")");
        }
        if !class.traits.is_empty() {
            self.write(" implements ");
            for (i, tr) in class.traits.iter().enumerate() {
                if i > 0 {
                    self.write(", ");
                }
                self.type_expr(tr);
            }
        }
        self.write(":");
        self.newline();
        self.indent += 1;
        for field in &class.fields {
            self.line_start();
            self.write(field.name.as_str());
            self.write(": ");
            self.type_expr(&field.ty);
            self.newline();
        }
        for method in &class.methods {
            self.function(method);
        }
        if class.fields.is_empty() && class.methods.is_empty() {
            self.line_start();
            self.write("0");
            self.newline();
        }
        self.indent -= 1;
    }

    fn trait_decl(&mut self, tr: &TraitDecl) {
        self.line_start();
        self.write("trait ");
        self.write(tr.name.as_str());
        self.generics(&tr.generics);
        self.write(":");
        self.newline();
        self.indent += 1;
        for method in &tr.methods {
            if method.has_default {
                self.function(&method.decl);
            } else {
                self.line_start();
                if method.decl.is_async {
                    self.write("async ");
                }
                self.write("def ");
                self.write(method.decl.name.as_str());
                self.generics(&method.decl.generics);
                self.params(&method.decl.params);
                if let Some(ret) = &method.decl.ret {
                    self.write(" -> ");
                    self.type_expr(ret);
                }
                self.newline();
            }
        }
        self.indent -= 1;
    }

    fn impl_decl(&mut self, im: &ImplDecl) {
        self.line_start();
        self.write("impl ");
        if let Some(trait_name) = im.trait_name {
            self.write(trait_name.as_str());
            self.write(" for ");
        }
        self.type_expr(&im.target);
        self.write(":");
        self.newline();
        self.indent += 1;
        for method in &im.methods {
            self.function(method);
        }
        self.indent -= 1;
    }

    fn import(&mut self, import: &ImportDecl) {
        self.line_start();
        let dotted: Vec<&str> = import.path.iter().map(|s| s.as_str()).collect();
        match &import.items {
            None => {
                self.write("import ");
                self.write(&dotted.join("."));
                if let Some(alias) = import.alias {
                    self.write(" as ");
                    self.write(alias.as_str());
                }
            }
            Some(items) if items.is_empty() => {
                self.write("from ");
                self.write(&dotted.join("."));
                self.write(" import *");
            }
            Some(items) => {
                self.write("from ");
                self.write(&dotted.join("."));
                self.write(" import ");
                for (i, (name, alias)) in items.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.write(name.as_str());
                    if let Some(alias) = alias {
                        self.write(" as ");
                        self.write(alias.as_str());
                    }
                }
            }
        }
        self.newline();
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match &pattern.kind {
            PatternKind::Constructor { name, args } => {
                self.write(name.as_str());
                // Bare `None` has no argument list.
                if !(args.is_empty() && name.as_str() == "None") {
                    self.write("(");
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            self.write(", ");
                        }
                        self.pattern(arg);
                    }
                    self.write(")");
                }
            }
            PatternKind::Literal(lit) => match lit {
                LiteralPat::Int(v) => self.write(&v.to_string()),
                LiteralPat::Float(v) => self.write(&format!("{v:?}")),
                LiteralPat::Str(s) => {
                    self.write(&escape_string(s.as_str()));
                }
                LiteralPat::Char(c) => self.write(&format!("'{c}'")),
                LiteralPat::Bool(b) => self.write(if *b { "true" } else { "false" }),
                LiteralPat::Nil => self.write("nil"),
            },
            PatternKind::Binding(name) => self.write(name.as_str()),
            PatternKind::Wildcard => self.write("_"),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(v) => self.write(&v.to_string()),
            ExprKind::Float(v) => self.write(&format!("{v:?}")),
            ExprKind::Bool(b) => self.write(if *b { "true" } else { "false" }),
            ExprKind::Str(s) => self.write(&escape_string(s.as_str())),
            ExprKind::Char(c) => self.write(&format!("'{c}'")),
            ExprKind::Nil => self.write("nil"),
            ExprKind::Var(name) => self.write(name.as_str()),
            ExprKind::Qualified { module, name } => {
                self.write(module.as_str());
                self.write("::");
                self.write(name.as_str());
            }
            ExprKind::Unary { op, operand } => {
                self.write(op.symbol());
                self.expr(operand);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs);
                self.write(" ");
                self.write(op.symbol());
                self.write(" ");
                self.expr(rhs);
            }
            ExprKind::Group(inner) => {
                self.write("(");
                self.expr(inner);
                self.write(")");
            }
            ExprKind::Assign { target, op, value } => {
                self.expr(target);
                match op {
                    Some(op) => {
                        self.write(" ");
                        self.write(op.symbol());
                        self.write("= ");
                    }
                    None => self.write(" = "),
                }
                self.expr(value);
            }
            ExprKind::Call {
                callee,
                generic_args,
                args,
            } => {
                self.expr(callee);
                if !generic_args.is_empty() {
                    self.write("<");
                    for (i, ty) in generic_args.iter().enumerate() {
                        if i > 0 {
                            self.write(", ");
                        }
                        self.type_expr(ty);
                    }
                    self.write(">");
                }
                self.write("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(arg);
                }
                self.write(")");
            }
            ExprKind::Field { object, name } => {
                self.expr(object);
                self.write(".");
                self.write(name.as_str());
            }
            ExprKind::SafeField { object, name } => {
                self.expr(object);
                self.write("?.");
                self.write(name.as_str());
            }
            ExprKind::NullAssert(inner) => {
                self.expr(inner);
                self.write("!!");
            }
            ExprKind::NullCoalesce { value, fallback } => {
                self.expr(value);
                self.write(" ?: ");
                self.expr(fallback);
            }
            ExprKind::Index { object, index } => {
                self.expr(object);
                self.write("[");
                self.expr(index);
                self.write("]");
            }
            ExprKind::List(elems) => {
                self.write("[");
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(e);
                }
                self.write("]");
            }
            ExprKind::Dict(entries) => {
                self.write("{");
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(k);
                    self.write(": ");
                    self.expr(v);
                }
                self.write("}");
            }
            ExprKind::Lambda { params, ret, body } => {
                self.write("lambda ");
                self.params(params);
                if let Some(ret) = ret {
                    self.write(" -> ");
                    self.type_expr(ret);
                }
                self.write(": ");
                self.expr(body);
            }
            ExprKind::Await(inner) => {
                self.write("await ");
                self.expr(inner);
            }
            ExprKind::Interp(parts) => {
                self.write("f\"");
                for part in parts {
                    match part {
                        InterpPart::Text(text) => {
                            self.write(&escape_fragment(text.as_str()));
                        }
                        InterpPart::Expr(e) => {
                            self.write("{");
                            self.expr(e);
                            self.write("}");
                        }
                    }
                }
                self.write("\"");
            }
            ExprKind::New { class, args } => {
                self.write("new ");
                self.type_expr(class);
                self.write("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(arg);
                }
                self.write(")");
            }
            ExprKind::Delete(inner) => {
                self.write("delete ");
                self.expr(inner);
            }
            ExprKind::Move(inner) => {
                self.write("move ");
                self.expr(inner);
            }
            ExprKind::ChanSend { chan, value } => {
                self.expr(chan);
                self.write(" <- ");
                self.expr(value);
            }
            ExprKind::ChanRecv(inner) => {
                self.write("<-");
                self.expr(inner);
            }
            ExprKind::OptionSome(inner) => {
                self.write("Some(");
                self.expr(inner);
                self.write(")");
            }
            ExprKind::OptionNone => self.write("None"),
            ExprKind::ResultOk(inner) => {
                self.write("Ok(");
                self.expr(inner);
                self.write(")");
            }
            ExprKind::ResultErr(inner) => {
                self.write("Err(");
                self.expr(inner);
                self.write(")");
            }
            ExprKind::Error => self.write("0"),
        }
    }

    fn type_expr(&mut self, ty: &TypeExpr) {
        match &ty.kind {
            TypeExprKind::Named { name, args } => {
                self.write(name.as_str());
                if !args.is_empty() {
                    self.write("<");
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            self.write(", ");
                        }
                        self.type_expr(arg);
                    }
                    self.write(">");
                }
            }
            TypeExprKind::SelfType => self.write("Self"),
            TypeExprKind::Nullable(inner) => {
                self.type_expr(inner);
                self.write("?");
            }
            TypeExprKind::Pointer(inner) => {
                self.write("*");
                self.type_expr(inner);
            }
            TypeExprKind::Reference { inner, mutable } => {
                self.write(if *mutable { "&mut " } else { "&" });
                self.type_expr(inner);
            }
            TypeExprKind::Tuple(elems) => {
                self.write("(");
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.type_expr(e);
                }
                self.write(")");
            }
            TypeExprKind::Array { elem, len } => {
                self.write("[");
                self.type_expr(elem);
                if let Some(len) = len {
                    self.write("; ");
                    self.write(&len.to_string());
                }
                self.write("]");
            }
            TypeExprKind::Dict { key, value } => {
                self.write("{");
                self.type_expr(key);
                self.write(": ");
                self.type_expr(value);
                self.write("}");
            }
            TypeExprKind::Func { params, ret } => {
                self.write("(");
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.type_expr(p);
                }
                self.write(") -> ");
                self.type_expr(ret);
            }
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    push_escaped(&mut out, s);
    out.push('"');
    out
}

/// Escape an f-string text fragment (no surrounding quotes).
fn escape_fragment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    push_escaped(&mut out, s);
    out
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;
    use tocin_util::Handler;

    /// Pretty-print, re-parse, pretty-print again: the second print
    /// must equal the first. This is the round-trip property in a form
    /// that is insensitive to spans.
    fn assert_round_trip(source: &str) {
        let handler = Handler::new();
        let module = parse_source(source, "test", &handler);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        let printed = pretty_print(&module);

        let handler2 = Handler::new();
        let reparsed = parse_source(&printed, "test", &handler2);
        assert!(
            !handler2.has_errors(),
            "printed output failed to re-parse:\n{printed}\n{:?}",
            handler2.diagnostics()
        );
        let printed_again = pretty_print(&reparsed);
        assert_eq!(printed, printed_again, "printer is not a fixpoint");
    }

    #[test]
    fn test_round_trip_function() {
        assert_round_trip("def add(a: int, b: int) -> int:\n    return a + b\n");
    }

    #[test]
    fn test_round_trip_control_flow() {
        assert_round_trip(
            "def f(n: int) -> int:\n    let total = 0\n    while n > 0:\n        total = total + n\n        n = n - 1\n    if total > 10:\n        return total\n    else:\n        return 0\n",
        );
    }

    #[test]
    fn test_round_trip_class_and_impl() {
        assert_round_trip(
            "class Point implements Show:\n    x: int\n    y: int\n    def sum(self) -> int:\n        return self.x + self.y\nimpl Show for Point:\n    def show(self) -> string:\n        return \"point\"\n",
        );
    }

    #[test]
    fn test_round_trip_match_and_option() {
        assert_round_trip(
            "def unwrap_or(opt: Option<int>, dflt: int) -> int:\n    match opt:\n        case Some(v):\n            return v\n        case None:\n            return dflt\n",
        );
    }

    #[test]
    fn test_round_trip_concurrency() {
        assert_round_trip(
            "def pump(input: Chan<int>, output: Chan<int>):\n    go relay(input)\n    select:\n        case v = <-input:\n            output <- v\n        default:\n            return\n",
        );
    }

    #[test]
    fn test_round_trip_strings_and_interp() {
        assert_round_trip("let banner = f\"value = {x + 1}, done\"\n");
        assert_round_trip("let s = \"tab\\there\"\n");
    }

    #[test]
    fn test_round_trip_generics_and_lambda() {
        assert_round_trip(
            "def apply<T, U: Show>(f: (T) -> U, x: T) -> U:\n    return f(x)\nlet double = lambda (n: int) -> int: n * 2\n",
        );
    }

    #[test]
    fn test_round_trip_grouping_preserved() {
        assert_round_trip("let x = (1 + 2) * 3\n");
    }

    #[test]
    fn test_round_trip_imports() {
        assert_round_trip("import util.text as t\nfrom util.math import abs, floor as f\n");
    }
}
