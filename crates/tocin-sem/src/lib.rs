//! tocin-sem - Semantic analysis for Tocin.
//!
//! Resolves names, infers and checks types, enforces trait conformance
//! and object safety, null-safety, ownership/move rules, and
//! Option/Result exhaustiveness, and caches generic instantiations for
//! the lowerer. The analyzer owns the scope stack and the type,
//! class/trait/impl, and instantiation tables; it mutates only the type
//! annotation slot of AST expressions. Non-fatal failures poison the
//! offending expression with the `unknown` type so downstream checks
//! keep running without cascading errors.

pub mod analysis;
pub mod modules;
pub mod registry;
pub mod scope;
pub mod types;

mod infer;

#[cfg(test)]
mod edge_cases;

pub use analysis::{Analysis, Analyzer, FeatureToggles};
pub use modules::ModuleGraph;
pub use registry::{ClassInfo, FuncSig, ImplInfo, InstantiationCache, Registries, TraitInfo};
pub use scope::{OwnState, ScopeKind, ScopeStack, SymbolInfo, SymbolKind};
pub use types::{TypeKind, TypeTable};

use tocin_par::ast::Module;
use tocin_util::Handler;

/// Analyze a single already-parsed module with default toggles.
/// Convenience for the driver's single-file path, the REPL, and tests.
pub fn analyze_module(module: &mut Module, handler: &Handler) -> Analysis {
    let analyzer = Analyzer::new(handler, FeatureToggles::default());
    analyzer.analyze_program(std::slice::from_mut(module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tocin_par::parse_source;
    use tocin_util::diagnostic::codes;
    use tocin_util::DiagnosticCode;

    fn analyze(source: &str) -> (Handler, Analysis) {
        let handler = Handler::new();
        let mut module = parse_source(source, "test", &handler);
        assert!(
            !handler.has_errors(),
            "parse errors: {:?}",
            handler.diagnostics()
        );
        let analysis = analyze_module(&mut module, &handler);
        (handler, analysis)
    }

    fn assert_clean(source: &str) {
        let (handler, _) = analyze(source);
        let rendered: Vec<String> = handler
            .diagnostics()
            .iter()
            .map(|d| format!("{}: {}", d.code, d.message))
            .collect();
        assert!(!handler.has_errors(), "unexpected errors: {rendered:?}");
    }

    fn assert_code(source: &str, code: DiagnosticCode) {
        let (handler, _) = analyze(source);
        let codes_seen: Vec<_> = handler.diagnostics().iter().map(|d| d.code).collect();
        assert!(
            codes_seen.contains(&code),
            "expected {code}, got {codes_seen:?}"
        );
    }

    #[test]
    fn test_arithmetic_promotion() {
        let handler = Handler::new();
        let mut module = parse_source("let x = 1 + 2.0\n", "test", &handler);
        let analysis = analyze_module(&mut module, &handler);
        assert!(!handler.has_errors());
        // The initializer's annotation is float.
        let tocin_par::ast::StmtKind::Let { init: Some(init), .. } = &module.body[0].kind else {
            panic!("expected let");
        };
        let ty = init.ty.expect("expression must be annotated");
        assert_eq!(analysis.types.display(ty), "float");
    }

    #[test]
    fn test_every_expression_annotated_after_clean_analysis() {
        let handler = Handler::new();
        let source = "def f(a: int, b: float) -> float:\n    let c = a + b\n    return c * 2.0\n";
        let mut module = parse_source(source, "test", &handler);
        let analysis = analyze_module(&mut module, &handler);
        assert!(!handler.has_errors());

        fn walk_expr(e: &tocin_par::ast::Expr, types: &TypeTable) {
            let ty = e.ty.expect("unannotated expression after clean analysis");
            assert_ne!(types.display(ty), "unknown");
            use tocin_par::ast::ExprKind::*;
            match &e.kind {
                Binary { lhs, rhs, .. } => {
                    walk_expr(lhs, types);
                    walk_expr(rhs, types);
                }
                Unary { operand, .. } | Group(operand) => walk_expr(operand, types),
                _ => {}
            }
        }
        fn walk(stmts: &[tocin_par::ast::Stmt], types: &TypeTable) {
            for s in stmts {
                use tocin_par::ast::StmtKind::*;
                match &s.kind {
                    Expr(e) | Return(Some(e)) => walk_expr(e, types),
                    Let { init: Some(e), .. } => walk_expr(e, types),
                    Function(f) => walk(&f.body, types),
                    _ => {}
                }
            }
        }
        walk(&module.body, &analysis.types);
    }

    #[test]
    fn test_undefined_variable() {
        assert_code("let x = missing\n", codes::T002_UNDEFINED_VARIABLE);
    }

    #[test]
    fn test_null_narrowing_permits_return() {
        assert_clean(
            "def g(x: int?) -> int:\n    if x != nil:\n        return x\n    else:\n        return 0\n",
        );
    }

    #[test]
    fn test_missing_null_check_is_reported() {
        assert_code(
            "def g(x: int?) -> int:\n    return x\n",
            codes::N003_NULLABLE_DEREFERENCE,
        );
    }

    #[test]
    fn test_nullable_assignment_reported() {
        assert_code(
            "def h(x: int?):\n    let y: int = x\n",
            codes::N001_NULLABLE_ASSIGNMENT,
        );
    }

    #[test]
    fn test_narrowing_invalidated_by_assignment() {
        assert_code(
            "def g(x: int?) -> int:\n    if x != nil:\n        x = nil\n        return x\n    return 0\n",
            codes::N003_NULLABLE_DEREFERENCE,
        );
    }

    #[test]
    fn test_safe_call_and_coalesce() {
        assert_clean(
            "class Box:\n    value: int\ndef f(b: Box?) -> int:\n    return b?.value ?: 0\n",
        );
    }

    #[test]
    fn test_option_exhaustiveness() {
        assert_clean(
            "def f(opt: Option<int>) -> int:\n    match opt:\n        case Some(v):\n            return v\n        case None:\n            return 0\n",
        );
        assert_code(
            "def f(opt: Option<int>) -> int:\n    match opt:\n        case Some(v):\n            return v\n    return 0\n",
            codes::P001_NON_EXHAUSTIVE_PATTERNS,
        );
    }

    #[test]
    fn test_wildcard_satisfies_exhaustiveness() {
        assert_clean(
            "def f(r: Result<int, string>) -> int:\n    match r:\n        case Ok(v):\n            return v\n        case _:\n            return 0\n",
        );
    }

    #[test]
    fn test_use_after_move() {
        assert_code(
            "let a = \"hi\"\nlet b = move a\nprint(a)\n",
            codes::O002_USE_AFTER_MOVE,
        );
    }

    #[test]
    fn test_reassignment_revives_moved_binding() {
        assert_clean("let a = \"hi\"\nlet b = move a\na = \"again\"\nprint(a)\n");
    }

    #[test]
    fn test_move_parameter_moves_argument() {
        assert_code(
            "def eat(move s: string):\n    print(s)\nlet a = \"x\"\neat(a)\nprint(a)\n",
            codes::O002_USE_AFTER_MOVE,
        );
    }

    #[test]
    fn test_generic_instantiations_cached_once_per_tuple() {
        let (handler, analysis) = analyze(
            "def id<T>(x: T) -> T:\n    return x\nid<int>(1)\nid<string>(\"a\")\nid<int>(2)\n",
        );
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        let mangled: Vec<&str> = analysis
            .instantiations
            .iter()
            .map(|i| i.mangled.as_str())
            .collect();
        assert_eq!(mangled, vec!["id_int", "id_string"]);
    }

    #[test]
    fn test_generic_inference_without_explicit_args() {
        assert_clean("def id<T>(x: T) -> T:\n    return x\nlet n = id(42)\n");
    }

    #[test]
    fn test_trait_bound_enforced() {
        assert_code(
            "trait Show:\n    def show(self) -> string\ndef shout<T: Show>(x: T) -> string:\n    return x.show()\nshout<int>(1)\n",
            codes::T030_TRAIT_BOUND_NOT_SATISFIED,
        );
    }

    #[test]
    fn test_trait_bound_satisfied_via_impl() {
        assert_clean(
            "trait Show:\n    def show(self) -> string\nimpl Show for int:\n    def show(self) -> string:\n        return \"int\"\ndef shout<T: Show>(x: T) -> string:\n    return x.show()\nshout<int>(1)\n",
        );
    }

    #[test]
    fn test_missing_trait_method() {
        assert_code(
            "trait Greet:\n    def hello(self) -> string\n    def bye(self) -> string\nclass P:\n    x: int\nimpl Greet for P:\n    def hello(self) -> string:\n        return \"hi\"\n",
            codes::T031_MISSING_TRAIT_METHOD,
        );
    }

    #[test]
    fn test_default_method_fills_gap() {
        assert_clean(
            "trait Greet:\n    def hello(self) -> string\n    def bye(self) -> string:\n        return \"bye\"\nclass P:\n    x: int\nimpl Greet for P:\n    def hello(self) -> string:\n        return \"hi\"\n",
        );
    }

    #[test]
    fn test_trait_signature_mismatch() {
        assert_code(
            "trait Greet:\n    def hello(self) -> string\nclass P:\n    x: int\nimpl Greet for P:\n    def hello(self) -> int:\n        return 1\n",
            codes::T032_TRAIT_SIGNATURE_MISMATCH,
        );
    }

    #[test]
    fn test_object_safety() {
        assert_code(
            "trait Cmp:\n    def cmp(self, other: Cmp) -> int\ndef f(c: Cmp) -> int:\n    return 0\n",
            codes::T033_NOT_OBJECT_SAFE,
        );
    }

    #[test]
    fn test_await_outside_async() {
        assert_code(
            "def f(fut: Future<int>) -> int:\n    return await fut\n",
            codes::T009_AWAIT_OUTSIDE_ASYNC,
        );
    }

    #[test]
    fn test_await_inside_async() {
        assert_clean(
            "async def fetch() -> int:\n    return 1\nasync def caller() -> int:\n    return await fetch()\n",
        );
    }

    #[test]
    fn test_go_requires_call() {
        assert_code("def w():\n    return\ngo w\n", codes::T010_INVALID_GO_TARGET);
        assert_clean("def w():\n    return\ngo w()\n");
    }

    #[test]
    fn test_channel_send_type() {
        assert_clean("def f(ch: Chan<int>):\n    ch <- 1\n");
        assert_code(
            "def f(ch: Chan<int>):\n    ch <- \"text\"\n",
            codes::T001_TYPE_MISMATCH,
        );
    }

    #[test]
    fn test_channel_recv_type() {
        assert_clean("def f(ch: Chan<int>) -> int:\n    return <-ch\n");
    }

    #[test]
    fn test_select_cases_checked_independently() {
        assert_clean(
            "def f(a: Chan<int>, b: Chan<string>):\n    select:\n        case v = <-a:\n            print(v)\n        case b <- \"x\":\n            print(\"sent\")\n        default:\n            print(\"idle\")\n",
        );
    }

    #[test]
    fn test_missing_return_reported() {
        assert_code(
            "def f(flag: bool) -> int:\n    if flag:\n        return 1\n",
            codes::T013_MISSING_RETURN,
        );
    }

    #[test]
    fn test_assign_to_const() {
        assert_code("const k = 1\nk = 2\n", codes::T014_ASSIGN_TO_IMMUTABLE);
    }

    #[test]
    fn test_method_resolution_inherent_wins() {
        assert_clean(
            "trait Speak:\n    def sound(self) -> string:\n        return \"?\"\nclass Dog:\n    x: int\n    def sound(self) -> string:\n        return \"woof\"\nimpl Speak for Dog:\n    def sound(self) -> string:\n        return \"generic\"\ndef f(d: Dog) -> string:\n    return d.sound()\n",
        );
    }

    #[test]
    fn test_ambiguous_method() {
        assert_code(
            "trait A:\n    def go(self) -> int:\n        return 1\ntrait B:\n    def go(self) -> int:\n        return 2\nclass C:\n    x: int\nimpl A for C:\n    def go(self) -> int:\n        return 1\nimpl B for C:\n    def go(self) -> int:\n        return 2\ndef f(c: C) -> int:\n    return c.go()\n",
            codes::M001_AMBIGUOUS_METHOD,
        );
    }

    #[test]
    fn test_extension_function() {
        assert_clean(
            "impl string:\n    def shout(self) -> string:\n        return self\nlet s = \"hi\".shout()\n",
        );
    }

    #[test]
    fn test_string_indexing_yields_char() {
        let handler = Handler::new();
        let mut module = parse_source("let c = \"abc\"[0]\n", "test", &handler);
        let analysis = analyze_module(&mut module, &handler);
        assert!(!handler.has_errors());
        let tocin_par::ast::StmtKind::Let { init: Some(init), .. } = &module.body[0].kind else {
            panic!();
        };
        assert_eq!(analysis.types.display(init.ty.unwrap()), "char");
    }

    #[test]
    fn test_class_field_and_method_access() {
        assert_clean(
            "class Point:\n    x: int\n    y: int\n    def norm(self) -> int:\n        return self.x * self.x + self.y * self.y\ndef f() -> int:\n    let p = new Point(1, 2)\n    return p.norm() + p.x\n",
        );
    }
}
