//! Analyzer behavior on degraded and boundary inputs.

use tocin_par::parse_source;
use tocin_util::diagnostic::codes;
use tocin_util::Handler;

use crate::analyze_module;

fn run(source: &str) -> Handler {
    let handler = Handler::new();
    let mut module = parse_source(source, "test", &handler);
    analyze_module(&mut module, &handler);
    handler
}

#[test]
fn test_unknown_operands_do_not_cascade() {
    // `missing` is undefined; the additions over the poisoned value
    // must not produce further errors.
    let handler = run("let x = missing + 1 + 2 + 3\n");
    assert_eq!(handler.error_count(), 1);
    assert_eq!(
        handler.diagnostics()[0].code,
        codes::T002_UNDEFINED_VARIABLE
    );
}

#[test]
fn test_poisoned_call_does_not_cascade() {
    let handler = run("let x = missing(1, 2)\nlet y = x + 1\n");
    assert_eq!(handler.error_count(), 1);
}

#[test]
fn test_independent_errors_all_reported() {
    let handler = run("let a: int = \"s\"\nlet b: bool = 3\n");
    assert_eq!(handler.error_count(), 2);
}

#[test]
fn test_forward_reference_between_functions() {
    let handler = run("def first() -> int:\n    return second()\ndef second() -> int:\n    return 1\n");
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
}

#[test]
fn test_forward_reference_between_classes() {
    let source = "class A:\n    partner: B?\nclass B:\n    partner: A?\n";
    let handler = run(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
}

#[test]
fn test_duplicate_function_reported() {
    let handler = run("def f():\n    return\ndef f():\n    return\n");
    assert!(handler
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::T007_DUPLICATE_DEFINITION));
}

#[test]
fn test_shadowing_in_nested_scope_is_fine() {
    let handler = run("let x = 1\nif true:\n    let x = \"inner\"\n    print(x)\nprint(x)\n");
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
}

#[test]
fn test_return_at_top_level() {
    let handler = run("return 1\n");
    assert!(handler
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::T008_RETURN_OUTSIDE_FUNCTION));
}

#[test]
fn test_scope_exit_on_error_path_does_not_leak() {
    // The inner `let` fails to type-check, but the scope machinery
    // still pops cleanly and the outer `y` stays visible.
    let source = "let y = 1\nif true:\n    let z: int = \"bad\"\nlet w = y\n";
    let handler = run(source);
    let t002 = handler
        .diagnostics()
        .iter()
        .filter(|d| d.code == codes::T002_UNDEFINED_VARIABLE)
        .count();
    assert_eq!(t002, 0);
    assert_eq!(handler.error_count(), 1);
}

#[test]
fn test_lambda_capture_of_moved_binding() {
    let handler = run("let s = \"x\"\nlet t = move s\nlet f = lambda (n: int) -> string: s\n");
    assert!(handler
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::O002_USE_AFTER_MOVE));
}

#[test]
fn test_move_of_captured_binding_rejected() {
    let handler = run("let s = \"x\"\nlet f = lambda (n: int) -> string: move s\n");
    assert!(handler
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::O003_MOVE_OF_CAPTURED));
}

#[test]
fn test_feature_toggle_disables_concurrency() {
    use crate::{Analyzer, FeatureToggles};
    let handler = Handler::new();
    let mut module = parse_source("def w():\n    return\ngo w()\n", "test", &handler);
    let toggles = FeatureToggles {
        allow_concurrency: false,
        ..FeatureToggles::default()
    };
    let analyzer = Analyzer::new(&handler, toggles);
    analyzer.analyze_program(std::slice::from_mut(&mut module));
    assert!(handler
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::G001_FEATURE_DISABLED));
}
