//! Parser behavior on malformed and boundary inputs.

use tocin_util::diagnostic::codes;
use tocin_util::Handler;

use crate::ast::StmtKind;
use crate::parse_source;

#[test]
fn test_empty_source() {
    let handler = Handler::new();
    let module = parse_source("", "test", &handler);
    assert!(module.body.is_empty());
    assert!(!handler.has_errors());
}

#[test]
fn test_only_comments_and_blank_lines() {
    let handler = Handler::new();
    let module = parse_source("# nothing here\n\n   # still nothing\n", "test", &handler);
    assert!(module.body.is_empty());
    assert!(!handler.has_errors());
}

#[test]
fn test_recovery_skips_to_next_def() {
    let source = "def broken(:\n    return 1\ndef fine():\n    return 2\n";
    let handler = Handler::new();
    let module = parse_source(source, "test", &handler);
    assert!(handler.has_errors());
    assert!(module.body.iter().any(
        |s| matches!(&s.kind, StmtKind::Function(f) if f.name.as_str() == "fine")
    ));
}

#[test]
fn test_multiple_independent_errors_reported() {
    let source = "let = 1\nlet = 2\nlet ok = 3\n";
    let handler = Handler::new();
    let module = parse_source(source, "test", &handler);
    assert!(handler.error_count() >= 2);
    assert!(module
        .body
        .iter()
        .any(|s| matches!(&s.kind, StmtKind::Let { name, .. } if name.as_str() == "ok")));
}

#[test]
fn test_unexpected_eof_in_block() {
    let handler = Handler::new();
    parse_source("def f():\n", "test", &handler);
    assert!(handler.has_errors());
}

#[test]
fn test_missing_paren_reports_expected_token() {
    let handler = Handler::new();
    parse_source("let x = (1 + 2\n", "test", &handler);
    assert!(handler
        .diagnostics()
        .iter()
        .any(|d| d.code == codes::P003_EXPECTED_TOKEN || d.code == codes::P006_UNEXPECTED_EOF));
}

#[test]
fn test_deeply_nested_expression() {
    let mut source = String::from("let x = ");
    for _ in 0..40 {
        source.push('(');
    }
    source.push('1');
    for _ in 0..40 {
        source.push(')');
    }
    source.push('\n');
    let handler = Handler::new();
    let module = parse_source(&source, "test", &handler);
    assert!(!handler.has_errors());
    assert_eq!(module.body.len(), 1);
}

#[test]
fn test_statement_after_inline_suite() {
    let source = "if a: x = 1\nlet y = 2\n";
    let handler = Handler::new();
    let module = parse_source(source, "test", &handler);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    assert_eq!(module.body.len(), 2);
}
