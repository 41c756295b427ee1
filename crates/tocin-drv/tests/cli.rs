//! End-to-end driver tests: invoke the `tocin` binary against real
//! files and check exit codes, diagnostics format, and outputs.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn tocin() -> Command {
    Command::cargo_bin("tocin").expect("binary builds")
}

#[test]
fn test_help() {
    tocin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ahead-of-time compiler"));
}

#[test]
fn test_no_input_is_usage_error() {
    tocin().assert().code(1).stderr(predicate::str::contains("no input file"));
}

#[test]
fn test_compiles_simple_program() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("hello.to");
    fs::write(&input, "def main():\n    print(\"hello\")\n").unwrap();

    tocin().arg(&input).assert().success();

    let output = input.with_extension("ll");
    let ir = fs::read_to_string(output).expect("IR written next to the input");
    assert!(ir.contains("define i32 @main"));
    assert!(ir.contains("tocin_main"));
}

#[test]
fn test_dump_ir_prints_module() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("x.to");
    fs::write(&input, "let x = 1 + 2.0\n").unwrap();

    tocin()
        .arg(&input)
        .arg("--dump-ir")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitofp"));
}

#[test]
fn test_dump_ast_round_trips() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("f.to");
    fs::write(&input, "def add(a: int, b: int) -> int:\n    return a + b\n").unwrap();

    tocin()
        .arg(&input)
        .arg("--dump-ast")
        .assert()
        .success()
        .stdout(predicate::str::contains("def add(a: int, b: int) -> int:"));
}

#[test]
fn test_type_error_fails_with_rendered_diagnostic() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.to");
    fs::write(&input, "let x = missing\n").unwrap();

    tocin()
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("T002_UNDEFINED_VARIABLE"))
        .stderr(predicate::str::contains("bad.to:1:9: error:"));
}

#[test]
fn test_null_safety_violation_reported() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("nullable.to");
    fs::write(&input, "def g(x: int?) -> int:\n    return x\n").unwrap();

    tocin()
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("N003_NULLABLE_DEREFERENCE"));
}

#[test]
fn test_use_after_move_reported() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("moved.to");
    fs::write(&input, "let a = \"hi\"\nlet b = move a\nprint(a)\n").unwrap();

    tocin()
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("O002_USE_AFTER_MOVE"));
}

#[test]
fn test_invalid_utf8_inside_string_literal_is_accepted() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("raw.to");
    // The 0xFF byte sits inside a string literal and must pass through
    // verbatim rather than fail the whole file.
    fs::write(&input, b"let s = \"a\xffb\"\nprint(s)\n".to_vec()).unwrap();

    tocin().arg(&input).assert().success();
}

#[test]
fn test_invalid_utf8_outside_string_literal_is_lexer_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("raw.to");
    fs::write(&input, b"let \xff = 1\n".to_vec()).unwrap();

    tocin()
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("L001_UNEXPECTED_CHARACTER"));
}

#[test]
fn test_module_import_via_search_path() {
    let dir = TempDir::new().unwrap();
    let lib_dir = dir.path().join("libs").join("util");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(
        lib_dir.join("text.to"),
        "export def shout(s: string) -> string:\n    return s + \"!\"\n",
    )
    .unwrap();

    let input = dir.path().join("app.to");
    fs::write(
        &input,
        "from util.text import shout\nlet s = shout(\"hey\")\n",
    )
    .unwrap();

    tocin()
        .arg(&input)
        .env("TOCIN_MODULE_PATH", dir.path().join("libs"))
        .assert()
        .success();
}

#[test]
fn test_missing_module_reports_io_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("app.to");
    fs::write(&input, "import nowhere.at.all\n").unwrap();

    tocin()
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("I002_MODULE_NOT_FOUND"));
}

#[test]
fn test_cyclic_import_is_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.to"), "import b\nexport let x = 1\n").unwrap();
    fs::write(dir.path().join("b.to"), "import a\nexport let y = 2\n").unwrap();

    tocin()
        .arg(dir.path().join("a.to"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("T035_CYCLIC_IMPORT"));
}

#[test]
fn test_wasm_target_without_shell_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("w.to");
    fs::write(&input, "let x = 1\n").unwrap();

    tocin()
        .arg(&input)
        .args(["--target", "wasm"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("G001_FEATURE_DISABLED"));
}

#[test]
fn test_no_concurrency_toggle() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("conc.to");
    fs::write(&input, "def w():\n    return\ngo w()\n").unwrap();

    tocin()
        .arg(&input)
        .arg("--no-concurrency")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("G001_FEATURE_DISABLED"));
}

#[test]
fn test_timing_summary() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("t.to");
    fs::write(&input, "let x = 1\n").unwrap();

    tocin()
        .arg(&input)
        .arg("--time")
        .assert()
        .success()
        .stderr(predicate::str::contains("phase timings:"));
}

#[test]
fn test_explicit_output_path() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("named.to");
    let output = dir.path().join("custom.ll");
    fs::write(&input, "let x = 1\n").unwrap();

    tocin().arg(&input).arg("-o").arg(&output).assert().success();
    assert!(output.is_file());
}

#[test]
fn test_multiple_errors_sorted_by_position() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("multi.to");
    fs::write(&input, "let a = first_missing\nlet b = second_missing\n").unwrap();

    let assert = tocin().arg(&input).assert().code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    let first = stderr.find("first_missing").expect("first error reported");
    let second = stderr.find("second_missing").expect("second error reported");
    assert!(first < second, "diagnostics not in source order:\n{stderr}");
}
