//! Diagnostic sink shared by every compiler phase.
//!
//! Each phase appends [`Diagnostic`] records to one [`Handler`]; the
//! driver renders them as `file:line:col: severity: CODE: message`,
//! sorted by phase then source position.
//!
//! # Examples
//!
//! ```
//! use tocin_util::diagnostic::{codes, Handler};
//! use tocin_util::Span;
//!
//! let handler = Handler::new();
//! handler.error(codes::T002_UNDEFINED_VARIABLE, "undefined variable `x`", Span::DUMMY);
//! assert!(handler.has_errors());
//! ```

pub mod codes;

pub use codes::DiagnosticCode;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::span::{SourceMap, Span};

/// Diagnostic severity.
///
/// `Info` is ignored by default, `Warning` never fails the build,
/// `Error` fails it at the end of the pipeline, `Fatal` aborts it
/// immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// The phase a diagnostic code belongs to. Determines the code prefix and
/// the cross-phase ordering of rendered records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Lexer,
    Parser,
    Type,
    NullSafety,
    Ownership,
    MethodResolution,
    Codegen,
    Io,
    General,
}

impl Phase {
    /// Single-letter code prefix.
    pub const fn prefix(self) -> char {
        match self {
            Phase::Lexer => 'L',
            Phase::Parser => 'P',
            Phase::Type => 'T',
            Phase::NullSafety => 'N',
            Phase::Ownership => 'O',
            Phase::MethodResolution => 'M',
            Phase::Codegen => 'C',
            Phase::Io => 'I',
            Phase::General => 'G',
        }
    }

    /// Pipeline position, for sorting rendered diagnostics. IO and
    /// general errors sort first since they precede any phase output.
    pub const fn order(self) -> u8 {
        match self {
            Phase::Io => 0,
            Phase::General => 1,
            Phase::Lexer => 2,
            Phase::Parser => 3,
            Phase::Type => 4,
            Phase::NullSafety => 5,
            Phase::Ownership => 6,
            Phase::MethodResolution => 7,
            Phase::Codegen => 8,
        }
    }
}

/// A secondary location attached to a diagnostic.
#[derive(Clone, Debug)]
pub struct Note {
    pub message: String,
    pub span: Option<Span>,
}

/// One diagnostic record.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.notes.push(Note {
            message: message.into(),
            span,
        });
        self
    }

    /// Render as `file:line:col: severity: CODE: message`.
    pub fn render(&self, sources: &SourceMap) -> String {
        format!(
            "{}:{}:{}: {}: {}: {}",
            sources.name(self.span.file),
            self.span.line,
            self.span.column,
            self.severity,
            self.code.id,
            self.message
        )
    }
}

/// Thread-safe append-only collection of diagnostics.
///
/// Records keep their emission order; [`Handler::sorted`] groups them by
/// phase then source position for user-facing output.
#[derive(Default)]
pub struct Handler {
    records: Mutex<Vec<Diagnostic>>,
    fatal_seen: AtomicBool,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-built record.
    pub fn emit(&self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Fatal {
            self.fatal_seen.store(true, Ordering::Release);
        }
        self.records.lock().push(diagnostic);
    }

    pub fn info(&self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Severity::Info, code, message, span));
    }

    pub fn warning(&self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Severity::Warning, code, message, span));
    }

    pub fn error(&self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Severity::Error, code, message, span));
    }

    pub fn fatal(&self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Severity::Fatal, code, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.records
            .lock()
            .iter()
            .any(|d| d.severity >= Severity::Error)
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal_seen.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
        self.fatal_seen.store(false, Ordering::Release);
    }

    /// Snapshot of all records in emission order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    /// Records sorted by phase, then file, then source position.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut records = self.diagnostics();
        records.sort_by_key(|d| {
            (
                d.code.phase.order(),
                d.span.file,
                d.span.line,
                d.span.column,
            )
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{FileId, SourceMap};

    #[test]
    fn test_empty_handler() {
        let handler = Handler::new();
        assert!(!handler.has_errors());
        assert!(!handler.has_fatal());
        assert_eq!(handler.error_count(), 0);
    }

    #[test]
    fn test_warning_is_not_error() {
        let handler = Handler::new();
        handler.warning(codes::G002_INTERNAL, "odd but fine", Span::DUMMY);
        assert!(!handler.has_errors());
        assert_eq!(handler.warning_count(), 1);
    }

    #[test]
    fn test_error_counts() {
        let handler = Handler::new();
        handler.error(codes::T001_TYPE_MISMATCH, "mismatch", Span::DUMMY);
        handler.error(codes::T002_UNDEFINED_VARIABLE, "undefined", Span::DUMMY);
        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 2);
    }

    #[test]
    fn test_fatal_flag() {
        let handler = Handler::new();
        assert!(!handler.has_fatal());
        handler.fatal(codes::T035_CYCLIC_IMPORT, "cycle", Span::DUMMY);
        assert!(handler.has_fatal());
        assert!(handler.has_errors());
    }

    #[test]
    fn test_clear_resets() {
        let handler = Handler::new();
        handler.fatal(codes::G002_INTERNAL, "boom", Span::DUMMY);
        handler.clear();
        assert!(!handler.has_errors());
        assert!(!handler.has_fatal());
    }

    #[test]
    fn test_render_format() {
        let mut sources = SourceMap::new();
        let file = sources.add_file("main.to", "let x = y\n");
        let diag = Diagnostic::new(
            Severity::Error,
            codes::T002_UNDEFINED_VARIABLE,
            "undefined variable `y`",
            Span::with_file(8, 9, file, 1, 9),
        );
        assert_eq!(
            diag.render(&sources),
            "main.to:1:9: error: T002_UNDEFINED_VARIABLE: undefined variable `y`"
        );
    }

    #[test]
    fn test_sorted_groups_by_phase() {
        let handler = Handler::new();
        let at = |line| Span::with_file(0, 0, FileId::DUMMY, line, 1);
        handler.error(codes::T001_TYPE_MISMATCH, "late phase", at(1));
        handler.error(codes::L001_UNEXPECTED_CHARACTER, "early phase", at(9));
        let sorted = handler.sorted();
        assert_eq!(sorted[0].code, codes::L001_UNEXPECTED_CHARACTER);
        assert_eq!(sorted[1].code, codes::T001_TYPE_MISMATCH);
    }

    #[test]
    fn test_sorted_by_position_within_phase() {
        let handler = Handler::new();
        let at = |line| Span::with_file(0, 0, FileId::DUMMY, line, 1);
        handler.error(codes::P002_UNEXPECTED_TOKEN, "second", at(5));
        handler.error(codes::P003_EXPECTED_TOKEN, "first", at(2));
        let sorted = handler.sorted();
        assert_eq!(sorted[0].message, "first");
        assert_eq!(sorted[1].message, "second");
    }
}
