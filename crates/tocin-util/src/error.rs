//! The "error already reported" sentinel.
//!
//! Fallible checks in the analyzer and lowerer return
//! `Result<T, ErrorReported>`: the error variant carries no payload and
//! only signals that a diagnostic is already in the sink, so callers
//! must not report again.

use thiserror::Error;

/// Zero-sized witness that a diagnostic has been emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("compilation error already reported")]
pub struct ErrorReported;

/// Result alias used throughout the semantic and codegen phases.
pub type CompileResult<T> = Result<T, ErrorReported>;
