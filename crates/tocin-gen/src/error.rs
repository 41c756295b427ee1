//! Error types for LLVM IR lowering.

use thiserror::Error;

/// Errors surfaced while building the LLVM module. Most feed the
/// diagnostic sink as internal-compiler-error records; the variants
/// exist so intermediate layers can use `?`.
#[derive(Debug, Error)]
pub enum CodeGenError {
    /// The LLVM IR builder rejected an instruction.
    #[error("LLVM builder error: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),

    /// Module verification failed after lowering.
    #[error("module verification failed: {0}")]
    VerifierFailed(String),

    /// A construct the lowerer cannot express reached codegen.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// A function referenced during lowering was never declared.
    #[error("function `{0}` was not declared")]
    FunctionNotFound(String),

    /// Lowering invariant broken; indicates a compiler bug.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for lowering operations.
pub type Result<T> = std::result::Result<T, CodeGenError>;
