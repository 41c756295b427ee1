//! tocin-gen - LLVM IR lowering.
//!
//! Consumes the typed AST plus the analyzer's type table, registries,
//! and instantiation cache, and builds an LLVM module via `inkwell`.
//! Only concrete generic instantiations are emitted, under their
//! mangled `base_T1_T2` names. The module is verified before being
//! returned; verification failure is an internal-compiler-error
//! diagnostic, never a silent bad module.

pub mod error;
pub mod llvm;
pub mod runtime;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{CodeGenError, Result};
pub use llvm::Lowerer;

use inkwell::context::Context;
use tocin_par::ast::Module;
use tocin_sem::Analysis;
use tocin_util::diagnostic::codes;
use tocin_util::{CompileResult, ErrorReported, Handler};

/// Lower a fully-analyzed module to textual LLVM IR.
///
/// Each call owns an independent LLVM context, so separate compilation
/// units never share LLVM state.
pub fn lower_to_ir(
    ast: &Module,
    analysis: &mut Analysis,
    handler: &Handler,
    module_name: &str,
) -> CompileResult<String> {
    let context = Context::create();
    let mut lowerer = Lowerer::new(&context, module_name, analysis, handler);
    match lowerer.lower(ast) {
        Ok(()) => Ok(lowerer.print_ir()),
        Err(CodeGenError::VerifierFailed(_)) => {
            // Already reported as C001 by the lowerer.
            Err(ErrorReported)
        }
        Err(CodeGenError::Unsupported(what)) => {
            handler.error(
                codes::C002_UNSUPPORTED_CONSTRUCT,
                format!("cannot lower this program: {what}"),
                tocin_util::Span::DUMMY,
            );
            Err(ErrorReported)
        }
        Err(other) => {
            handler.error(
                codes::G002_INTERNAL,
                format!("internal compiler error during lowering: {other}"),
                tocin_util::Span::DUMMY,
            );
            Err(ErrorReported)
        }
    }
}
