//! tocin-util - Foundation types shared by every compiler phase.
//!
//! This crate carries the pieces the rest of the pipeline is built on:
//! source locations ([`Span`], [`SourceMap`]), interned strings
//! ([`Symbol`]), typed indices ([`Idx`], [`IndexVec`]), the diagnostic
//! sink ([`diagnostic::Handler`]) and the stable error-code registry
//! ([`diagnostic::codes`]).

pub mod diagnostic;
pub mod error;
pub mod index_vec;
pub mod span;
pub mod symbol;

pub use diagnostic::{Diagnostic, DiagnosticCode, Handler, Phase, Severity};
pub use error::{CompileResult, ErrorReported};
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, SourceFile, SourceMap, Span};
pub use symbol::Symbol;

// Re-export the hash maps used across the compiler so phase crates agree
// on hasher choice.
pub use rustc_hash::{FxHashMap, FxHashSet};

crate::define_idx!(
    /// Handle to an interned type. The table lives in the semantic
    /// crate; the handle lives here so the AST can carry annotations
    /// without depending on it. Handle equality is type equality.
    TypeId
);

impl TypeId {
    /// The `unknown` poison type. The semantic crate interns it first so
    /// the handle is stable.
    pub const UNKNOWN: TypeId = TypeId(0);
}
