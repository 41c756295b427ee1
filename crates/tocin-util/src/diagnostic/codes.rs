//! The stable error-code registry.
//!
//! Every diagnostic the compiler can produce has a code here. Codes are
//! grouped by phase prefix (L lexer, P parser, T type, N null safety,
//! O ownership, M method resolution, C codegen, I I/O, G general) and
//! never renumbered.

use super::Phase;

/// A stable diagnostic identifier, e.g. `O002_USE_AFTER_MOVE`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    /// The full stable identifier rendered to users.
    pub id: &'static str,
    /// Owning phase; prefix of `id` and sort key for output.
    pub phase: Phase,
}

impl DiagnosticCode {
    pub const fn new(id: &'static str, phase: Phase) -> Self {
        Self { id, phase }
    }
}

impl std::fmt::Debug for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id)
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id)
    }
}

macro_rules! codes {
    ($($phase:ident { $($name:ident),* $(,)? })*) => {
        $($(
            pub const $name: DiagnosticCode =
                DiagnosticCode::new(stringify!($name), Phase::$phase);
        )*)*

        /// Every registered code, for documentation and self-tests.
        pub const ALL: &[DiagnosticCode] = &[$($($name),*),*];
    };
}

codes! {
    Lexer {
        L001_UNEXPECTED_CHARACTER,
        L002_UNTERMINATED_STRING,
        L003_INVALID_NUMBER_FORMAT,
        L004_MIXED_INDENTATION,
        L005_INCONSISTENT_INDENTATION,
        L006_INVALID_ESCAPE,
    }
    Parser {
        P001_NON_EXHAUSTIVE_PATTERNS,
        P002_UNEXPECTED_TOKEN,
        P003_EXPECTED_TOKEN,
        P004_INVALID_ASSIGNMENT_TARGET,
        P005_CONST_WITHOUT_INIT,
        P006_UNEXPECTED_EOF,
    }
    Type {
        T001_TYPE_MISMATCH,
        T002_UNDEFINED_VARIABLE,
        T003_UNDEFINED_TYPE,
        T004_ARITY_MISMATCH,
        T005_NOT_CALLABLE,
        T006_INVALID_OPERANDS,
        T007_DUPLICATE_DEFINITION,
        T008_RETURN_OUTSIDE_FUNCTION,
        T009_AWAIT_OUTSIDE_ASYNC,
        T010_INVALID_GO_TARGET,
        T011_CHANNEL_CAPABILITY,
        T012_NOT_INDEXABLE,
        T013_MISSING_RETURN,
        T014_ASSIGN_TO_IMMUTABLE,
        T030_TRAIT_BOUND_NOT_SATISFIED,
        T031_MISSING_TRAIT_METHOD,
        T032_TRAIT_SIGNATURE_MISMATCH,
        T033_NOT_OBJECT_SAFE,
        T034_GENERIC_RECURSION_LIMIT,
        T035_CYCLIC_IMPORT,
        T036_UNDEFINED_MODULE,
    }
    NullSafety {
        N001_NULLABLE_ASSIGNMENT,
        N002_NULLABLE_CALL,
        N003_NULLABLE_DEREFERENCE,
        N004_NULLABLE_INDEX,
    }
    Ownership {
        O002_USE_AFTER_MOVE,
        O003_MOVE_OF_CAPTURED,
    }
    MethodResolution {
        M001_AMBIGUOUS_METHOD,
        M002_UNDEFINED_METHOD,
    }
    Codegen {
        C001_VERIFIER_FAILED,
        C002_UNSUPPORTED_CONSTRUCT,
    }
    Io {
        I001_FILE_NOT_FOUND,
        I002_MODULE_NOT_FOUND,
        I003_INVALID_UTF8,
        I004_WRITE_FAILED,
    }
    General {
        G001_FEATURE_DISABLED,
        G002_INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_phase_prefix() {
        for code in ALL {
            assert_eq!(
                code.id.chars().next().unwrap(),
                code.phase.prefix(),
                "code {} does not start with its phase prefix",
                code.id
            );
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.id), "duplicate code {}", code.id);
        }
    }

    #[test]
    fn test_display_is_full_id() {
        assert_eq!(O002_USE_AFTER_MOVE.to_string(), "O002_USE_AFTER_MOVE");
    }
}
