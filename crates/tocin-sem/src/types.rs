//! The interned type table.
//!
//! Types are immutable once interned and compared by [`TypeId`]; the
//! analyzer inserts coerced variants as new entries but never mutates an
//! entry another node holds. `TypeId(0)` is always the `unknown` poison
//! type that error recovery annotates subtrees with.

use tocin_util::{FxHashMap, IndexVec, Symbol, TypeId};

/// The structure of one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Poison type for subtrees that already produced a diagnostic.
    Unknown,
    Void,
    Bool,
    Int,
    Float,
    Char,
    Str,
    /// The type of a bare `nil` literal: assignable to every nullable.
    NilLiteral,
    /// A class (or generic class instance) by qualified name.
    Named { name: Symbol, args: Vec<TypeId> },
    /// A trait used as a type.
    TraitObject { name: Symbol, args: Vec<TypeId> },
    Func {
        params: Vec<TypeId>,
        ret: TypeId,
        is_async: bool,
    },
    Tuple(Vec<TypeId>),
    Array {
        elem: TypeId,
        len: Option<u64>,
    },
    Dict {
        key: TypeId,
        value: TypeId,
    },
    Pointer(TypeId),
    Ref {
        inner: TypeId,
        mutable: bool,
    },
    /// `T?`.
    Nullable(TypeId),
    Option(TypeId),
    Result {
        ok: TypeId,
        err: TypeId,
    },
    Chan {
        elem: TypeId,
        can_send: bool,
        can_recv: bool,
    },
    Future(TypeId),
    /// An in-scope generic parameter with its declared bounds.
    TypeParam { name: Symbol, bounds: Vec<Symbol> },
}

/// Interning table. Equal kinds always map to the same id, so deep
/// structural equality reduces to id equality.
pub struct TypeTable {
    kinds: IndexVec<TypeId, TypeKind>,
    lookup: FxHashMap<TypeKind, TypeId>,
    pub unknown: TypeId,
    pub void: TypeId,
    pub bool_: TypeId,
    pub int: TypeId,
    pub float: TypeId,
    pub char_: TypeId,
    pub string: TypeId,
    pub nil: TypeId,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            kinds: IndexVec::new(),
            lookup: FxHashMap::default(),
            unknown: TypeId::UNKNOWN,
            void: TypeId::UNKNOWN,
            bool_: TypeId::UNKNOWN,
            int: TypeId::UNKNOWN,
            float: TypeId::UNKNOWN,
            char_: TypeId::UNKNOWN,
            string: TypeId::UNKNOWN,
            nil: TypeId::UNKNOWN,
        };
        // Unknown must land on TypeId(0); see `TypeId::UNKNOWN`.
        table.unknown = table.intern(TypeKind::Unknown);
        debug_assert_eq!(table.unknown, TypeId::UNKNOWN);
        table.void = table.intern(TypeKind::Void);
        table.bool_ = table.intern(TypeKind::Bool);
        table.int = table.intern(TypeKind::Int);
        table.float = table.intern(TypeKind::Float);
        table.char_ = table.intern(TypeKind::Char);
        table.string = table.intern(TypeKind::Str);
        table.nil = table.intern(TypeKind::NilLiteral);
        table
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.lookup.get(&kind) {
            return id;
        }
        let id = self.kinds.push(kind.clone());
        self.lookup.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id]
    }

    pub fn is_unknown(&self, id: TypeId) -> bool {
        id == self.unknown
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Int | TypeKind::Float)
    }

    pub fn is_nullable(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Nullable(_))
    }

    /// Strip one nullable layer, if present.
    pub fn non_nullable(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Nullable(inner) => *inner,
            _ => id,
        }
    }

    pub fn nullable(&mut self, inner: TypeId) -> TypeId {
        if self.is_nullable(inner) {
            return inner;
        }
        self.intern(TypeKind::Nullable(inner))
    }

    /// Whether the type (transitively) contains `unknown`; such types
    /// never produce follow-on diagnostics.
    pub fn contains_unknown(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Unknown => true,
            TypeKind::Void
            | TypeKind::Bool
            | TypeKind::Int
            | TypeKind::Float
            | TypeKind::Char
            | TypeKind::Str
            | TypeKind::NilLiteral
            | TypeKind::TypeParam { .. } => false,
            TypeKind::Named { args, .. } | TypeKind::TraitObject { args, .. } => {
                args.iter().any(|&a| self.contains_unknown(a))
            }
            TypeKind::Func { params, ret, .. } => {
                params.iter().any(|&p| self.contains_unknown(p)) || self.contains_unknown(*ret)
            }
            TypeKind::Tuple(elems) => elems.iter().any(|&e| self.contains_unknown(e)),
            TypeKind::Array { elem, .. } => self.contains_unknown(*elem),
            TypeKind::Dict { key, value } => {
                self.contains_unknown(*key) || self.contains_unknown(*value)
            }
            TypeKind::Pointer(inner)
            | TypeKind::Ref { inner, .. }
            | TypeKind::Nullable(inner)
            | TypeKind::Option(inner)
            | TypeKind::Future(inner)
            | TypeKind::Chan { elem: inner, .. } => self.contains_unknown(*inner),
            TypeKind::Result { ok, err } => {
                self.contains_unknown(*ok) || self.contains_unknown(*err)
            }
        }
    }

    /// Substitute type parameters by name. `depth` guards runaway
    /// recursive instantiation; callers start it at zero and treat an
    /// overflow as the generic-recursion-limit error.
    pub fn substitute(
        &mut self,
        id: TypeId,
        map: &FxHashMap<Symbol, TypeId>,
        depth: usize,
    ) -> Result<TypeId, ()> {
        if depth > MAX_SUBSTITUTION_DEPTH {
            return Err(());
        }
        let kind = self.kind(id).clone();
        let result = match kind {
            TypeKind::TypeParam { name, .. } => match map.get(&name) {
                Some(&replacement) => replacement,
                None => id,
            },
            TypeKind::Named { name, args } => {
                let args = self.substitute_all(&args, map, depth + 1)?;
                self.intern(TypeKind::Named { name, args })
            }
            TypeKind::TraitObject { name, args } => {
                let args = self.substitute_all(&args, map, depth + 1)?;
                self.intern(TypeKind::TraitObject { name, args })
            }
            TypeKind::Func {
                params,
                ret,
                is_async,
            } => {
                let params = self.substitute_all(&params, map, depth + 1)?;
                let ret = self.substitute(ret, map, depth + 1)?;
                self.intern(TypeKind::Func {
                    params,
                    ret,
                    is_async,
                })
            }
            TypeKind::Tuple(elems) => {
                let elems = self.substitute_all(&elems, map, depth + 1)?;
                self.intern(TypeKind::Tuple(elems))
            }
            TypeKind::Array { elem, len } => {
                let elem = self.substitute(elem, map, depth + 1)?;
                self.intern(TypeKind::Array { elem, len })
            }
            TypeKind::Dict { key, value } => {
                let key = self.substitute(key, map, depth + 1)?;
                let value = self.substitute(value, map, depth + 1)?;
                self.intern(TypeKind::Dict { key, value })
            }
            TypeKind::Pointer(inner) => {
                let inner = self.substitute(inner, map, depth + 1)?;
                self.intern(TypeKind::Pointer(inner))
            }
            TypeKind::Ref { inner, mutable } => {
                let inner = self.substitute(inner, map, depth + 1)?;
                self.intern(TypeKind::Ref { inner, mutable })
            }
            TypeKind::Nullable(inner) => {
                let inner = self.substitute(inner, map, depth + 1)?;
                self.intern(TypeKind::Nullable(inner))
            }
            TypeKind::Option(inner) => {
                let inner = self.substitute(inner, map, depth + 1)?;
                self.intern(TypeKind::Option(inner))
            }
            TypeKind::Result { ok, err } => {
                let ok = self.substitute(ok, map, depth + 1)?;
                let err = self.substitute(err, map, depth + 1)?;
                self.intern(TypeKind::Result { ok, err })
            }
            TypeKind::Chan {
                elem,
                can_send,
                can_recv,
            } => {
                let elem = self.substitute(elem, map, depth + 1)?;
                self.intern(TypeKind::Chan {
                    elem,
                    can_send,
                    can_recv,
                })
            }
            TypeKind::Future(inner) => {
                let inner = self.substitute(inner, map, depth + 1)?;
                self.intern(TypeKind::Future(inner))
            }
            other => self.intern(other),
        };
        Ok(result)
    }

    fn substitute_all(
        &mut self,
        ids: &[TypeId],
        map: &FxHashMap<Symbol, TypeId>,
        depth: usize,
    ) -> Result<Vec<TypeId>, ()> {
        ids.iter().map(|&id| self.substitute(id, map, depth)).collect()
    }

    /// Surface spelling of a type.
    pub fn display(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Unknown => "unknown".into(),
            TypeKind::Void => "void".into(),
            TypeKind::Bool => "bool".into(),
            TypeKind::Int => "int".into(),
            TypeKind::Float => "float".into(),
            TypeKind::Char => "char".into(),
            TypeKind::Str => "string".into(),
            TypeKind::NilLiteral => "nil".into(),
            TypeKind::Named { name, args } | TypeKind::TraitObject { name, args } => {
                if args.is_empty() {
                    name.as_str().to_string()
                } else {
                    let args: Vec<String> = args.iter().map(|&a| self.display(a)).collect();
                    format!("{}<{}>", name, args.join(", "))
                }
            }
            TypeKind::Func {
                params,
                ret,
                is_async,
            } => {
                let params: Vec<String> = params.iter().map(|&p| self.display(p)).collect();
                let prefix = if *is_async { "async " } else { "" };
                format!("{}({}) -> {}", prefix, params.join(", "), self.display(*ret))
            }
            TypeKind::Tuple(elems) => {
                let elems: Vec<String> = elems.iter().map(|&e| self.display(e)).collect();
                format!("({})", elems.join(", "))
            }
            TypeKind::Array { elem, len } => match len {
                Some(len) => format!("[{}; {}]", self.display(*elem), len),
                None => format!("[{}]", self.display(*elem)),
            },
            TypeKind::Dict { key, value } => {
                format!("{{{}: {}}}", self.display(*key), self.display(*value))
            }
            TypeKind::Pointer(inner) => format!("*{}", self.display(*inner)),
            TypeKind::Ref { inner, mutable } => {
                if *mutable {
                    format!("&mut {}", self.display(*inner))
                } else {
                    format!("&{}", self.display(*inner))
                }
            }
            TypeKind::Nullable(inner) => format!("{}?", self.display(*inner)),
            TypeKind::Option(inner) => format!("Option<{}>", self.display(*inner)),
            TypeKind::Result { ok, err } => {
                format!("Result<{}, {}>", self.display(*ok), self.display(*err))
            }
            TypeKind::Chan { elem, .. } => format!("Chan<{}>", self.display(*elem)),
            TypeKind::Future(inner) => format!("Future<{}>", self.display(*inner)),
            TypeKind::TypeParam { name, .. } => name.as_str().to_string(),
        }
    }

    /// Mangled name for a generic instantiation: `base_T1_T2_…`.
    pub fn mangle(&self, base: Symbol, args: &[TypeId]) -> String {
        let mut out = base.as_str().to_string();
        for &arg in args {
            out.push('_');
            for c in self.display(arg).chars() {
                if c.is_alphanumeric() {
                    out.push(c);
                } else if c == '_' {
                    out.push('_');
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

const MAX_SUBSTITUTION_DEPTH: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_dedups() {
        let mut table = TypeTable::new();
        let a = table.intern(TypeKind::Option(table.int));
        let b = table.intern(TypeKind::Option(table.int));
        assert_eq!(a, b);
        let c = table.intern(TypeKind::Option(table.float));
        assert_ne!(a, c);
    }

    #[test]
    fn test_unknown_is_type_id_zero() {
        let table = TypeTable::new();
        assert_eq!(table.unknown, TypeId::UNKNOWN);
    }

    #[test]
    fn test_display_round_trip_stability() {
        let mut table = TypeTable::new();
        let opt = table.intern(TypeKind::Option(table.int));
        let res = table.intern(TypeKind::Result {
            ok: opt,
            err: table.string,
        });
        // Interned types are immutable: displaying the "clone" (same id)
        // is displaying the type.
        assert_eq!(table.display(res), "Result<Option<int>, string>");
        assert_eq!(table.display(res), table.display(res));
    }

    #[test]
    fn test_display_spellings() {
        let mut table = TypeTable::new();
        let nullable = table.nullable(table.int);
        assert_eq!(table.display(nullable), "int?");
        let arr = table.intern(TypeKind::Array {
            elem: table.string,
            len: None,
        });
        assert_eq!(table.display(arr), "[string]");
        let chan = table.intern(TypeKind::Chan {
            elem: table.int,
            can_send: true,
            can_recv: true,
        });
        assert_eq!(table.display(chan), "Chan<int>");
        let func = table.intern(TypeKind::Func {
            params: vec![table.int, table.bool_],
            ret: table.void,
            is_async: false,
        });
        assert_eq!(table.display(func), "(int, bool) -> void");
    }

    #[test]
    fn test_nullable_is_idempotent() {
        let mut table = TypeTable::new();
        let once = table.nullable(table.int);
        let twice = table.nullable(once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_substitution() {
        let mut table = TypeTable::new();
        let t_param = table.intern(TypeKind::TypeParam {
            name: Symbol::intern("T"),
            bounds: vec![],
        });
        let opt_t = table.intern(TypeKind::Option(t_param));
        let mut map = FxHashMap::default();
        map.insert(Symbol::intern("T"), table.int);
        let substituted = table.substitute(opt_t, &map, 0).unwrap();
        let expected = table.intern(TypeKind::Option(table.int));
        assert_eq!(substituted, expected);
    }

    #[test]
    fn test_contains_unknown() {
        let mut table = TypeTable::new();
        let opt_unknown = table.intern(TypeKind::Option(table.unknown));
        assert!(table.contains_unknown(opt_unknown));
        let opt_int = table.intern(TypeKind::Option(table.int));
        assert!(!table.contains_unknown(opt_int));
    }

    #[test]
    fn test_mangle() {
        let mut table = TypeTable::new();
        let base = Symbol::intern("id");
        assert_eq!(table.mangle(base, &[table.int]), "id_int");
        assert_eq!(table.mangle(base, &[table.string]), "id_string");
        let opt = table.intern(TypeKind::Option(table.int));
        assert_eq!(table.mangle(base, &[opt]), "id_Optionint");
    }
}
