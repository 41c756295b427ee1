//! Class, trait, impl, and extension-function registries, plus the
//! generic-instantiation cache.
//!
//! These are owned by the analyzer (and handed to the lowerer inside
//! the analysis result) — there is no global state; each compilation
//! session builds its own registries.

use indexmap::IndexMap;

use tocin_util::{FxHashMap, Span, Symbol, TypeId};

/// A resolved function signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncSig {
    /// Parameter types, excluding the receiver.
    pub params: Vec<TypeId>,
    /// Which parameters are move-by-value, parallel to `params`.
    pub moves: Vec<bool>,
    pub ret: TypeId,
    pub is_async: bool,
    pub has_self: bool,
    /// Generic parameter names with their bounds.
    pub generics: Vec<(Symbol, Vec<Symbol>)>,
}

impl FuncSig {
    /// Signature equality for trait conformance: receiver, parameter
    /// types, return type, and asyncness must all agree.
    pub fn matches(&self, other: &FuncSig) -> bool {
        self.params == other.params
            && self.ret == other.ret
            && self.is_async == other.is_async
            && self.has_self == other.has_self
    }
}

/// One registered class.
#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: Symbol,
    pub generics: Vec<(Symbol, Vec<Symbol>)>,
    pub superclass: Option<Symbol>,
    /// Traits declared in the class head (`implements …`).
    pub traits: Vec<Symbol>,
    /// Fields in declaration order.
    pub fields: IndexMap<Symbol, TypeId>,
    /// Inherent methods.
    pub methods: IndexMap<Symbol, FuncSig>,
    pub span: Span,
}

/// One trait method requirement.
#[derive(Clone, Debug)]
pub struct TraitMethodInfo {
    pub sig: FuncSig,
    pub has_default: bool,
    /// True if the signature mentions the trait's own type outside the
    /// receiver position, which makes the trait object-unsafe.
    pub mentions_self: bool,
}

/// One registered trait.
#[derive(Clone, Debug)]
pub struct TraitInfo {
    pub name: Symbol,
    pub methods: IndexMap<Symbol, TraitMethodInfo>,
    pub span: Span,
}

impl TraitInfo {
    /// A trait is object-safe iff no method mentions the trait's own
    /// type outside the receiver and no method is generic.
    pub fn is_object_safe(&self) -> bool {
        self.methods
            .values()
            .all(|m| !m.mentions_self && m.sig.generics.is_empty())
    }
}

/// One `impl Trait for Type` block.
#[derive(Clone, Debug)]
pub struct ImplInfo {
    pub trait_name: Symbol,
    /// Target type head name (class name or primitive spelling).
    pub target: Symbol,
    pub methods: IndexMap<Symbol, FuncSig>,
    pub span: Span,
}

/// All nominal-type information for one compilation session.
#[derive(Default)]
pub struct Registries {
    pub classes: FxHashMap<Symbol, ClassInfo>,
    pub traits: FxHashMap<Symbol, TraitInfo>,
    pub impls: Vec<ImplInfo>,
    /// Extension functions from inherent `impl Type:` blocks, keyed by
    /// target head name, in import/registration order.
    pub extensions: FxHashMap<Symbol, Vec<(Symbol, FuncSig)>>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// The impl block for a (trait, target) pair, if registered.
    pub fn impl_of(&self, trait_name: Symbol, target: Symbol) -> Option<&ImplInfo> {
        self.impls
            .iter()
            .find(|im| im.trait_name == trait_name && im.target == target)
    }

    /// Whether `target` implements `trait_name`, via the class head or
    /// an impl block, including through the superclass chain.
    pub fn implements(&self, target: Symbol, trait_name: Symbol) -> bool {
        let mut current = Some(target);
        while let Some(name) = current {
            if self.impl_of(trait_name, name).is_some() {
                return true;
            }
            if let Some(class) = self.classes.get(&name) {
                if class.traits.contains(&trait_name) {
                    return true;
                }
                current = class.superclass;
            } else {
                current = None;
            }
        }
        false
    }

    /// Inherent method lookup, walking the superclass chain.
    pub fn inherent_method(&self, class: Symbol, method: Symbol) -> Option<&FuncSig> {
        let mut current = Some(class);
        while let Some(name) = current {
            let info = self.classes.get(&name)?;
            if let Some(sig) = info.methods.get(&method) {
                return Some(sig);
            }
            current = info.superclass;
        }
        None
    }

    /// Field lookup, walking the superclass chain.
    pub fn field_of(&self, class: Symbol, field: Symbol) -> Option<TypeId> {
        let mut current = Some(class);
        while let Some(name) = current {
            let info = self.classes.get(&name)?;
            if let Some(&ty) = info.fields.get(&field) {
                return Some(ty);
            }
            current = info.superclass;
        }
        None
    }
}

/// One concrete instantiation of a generic declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instantiation {
    pub base: Symbol,
    pub args: Vec<TypeId>,
    pub mangled: String,
}

/// Cache keyed by (base name, argument tuple). Entries are added once
/// and never mutated; repeated uses share one entry so the lowerer
/// emits each instantiation once.
#[derive(Default)]
pub struct InstantiationCache {
    map: FxHashMap<(Symbol, Vec<TypeId>), usize>,
    entries: Vec<Instantiation>,
}

impl InstantiationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an instantiation, returning its index and whether it was
    /// newly inserted.
    pub fn insert(&mut self, base: Symbol, args: Vec<TypeId>, mangled: String) -> (usize, bool) {
        if let Some(&idx) = self.map.get(&(base, args.clone())) {
            return (idx, false);
        }
        let idx = self.entries.len();
        self.entries.push(Instantiation {
            base,
            args: args.clone(),
            mangled,
        });
        self.map.insert((base, args), idx);
        (idx, true)
    }

    pub fn get(&self, base: Symbol, args: &[TypeId]) -> Option<&Instantiation> {
        self.map
            .get(&(base, args.to_vec()))
            .map(|&idx| &self.entries[idx])
    }

    /// Instantiations in first-use order.
    pub fn iter(&self) -> impl Iterator<Item = &Instantiation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::intern(name)
    }

    fn sig(ret: TypeId) -> FuncSig {
        FuncSig {
            params: vec![],
            moves: vec![],
            ret,
            is_async: false,
            has_self: true,
            generics: vec![],
        }
    }

    #[test]
    fn test_implements_via_impl_block() {
        let mut reg = Registries::new();
        reg.impls.push(ImplInfo {
            trait_name: sym("Show"),
            target: sym("Point"),
            methods: IndexMap::new(),
            span: Span::DUMMY,
        });
        assert!(reg.implements(sym("Point"), sym("Show")));
        assert!(!reg.implements(sym("Point"), sym("Hash")));
    }

    #[test]
    fn test_implements_via_superclass() {
        let mut reg = Registries::new();
        reg.classes.insert(
            sym("Animal"),
            ClassInfo {
                name: sym("Animal"),
                generics: vec![],
                superclass: None,
                traits: vec![sym("Named")],
                fields: IndexMap::new(),
                methods: IndexMap::new(),
                span: Span::DUMMY,
            },
        );
        reg.classes.insert(
            sym("Dog"),
            ClassInfo {
                name: sym("Dog"),
                generics: vec![],
                superclass: Some(sym("Animal")),
                traits: vec![],
                fields: IndexMap::new(),
                methods: IndexMap::new(),
                span: Span::DUMMY,
            },
        );
        assert!(reg.implements(sym("Dog"), sym("Named")));
    }

    #[test]
    fn test_inherent_method_through_chain() {
        let mut reg = Registries::new();
        let mut methods = IndexMap::new();
        methods.insert(sym("speak"), sig(TypeId::UNKNOWN));
        reg.classes.insert(
            sym("Animal"),
            ClassInfo {
                name: sym("Animal"),
                generics: vec![],
                superclass: None,
                traits: vec![],
                fields: IndexMap::new(),
                methods,
                span: Span::DUMMY,
            },
        );
        reg.classes.insert(
            sym("Dog"),
            ClassInfo {
                name: sym("Dog"),
                generics: vec![],
                superclass: Some(sym("Animal")),
                traits: vec![],
                fields: IndexMap::new(),
                methods: IndexMap::new(),
                span: Span::DUMMY,
            },
        );
        assert!(reg.inherent_method(sym("Dog"), sym("speak")).is_some());
    }

    #[test]
    fn test_instantiation_cache_dedups() {
        let mut cache = InstantiationCache::new();
        let (a, fresh_a) = cache.insert(sym("id"), vec![TypeId(3)], "id_int".into());
        let (b, fresh_b) = cache.insert(sym("id"), vec![TypeId(3)], "id_int".into());
        let (c, fresh_c) = cache.insert(sym("id"), vec![TypeId(6)], "id_string".into());
        assert_eq!(a, b);
        assert!(fresh_a);
        assert!(!fresh_b);
        assert_ne!(a, c);
        assert!(fresh_c);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_object_safety() {
        let mut methods = IndexMap::new();
        methods.insert(
            sym("show"),
            TraitMethodInfo {
                sig: sig(TypeId::UNKNOWN),
                has_default: false,
                mentions_self: false,
            },
        );
        let safe = TraitInfo {
            name: sym("Show"),
            methods: methods.clone(),
            span: Span::DUMMY,
        };
        assert!(safe.is_object_safe());

        methods.insert(
            sym("combine"),
            TraitMethodInfo {
                sig: sig(TypeId::UNKNOWN),
                has_default: false,
                mentions_self: true,
            },
        );
        let unsafe_trait = TraitInfo {
            name: sym("Combine"),
            methods,
            span: Span::DUMMY,
        };
        assert!(!unsafe_trait.is_object_safe());
    }
}
