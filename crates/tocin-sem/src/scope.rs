//! Lexical scopes and symbols.
//!
//! The scope chain is an explicit stack of maps owned by the analyzer —
//! there are no parent pointers. Pushes and pops are paired through the
//! analyzer's `with_scope` closure guard so error paths cannot leak a
//! scope. Symbol insertion order is preserved (scope exit drops owned
//! locals in reverse declaration order).

use indexmap::IndexMap;

use tocin_util::{Span, Symbol, TypeId};

/// What a name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    Type,
    ModuleAlias,
}

/// Ownership state of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnState {
    Owned,
    Borrowed,
    Moved,
}

/// One resolved name.
#[derive(Clone, Debug)]
pub struct SymbolInfo {
    pub name: Symbol,
    pub ty: TypeId,
    pub mutable: bool,
    pub kind: SymbolKind,
    /// Scope level the symbol was declared at.
    pub depth: usize,
    pub span: Span,
    pub state: OwnState,
    /// For `ModuleAlias`: the module this alias resolves to.
    pub module: Option<Symbol>,
}

impl SymbolInfo {
    pub fn variable(name: Symbol, ty: TypeId, mutable: bool, depth: usize, span: Span) -> Self {
        Self {
            name,
            ty,
            mutable,
            kind: SymbolKind::Variable,
            depth,
            span,
            state: OwnState::Owned,
            module: None,
        }
    }

    pub fn function(name: Symbol, ty: TypeId, depth: usize, span: Span) -> Self {
        Self {
            name,
            ty,
            mutable: false,
            kind: SymbolKind::Function,
            depth,
            span,
            state: OwnState::Owned,
            module: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
    Class,
    Lambda,
}

/// One lexical scope.
pub struct Scope {
    pub kind: ScopeKind,
    pub symbols: IndexMap<Symbol, SymbolInfo>,
}

/// The analyzer's scope stack.
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    /// A fresh stack containing only the module scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                symbols: IndexMap::new(),
            }],
        }
    }

    pub fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            symbols: IndexMap::new(),
        });
    }

    pub fn pop(&mut self) -> Option<Scope> {
        // The module scope is never popped.
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Define a symbol in the innermost scope. Returns the shadowed
    /// symbol of the same scope, if any.
    pub fn define(&mut self, info: SymbolInfo) -> Option<SymbolInfo> {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .symbols
            .insert(info.name, info)
    }

    /// Walk the chain innermost-out.
    pub fn lookup(&self, name: Symbol) -> Option<&SymbolInfo> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(&name))
    }

    pub fn lookup_mut(&mut self, name: Symbol) -> Option<&mut SymbolInfo> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.symbols.get_mut(&name))
    }

    /// Like [`lookup`](Self::lookup), also reporting whether the walk
    /// crossed a lambda boundary (the symbol would be a capture).
    pub fn lookup_with_capture(&self, name: Symbol) -> Option<(&SymbolInfo, bool)> {
        let mut crossed_lambda = false;
        for scope in self.scopes.iter().rev() {
            if let Some(info) = scope.symbols.get(&name) {
                return Some((info, crossed_lambda));
            }
            if scope.kind == ScopeKind::Lambda {
                crossed_lambda = true;
            }
        }
        None
    }

    /// The module scope's symbols.
    pub fn module_scope(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn module_scope_mut(&mut self) -> &mut Scope {
        &mut self.scopes[0]
    }

    /// True if any enclosing scope is a function or lambda body.
    pub fn in_function(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| matches!(s.kind, ScopeKind::Function | ScopeKind::Lambda))
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::intern(name)
    }

    fn var(name: &str, depth: usize) -> SymbolInfo {
        SymbolInfo::variable(sym(name), TypeId::UNKNOWN, true, depth, Span::DUMMY)
    }

    #[test]
    fn test_lookup_walks_outward() {
        let mut scopes = ScopeStack::new();
        scopes.define(var("outer", 0));
        scopes.push(ScopeKind::Block);
        scopes.define(var("inner", 1));
        assert!(scopes.lookup(sym("outer")).is_some());
        assert!(scopes.lookup(sym("inner")).is_some());
        scopes.pop();
        assert!(scopes.lookup(sym("inner")).is_none());
    }

    #[test]
    fn test_shadowing() {
        let mut scopes = ScopeStack::new();
        scopes.define(var("x", 0));
        scopes.push(ScopeKind::Block);
        let mut shadow = var("x", 1);
        shadow.mutable = false;
        scopes.define(shadow);
        assert_eq!(scopes.lookup(sym("x")).unwrap().depth, 1);
        scopes.pop();
        assert_eq!(scopes.lookup(sym("x")).unwrap().depth, 0);
    }

    #[test]
    fn test_module_scope_survives_pop() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.pop().is_none());
        assert_eq!(scopes.depth(), 0);
    }

    #[test]
    fn test_capture_detection() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.define(var("local", 1));
        scopes.push(ScopeKind::Lambda);
        scopes.define(var("param", 2));
        let (_, captured) = scopes.lookup_with_capture(sym("local")).unwrap();
        assert!(captured);
        let (_, captured) = scopes.lookup_with_capture(sym("param")).unwrap();
        assert!(!captured);
    }

    #[test]
    fn test_declaration_order_preserved() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.define(var("a", 1));
        scopes.define(var("b", 1));
        scopes.define(var("c", 1));
        let scope = scopes.pop().unwrap();
        let names: Vec<&str> = scope.symbols.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
