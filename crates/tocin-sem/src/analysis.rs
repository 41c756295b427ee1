//! The semantic analyzer: declaration collection and statement
//! checking.
//!
//! Analysis is conceptually two passes. The collect pass registers
//! every top-level declaration of a module (functions, classes, traits,
//! impls, imports) so definition order within a file does not constrain
//! reference order. The check pass then types bodies in source order,
//! mutating each expression's annotation slot. Expression inference
//! itself lives in `infer.rs`.

use tocin_par::ast::{
    ClassDecl, FunctionDecl, ImplDecl, ImportDecl, Module, Stmt, StmtKind, TraitDecl, TypeExpr,
    TypeExprKind,
};
use tocin_util::diagnostic::codes;
use tocin_util::{FxHashMap, FxHashSet, Handler, Span, Symbol, TypeId};

use crate::registry::{
    ClassInfo, FuncSig, ImplInfo, InstantiationCache, Registries, TraitInfo, TraitMethodInfo,
};
use crate::scope::{OwnState, ScopeKind, ScopeStack, SymbolInfo, SymbolKind};
use crate::types::{TypeKind, TypeTable};

/// Feature toggles mirrored from the driver's `--no-*` flags.
#[derive(Clone, Copy, Debug)]
pub struct FeatureToggles {
    pub allow_async: bool,
    pub allow_concurrency: bool,
    pub allow_advanced: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            allow_async: true,
            allow_concurrency: true,
            allow_advanced: true,
        }
    }
}

/// Everything the lowerer needs from a finished analysis.
pub struct Analysis {
    pub types: TypeTable,
    pub registry: Registries,
    pub instantiations: InstantiationCache,
    /// Resolved signatures of free functions, by name.
    pub functions: FxHashMap<Symbol, FuncSig>,
}

pub(crate) struct FnCtx {
    pub ret: TypeId,
    pub is_async: bool,
}

pub struct Analyzer<'a> {
    pub(crate) handler: &'a Handler,
    pub(crate) types: TypeTable,
    pub(crate) registry: Registries,
    pub(crate) cache: InstantiationCache,
    pub(crate) scopes: ScopeStack,
    /// Exported symbol tables of already-analyzed modules.
    pub(crate) exports: FxHashMap<Symbol, FxHashMap<Symbol, SymbolInfo>>,
    /// Names marked `export` in the module currently being analyzed.
    pub(crate) exported_names: FxHashSet<Symbol>,
    /// Generic parameter lists of generic functions, by name.
    pub(crate) fn_generics: FxHashMap<Symbol, Vec<(Symbol, Vec<Symbol>)>>,
    /// Resolved signatures of free functions, by name.
    pub(crate) fn_sigs: FxHashMap<Symbol, FuncSig>,
    pub(crate) fn_stack: Vec<FnCtx>,
    /// Null-narrowing overlays, innermost last.
    pub(crate) narrowed: Vec<FxHashMap<Symbol, TypeId>>,
    pub(crate) toggles: FeatureToggles,
    pub(crate) current_module: Symbol,
    /// Receiver type while checking a class/impl/trait body.
    pub(crate) self_ty: Option<TypeId>,
}

impl<'a> Analyzer<'a> {
    pub fn new(handler: &'a Handler, toggles: FeatureToggles) -> Self {
        Self {
            handler,
            types: TypeTable::new(),
            registry: Registries::new(),
            cache: InstantiationCache::new(),
            scopes: ScopeStack::new(),
            exports: FxHashMap::default(),
            exported_names: FxHashSet::default(),
            fn_generics: FxHashMap::default(),
            fn_sigs: FxHashMap::default(),
            fn_stack: Vec::new(),
            narrowed: Vec::new(),
            toggles,
            current_module: Symbol::intern(""),
            self_ty: None,
        }
    }

    /// Analyze modules in dependency order (imports first) and hand the
    /// registries to the lowerer.
    pub fn analyze_program(mut self, modules: &mut [Module]) -> Analysis {
        for module in modules.iter_mut() {
            self.analyze_module(module);
            if self.handler.has_fatal() {
                break;
            }
        }
        Analysis {
            types: self.types,
            registry: self.registry,
            instantiations: self.cache,
            functions: self.fn_sigs,
        }
    }

    /// Analyze one module against the exports gathered so far.
    pub fn analyze_module(&mut self, module: &mut Module) {
        self.scopes = ScopeStack::new();
        self.exported_names = FxHashSet::default();
        self.current_module = module.name;
        self.define_builtins();

        // `module a.b` renames the unit before anything else looks at it.
        for stmt in &module.body {
            if let StmtKind::Module(path) = &stmt.kind {
                module.name = join_path(path);
                self.current_module = module.name;
            }
        }

        self.collect_module(module);
        for stmt in &mut module.body {
            self.check_stmt(stmt);
        }
        self.harvest_exports();
    }

    /// Runtime-provided functions visible in every module.
    fn define_builtins(&mut self) {
        for name in ["print", "println"] {
            let fn_ty = self.types.intern(TypeKind::Func {
                // `unknown` parameter: accepts any argument.
                params: vec![self.types.unknown],
                ret: self.types.void,
                is_async: false,
            });
            self.scopes.define(SymbolInfo::function(
                Symbol::intern(name),
                fn_ty,
                0,
                Span::DUMMY,
            ));
        }
    }

    // ----- collect pass -------------------------------------------------

    /// Collection runs in ordered sweeps so that declaration order
    /// within a file never constrains reference order: imports, then
    /// class/trait names, then their bodies, then function signatures,
    /// then impls.
    fn collect_module(&mut self, module: &Module) {
        for stmt in &module.body {
            self.collect_imports_stmt(stmt, false);
        }
        for stmt in &module.body {
            self.collect_type_names(stmt, false);
        }
        for stmt in &module.body {
            self.collect_type_bodies(stmt);
        }
        for stmt in &module.body {
            self.collect_fn_stmt(stmt, false);
        }
        for stmt in &module.body {
            self.collect_impl_stmt(stmt);
        }
    }

    fn collect_imports_stmt(&mut self, stmt: &Stmt, exported: bool) {
        match &stmt.kind {
            StmtKind::Export(inner) => self.collect_imports_stmt(inner, true),
            StmtKind::Import(decl) => self.collect_import(decl),
            StmtKind::Let { name, .. } if exported => {
                self.exported_names.insert(*name);
            }
            _ => {}
        }
    }

    /// Register class and trait names as stubs so bodies and signatures
    /// may refer to them regardless of order (including recursively).
    fn collect_type_names(&mut self, stmt: &Stmt, exported: bool) {
        match &stmt.kind {
            StmtKind::Export(inner) => self.collect_type_names(inner, true),
            StmtKind::Class(decl) => {
                if self.registry.classes.contains_key(&decl.name) {
                    self.handler.error(
                        codes::T007_DUPLICATE_DEFINITION,
                        format!("class `{}` is defined more than once", decl.name),
                        decl.span,
                    );
                }
                self.registry.classes.insert(
                    decl.name,
                    ClassInfo {
                        name: decl.name,
                        generics: decl
                            .generics
                            .iter()
                            .map(|g| (g.name, g.bounds.clone()))
                            .collect(),
                        superclass: None,
                        traits: Vec::new(),
                        fields: indexmap::IndexMap::new(),
                        methods: indexmap::IndexMap::new(),
                        span: decl.span,
                    },
                );
                let bare = self.types.intern(TypeKind::Named {
                    name: decl.name,
                    args: vec![],
                });
                let depth = self.scopes.depth();
                self.scopes.define(SymbolInfo {
                    name: decl.name,
                    ty: bare,
                    mutable: false,
                    kind: SymbolKind::Type,
                    depth,
                    span: decl.span,
                    state: OwnState::Owned,
                    module: None,
                });
                if exported {
                    self.exported_names.insert(decl.name);
                }
            }
            StmtKind::Trait(decl) => {
                if self.registry.traits.contains_key(&decl.name) {
                    self.handler.error(
                        codes::T007_DUPLICATE_DEFINITION,
                        format!("trait `{}` is defined more than once", decl.name),
                        decl.span,
                    );
                }
                self.registry.traits.insert(
                    decl.name,
                    TraitInfo {
                        name: decl.name,
                        methods: indexmap::IndexMap::new(),
                        span: decl.span,
                    },
                );
                if exported {
                    self.exported_names.insert(decl.name);
                }
            }
            _ => {}
        }
    }

    fn collect_type_bodies(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Export(inner) => self.collect_type_bodies(inner),
            StmtKind::Class(decl) => self.collect_class(decl),
            StmtKind::Trait(decl) => self.collect_trait(decl),
            _ => {}
        }
    }

    fn collect_fn_stmt(&mut self, stmt: &Stmt, exported: bool) {
        match &stmt.kind {
            StmtKind::Export(inner) => self.collect_fn_stmt(inner, true),
            StmtKind::Function(decl) => self.collect_function(decl, exported),
            _ => {}
        }
    }

    fn collect_impl_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Export(inner) => self.collect_impl_stmt(inner),
            StmtKind::Impl(decl) => self.collect_impl(decl),
            _ => {}
        }
    }

    pub(crate) fn collect_function(&mut self, decl: &FunctionDecl, exported: bool) {
        let (sig, fn_ty) = self.resolve_signature(decl, None);
        self.fn_sigs.insert(decl.name, sig);
        if !decl.generics.is_empty() {
            self.fn_generics.insert(
                decl.name,
                decl.generics
                    .iter()
                    .map(|g| (g.name, g.bounds.clone()))
                    .collect(),
            );
        }
        let depth = self.scopes.depth();
        let previous = self.scopes.define(SymbolInfo::function(
            decl.name, fn_ty, depth, decl.span,
        ));
        if previous.is_some() {
            self.handler.error(
                codes::T007_DUPLICATE_DEFINITION,
                format!("`{}` is defined more than once", decl.name),
                decl.span,
            );
        }
        if exported {
            self.exported_names.insert(decl.name);
        }
    }

    /// Fill in the previously stubbed class entry.
    fn collect_class(&mut self, decl: &ClassDecl) {
        let generics: Vec<(Symbol, Vec<Symbol>)> = decl
            .generics
            .iter()
            .map(|g| (g.name, g.bounds.clone()))
            .collect();

        self.with_scope(ScopeKind::Class, |this| {
            this.bind_generics(&decl.generics);
            let class_args: Vec<TypeId> = decl
                .generics
                .iter()
                .map(|g| {
                    this.types.intern(TypeKind::TypeParam {
                        name: g.name,
                        bounds: g.bounds.clone(),
                    })
                })
                .collect();
            let self_ty = this.types.intern(TypeKind::Named {
                name: decl.name,
                args: class_args,
            });

            let mut fields = indexmap::IndexMap::new();
            for field in &decl.fields {
                let ty = this.resolve_type(&field.ty);
                if fields.insert(field.name, ty).is_some() {
                    this.handler.error(
                        codes::T007_DUPLICATE_DEFINITION,
                        format!("field `{}` is defined more than once", field.name),
                        field.span,
                    );
                }
            }

            let mut methods = indexmap::IndexMap::new();
            for method in &decl.methods {
                let (sig, _) = this.resolve_signature(method, Some(self_ty));
                if methods.insert(method.name, sig).is_some() {
                    this.handler.error(
                        codes::T007_DUPLICATE_DEFINITION,
                        format!("method `{}` is defined more than once", method.name),
                        method.span,
                    );
                }
            }

            let superclass = decl.superclass.as_ref().and_then(|s| match &s.kind {
                TypeExprKind::Named { name, .. } => Some(*name),
                _ => None,
            });
            let traits: Vec<Symbol> = decl
                .traits
                .iter()
                .filter_map(|t| match &t.kind {
                    TypeExprKind::Named { name, .. } => Some(*name),
                    _ => None,
                })
                .collect();

            this.registry.classes.insert(
                decl.name,
                ClassInfo {
                    name: decl.name,
                    generics,
                    superclass,
                    traits,
                    fields,
                    methods,
                    span: decl.span,
                },
            );
        });
    }

    /// Fill in the previously stubbed trait entry.
    fn collect_trait(&mut self, decl: &TraitDecl) {
        let marker = self.types.intern(TypeKind::TraitObject {
            name: decl.name,
            args: vec![],
        });
        let mut methods = indexmap::IndexMap::new();
        self.with_scope(ScopeKind::Class, |this| {
            this.bind_generics(&decl.generics);
            for method in &decl.methods {
                let (sig, _) = this.resolve_signature(&method.decl, Some(marker));
                let mentions_self = sig.params.iter().any(|&p| this.type_mentions(p, marker))
                    || this.type_mentions(sig.ret, marker);
                methods.insert(
                    method.decl.name,
                    TraitMethodInfo {
                        sig,
                        has_default: method.has_default,
                        mentions_self,
                    },
                );
            }
        });
        self.registry.traits.insert(
            decl.name,
            TraitInfo {
                name: decl.name,
                methods,
                span: decl.span,
            },
        );
    }

    fn collect_impl(&mut self, decl: &ImplDecl) {
        let Some(target) = type_head_name(&decl.target) else {
            self.handler.error(
                codes::T003_UNDEFINED_TYPE,
                "impl target must be a named type",
                decl.span,
            );
            return;
        };
        let target_ty = self.resolve_type(&decl.target);

        let mut methods = indexmap::IndexMap::new();
        for method in &decl.methods {
            let (sig, _) = self.resolve_signature(method, Some(target_ty));
            methods.insert(method.name, sig);
        }

        match decl.trait_name {
            Some(trait_name) => {
                self.registry.impls.push(ImplInfo {
                    trait_name,
                    target,
                    methods,
                    span: decl.span,
                });
            }
            None => {
                // Inherent impl: extension functions, registered in
                // appearance order (the method-resolution tiebreak).
                let entry = self.registry.extensions.entry(target).or_default();
                for (name, sig) in methods {
                    entry.push((name, sig));
                }
            }
        }
    }

    fn collect_import(&mut self, decl: &ImportDecl) {
        let module_key = join_path(&decl.path);
        match &decl.items {
            None => {
                let alias = decl.alias.unwrap_or_else(|| *decl.path.last().unwrap());
                if !self.exports.contains_key(&module_key) {
                    self.handler.error(
                        codes::T036_UNDEFINED_MODULE,
                        format!("module `{module_key}` is not loaded"),
                        decl.span,
                    );
                }
                let depth = self.scopes.depth();
                self.scopes.define(SymbolInfo {
                    name: alias,
                    ty: self.types.unknown,
                    mutable: false,
                    kind: SymbolKind::ModuleAlias,
                    depth,
                    span: decl.span,
                    state: OwnState::Owned,
                    module: Some(module_key),
                });
            }
            Some(items) => {
                let Some(exported) = self.exports.get(&module_key).cloned() else {
                    self.handler.error(
                        codes::T036_UNDEFINED_MODULE,
                        format!("module `{module_key}` is not loaded"),
                        decl.span,
                    );
                    return;
                };
                if items.is_empty() {
                    // `from m import *`
                    for (name, info) in exported {
                        let mut info = info.clone();
                        info.name = name;
                        info.depth = self.scopes.depth();
                        self.scopes.define(info);
                    }
                } else {
                    for (name, alias) in items {
                        match exported.get(name) {
                            Some(info) => {
                                let mut info = info.clone();
                                info.name = alias.unwrap_or(*name);
                                info.depth = self.scopes.depth();
                                self.scopes.define(info);
                            }
                            None => self.handler.error(
                                codes::T002_UNDEFINED_VARIABLE,
                                format!("module `{module_key}` does not export `{name}`"),
                                decl.span,
                            ),
                        }
                    }
                }
            }
        }
    }

    fn harvest_exports(&mut self) {
        let mut table = FxHashMap::default();
        for name in self.exported_names.iter() {
            if let Some(info) = self.scopes.module_scope().symbols.get(name) {
                table.insert(*name, info.clone());
            }
        }
        self.exports.insert(self.current_module, table);
    }

    // ----- shared helpers -----------------------------------------------

    /// Run `f` inside a nested scope; the pop happens on every exit
    /// path.
    pub(crate) fn with_scope<R>(&mut self, kind: ScopeKind, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scopes.push(kind);
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Define each generic parameter as a type symbol in the current
    /// scope.
    pub(crate) fn bind_generics(&mut self, generics: &[tocin_par::ast::GenericParam]) {
        for g in generics {
            for bound in &g.bounds {
                if !self.registry.traits.contains_key(bound) {
                    // Bounds may name traits from other modules that are
                    // resolved lazily; only flag clearly unknown ones.
                    if !self.exports.values().any(|e| e.contains_key(bound)) {
                        self.handler.error(
                            codes::T003_UNDEFINED_TYPE,
                            format!("unknown trait `{bound}` in bound"),
                            g.span,
                        );
                    }
                }
            }
            let ty = self.types.intern(TypeKind::TypeParam {
                name: g.name,
                bounds: g.bounds.clone(),
            });
            let depth = self.scopes.depth();
            self.scopes.define(SymbolInfo {
                name: g.name,
                ty,
                mutable: false,
                kind: SymbolKind::Type,
                depth,
                span: g.span,
                state: OwnState::Owned,
                module: None,
            });
        }
    }

    /// Resolve a function's declared signature. `self_ty` supplies the
    /// receiver type for methods.
    pub(crate) fn resolve_signature(
        &mut self,
        decl: &FunctionDecl,
        self_ty: Option<TypeId>,
    ) -> (FuncSig, TypeId) {
        self.with_scope(ScopeKind::Block, |this| {
            this.bind_generics(&decl.generics);
            let saved_self = this.self_ty;
            if let Some(self_ty) = self_ty {
                this.self_ty = Some(self_ty);
            }

            let mut params = Vec::new();
            let mut moves = Vec::new();
            let mut has_self = false;
            for (i, param) in decl.params.iter().enumerate() {
                if i == 0 && matches!(param.ty.kind, TypeExprKind::SelfType) {
                    has_self = true;
                    continue;
                }
                params.push(this.resolve_type(&param.ty));
                moves.push(param.is_move);
            }
            let ret = decl
                .ret
                .as_ref()
                .map(|t| this.resolve_type(t))
                .unwrap_or(this.types.void);

            let sig = FuncSig {
                params: params.clone(),
                moves,
                ret,
                is_async: decl.is_async,
                has_self,
                generics: decl
                    .generics
                    .iter()
                    .map(|g| (g.name, g.bounds.clone()))
                    .collect(),
            };
            let external_ret = if decl.is_async {
                this.types.intern(TypeKind::Future(ret))
            } else {
                ret
            };
            let fn_ty = this.types.intern(TypeKind::Func {
                params,
                ret: external_ret,
                is_async: decl.is_async,
            });
            this.self_ty = saved_self;
            (sig, fn_ty)
        })
    }

    /// Resolve a surface type expression to an interned type.
    pub(crate) fn resolve_type(&mut self, te: &TypeExpr) -> TypeId {
        match &te.kind {
            TypeExprKind::Named { name, args } => self.resolve_named_type(*name, args, te.span),
            TypeExprKind::SelfType => match self.self_ty {
                Some(ty) => ty,
                None => {
                    self.handler.error(
                        codes::T003_UNDEFINED_TYPE,
                        "`Self` is only meaningful inside a class, trait, or impl",
                        te.span,
                    );
                    self.types.unknown
                }
            },
            TypeExprKind::Nullable(inner) => {
                let inner = self.resolve_type(inner);
                self.types.nullable(inner)
            }
            TypeExprKind::Pointer(inner) => {
                let inner = self.resolve_type(inner);
                self.types.intern(TypeKind::Pointer(inner))
            }
            TypeExprKind::Reference { inner, mutable } => {
                let inner = self.resolve_type(inner);
                self.types.intern(TypeKind::Ref {
                    inner,
                    mutable: *mutable,
                })
            }
            TypeExprKind::Tuple(elems) => {
                let elems: Vec<TypeId> = elems.iter().map(|e| self.resolve_type(e)).collect();
                self.types.intern(TypeKind::Tuple(elems))
            }
            TypeExprKind::Array { elem, len } => {
                let elem = self.resolve_type(elem);
                self.types.intern(TypeKind::Array { elem, len: *len })
            }
            TypeExprKind::Dict { key, value } => {
                let key = self.resolve_type(key);
                let value = self.resolve_type(value);
                self.types.intern(TypeKind::Dict { key, value })
            }
            TypeExprKind::Func { params, ret } => {
                let params: Vec<TypeId> = params.iter().map(|p| self.resolve_type(p)).collect();
                let ret = self.resolve_type(ret);
                self.types.intern(TypeKind::Func {
                    params,
                    ret,
                    is_async: false,
                })
            }
        }
    }

    fn resolve_named_type(&mut self, name: Symbol, args: &[TypeExpr], span: Span) -> TypeId {
        let resolved_args: Vec<TypeId> = args.iter().map(|a| self.resolve_type(a)).collect();
        match name.as_str() {
            "void" if args.is_empty() => return self.types.void,
            "bool" if args.is_empty() => return self.types.bool_,
            "int" if args.is_empty() => return self.types.int,
            "float" if args.is_empty() => return self.types.float,
            "char" if args.is_empty() => return self.types.char_,
            "string" if args.is_empty() => return self.types.string,
            "Option" if resolved_args.len() == 1 => {
                return self.types.intern(TypeKind::Option(resolved_args[0]));
            }
            "Result" if resolved_args.len() == 2 => {
                return self.types.intern(TypeKind::Result {
                    ok: resolved_args[0],
                    err: resolved_args[1],
                });
            }
            "Chan" if resolved_args.len() == 1 => {
                return self.types.intern(TypeKind::Chan {
                    elem: resolved_args[0],
                    can_send: true,
                    can_recv: true,
                });
            }
            "Future" if resolved_args.len() == 1 => {
                return self.types.intern(TypeKind::Future(resolved_args[0]));
            }
            _ => {}
        }

        // In-scope type parameter?
        if let Some(info) = self.scopes.lookup(name) {
            if info.kind == SymbolKind::Type {
                if let TypeKind::TypeParam { .. } = self.types.kind(info.ty) {
                    return info.ty;
                }
            }
        }

        if let Some(class) = self.registry.classes.get(&name) {
            let expected = class.generics.len();
            let generics = class.generics.clone();
            if resolved_args.len() != expected {
                self.handler.error(
                    codes::T004_ARITY_MISMATCH,
                    format!(
                        "`{name}` expects {expected} type argument(s), got {}",
                        resolved_args.len()
                    ),
                    span,
                );
                return self.types.unknown;
            }
            if !resolved_args.is_empty() {
                self.check_bounds(&generics, &resolved_args, span);
                let mangled = self.types.mangle(name, &resolved_args);
                self.cache.insert(name, resolved_args.clone(), mangled);
            }
            return self.types.intern(TypeKind::Named {
                name,
                args: resolved_args,
            });
        }

        if let Some(trait_info) = self.registry.traits.get(&name) {
            if !trait_info.is_object_safe() {
                self.handler.error(
                    codes::T033_NOT_OBJECT_SAFE,
                    format!(
                        "trait `{name}` cannot be used as a type: a method mentions `{name}` itself or is generic"
                    ),
                    span,
                );
            }
            return self.types.intern(TypeKind::TraitObject {
                name,
                args: resolved_args,
            });
        }

        self.handler.error(
            codes::T003_UNDEFINED_TYPE,
            format!("unknown type `{name}`"),
            span,
        );
        self.types.unknown
    }

    /// Check concrete type arguments against declared trait bounds.
    pub(crate) fn check_bounds(
        &mut self,
        generics: &[(Symbol, Vec<Symbol>)],
        args: &[TypeId],
        span: Span,
    ) {
        for ((param, bounds), &arg) in generics.iter().zip(args) {
            if self.types.is_unknown(arg) {
                continue;
            }
            for &bound in bounds {
                if !self.type_implements(arg, bound) {
                    let shown = self.types.display(arg);
                    self.handler.error(
                        codes::T030_TRAIT_BOUND_NOT_SATISFIED,
                        format!("`{shown}` does not implement `{bound}` required by `{param}`"),
                        span,
                    );
                }
            }
        }
    }

    /// Does a concrete type satisfy a trait bound?
    pub(crate) fn type_implements(&self, ty: TypeId, trait_name: Symbol) -> bool {
        match self.types.kind(ty) {
            TypeKind::Named { name, .. } => self.registry.implements(*name, trait_name),
            TypeKind::TraitObject { name, .. } => *name == trait_name,
            TypeKind::TypeParam { bounds, .. } => bounds.contains(&trait_name),
            other => {
                // Primitives implement a trait through an impl block on
                // their spelling.
                if let Some(head) = primitive_head(other) {
                    self.registry.impl_of(trait_name, head).is_some()
                } else {
                    false
                }
            }
        }
    }

    /// Does `ty` mention `marker` anywhere in its structure?
    pub(crate) fn type_mentions(&self, ty: TypeId, marker: TypeId) -> bool {
        if ty == marker {
            return true;
        }
        match self.types.kind(ty) {
            TypeKind::Named { args, .. } | TypeKind::TraitObject { args, .. } => {
                args.iter().any(|&a| self.type_mentions(a, marker))
            }
            TypeKind::Func { params, ret, .. } => {
                params.iter().any(|&p| self.type_mentions(p, marker))
                    || self.type_mentions(*ret, marker)
            }
            TypeKind::Tuple(elems) => elems.iter().any(|&e| self.type_mentions(e, marker)),
            TypeKind::Array { elem, .. } => self.type_mentions(*elem, marker),
            TypeKind::Dict { key, value } => {
                self.type_mentions(*key, marker) || self.type_mentions(*value, marker)
            }
            TypeKind::Pointer(inner)
            | TypeKind::Ref { inner, .. }
            | TypeKind::Nullable(inner)
            | TypeKind::Option(inner)
            | TypeKind::Future(inner)
            | TypeKind::Chan { elem: inner, .. } => self.type_mentions(*inner, marker),
            TypeKind::Result { ok, err } => {
                self.type_mentions(*ok, marker) || self.type_mentions(*err, marker)
            }
            _ => false,
        }
    }

    // ----- statement checking -------------------------------------------

    pub(crate) fn check_block(&mut self, body: &mut [Stmt]) {
        self.with_scope(ScopeKind::Block, |this| {
            for stmt in body {
                this.check_stmt(stmt);
            }
        });
    }

    pub(crate) fn check_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::Let {
                name,
                ty,
                init,
                mutable,
                resolved,
            } => {
                let declared = ty.as_ref().map(|t| self.resolve_type(t));
                let init_ty = init.as_mut().map(|e| self.check_expr(e));
                let final_ty = match (declared, init_ty) {
                    (Some(declared), Some(actual)) => {
                        self.require_assignable(
                            actual,
                            declared,
                            init.as_ref().map(|e| e.span).unwrap_or(stmt.span),
                        );
                        declared
                    }
                    (Some(declared), None) => declared,
                    (None, Some(actual)) => {
                        // `nil` alone gives a nullable of unknown.
                        if actual == self.types.nil {
                            let unknown = self.types.unknown;
                            self.types.nullable(unknown)
                        } else {
                            actual
                        }
                    }
                    (None, None) => {
                        self.handler.error(
                            codes::T001_TYPE_MISMATCH,
                            format!("`{name}` needs a type annotation or an initializer"),
                            stmt.span,
                        );
                        self.types.unknown
                    }
                };
                *resolved = Some(final_ty);
                let depth = self.scopes.depth();
                self.scopes.define(SymbolInfo::variable(
                    *name, final_ty, *mutable, depth, stmt.span,
                ));
            }
            StmtKind::If {
                cond,
                then_body,
                elifs,
                else_body,
            } => {
                let cond_ty = self.check_expr(cond);
                self.require_bool(cond_ty, cond.span);
                let narrowing = self.narrowing_of(cond);
                self.with_narrowing(narrowing.clone().filter(|n| n.1).map(|n| n.0), |this| {
                    this.check_block(then_body);
                });
                for (elif_cond, elif_body) in elifs {
                    let ty = self.check_expr(elif_cond);
                    self.require_bool(ty, elif_cond.span);
                    let elif_narrowing = self.narrowing_of(elif_cond);
                    self.with_narrowing(
                        elif_narrowing.filter(|n| n.1).map(|n| n.0),
                        |this| this.check_block(elif_body),
                    );
                }
                if let Some(else_body) = else_body {
                    self.with_narrowing(
                        narrowing.filter(|n| !n.1).map(|n| n.0),
                        |this| this.check_block(else_body),
                    );
                }
            }
            StmtKind::While { cond, body } => {
                let cond_ty = self.check_expr(cond);
                self.require_bool(cond_ty, cond.span);
                self.check_block(body);
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                let iter_ty = self.check_expr(iterable);
                let elem_ty = self.element_type(iter_ty);
                self.with_scope(ScopeKind::Block, |this| {
                    let depth = this.scopes.depth();
                    this.scopes.define(SymbolInfo::variable(
                        *var,
                        elem_ty,
                        false,
                        depth,
                        iterable.span,
                    ));
                    for s in body {
                        this.check_stmt(s);
                    }
                });
            }
            StmtKind::Function(decl) => {
                // Nested functions are declared at first sight.
                if self.scopes.depth() > 0 {
                    self.collect_function(decl, false);
                }
                self.check_function(decl, None);
            }
            StmtKind::Return(value) => self.check_return(value.as_mut(), stmt.span),
            StmtKind::Class(decl) => self.check_class(decl),
            StmtKind::Trait(decl) => self.check_trait(decl),
            StmtKind::Impl(decl) => self.check_impl(decl),
            StmtKind::Import(_) | StmtKind::Module(_) => {}
            StmtKind::Export(inner) => self.check_stmt(inner),
            StmtKind::Match { scrutinee, cases } => self.check_match(scrutinee, cases, stmt.span),
            StmtKind::Go(expr) => self.check_go(expr, stmt.span),
            StmtKind::Select { cases, default } => self.check_select(cases, default, stmt.span),
            StmtKind::Error => {}
        }
    }

    pub(crate) fn check_function(&mut self, decl: &mut FunctionDecl, self_ty: Option<TypeId>) {
        if decl.is_async && !self.toggles.allow_async {
            self.handler.error(
                codes::G001_FEATURE_DISABLED,
                "async functions are disabled (--no-async)",
                decl.span,
            );
        }
        let decl_span = decl.span;
        let ret_expr = decl.ret.clone();
        self.with_scope(ScopeKind::Function, |this| {
            this.bind_generics(&decl.generics);
            let saved_self = this.self_ty;
            if self_ty.is_some() {
                this.self_ty = self_ty;
            }
            let ret = ret_expr
                .as_ref()
                .map(|t| this.resolve_type(t))
                .unwrap_or(this.types.void);

            for param in &decl.params {
                let ty = if matches!(param.ty.kind, TypeExprKind::SelfType) {
                    this.self_ty.unwrap_or(this.types.unknown)
                } else {
                    this.resolve_type(&param.ty)
                };
                let depth = this.scopes.depth();
                let mut info = SymbolInfo::variable(param.name, ty, true, depth, param.span);
                info.kind = SymbolKind::Parameter;
                this.scopes.define(info);
            }

            this.fn_stack.push(FnCtx {
                ret,
                is_async: decl.is_async,
            });
            for s in &mut decl.body {
                this.check_stmt(s);
            }
            this.fn_stack.pop();

            let needs_return = ret != this.types.void && !this.types.is_unknown(ret);
            if needs_return && !all_paths_return(&decl.body) {
                this.handler.error(
                    codes::T013_MISSING_RETURN,
                    format!(
                        "`{}` returns `{}` but not every path returns a value",
                        decl.name,
                        this.types.display(ret)
                    ),
                    decl_span,
                );
            }
            this.self_ty = saved_self;
        });
    }

    fn check_return(&mut self, value: Option<&mut tocin_par::ast::Expr>, span: Span) {
        let Some(ctx_ret) = self.fn_stack.last().map(|c| c.ret) else {
            self.handler.error(
                codes::T008_RETURN_OUTSIDE_FUNCTION,
                "`return` outside of a function",
                span,
            );
            if let Some(value) = value {
                self.check_expr(value);
            }
            return;
        };
        match value {
            Some(value) => {
                let actual = self.check_expr(value);
                // Returning a nullable where the function promises a
                // non-nullable is a dereference-shaped null error.
                if self.types.is_nullable(actual)
                    && !self.types.is_nullable(ctx_ret)
                    && !self.types.is_unknown(ctx_ret)
                    && !self.types.contains_unknown(actual)
                {
                    let shown_actual = self.types.display(actual);
                    let shown_ret = self.types.display(ctx_ret);
                    self.handler.error(
                        codes::N003_NULLABLE_DEREFERENCE,
                        format!("returning `{shown_actual}` where non-nullable `{shown_ret}` is required; check for nil, use `?.`, `?:`, or `!!`"),
                        value.span,
                    );
                } else {
                    self.require_assignable(actual, ctx_ret, value.span);
                }
            }
            None => {
                if ctx_ret != self.types.void && !self.types.is_unknown(ctx_ret) {
                    let shown = self.types.display(ctx_ret);
                    self.handler.error(
                        codes::T001_TYPE_MISMATCH,
                        format!("empty return in a function returning `{shown}`"),
                        span,
                    );
                }
            }
        }
    }

    fn check_class(&mut self, decl: &mut ClassDecl) {
        let class_args: Vec<TypeId> = decl
            .generics
            .iter()
            .map(|g| {
                self.types.intern(TypeKind::TypeParam {
                    name: g.name,
                    bounds: g.bounds.clone(),
                })
            })
            .collect();
        let self_ty = self.types.intern(TypeKind::Named {
            name: decl.name,
            args: class_args,
        });
        let generics = decl.generics.clone();
        self.with_scope(ScopeKind::Class, |this| {
            this.bind_generics(&generics);
            for method in &mut decl.methods {
                this.check_function(method, Some(self_ty));
            }
        });
    }

    fn check_trait(&mut self, decl: &mut TraitDecl) {
        let marker = self.types.intern(TypeKind::TraitObject {
            name: decl.name,
            args: vec![],
        });
        let generics = decl.generics.clone();
        self.with_scope(ScopeKind::Class, |this| {
            this.bind_generics(&generics);
            for method in &mut decl.methods {
                if method.has_default {
                    this.check_function(&mut method.decl, Some(marker));
                }
            }
        });
    }

    fn check_impl(&mut self, decl: &mut ImplDecl) {
        let target_ty = self.resolve_type(&decl.target);
        let Some(target) = type_head_name(&decl.target) else {
            return;
        };

        if let Some(trait_name) = decl.trait_name {
            let Some(trait_info) = self.registry.traits.get(&trait_name).cloned() else {
                self.handler.error(
                    codes::T003_UNDEFINED_TYPE,
                    format!("unknown trait `{trait_name}`"),
                    decl.span,
                );
                for method in &mut decl.methods {
                    self.check_function(method, Some(target_ty));
                }
                return;
            };
            let marker = self.types.intern(TypeKind::TraitObject {
                name: trait_name,
                args: vec![],
            });
            let impl_info = self.registry.impl_of(trait_name, target).cloned();

            // (i) every required method is implemented or defaulted
            for (name, req) in &trait_info.methods {
                let provided = impl_info
                    .as_ref()
                    .map(|im| im.methods.contains_key(name))
                    .unwrap_or(false);
                if !provided && !req.has_default {
                    self.handler.error(
                        codes::T031_MISSING_TRAIT_METHOD,
                        format!(
                            "impl of `{trait_name}` for `{target}` is missing required method `{name}`"
                        ),
                        decl.span,
                    );
                }
            }

            // (ii) implemented signatures match, with the trait's own
            // type standing for the implementing type
            if let Some(impl_info) = &impl_info {
                for (name, sig) in &impl_info.methods {
                    let Some(req) = trait_info.methods.get(name) else {
                        self.handler.error(
                            codes::T032_TRAIT_SIGNATURE_MISMATCH,
                            format!("`{name}` is not a method of trait `{trait_name}`"),
                            decl.span,
                        );
                        continue;
                    };
                    let expected = self.replace_in_sig(&req.sig, marker, target_ty);
                    if !sig.matches(&expected) {
                        self.handler.error(
                            codes::T032_TRAIT_SIGNATURE_MISMATCH,
                            format!(
                                "`{name}` does not match the signature required by `{trait_name}`"
                            ),
                            decl.span,
                        );
                    }
                }
            }
        }

        for method in &mut decl.methods {
            self.check_function(method, Some(target_ty));
        }
    }

    /// Substitute `marker` (the trait's own type) with `target` across a
    /// signature, for conformance comparison.
    fn replace_in_sig(&mut self, sig: &FuncSig, marker: TypeId, target: TypeId) -> FuncSig {
        let params = sig
            .params
            .iter()
            .map(|&p| self.replace_type(p, marker, target))
            .collect();
        let ret = self.replace_type(sig.ret, marker, target);
        FuncSig {
            params,
            moves: sig.moves.clone(),
            ret,
            is_async: sig.is_async,
            has_self: sig.has_self,
            generics: sig.generics.clone(),
        }
    }

    fn replace_type(&mut self, ty: TypeId, from: TypeId, to: TypeId) -> TypeId {
        if ty == from {
            return to;
        }
        match self.types.kind(ty).clone() {
            TypeKind::Named { name, args } => {
                let args = args
                    .into_iter()
                    .map(|a| self.replace_type(a, from, to))
                    .collect();
                self.types.intern(TypeKind::Named { name, args })
            }
            TypeKind::Nullable(inner) => {
                let inner = self.replace_type(inner, from, to);
                self.types.nullable(inner)
            }
            TypeKind::Option(inner) => {
                let inner = self.replace_type(inner, from, to);
                self.types.intern(TypeKind::Option(inner))
            }
            TypeKind::Result { ok, err } => {
                let ok = self.replace_type(ok, from, to);
                let err = self.replace_type(err, from, to);
                self.types.intern(TypeKind::Result { ok, err })
            }
            TypeKind::Array { elem, len } => {
                let elem = self.replace_type(elem, from, to);
                self.types.intern(TypeKind::Array { elem, len })
            }
            TypeKind::Func {
                params,
                ret,
                is_async,
            } => {
                let params = params
                    .into_iter()
                    .map(|p| self.replace_type(p, from, to))
                    .collect();
                let ret = self.replace_type(ret, from, to);
                self.types.intern(TypeKind::Func {
                    params,
                    ret,
                    is_async,
                })
            }
            _ => ty,
        }
    }

    /// The element a `for` loop binds for a given iterable type.
    fn element_type(&mut self, iter_ty: TypeId) -> TypeId {
        match self.types.kind(iter_ty).clone() {
            TypeKind::Array { elem, .. } => elem,
            TypeKind::Str => self.types.char_,
            TypeKind::Dict { key, .. } => key,
            TypeKind::Chan { elem, .. } => elem,
            TypeKind::Unknown => self.types.unknown,
            // Anything else goes through the runtime iterator protocol.
            _ => self.types.unknown,
        }
    }
}

/// Does every control-flow path through `body` end in a return?
pub(crate) fn all_paths_return(body: &[Stmt]) -> bool {
    body.iter().any(stmt_returns)
}

fn stmt_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::If {
            then_body,
            elifs,
            else_body,
            ..
        } => {
            else_body.as_ref().is_some_and(|e| all_paths_return(e))
                && all_paths_return(then_body)
                && elifs.iter().all(|(_, body)| all_paths_return(body))
        }
        StmtKind::Match { cases, .. } => {
            !cases.is_empty() && cases.iter().all(|c| all_paths_return(&c.body))
        }
        _ => false,
    }
}

/// The head name of a surface type, used to key impls and extensions.
pub(crate) fn type_head_name(te: &TypeExpr) -> Option<Symbol> {
    match &te.kind {
        TypeExprKind::Named { name, .. } => Some(*name),
        _ => None,
    }
}

/// Primitive types are keyed by their surface spelling for impl lookup.
pub(crate) fn primitive_head(kind: &TypeKind) -> Option<Symbol> {
    let name = match kind {
        TypeKind::Bool => "bool",
        TypeKind::Int => "int",
        TypeKind::Float => "float",
        TypeKind::Char => "char",
        TypeKind::Str => "string",
        _ => return None,
    };
    Some(Symbol::intern(name))
}

pub(crate) fn join_path(path: &[Symbol]) -> Symbol {
    let joined: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
    Symbol::intern(&joined.join("."))
}
