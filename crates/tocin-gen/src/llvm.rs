//! LLVM IR lowering for the typed AST.
//!
//! The lowerer owns the LLVM context handles, a single builder whose
//! insertion point moves across basic blocks, a stack of scope-local
//! maps from source name to stack slot, and a registry of lowered
//! function handles. Every local is stack-allocated at function entry;
//! reads and writes become loads and stores, leaving SSA construction
//! to the optimizer. Every basic block is terminated exactly once, and
//! the builder is never left dangling at the end of a function.

mod call;
mod expr;
mod lower;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue,
};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};
use rustc_hash::FxHashMap;

use tocin_par::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, InterpPart, LiteralPat, MatchCase, PatternKind,
    SelectCase, SelectOp, Stmt, StmtKind, TypeExprKind, UnaryOp,
};
use tocin_sem::{Analysis, FuncSig, TypeKind};
use tocin_util::diagnostic::codes;
use tocin_util::{Handler, Symbol, TypeId};

use crate::error::{CodeGenError, Result};
use crate::runtime::Runtime;
use crate::types::{flat_fields, TypeMapper};

/// One stack slot.
#[derive(Clone, Copy)]
struct Local<'ctx> {
    ptr: PointerValue<'ctx>,
    ty: TypeId,
}

/// A function queued for declaration and definition.
struct PendingFn {
    decl: FunctionDecl,
    /// Emitted symbol name.
    symbol: String,
    /// Receiver type for methods.
    self_ty: Option<TypeId>,
    sig: FuncSig,
    /// Type-parameter substitution for generic instantiations.
    subst: FxHashMap<Symbol, TypeId>,
}

pub struct Lowerer<'ctx, 'a> {
    context: &'ctx Context,
    pub module: Module<'ctx>,
    builder: Builder<'ctx>,
    mapper: TypeMapper<'ctx>,
    runtime: Runtime<'ctx>,
    analysis: &'a mut Analysis,
    handler: &'a Handler,
    locals: Vec<FxHashMap<Symbol, Local<'ctx>>>,
    functions: FxHashMap<String, (FunctionValue<'ctx>, FuncSig)>,
    vtables: FxHashMap<String, PointerValue<'ctx>>,
    subst: FxHashMap<Symbol, TypeId>,
    /// Default method bodies per (trait, method), stashed while
    /// gathering so impls that omit them can materialize a copy.
    trait_defaults: FxHashMap<(Symbol, Symbol), FunctionDecl>,
    current_ret: TypeId,
    current_async: bool,
    counter: usize,
}

impl<'ctx, 'a> Lowerer<'ctx, 'a> {
    pub fn new(
        context: &'ctx Context,
        module_name: &str,
        analysis: &'a mut Analysis,
        handler: &'a Handler,
    ) -> Self {
        let module = context.create_module(module_name);
        let runtime = Runtime::declare(context, &module);
        let void = analysis.types.void;
        Self {
            context,
            module,
            builder: context.create_builder(),
            mapper: TypeMapper::new(context),
            runtime,
            analysis,
            handler,
            locals: Vec::new(),
            functions: FxHashMap::default(),
            vtables: FxHashMap::default(),
            subst: FxHashMap::default(),
            trait_defaults: FxHashMap::default(),
            current_ret: void,
            current_async: false,
            counter: 0,
        }
    }

    /// Lower one module: declare every function (concrete generic
    /// instantiations included), define their bodies, wrap top-level
    /// statements into `main`, and verify.
    pub fn lower(&mut self, ast: &tocin_par::ast::Module) -> Result<()> {
        let pendings = self.gather(ast)?;
        for pending in &pendings {
            self.declare(pending);
        }
        for pending in &pendings {
            self.define(pending)?;
        }
        self.emit_main(ast)?;

        if let Err(message) = self.module.verify() {
            self.handler.error(
                codes::C001_VERIFIER_FAILED,
                format!(
                    "internal compiler error: emitted module failed verification: {}",
                    message.to_string().lines().next().unwrap_or_default()
                ),
                tocin_util::Span::DUMMY,
            );
            return Err(CodeGenError::VerifierFailed(message.to_string()));
        }
        Ok(())
    }

    /// Textual IR of the lowered module.
    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    // ----- gathering and declaration ------------------------------------

    fn gather(&mut self, ast: &tocin_par::ast::Module) -> Result<Vec<PendingFn>> {
        // Stash trait default bodies first: impls anywhere in the
        // module may need them.
        for stmt in &ast.body {
            self.remember_trait_defaults(stmt);
        }
        let mut pendings = Vec::new();
        for stmt in &ast.body {
            self.gather_stmt(stmt, &mut pendings)?;
        }
        Ok(pendings)
    }

    fn remember_trait_defaults(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Export(inner) => self.remember_trait_defaults(inner),
            StmtKind::Trait(decl) => {
                for method in &decl.methods {
                    if method.has_default {
                        self.trait_defaults
                            .insert((decl.name, method.decl.name), method.decl.clone());
                    }
                }
            }
            _ => {}
        }
    }

    fn gather_stmt(&mut self, stmt: &Stmt, pendings: &mut Vec<PendingFn>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Export(inner) => self.gather_stmt(inner, pendings)?,
            StmtKind::Function(decl) => {
                let Some(sig) = self.analysis.functions.get(&decl.name).cloned() else {
                    return Ok(());
                };
                if sig.generics.is_empty() {
                    pendings.push(PendingFn {
                        decl: decl.clone(),
                        symbol: free_fn_symbol(decl.name),
                        self_ty: None,
                        sig,
                        subst: FxHashMap::default(),
                    });
                } else {
                    // Generic declarations are not emitted in the
                    // abstract; each cached instantiation is.
                    let instances: Vec<(Vec<TypeId>, String)> = self
                        .analysis
                        .instantiations
                        .iter()
                        .filter(|inst| inst.base == decl.name)
                        .map(|inst| (inst.args.clone(), inst.mangled.clone()))
                        .collect();
                    for (args, mangled) in instances {
                        let subst: FxHashMap<Symbol, TypeId> = sig
                            .generics
                            .iter()
                            .map(|(name, _)| *name)
                            .zip(args.iter().copied())
                            .collect();
                        let inst_sig = self.substitute_sig(&sig, &subst);
                        pendings.push(PendingFn {
                            decl: decl.clone(),
                            symbol: mangled,
                            self_ty: None,
                            sig: inst_sig,
                            subst,
                        });
                    }
                }
            }
            StmtKind::Class(class) => {
                let generics: Vec<Symbol> = self
                    .analysis
                    .registry
                    .classes
                    .get(&class.name)
                    .map(|c| c.generics.iter().map(|(n, _)| *n).collect())
                    .unwrap_or_default();
                if generics.is_empty() {
                    let self_ty = self.analysis.types.intern(TypeKind::Named {
                        name: class.name,
                        args: vec![],
                    });
                    for method in &class.methods {
                        let Some(sig) = self
                            .analysis
                            .registry
                            .classes
                            .get(&class.name)
                            .and_then(|c| c.methods.get(&method.name))
                            .cloned()
                        else {
                            continue;
                        };
                        pendings.push(PendingFn {
                            decl: method.clone(),
                            symbol: method_symbol(class.name, method.name),
                            self_ty: Some(self_ty),
                            sig,
                            subst: FxHashMap::default(),
                        });
                    }
                } else {
                    // Generic classes: each cached instantiation gets
                    // its own method set under the mangled class name.
                    let instances: Vec<(Vec<TypeId>, String)> = self
                        .analysis
                        .instantiations
                        .iter()
                        .filter(|inst| inst.base == class.name)
                        .map(|inst| (inst.args.clone(), inst.mangled.clone()))
                        .collect();
                    for (args, mangled) in instances {
                        let subst: FxHashMap<Symbol, TypeId> = generics
                            .iter()
                            .copied()
                            .zip(args.iter().copied())
                            .collect();
                        let self_ty = self.analysis.types.intern(TypeKind::Named {
                            name: class.name,
                            args: args.clone(),
                        });
                        for method in &class.methods {
                            let Some(sig) = self
                                .analysis
                                .registry
                                .classes
                                .get(&class.name)
                                .and_then(|c| c.methods.get(&method.name))
                                .cloned()
                            else {
                                continue;
                            };
                            let inst_sig = self.substitute_sig(&sig, &subst);
                            pendings.push(PendingFn {
                                decl: method.clone(),
                                symbol: format!("{mangled}_{}", method.name),
                                self_ty: Some(self_ty),
                                sig: inst_sig,
                                subst: subst.clone(),
                            });
                        }
                    }
                }
            }
            StmtKind::Impl(decl) => {
                let target = match &decl.target.kind {
                    TypeExprKind::Named { name, .. } => *name,
                    _ => return Ok(()),
                };
                let self_ty = self.resolve_impl_self_ty(target);
                match decl.trait_name {
                    Some(trait_name) => {
                        for method in &decl.methods {
                            let Some(sig) = self
                                .analysis
                                .registry
                                .impl_of(trait_name, target)
                                .and_then(|im| im.methods.get(&method.name))
                                .cloned()
                            else {
                                continue;
                            };
                            pendings.push(PendingFn {
                                decl: method.clone(),
                                symbol: trait_method_symbol(trait_name, target, method.name),
                                self_ty: Some(self_ty),
                                sig,
                                subst: FxHashMap::default(),
                            });
                        }
                        // Materialize trait defaults the impl leaves out.
                        self.gather_trait_defaults(trait_name, target, self_ty, decl, pendings);
                    }
                    None => {
                        for method in &decl.methods {
                            let Some(sig) = self
                                .analysis
                                .registry
                                .extensions
                                .get(&target)
                                .and_then(|entries| {
                                    entries
                                        .iter()
                                        .find(|(n, _)| *n == method.name)
                                        .map(|(_, s)| s.clone())
                                })
                            else {
                                continue;
                            };
                            pendings.push(PendingFn {
                                decl: method.clone(),
                                symbol: extension_symbol(target, method.name),
                                self_ty: Some(self_ty),
                                sig,
                                subst: FxHashMap::default(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn gather_trait_defaults(
        &mut self,
        trait_name: Symbol,
        target: Symbol,
        self_ty: TypeId,
        impl_decl: &tocin_par::ast::ImplDecl,
        pendings: &mut Vec<PendingFn>,
    ) {
        let Some(trait_info) = self.analysis.registry.traits.get(&trait_name).cloned() else {
            return;
        };
        let _ = impl_decl;
        for (name, info) in &trait_info.methods {
            let implemented = self
                .analysis
                .registry
                .impl_of(trait_name, target)
                .map(|im| im.methods.contains_key(name))
                .unwrap_or(false);
            if implemented || !info.has_default {
                continue;
            }
            if let Some(decl) = self.trait_default_body(trait_name, *name) {
                pendings.push(PendingFn {
                    decl,
                    symbol: trait_method_symbol(trait_name, target, *name),
                    self_ty: Some(self_ty),
                    sig: info.sig.clone(),
                    subst: FxHashMap::default(),
                });
            }
        }
    }

    fn trait_default_body(&self, trait_name: Symbol, method: Symbol) -> Option<FunctionDecl> {
        self.trait_defaults.get(&(trait_name, method)).cloned()
    }

    fn resolve_impl_self_ty(&mut self, target: Symbol) -> TypeId {
        match target.as_str() {
            "int" => self.analysis.types.int,
            "float" => self.analysis.types.float,
            "bool" => self.analysis.types.bool_,
            "char" => self.analysis.types.char_,
            "string" => self.analysis.types.string,
            _ => self.analysis.types.intern(TypeKind::Named {
                name: target,
                args: vec![],
            }),
        }
    }

    fn declare(&mut self, pending: &PendingFn) {
        let fn_type = self.llvm_fn_type(&pending.sig, pending.self_ty.is_some());
        let function = self.module.add_function(&pending.symbol, fn_type, None);
        self.functions
            .insert(pending.symbol.clone(), (function, pending.sig.clone()));

        // Async functions also get the awaiting wrapper the runtime and
        // FFI shells call synchronously.
        if pending.sig.is_async {
            let mut sync_sig = pending.sig.clone();
            sync_sig.is_async = false;
            let sync_type = self.llvm_fn_type(&sync_sig, pending.self_ty.is_some());
            let sync_name = format!("{}__sync", pending.symbol);
            let wrapper = self.module.add_function(&sync_name, sync_type, None);
            self.functions.insert(sync_name, (wrapper, sync_sig));
        }
    }

    fn llvm_fn_type(
        &mut self,
        sig: &FuncSig,
        has_receiver: bool,
    ) -> inkwell::types::FunctionType<'ctx> {
        let ptr = self.context.ptr_type(AddressSpace::default());
        let mut params: Vec<inkwell::types::BasicMetadataTypeEnum> = Vec::new();
        if has_receiver {
            params.push(ptr.into());
        }
        for &p in &sig.params {
            let p = self.concrete(p);
            params.push(
                self.mapper
                    .map(&mut self.analysis.types, &self.analysis.registry, p)
                    .into(),
            );
        }
        if sig.is_async {
            // Externally a Future: an opaque runtime pointer.
            return ptr.fn_type(&params, false);
        }
        let ret = self.concrete(sig.ret);
        if self.mapper.is_void(&self.analysis.types, ret) {
            self.context.void_type().fn_type(&params, false)
        } else {
            self.mapper
                .map(&mut self.analysis.types, &self.analysis.registry, ret)
                .fn_type(&params, false)
        }
    }

    /// Apply the active type-parameter substitution.
    fn concrete(&mut self, ty: TypeId) -> TypeId {
        if self.subst.is_empty() {
            return ty;
        }
        self.analysis
            .types
            .substitute(ty, &self.subst, 0)
            .unwrap_or(ty)
    }

    fn substitute_sig(&mut self, sig: &FuncSig, map: &FxHashMap<Symbol, TypeId>) -> FuncSig {
        let params = sig
            .params
            .iter()
            .map(|&p| self.analysis.types.substitute(p, map, 0).unwrap_or(p))
            .collect();
        let ret = self
            .analysis
            .types
            .substitute(sig.ret, map, 0)
            .unwrap_or(sig.ret);
        FuncSig {
            params,
            ret,
            moves: sig.moves.clone(),
            is_async: sig.is_async,
            has_self: sig.has_self,
            generics: Vec::new(),
        }
    }

    // ----- function definition ------------------------------------------

    fn define(&mut self, pending: &PendingFn) -> Result<()> {
        let function = self.functions[&pending.symbol].0;
        let saved_subst = std::mem::replace(&mut self.subst, pending.subst.clone());
        let saved_ret = self.current_ret;
        let saved_async = self.current_async;
        let saved_block = self.builder.get_insert_block();

        self.current_ret = {
            let r = pending.sig.ret;
            self.concrete(r)
        };
        self.current_async = pending.sig.is_async;

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        // Fresh local map: an inner function never sees the lowering
        // frame of the function that lexically contains it.
        let saved_locals = std::mem::take(&mut self.locals);
        self.locals.push(FxHashMap::default());

        // Parameter slots: allocas followed by stores of the incoming
        // arguments.
        let mut llvm_index = 0u32;
        for (i, param) in pending.decl.params.iter().enumerate() {
            let is_receiver = i == 0 && matches!(param.ty.kind, TypeExprKind::SelfType);
            let ty = if is_receiver {
                pending.self_ty.unwrap_or(self.analysis.types.unknown)
            } else {
                let idx = i - usize::from(pending.sig.has_self);
                let declared = pending.sig.params.get(idx).copied();
                let declared = declared.unwrap_or(self.analysis.types.unknown);
                self.concrete(declared)
            };
            let mapped = self.map_ty(ty);
            let slot = self.builder.build_alloca(mapped, param.name.as_str())?;
            if let Some(value) = function.get_nth_param(llvm_index) {
                self.builder.build_store(slot, value)?;
            }
            llvm_index += 1;
            self.locals
                .last_mut()
                .unwrap()
                .insert(param.name, Local { ptr: slot, ty });
        }

        for stmt in &pending.decl.body {
            self.lower_stmt(stmt)?;
        }
        self.finish_function()?;
        self.locals = saved_locals;

        if pending.sig.is_async {
            self.define_sync_wrapper(pending)?;
        }

        self.subst = saved_subst;
        self.current_ret = saved_ret;
        self.current_async = saved_async;
        if let Some(block) = saved_block {
            self.builder.position_at_end(block);
        }
        Ok(())
    }

    /// `name__sync`: await the future-returning function and hand back
    /// the plain value.
    fn define_sync_wrapper(&mut self, pending: &PendingFn) -> Result<()> {
        let sync_name = format!("{}__sync", pending.symbol);
        let wrapper = self.functions[&sync_name].0;
        let inner = self.functions[&pending.symbol].0;

        let entry = self.context.append_basic_block(wrapper, "entry");
        let saved = self.builder.get_insert_block();
        self.builder.position_at_end(entry);

        let args: Vec<BasicMetadataValueEnum> = (0..inner.count_params())
            .filter_map(|i| wrapper.get_nth_param(i))
            .map(|v| v.into())
            .collect();
        let future = self
            .builder
            .build_call(inner, &args, "future")?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| CodeGenError::Internal("async fn returned void".into()))?;
        let ret = self.concrete(pending.sig.ret);
        if self.mapper.is_void(&self.analysis.types, ret) {
            self.builder.build_call(
                self.runtime.future_get,
                &[future.into()],
                "await",
            )?;
            self.builder.build_return(None)?;
        } else {
            let slot = self
                .builder
                .build_call(self.runtime.future_get, &[future.into()], "await")?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| CodeGenError::Internal("Future_get returned void".into()))?;
            let mapped = self.map_ty(ret);
            let value = self
                .builder
                .build_load(mapped, slot.into_pointer_value(), "value")?;
            self.builder.build_return(Some(&value))?;
        }
        if let Some(block) = saved {
            self.builder.position_at_end(block);
        }
        Ok(())
    }

    /// Close the current function: void fallthrough becomes `ret void`;
    /// a non-void fallthrough is unreachable after the earlier
    /// return-completeness check.
    fn finish_function(&mut self) -> Result<()> {
        let block = self
            .builder
            .get_insert_block()
            .ok_or_else(|| CodeGenError::Internal("builder left dangling".into()))?;
        if block.get_terminator().is_some() {
            return Ok(());
        }
        if self.current_async {
            // Future<void> fallthrough: a promise with no value.
            let promise = self
                .builder
                .build_call(self.runtime.promise_create, &[], "promise")?
                .try_as_basic_value()
                .left()
                .unwrap();
            let future = self
                .builder
                .build_call(
                    self.runtime.promise_get_future,
                    &[promise.into()],
                    "future",
                )?
                .try_as_basic_value()
                .left()
                .unwrap();
            self.builder.build_return(Some(&future))?;
        } else if self.mapper.is_void(&self.analysis.types, self.current_ret) {
            self.builder.build_return(None)?;
        } else {
            self.builder.build_unreachable()?;
        }
        Ok(())
    }

    /// `main`: lower top-level statements in order, call a user-defined
    /// `main` function if one exists, and return 0.
    fn emit_main(&mut self, ast: &tocin_par::ast::Module) -> Result<()> {
        let i32_t = self.context.i32_type();
        let main = self.module.add_function("main", i32_t.fn_type(&[], false), None);
        let entry = self.context.append_basic_block(main, "entry");
        self.builder.position_at_end(entry);
        self.locals.push(FxHashMap::default());
        self.current_ret = self.analysis.types.void;
        self.current_async = false;

        for stmt in &ast.body {
            match &stmt.kind {
                StmtKind::Function(_)
                | StmtKind::Class(_)
                | StmtKind::Trait(_)
                | StmtKind::Impl(_)
                | StmtKind::Import(_)
                | StmtKind::Module(_) => {}
                StmtKind::Export(inner)
                    if matches!(
                        inner.kind,
                        StmtKind::Function(_)
                            | StmtKind::Class(_)
                            | StmtKind::Trait(_)
                            | StmtKind::Impl(_)
                    ) => {}
                _ => self.lower_stmt(stmt)?,
            }
        }

        let user_main = self
            .functions
            .get("tocin_main")
            .map(|(f, sig)| (*f, sig.params.is_empty()));
        if let Some((user_main, no_params)) = user_main {
            if no_params {
                self.builder.build_call(user_main, &[], "user_main")?;
            }
        }

        let block = self.builder.get_insert_block().unwrap();
        if block.get_terminator().is_none() {
            self.builder
                .build_return(Some(&i32_t.const_int(0, false)))?;
        }
        self.locals.pop();
        Ok(())
    }

    // ----- shared helpers -----------------------------------------------

    fn map_ty(&mut self, ty: TypeId) -> BasicTypeEnum<'ctx> {
        let ty = self.concrete(ty);
        self.mapper
            .map(&mut self.analysis.types, &self.analysis.registry, ty)
    }

    fn expr_ty(&mut self, expr: &Expr) -> TypeId {
        let ty = expr.ty.unwrap_or(self.analysis.types.unknown);
        self.concrete(ty)
    }

    fn fresh(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{}", self.counter)
    }

    fn lookup_local(&self, name: Symbol) -> Option<Local<'ctx>> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }

    fn define_local(&mut self, name: Symbol, ptr: PointerValue<'ctx>, ty: TypeId) {
        self.locals
            .last_mut()
            .expect("no local scope open")
            .insert(name, Local { ptr, ty });
    }

    /// Branch to `target` unless the current block already terminated.
    fn seal(&mut self, target: BasicBlock<'ctx>) -> Result<()> {
        let block = self
            .builder
            .get_insert_block()
            .ok_or_else(|| CodeGenError::Internal("builder left dangling".into()))?;
        if block.get_terminator().is_none() {
            self.builder.build_unconditional_branch(target)?;
        }
        Ok(())
    }

    fn current_function(&self) -> Result<FunctionValue<'ctx>> {
        self.builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .ok_or_else(|| CodeGenError::Internal("no current function".into()))
    }
}

/// Symbol naming for emitted functions.
pub(crate) fn free_fn_symbol(name: Symbol) -> String {
    // The C entry point is synthesized; a user `main` keeps its body
    // under this name and is called from it.
    if name.as_str() == "main" {
        "tocin_main".to_string()
    } else {
        name.as_str().to_string()
    }
}

pub(crate) fn method_symbol(class: Symbol, method: Symbol) -> String {
    format!("{class}_{method}")
}

pub(crate) fn trait_method_symbol(trait_name: Symbol, target: Symbol, method: Symbol) -> String {
    format!("{trait_name}_{target}_{method}")
}

pub(crate) fn extension_symbol(target: Symbol, method: Symbol) -> String {
    format!("ext_{target}_{method}")
}
