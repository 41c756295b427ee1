//! Call lowering: free functions, generic instantiations, methods
//! (static and virtual), builtins, and indirect calls through function
//! pointers.

use super::*;

impl<'ctx, 'a> Lowerer<'ctx, 'a> {
    pub(crate) fn lower_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        // Builtin printing converts its argument to a string first.
        if let ExprKind::Var(name) = &callee.kind {
            if matches!(name.as_str(), "print" | "println") && self.lookup_local(*name).is_none()
            {
                let target = if name.as_str() == "print" {
                    self.runtime.print
                } else {
                    self.runtime.println
                };
                let text = match args.first() {
                    Some(arg) => {
                        let ty = self.expr_ty(arg);
                        let v = self.lower_expr(arg)?;
                        self.to_string_value(v, ty)?
                    }
                    None => self.string_const(b"").into(),
                };
                self.builder.build_call(target, &[text.into()], "")?;
                return Ok(None);
            }
        }

        // Method call through a receiver.
        if let ExprKind::Field { object, name } | ExprKind::SafeField { object, name } =
            &callee.kind
        {
            let safe = matches!(callee.kind, ExprKind::SafeField { .. });
            return self.lower_method_call(expr, object, *name, safe, args);
        }

        // Named function, possibly generic.
        if let ExprKind::Var(name) | ExprKind::Qualified { name, .. } = &callee.kind {
            if self.lookup_local(*name).is_none() {
                if let Some(sig) = self.analysis.functions.get(name).cloned() {
                    if !sig.generics.is_empty() {
                        return self.lower_generic_call(*name, &sig, args);
                    }
                }
                let symbol = free_fn_symbol(*name);
                if let Some((function, sig)) =
                    self.functions.get(&symbol).map(|(f, s)| (*f, s.clone()))
                {
                    return self.emit_call(function, &sig, None, args);
                }
            }
        }

        // Anything else is a first-class function value.
        let callee_ty = self.expr_ty(callee);
        let TypeKind::Func { params, ret, is_async } =
            self.analysis.types.kind(callee_ty).clone()
        else {
            return Err(CodeGenError::Unsupported(
                "call through a non-function value".into(),
            ));
        };
        let sig = FuncSig {
            params: params.clone(),
            moves: vec![false; params.len()],
            ret,
            is_async,
            has_self: false,
            generics: Vec::new(),
        };
        let fp = self
            .lower_expr(callee)?
            .ok_or_else(|| CodeGenError::Internal("callee has no value".into()))?
            .into_pointer_value();
        let fn_type = self.llvm_fn_type(&sig, false);
        let call_args = self.lower_call_args(&sig, None, args)?;
        let site = self
            .builder
            .build_indirect_call(fn_type, fp, &call_args, "call")?;
        Ok(site.try_as_basic_value().left())
    }

    fn lower_generic_call(
        &mut self,
        fname: Symbol,
        sig: &FuncSig,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        // Re-derive the instantiation the analyzer cached by binding
        // declared parameter types against the argument types.
        let mut map: FxHashMap<Symbol, TypeId> = FxHashMap::default();
        for (&param_ty, arg) in sig.params.iter().zip(args) {
            let arg_ty = self.expr_ty(arg);
            self.bind_ty(param_ty, arg_ty, &mut map);
        }
        let ordered: Vec<TypeId> = sig
            .generics
            .iter()
            .map(|(name, _)| map.get(name).copied())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                CodeGenError::Unsupported(format!(
                    "cannot derive type arguments for `{fname}` at this call"
                ))
            })?;
        let mangled = self.analysis.types.mangle(fname, &ordered);
        let inst_sig = self.substitute_sig(sig, &map);
        let function = self
            .functions
            .get(&mangled)
            .map(|(f, _)| *f)
            .ok_or(CodeGenError::FunctionNotFound(mangled))?;
        self.emit_call(function, &inst_sig, None, args)
    }

    /// First-occurrence structural binding of type parameters.
    fn bind_ty(&mut self, declared: TypeId, actual: TypeId, map: &mut FxHashMap<Symbol, TypeId>) {
        let declared_kind = self.analysis.types.kind(declared).clone();
        let actual_kind = self.analysis.types.kind(actual).clone();
        match (declared_kind, actual_kind) {
            (TypeKind::TypeParam { name, .. }, _) => {
                map.entry(name).or_insert(actual);
            }
            (TypeKind::Option(d), TypeKind::Option(a))
            | (TypeKind::Nullable(d), TypeKind::Nullable(a))
            | (TypeKind::Future(d), TypeKind::Future(a))
            | (TypeKind::Array { elem: d, .. }, TypeKind::Array { elem: a, .. })
            | (TypeKind::Chan { elem: d, .. }, TypeKind::Chan { elem: a, .. }) => {
                self.bind_ty(d, a, map)
            }
            (
                TypeKind::Result { ok: d_ok, err: d_err },
                TypeKind::Result { ok: a_ok, err: a_err },
            ) => {
                self.bind_ty(d_ok, a_ok, map);
                self.bind_ty(d_err, a_err, map);
            }
            (
                TypeKind::Func { params: dp, ret: dr, .. },
                TypeKind::Func { params: ap, ret: ar, .. },
            ) => {
                for (&d, &a) in dp.iter().zip(&ap) {
                    self.bind_ty(d, a, map);
                }
                self.bind_ty(dr, ar, map);
            }
            (TypeKind::Named { name: dn, args: da }, TypeKind::Named { name: an, args: aa })
                if dn == an =>
            {
                for (&d, &a) in da.iter().zip(&aa) {
                    self.bind_ty(d, a, map);
                }
            }
            _ => {}
        }
    }

    fn lower_method_call(
        &mut self,
        expr: &Expr,
        object: &Expr,
        method: Symbol,
        safe: bool,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let obj_ty = self.expr_ty(object);

        if safe {
            if let TypeKind::Nullable(inner) = self.analysis.types.kind(obj_ty).clone() {
                return self.lower_safe_method_call(expr, object, inner, method, args);
            }
        }

        let receiver = self
            .lower_expr(object)?
            .ok_or_else(|| CodeGenError::Internal("receiver has no value".into()))?;
        self.dispatch_method(obj_ty, receiver, method, args)
    }

    fn dispatch_method(
        &mut self,
        recv_ty: TypeId,
        receiver: BasicValueEnum<'ctx>,
        method: Symbol,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        // Virtual dispatch through the trait object's vtable.
        if let TypeKind::TraitObject { name: trait_name, .. } =
            self.analysis.types.kind(recv_ty).clone()
        {
            return self.virtual_call(trait_name, receiver, method, args);
        }

        let (symbol, sig) = self
            .resolve_static_method(recv_ty, method)
            .ok_or_else(|| {
                CodeGenError::Internal(format!("unresolved method `{method}` reached codegen"))
            })?;
        let function = self
            .functions
            .get(&symbol)
            .map(|(f, _)| *f)
            .ok_or(CodeGenError::FunctionNotFound(symbol))?;
        self.emit_call(function, &sig, Some(receiver), args)
    }

    fn virtual_call(
        &mut self,
        trait_name: Symbol,
        receiver: BasicValueEnum<'ctx>,
        method: Symbol,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let trait_info = self
            .analysis
            .registry
            .traits
            .get(&trait_name)
            .cloned()
            .ok_or_else(|| CodeGenError::Internal("unknown trait in virtual call".into()))?;
        let slot = trait_info
            .methods
            .get_index_of(&method)
            .ok_or_else(|| CodeGenError::Internal("unknown trait method".into()))?;
        let sig = trait_info.methods[&method].sig.clone();

        let fat = receiver.into_struct_value();
        let data = self.builder.build_extract_value(fat, 0, "data")?;
        let vtable = self
            .builder
            .build_extract_value(fat, 1, "vtable")?
            .into_pointer_value();
        let ptr_t = self.context.ptr_type(AddressSpace::default());
        let slot_index = self.context.i64_type().const_int(slot as u64, false);
        let slot_ptr = unsafe {
            self.builder
                .build_in_bounds_gep(ptr_t, vtable, &[slot_index], "slot")?
        };
        let fn_ptr = self
            .builder
            .build_load(ptr_t, slot_ptr, "method")?
            .into_pointer_value();
        let fn_type = self.llvm_fn_type(&sig, true);
        let call_args = self.lower_call_args(&sig, Some(data), args)?;
        let site = self
            .builder
            .build_indirect_call(fn_type, fn_ptr, &call_args, "vcall")?;
        Ok(site.try_as_basic_value().left())
    }

    /// `obj?.m(args)`: call only when the receiver is present; the
    /// result rejoins as a nullable (or nothing for void methods).
    fn lower_safe_method_call(
        &mut self,
        expr: &Expr,
        object: &Expr,
        inner_ty: TypeId,
        method: Symbol,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let function = self.current_function()?;
        let value = self
            .lower_expr(object)?
            .ok_or_else(|| CodeGenError::Internal("receiver has no value".into()))?
            .into_struct_value();
        let present = self
            .builder
            .build_extract_value(value, 0, "present")?
            .into_int_value();

        let call_bb = self.context.append_basic_block(function, "safecall.some");
        let skip_bb = self.context.append_basic_block(function, "safecall.none");
        let merge = self.context.append_basic_block(function, "safecall.end");
        self.builder
            .build_conditional_branch(present, call_bb, skip_bb)?;

        let result_ty = self.expr_ty(expr);
        let is_void = self.mapper.is_void(&self.analysis.types, result_ty);

        self.builder.position_at_end(call_bb);
        let payload = self.builder.build_extract_value(value, 1, "payload")?;
        let call_result = self.dispatch_method(inner_ty, payload, method, args)?;
        let wrapped = match (&call_result, is_void) {
            (_, true) => None,
            (Some(v), false) => {
                let inner_result = match self.analysis.types.kind(result_ty) {
                    TypeKind::Nullable(inner) => *inner,
                    _ => result_ty,
                };
                Some(self.wrap_nullable(*v, inner_result)?)
            }
            (None, false) => None,
        };
        let call_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(skip_bb);
        let none_val = if is_void {
            None
        } else {
            let inner_result = match self.analysis.types.kind(result_ty) {
                TypeKind::Nullable(inner) => *inner,
                _ => result_ty,
            };
            Some(self.null_nullable(inner_result)?)
        };
        let skip_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(merge);
        match (wrapped, none_val) {
            (Some(some_v), Some(none_v)) => {
                let mapped = self.map_ty(result_ty);
                let phi = self.builder.build_phi(mapped, "safecall")?;
                phi.add_incoming(&[(&some_v, call_end), (&none_v, skip_end)]);
                Ok(Some(phi.as_basic_value()))
            }
            _ => Ok(None),
        }
    }

    /// Emit a direct call: coerce the arguments into the parameter
    /// types and drop the value for void returns.
    pub(crate) fn emit_call(
        &mut self,
        function: FunctionValue<'ctx>,
        sig: &FuncSig,
        receiver: Option<BasicValueEnum<'ctx>>,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let call_args = self.lower_call_args(sig, receiver, args)?;
        let site = self.builder.build_call(function, &call_args, "")?;
        Ok(site.try_as_basic_value().left())
    }

    fn lower_call_args(
        &mut self,
        sig: &FuncSig,
        receiver: Option<BasicValueEnum<'ctx>>,
        args: &[Expr],
    ) -> Result<Vec<BasicMetadataValueEnum<'ctx>>> {
        let mut call_args: Vec<BasicMetadataValueEnum> = Vec::new();
        if let Some(receiver) = receiver {
            call_args.push(receiver.into());
        }
        for (i, arg) in args.iter().enumerate() {
            let from = self.expr_ty(arg);
            let v = self.lower_expr(arg)?;
            let v = match sig.params.get(i) {
                Some(&param_ty) => {
                    let param_ty = self.concrete(param_ty);
                    self.coerce(v, from, param_ty)?
                }
                None => v,
            };
            if let Some(v) = v {
                call_args.push(v.into());
            }
        }
        Ok(call_args)
    }
}
