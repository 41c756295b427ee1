//! Statement and expression lowering.
//!
//! Control flow follows the textbook shapes: distinct entry, body, and
//! continuation blocks, short-circuit logic as branches joined by phis,
//! `match` on Option/Result as a switch over the discriminant tag.
//! Code after a terminator in the same suite is dead and skipped.

use super::*;

const TAG_NONE: u64 = 0;
const TAG_SOME: u64 = 1;
const TAG_OK: u64 = 0;
const TAG_ERR: u64 = 1;
/// Select case kinds handed to `__tocin_chan_select`.
const SELECT_RECV: u64 = 0;
const SELECT_SEND: u64 = 1;
const SELECT_DEFAULT: u64 = 2;

impl<'ctx, 'a> Lowerer<'ctx, 'a> {
    fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .map(|b| b.get_terminator().is_some())
            .unwrap_or(true)
    }

    pub(crate) fn lower_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.locals.push(FxHashMap::default());
        let result = (|| {
            for stmt in stmts {
                if self.block_terminated() {
                    break;
                }
                self.lower_stmt(stmt)?;
            }
            Ok(())
        })();
        self.locals.pop();
        result
    }

    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            StmtKind::Let {
                name,
                init,
                resolved,
                ..
            } => {
                let ty = resolved
                    .map(|t| self.concrete(t))
                    .or_else(|| init.as_ref().map(|e| self.expr_ty(e)))
                    .unwrap_or(self.analysis.types.unknown);
                let mapped = self.map_ty(ty);
                let slot = self.builder.build_alloca(mapped, name.as_str())?;
                if let Some(init) = init {
                    let from = self.expr_ty(init);
                    let value = self.lower_expr(init)?;
                    if let Some(value) = self.coerce(value, from, ty)? {
                        self.builder.build_store(slot, value)?;
                    }
                }
                self.define_local(*name, slot, ty);
                Ok(())
            }
            StmtKind::If {
                cond,
                then_body,
                elifs,
                else_body,
            } => self.lower_if(cond, then_body, elifs, else_body.as_deref()),
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::For {
                var,
                iterable,
                body,
            } => self.lower_for(*var, iterable, body),
            StmtKind::Function(decl) => self.lower_nested_function(decl),
            StmtKind::Return(value) => self.lower_return(value.as_ref()),
            StmtKind::Match { scrutinee, cases } => self.lower_match(scrutinee, cases),
            StmtKind::Go(expr) => self.lower_go(expr),
            StmtKind::Select { cases, default } => self.lower_select(cases, default.as_deref()),
            StmtKind::Class(_)
            | StmtKind::Trait(_)
            | StmtKind::Impl(_)
            | StmtKind::Import(_)
            | StmtKind::Module(_)
            | StmtKind::Error => Ok(()),
            StmtKind::Export(inner) => match inner.kind {
                StmtKind::Function(_)
                | StmtKind::Class(_)
                | StmtKind::Trait(_)
                | StmtKind::Impl(_) => Ok(()),
                _ => self.lower_stmt(inner),
            },
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_body: &[Stmt],
        elifs: &[(Expr, Vec<Stmt>)],
        else_body: Option<&[Stmt]>,
    ) -> Result<()> {
        let function = self.current_function()?;
        let merge = self.context.append_basic_block(function, "if.end");

        let mut arms: Vec<(&Expr, &[Stmt])> = vec![(cond, then_body)];
        for (c, b) in elifs {
            arms.push((c, b.as_slice()));
        }

        for (arm_cond, arm_body) in arms {
            let cond_v = self.lower_bool(arm_cond)?;
            let then_bb = self.context.append_basic_block(function, "if.then");
            let next_bb = self.context.append_basic_block(function, "if.else");
            self.builder
                .build_conditional_branch(cond_v, then_bb, next_bb)?;
            self.builder.position_at_end(then_bb);
            self.lower_block(arm_body)?;
            self.seal(merge)?;
            self.builder.position_at_end(next_bb);
        }
        if let Some(else_body) = else_body {
            self.lower_block(else_body)?;
        }
        self.seal(merge)?;
        self.builder.position_at_end(merge);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<()> {
        let function = self.current_function()?;
        let cond_bb = self.context.append_basic_block(function, "while.cond");
        let body_bb = self.context.append_basic_block(function, "while.body");
        let end_bb = self.context.append_basic_block(function, "while.end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let cond_v = self.lower_bool(cond)?;
        self.builder
            .build_conditional_branch(cond_v, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb);
        self.lower_block(body)?;
        self.seal(cond_bb)?;
        self.builder.position_at_end(end_bb);
        Ok(())
    }

    /// `for x in list` becomes an index-counted loop over the struct's
    /// length and data pointer; other iterables go through the runtime
    /// `iter_next` stub.
    fn lower_for(&mut self, var: Symbol, iterable: &Expr, body: &[Stmt]) -> Result<()> {
        let iter_ty = self.expr_ty(iterable);
        match self.analysis.types.kind(iter_ty).clone() {
            TypeKind::Array { elem, .. } => self.lower_for_list(var, iterable, elem, body),
            _ => self.lower_for_runtime(var, iterable, body),
        }
    }

    fn lower_for_list(
        &mut self,
        var: Symbol,
        iterable: &Expr,
        elem: TypeId,
        body: &[Stmt],
    ) -> Result<()> {
        let function = self.current_function()?;
        let list = self
            .lower_expr(iterable)?
            .ok_or_else(|| CodeGenError::Internal("list expression has no value".into()))?
            .into_struct_value();
        let len = self
            .builder
            .build_extract_value(list, 0, "len")?
            .into_int_value();
        let data = self
            .builder
            .build_extract_value(list, 1, "data")?
            .into_pointer_value();

        let i64_t = self.context.i64_type();
        let idx_slot = self.builder.build_alloca(i64_t, "idx")?;
        self.builder.build_store(idx_slot, i64_t.const_zero())?;

        let cond_bb = self.context.append_basic_block(function, "for.cond");
        let body_bb = self.context.append_basic_block(function, "for.body");
        let end_bb = self.context.append_basic_block(function, "for.end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let idx = self
            .builder
            .build_load(i64_t, idx_slot, "i")?
            .into_int_value();
        let in_range = self
            .builder
            .build_int_compare(IntPredicate::SLT, idx, len, "inrange")?;
        self.builder
            .build_conditional_branch(in_range, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb);
        let elem_mapped = self.map_ty(elem);
        let elem_ptr = unsafe {
            self.builder
                .build_in_bounds_gep(elem_mapped, data, &[idx], "elem.ptr")?
        };
        let elem_val = self.builder.build_load(elem_mapped, elem_ptr, "elem")?;
        let var_slot = self.builder.build_alloca(elem_mapped, var.as_str())?;
        self.builder.build_store(var_slot, elem_val)?;

        self.locals.push(FxHashMap::default());
        self.define_local(var, var_slot, elem);
        let body_result = (|| {
            for stmt in body {
                if self.block_terminated() {
                    break;
                }
                self.lower_stmt(stmt)?;
            }
            Ok(())
        })();
        self.locals.pop();
        body_result?;

        if !self.block_terminated() {
            let next = self
                .builder
                .build_int_add(idx, i64_t.const_int(1, false), "next")?;
            self.builder.build_store(idx_slot, next)?;
            self.builder.build_unconditional_branch(cond_bb)?;
        }
        self.builder.position_at_end(end_bb);
        Ok(())
    }

    /// Iterables with no inline shape loop on the runtime iterator
    /// stub: `iter_next` yields an element pointer, null when done.
    fn lower_for_runtime(&mut self, var: Symbol, iterable: &Expr, body: &[Stmt]) -> Result<()> {
        let function = self.current_function()?;
        let obj_ty = self.expr_ty(iterable);
        let obj = self.lower_expr(iterable)?.ok_or_else(|| {
            CodeGenError::Internal("iterable expression has no value".into())
        })?;
        let obj_mapped = self.map_ty(obj_ty);
        let obj_slot = self.builder.build_alloca(obj_mapped, "iter.obj")?;
        self.builder.build_store(obj_slot, obj)?;

        // The loop variable's element type comes from the iterable.
        let elem = match self.analysis.types.kind(obj_ty).clone() {
            TypeKind::Str => self.analysis.types.char_,
            TypeKind::Dict { key, .. } => key,
            TypeKind::Chan { elem, .. } => elem,
            _ => self.analysis.types.unknown,
        };
        let elem_mapped = self.map_ty(elem);

        let cond_bb = self.context.append_basic_block(function, "for.next");
        let body_bb = self.context.append_basic_block(function, "for.body");
        let end_bb = self.context.append_basic_block(function, "for.end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let next_ptr = self
            .builder
            .build_call(self.runtime.iter_next, &[obj_slot.into()], "next")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        let null = self.context.ptr_type(AddressSpace::default()).const_null();
        let done = self
            .builder
            .build_int_compare(
                IntPredicate::EQ,
                self.builder
                    .build_ptr_to_int(next_ptr, self.context.i64_type(), "p")?,
                self.builder
                    .build_ptr_to_int(null, self.context.i64_type(), "null")?,
                "done",
            )?;
        self.builder
            .build_conditional_branch(done, end_bb, body_bb)?;

        self.builder.position_at_end(body_bb);
        let elem_val = self.builder.build_load(elem_mapped, next_ptr, "elem")?;
        let var_slot = self.builder.build_alloca(elem_mapped, var.as_str())?;
        self.builder.build_store(var_slot, elem_val)?;

        self.locals.push(FxHashMap::default());
        self.define_local(var, var_slot, elem);
        let body_result = (|| {
            for stmt in body {
                if self.block_terminated() {
                    break;
                }
                self.lower_stmt(stmt)?;
            }
            Ok(())
        })();
        self.locals.pop();
        body_result?;
        self.seal(cond_bb)?;
        self.builder.position_at_end(end_bb);
        Ok(())
    }

    fn lower_nested_function(&mut self, decl: &FunctionDecl) -> Result<()> {
        let Some(sig) = self.analysis.functions.get(&decl.name).cloned() else {
            return Ok(());
        };
        if !sig.generics.is_empty() {
            return Err(CodeGenError::Unsupported(
                "generic nested functions are not lowered".into(),
            ));
        }
        let pending = PendingFn {
            decl: decl.clone(),
            symbol: free_fn_symbol(decl.name),
            self_ty: None,
            sig,
            subst: FxHashMap::default(),
        };
        self.declare(&pending);
        self.define(&pending)
    }

    fn lower_return(&mut self, value: Option<&Expr>) -> Result<()> {
        if self.current_async {
            return self.lower_async_return(value);
        }
        match value {
            Some(value) => {
                let from = self.expr_ty(value);
                let v = self.lower_expr(value)?;
                let ret_ty = self.current_ret;
                match self.coerce(v, from, ret_ty)? {
                    Some(v) => self.builder.build_return(Some(&v))?,
                    None => self.builder.build_return(None)?,
                };
            }
            None => {
                self.builder.build_return(None)?;
            }
        }
        Ok(())
    }

    /// A return inside an async function resolves a promise and hands
    /// back its future.
    fn lower_async_return(&mut self, value: Option<&Expr>) -> Result<()> {
        let promise = self
            .builder
            .build_call(self.runtime.promise_create, &[], "promise")?
            .try_as_basic_value()
            .left()
            .unwrap();
        if let Some(value) = value {
            let from = self.expr_ty(value);
            let v = self.lower_expr(value)?;
            let ret_ty = self.current_ret;
            if let Some(v) = self.coerce(v, from, ret_ty)? {
                // The payload outlives this frame; box it.
                let size = self
                    .mapper
                    .size_of(&mut self.analysis.types, &self.analysis.registry, ret_ty);
                let slot = self
                    .builder
                    .build_call(self.runtime.alloc, &[size.into()], "ret.box")?
                    .try_as_basic_value()
                    .left()
                    .unwrap()
                    .into_pointer_value();
                self.builder.build_store(slot, v)?;
                self.builder.build_call(
                    self.runtime.promise_set,
                    &[promise.into(), slot.into()],
                    "",
                )?;
            }
        }
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
        Ok(())
    }

    // ----- match --------------------------------------------------------

    fn lower_match(&mut self, scrutinee: &Expr, cases: &[MatchCase]) -> Result<()> {
        let scrut_ty = self.expr_ty(scrutinee);
        match self.analysis.types.kind(scrut_ty).clone() {
            TypeKind::Option(payload) => {
                self.lower_tag_match(scrutinee, cases, &[("Some", TAG_SOME), ("None", TAG_NONE)], |name| {
                    if name == "Some" {
                        Some((1, payload))
                    } else {
                        None
                    }
                })
            }
            TypeKind::Result { ok, err } => {
                self.lower_tag_match(scrutinee, cases, &[("Ok", TAG_OK), ("Err", TAG_ERR)], |name| {
                    match name {
                        "Ok" => Some((1, ok)),
                        "Err" => Some((2, err)),
                        _ => None,
                    }
                })
            }
            _ => self.lower_literal_match(scrutinee, cases),
        }
    }

    /// Switch on the discriminant tag, one block per arm, joined at a
    /// common continuation. Arms missing after the semantic check are
    /// unreachable.
    fn lower_tag_match(
        &mut self,
        scrutinee: &Expr,
        cases: &[MatchCase],
        tags: &[(&str, u64)],
        payload_of: impl Fn(&str) -> Option<(u32, TypeId)>,
    ) -> Result<()> {
        let function = self.current_function()?;
        let scrut = self
            .lower_expr(scrutinee)?
            .ok_or_else(|| CodeGenError::Internal("match scrutinee has no value".into()))?
            .into_struct_value();
        let tag = self
            .builder
            .build_extract_value(scrut, 0, "tag")?
            .into_int_value();

        let merge = self.context.append_basic_block(function, "match.end");
        let i32_t = self.context.i32_type();

        let mut switch_arms: Vec<(IntValue<'ctx>, BasicBlock<'ctx>)> = Vec::new();
        let mut lowered: Vec<(BasicBlock<'ctx>, &MatchCase)> = Vec::new();
        let mut default_bb: Option<BasicBlock<'ctx>> = None;

        for case in cases {
            let bb = self.context.append_basic_block(function, "match.arm");
            match &case.pattern.kind {
                PatternKind::Constructor { name, .. } => {
                    if let Some(&(_, tag_value)) =
                        tags.iter().find(|(n, _)| *n == name.as_str())
                    {
                        switch_arms.push((i32_t.const_int(tag_value, false), bb));
                    }
                }
                PatternKind::Wildcard | PatternKind::Binding(_) => {
                    default_bb = Some(bb);
                }
                PatternKind::Literal(_) => {
                    return Err(CodeGenError::Unsupported(
                        "literal patterns on Option/Result".into(),
                    ));
                }
            }
            lowered.push((bb, case));
        }

        let else_bb = match default_bb {
            Some(bb) => bb,
            None => {
                let bb = self.context.append_basic_block(function, "match.unreachable");
                let current = self.builder.get_insert_block().unwrap();
                self.builder.position_at_end(bb);
                self.builder.build_unreachable()?;
                self.builder.position_at_end(current);
                bb
            }
        };
        self.builder.build_switch(tag, else_bb, &switch_arms)?;

        for (bb, case) in lowered {
            self.builder.position_at_end(bb);
            self.locals.push(FxHashMap::default());
            let arm_result = (|| {
                match &case.pattern.kind {
                    PatternKind::Constructor { name, args } => {
                        if let (Some((index, payload_ty)), Some(arg)) =
                            (payload_of(name.as_str()), args.first())
                        {
                            match &arg.kind {
                                PatternKind::Binding(binding) => {
                                    let payload = self
                                        .builder
                                        .build_extract_value(scrut, index, "payload")?;
                                    let mapped = self.map_ty(payload_ty);
                                    let slot = self
                                        .builder
                                        .build_alloca(mapped, binding.as_str())?;
                                    self.builder.build_store(slot, payload)?;
                                    self.define_local(*binding, slot, payload_ty);
                                }
                                PatternKind::Wildcard => {}
                                _ => {
                                    return Err(CodeGenError::Unsupported(
                                        "nested constructor patterns".into(),
                                    ));
                                }
                            }
                        }
                    }
                    PatternKind::Binding(binding) => {
                        let scrut_ty = self.expr_ty(scrutinee);
                        let mapped = self.map_ty(scrut_ty);
                        let slot = self.builder.build_alloca(mapped, binding.as_str())?;
                        self.builder.build_store(slot, scrut)?;
                        self.define_local(*binding, slot, scrut_ty);
                    }
                    _ => {}
                }
                for stmt in &case.body {
                    if self.block_terminated() {
                        break;
                    }
                    self.lower_stmt(stmt)?;
                }
                Ok(())
            })();
            self.locals.pop();
            arm_result?;
            self.seal(merge)?;
        }
        self.builder.position_at_end(merge);
        Ok(())
    }

    /// Matches on non-sum scrutinees compare arm by arm.
    fn lower_literal_match(&mut self, scrutinee: &Expr, cases: &[MatchCase]) -> Result<()> {
        let function = self.current_function()?;
        let scrut_ty = self.expr_ty(scrutinee);
        let scrut = self
            .lower_expr(scrutinee)?
            .ok_or_else(|| CodeGenError::Internal("match scrutinee has no value".into()))?;
        let merge = self.context.append_basic_block(function, "match.end");

        for case in cases {
            let arm_bb = self.context.append_basic_block(function, "match.arm");
            let next_bb = self.context.append_basic_block(function, "match.next");
            match &case.pattern.kind {
                PatternKind::Literal(lit) => {
                    let matched = self.literal_equals(scrut, scrut_ty, lit)?;
                    self.builder
                        .build_conditional_branch(matched, arm_bb, next_bb)?;
                }
                PatternKind::Wildcard | PatternKind::Binding(_) => {
                    self.builder.build_unconditional_branch(arm_bb)?;
                }
                PatternKind::Constructor { .. } => {
                    return Err(CodeGenError::Unsupported(
                        "constructor pattern on a non-sum scrutinee".into(),
                    ));
                }
            }
            self.builder.position_at_end(arm_bb);
            self.locals.push(FxHashMap::default());
            let arm_result = (|| {
                if let PatternKind::Binding(binding) = &case.pattern.kind {
                    let mapped = self.map_ty(scrut_ty);
                    let slot = self.builder.build_alloca(mapped, binding.as_str())?;
                    self.builder.build_store(slot, scrut)?;
                    self.define_local(*binding, slot, scrut_ty);
                }
                for stmt in &case.body {
                    if self.block_terminated() {
                        break;
                    }
                    self.lower_stmt(stmt)?;
                }
                Ok(())
            })();
            self.locals.pop();
            arm_result?;
            self.seal(merge)?;
            self.builder.position_at_end(next_bb);
        }
        self.seal(merge)?;
        self.builder.position_at_end(merge);
        Ok(())
    }

    fn literal_equals(
        &mut self,
        scrut: BasicValueEnum<'ctx>,
        scrut_ty: TypeId,
        lit: &LiteralPat,
    ) -> Result<IntValue<'ctx>> {
        let _ = scrut_ty;
        match lit {
            LiteralPat::Int(v) => Ok(self.builder.build_int_compare(
                IntPredicate::EQ,
                scrut.into_int_value(),
                self.context.i64_type().const_int(*v as u64, true),
                "eq",
            )?),
            LiteralPat::Bool(v) => Ok(self.builder.build_int_compare(
                IntPredicate::EQ,
                scrut.into_int_value(),
                self.context.bool_type().const_int(u64::from(*v), false),
                "eq",
            )?),
            LiteralPat::Char(c) => Ok(self.builder.build_int_compare(
                IntPredicate::EQ,
                scrut.into_int_value(),
                self.context.i32_type().const_int(*c as u64, false),
                "eq",
            )?),
            LiteralPat::Float(v) => Ok(self.builder.build_float_compare(
                FloatPredicate::OEQ,
                scrut.into_float_value(),
                self.context.f64_type().const_float(*v),
                "eq",
            )?),
            LiteralPat::Str(s) => {
                let text = self.string_const(s.as_bytes());
                Ok(self
                    .builder
                    .build_call(
                        self.runtime.string_eq,
                        &[scrut.into(), text.into()],
                        "eq",
                    )?
                    .try_as_basic_value()
                    .left()
                    .unwrap()
                    .into_int_value())
            }
            LiteralPat::Nil => {
                // nil pattern against a nullable: absent flag.
                let flag = self
                    .builder
                    .build_extract_value(scrut.into_struct_value(), 0, "present")?
                    .into_int_value();
                Ok(self
                    .builder
                    .build_not(flag, "isnil")?)
            }
        }
    }

    // ----- go / select --------------------------------------------------

    /// `go f(args)` packages the evaluated arguments into a heap thunk
    /// environment and hands a thunk to the runtime scheduler.
    fn lower_go(&mut self, expr: &Expr) -> Result<()> {
        let ExprKind::Call { callee, args, .. } = &expr.kind else {
            return Err(CodeGenError::Unsupported("go target must be a call".into()));
        };
        let fname = match &callee.kind {
            ExprKind::Var(name) => *name,
            ExprKind::Qualified { name, .. } => *name,
            _ => {
                return Err(CodeGenError::Unsupported(
                    "go target must be a named function".into(),
                ));
            }
        };
        let symbol = free_fn_symbol(fname);
        let (target, sig) = self
            .functions
            .get(&symbol)
            .map(|(f, s)| (*f, s.clone()))
            .ok_or_else(|| CodeGenError::FunctionNotFound(symbol))?;

        // Evaluate arguments now; they live in the heap environment.
        let mut arg_vals = Vec::new();
        let mut arg_tys = Vec::new();
        for (arg, &param_ty) in args.iter().zip(&sig.params) {
            let from = self.expr_ty(arg);
            let v = self.lower_expr(arg)?;
            let param_ty = self.concrete(param_ty);
            if let Some(v) = self.coerce(v, from, param_ty)? {
                arg_vals.push(v);
                arg_tys.push(param_ty);
            }
        }

        let ptr_t = self.context.ptr_type(AddressSpace::default());
        let env_ptr = if arg_vals.is_empty() {
            ptr_t.const_null()
        } else {
            let member_tys: Vec<BasicTypeEnum> =
                arg_tys.iter().map(|&t| self.map_ty(t)).collect();
            let env_ty = self.context.struct_type(&member_tys, false);
            let size = env_ty
                .size_of()
                .unwrap_or_else(|| self.context.i64_type().const_int(8, false));
            let env = self
                .builder
                .build_call(self.runtime.alloc, &[size.into()], "go.env")?
                .try_as_basic_value()
                .left()
                .unwrap()
                .into_pointer_value();
            for (i, v) in arg_vals.iter().enumerate() {
                let slot = self
                    .builder
                    .build_struct_gep(env_ty, env, i as u32, "go.arg")?;
                self.builder.build_store(slot, *v)?;
            }
            env
        };

        // The thunk unpacks the environment and performs the call.
        let thunk_name = self.fresh("__go_thunk_");
        let thunk_ty = self.context.void_type().fn_type(&[ptr_t.into()], false);
        let thunk = self.module.add_function(&thunk_name, thunk_ty, None);
        let saved = self.builder.get_insert_block();
        let entry = self.context.append_basic_block(thunk, "entry");
        self.builder.position_at_end(entry);
        let mut call_args: Vec<BasicMetadataValueEnum> = Vec::new();
        if !arg_tys.is_empty() {
            let member_tys: Vec<BasicTypeEnum> =
                arg_tys.iter().map(|&t| self.map_ty(t)).collect();
            let env_ty = self.context.struct_type(&member_tys, false);
            let env = thunk.get_nth_param(0).unwrap().into_pointer_value();
            for (i, member) in member_tys.iter().enumerate() {
                let slot = self
                    .builder
                    .build_struct_gep(env_ty, env, i as u32, "arg.ptr")?;
                let value = self.builder.build_load(*member, slot, "arg")?;
                call_args.push(value.into());
            }
        }
        self.builder.build_call(target, &call_args, "")?;
        self.builder.build_return(None)?;
        if let Some(block) = saved {
            self.builder.position_at_end(block);
        }

        let thunk_ptr = thunk.as_global_value().as_pointer_value();
        self.builder.build_call(
            self.runtime.go_launch,
            &[thunk_ptr.into(), env_ptr.into()],
            "",
        )?;
        Ok(())
    }

    /// `select` builds a descriptor array, asks the runtime which case
    /// proceeded, and switches to the chosen body.
    fn lower_select(&mut self, cases: &[SelectCase], default: Option<&[Stmt]>) -> Result<()> {
        let function = self.current_function()?;
        let ptr_t = self.context.ptr_type(AddressSpace::default());
        let i32_t = self.context.i32_type();
        let desc_ty = self
            .context
            .struct_type(&[i32_t.into(), ptr_t.into(), ptr_t.into()], false);
        let total = cases.len() + usize::from(default.is_some());
        let arr_ty = desc_ty.array_type(total as u32);
        let descs = self.builder.build_alloca(arr_ty, "select.descs")?;

        let mut recv_slots: Vec<Option<(PointerValue<'ctx>, TypeId)>> = Vec::new();
        for (i, case) in cases.iter().enumerate() {
            let zero = self.context.i64_type().const_zero();
            let index = self.context.i64_type().const_int(i as u64, false);
            let desc = unsafe {
                self.builder
                    .build_in_bounds_gep(arr_ty, descs, &[zero, index], "desc")?
            };
            match &case.op {
                SelectOp::Recv { chan, .. } => {
                    let chan_ty = self.expr_ty(chan);
                    let elem = match self.analysis.types.kind(chan_ty) {
                        TypeKind::Chan { elem, .. } => *elem,
                        _ => self.analysis.types.unknown,
                    };
                    let chan_v = self.lower_expr(chan)?.unwrap();
                    let elem_mapped = self.map_ty(elem);
                    let slot = self.builder.build_alloca(elem_mapped, "recv.slot")?;
                    recv_slots.push(Some((slot, elem)));

                    let kind_ptr =
                        self.builder.build_struct_gep(desc_ty, desc, 0, "kind")?;
                    self.builder
                        .build_store(kind_ptr, i32_t.const_int(SELECT_RECV, false))?;
                    let chan_ptr =
                        self.builder.build_struct_gep(desc_ty, desc, 1, "chan")?;
                    self.builder.build_store(chan_ptr, chan_v)?;
                    let slot_ptr =
                        self.builder.build_struct_gep(desc_ty, desc, 2, "slot")?;
                    self.builder.build_store(slot_ptr, slot)?;
                }
                SelectOp::Send { chan, value } => {
                    let chan_ty = self.expr_ty(chan);
                    let elem = match self.analysis.types.kind(chan_ty) {
                        TypeKind::Chan { elem, .. } => *elem,
                        _ => self.analysis.types.unknown,
                    };
                    let chan_v = self.lower_expr(chan)?.unwrap();
                    let from = self.expr_ty(value);
                    let v = self.lower_expr(value)?;
                    let elem_mapped = self.map_ty(elem);
                    let slot = self.builder.build_alloca(elem_mapped, "send.slot")?;
                    if let Some(v) = self.coerce(v, from, elem)? {
                        self.builder.build_store(slot, v)?;
                    }
                    recv_slots.push(None);

                    let kind_ptr =
                        self.builder.build_struct_gep(desc_ty, desc, 0, "kind")?;
                    self.builder
                        .build_store(kind_ptr, i32_t.const_int(SELECT_SEND, false))?;
                    let chan_ptr =
                        self.builder.build_struct_gep(desc_ty, desc, 1, "chan")?;
                    self.builder.build_store(chan_ptr, chan_v)?;
                    let slot_ptr =
                        self.builder.build_struct_gep(desc_ty, desc, 2, "slot")?;
                    self.builder.build_store(slot_ptr, slot)?;
                }
            }
        }
        if default.is_some() {
            let zero = self.context.i64_type().const_zero();
            let index = self
                .context
                .i64_type()
                .const_int(cases.len() as u64, false);
            let desc = unsafe {
                self.builder
                    .build_in_bounds_gep(arr_ty, descs, &[zero, index], "desc.default")?
            };
            let kind_ptr = self.builder.build_struct_gep(desc_ty, desc, 0, "kind")?;
            self.builder
                .build_store(kind_ptr, i32_t.const_int(SELECT_DEFAULT, false))?;
            let chan_ptr = self.builder.build_struct_gep(desc_ty, desc, 1, "chan")?;
            self.builder.build_store(chan_ptr, ptr_t.const_null())?;
            let slot_ptr = self.builder.build_struct_gep(desc_ty, desc, 2, "slot")?;
            self.builder.build_store(slot_ptr, ptr_t.const_null())?;
        }

        let chosen = self
            .builder
            .build_call(
                self.runtime.chan_select,
                &[
                    i32_t.const_int(total as u64, false).into(),
                    descs.into(),
                ],
                "chosen",
            )?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_int_value();

        let merge = self.context.append_basic_block(function, "select.end");
        let mut switch_arms = Vec::new();
        let mut bodies: Vec<(BasicBlock<'ctx>, usize)> = Vec::new();
        for (i, _) in cases.iter().enumerate() {
            let bb = self.context.append_basic_block(function, "select.case");
            switch_arms.push((i32_t.const_int(i as u64, false), bb));
            bodies.push((bb, i));
        }
        let default_bb = if default.is_some() {
            let bb = self.context.append_basic_block(function, "select.default");
            switch_arms.push((i32_t.const_int(cases.len() as u64, false), bb));
            bb
        } else {
            merge
        };
        self.builder.build_switch(chosen, default_bb, &switch_arms)?;

        for (bb, i) in bodies {
            self.builder.position_at_end(bb);
            self.locals.push(FxHashMap::default());
            let case = &cases[i];
            let result = (|| {
                if let SelectOp::Recv {
                    binding: Some(binding),
                    ..
                } = &case.op
                {
                    if let Some((slot, elem)) = recv_slots[i] {
                        self.define_local(*binding, slot, elem);
                    }
                }
                for stmt in &case.body {
                    if self.block_terminated() {
                        break;
                    }
                    self.lower_stmt(stmt)?;
                }
                Ok(())
            })();
            self.locals.pop();
            result?;
            self.seal(merge)?;
        }
        if let Some(default_body) = default {
            self.builder.position_at_end(default_bb);
            self.lower_block(default_body)?;
            self.seal(merge)?;
        }
        self.builder.position_at_end(merge);
        Ok(())
    }
}
