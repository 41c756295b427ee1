//! Expression lowering.

use super::*;

impl<'ctx, 'a> Lowerer<'ctx, 'a> {
    /// Lower one expression. `None` means the expression has no value
    /// (void).
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<Option<BasicValueEnum<'ctx>>> {
        match &expr.kind {
            ExprKind::Int(v) => Ok(Some(
                self.context.i64_type().const_int(*v as u64, true).into(),
            )),
            ExprKind::Float(v) => Ok(Some(self.context.f64_type().const_float(*v).into())),
            ExprKind::Bool(v) => Ok(Some(
                self.context
                    .bool_type()
                    .const_int(u64::from(*v), false)
                    .into(),
            )),
            ExprKind::Char(c) => Ok(Some(
                self.context.i32_type().const_int(*c as u64, false).into(),
            )),
            ExprKind::Str(s) => Ok(Some(self.string_const(s.as_bytes()).into())),
            // A bare nil only survives until coercion into a nullable.
            ExprKind::Nil => Ok(Some(self.context.i64_type().const_zero().into())),
            ExprKind::Var(name) => self.lower_var(*name),
            ExprKind::Qualified { name, .. } => self.lower_var(*name),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            ExprKind::Group(inner) => self.lower_expr(inner),
            ExprKind::Assign { target, op, value } => {
                self.lower_assign(target, *op, value)?;
                Ok(None)
            }
            ExprKind::Call {
                callee,
                args,
                ..
            } => self.lower_call(expr, callee, args),
            ExprKind::Field { object, name } => self.lower_field(expr, object, *name, false),
            ExprKind::SafeField { object, name } => self.lower_field(expr, object, *name, true),
            ExprKind::NullAssert(inner) => {
                let v = self
                    .lower_expr(inner)?
                    .ok_or_else(|| CodeGenError::Internal("null assert on void".into()))?;
                Ok(Some(self.builder.build_extract_value(
                    v.into_struct_value(),
                    1,
                    "asserted",
                )?))
            }
            ExprKind::NullCoalesce { value, fallback } => {
                self.lower_null_coalesce(expr, value, fallback)
            }
            ExprKind::Index { object, index } => self.lower_index(expr, object, index),
            ExprKind::List(elems) => self.lower_list(expr, elems),
            ExprKind::Dict(entries) => self.lower_dict(expr, entries),
            ExprKind::Lambda { params, body, .. } => self.lower_lambda(expr, params, body),
            ExprKind::Await(inner) => self.lower_await(expr, inner),
            ExprKind::Interp(parts) => self.lower_interp(parts).map(Some),
            ExprKind::New { args, .. } => self.lower_new(expr, args),
            ExprKind::Delete(inner) => self.lower_delete(inner),
            ExprKind::Move(inner) => self.lower_expr(inner),
            ExprKind::ChanSend { chan, value } => {
                self.lower_chan_send(chan, value)?;
                Ok(None)
            }
            ExprKind::ChanRecv(inner) => self.lower_chan_recv(expr, inner),
            ExprKind::OptionSome(inner) => self.lower_tagged(expr, 1, Some(inner), 1),
            ExprKind::OptionNone => self.lower_tagged(expr, 0, None, 1),
            ExprKind::ResultOk(inner) => self.lower_tagged(expr, 0, Some(inner), 1),
            ExprKind::ResultErr(inner) => self.lower_tagged(expr, 1, Some(inner), 2),
            ExprKind::Error => Ok(Some(self.context.i64_type().const_zero().into())),
        }
    }

    /// Lower an expression that must produce an `i1`.
    pub(crate) fn lower_bool(&mut self, expr: &Expr) -> Result<IntValue<'ctx>> {
        let v = self
            .lower_expr(expr)?
            .ok_or_else(|| CodeGenError::Internal("condition has no value".into()))?;
        Ok(v.into_int_value())
    }

    fn lower_var(&mut self, name: Symbol) -> Result<Option<BasicValueEnum<'ctx>>> {
        if let Some(local) = self.lookup_local(name) {
            let mapped = self.map_ty(local.ty);
            return Ok(Some(self.builder.build_load(
                mapped,
                local.ptr,
                name.as_str(),
            )?));
        }
        // A function used as a first-class value lowers to its pointer.
        let symbol = free_fn_symbol(name);
        if let Some((function, _)) = self.functions.get(&symbol) {
            return Ok(Some(
                function.as_global_value().as_pointer_value().into(),
            ));
        }
        Err(CodeGenError::Internal(format!(
            "unresolved name `{name}` reached codegen"
        )))
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        match op {
            UnaryOp::Neg => {
                let v = self.lower_expr(operand)?.unwrap();
                Ok(Some(match v {
                    BasicValueEnum::IntValue(i) => {
                        self.builder.build_int_neg(i, "neg")?.into()
                    }
                    BasicValueEnum::FloatValue(f) => {
                        self.builder.build_float_neg(f, "neg")?.into()
                    }
                    other => other,
                }))
            }
            UnaryOp::Not | UnaryOp::BitNot => {
                let v = self.lower_expr(operand)?.unwrap().into_int_value();
                Ok(Some(self.builder.build_not(v, "not")?.into()))
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let ExprKind::Var(name) = operand.kind else {
                    return Err(CodeGenError::Unsupported(
                        "increment of a non-variable".into(),
                    ));
                };
                let local = self
                    .lookup_local(name)
                    .ok_or_else(|| CodeGenError::Internal("unknown local".into()))?;
                let mapped = self.map_ty(local.ty);
                let current = self.builder.build_load(mapped, local.ptr, "cur")?;
                let updated: BasicValueEnum = match current {
                    BasicValueEnum::IntValue(i) => {
                        let one = self.context.i64_type().const_int(1, false);
                        if op == UnaryOp::PreInc {
                            self.builder.build_int_add(i, one, "inc")?.into()
                        } else {
                            self.builder.build_int_sub(i, one, "dec")?.into()
                        }
                    }
                    BasicValueEnum::FloatValue(f) => {
                        let one = self.context.f64_type().const_float(1.0);
                        if op == UnaryOp::PreInc {
                            self.builder.build_float_add(f, one, "inc")?.into()
                        } else {
                            self.builder.build_float_sub(f, one, "dec")?.into()
                        }
                    }
                    other => other,
                };
                self.builder.build_store(local.ptr, updated)?;
                Ok(Some(updated))
            }
        }
    }

    // ----- binary operators ---------------------------------------------

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_short_circuit(op, lhs, rhs).map(Some);
        }

        let lhs_ty = self.expr_ty(lhs);
        let rhs_ty = self.expr_ty(rhs);
        let types = &self.analysis.types;
        let lhs_nil = matches!(types.kind(lhs_ty), TypeKind::NilLiteral);
        let rhs_nil = matches!(types.kind(rhs_ty), TypeKind::NilLiteral);

        // `x == nil` / `x != nil` on a nullable reads the presence flag.
        if (lhs_nil || rhs_nil) && matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            if lhs_nil && rhs_nil {
                let result = self
                    .context
                    .bool_type()
                    .const_int(u64::from(op == BinaryOp::Eq), false);
                return Ok(Some(result.into()));
            }
            let (value_expr, _) = if lhs_nil { (rhs, lhs) } else { (lhs, rhs) };
            let value = self.lower_expr(value_expr)?.unwrap().into_struct_value();
            let present = self
                .builder
                .build_extract_value(value, 0, "present")?
                .into_int_value();
            let result = if op == BinaryOp::Ne {
                present
            } else {
                self.builder.build_not(present, "isnil")?
            };
            return Ok(Some(result.into()));
        }

        let string = self.analysis.types.string;
        if lhs_ty == string && rhs_ty == string {
            return self.lower_string_binary(op, lhs, rhs);
        }

        let lv = self
            .lower_expr(lhs)?
            .ok_or_else(|| CodeGenError::Internal("operand has no value".into()))?;
        let rv = self
            .lower_expr(rhs)?
            .ok_or_else(|| CodeGenError::Internal("operand has no value".into()))?;

        let float = self.analysis.types.float;
        let promote = lhs_ty == float || rhs_ty == float;
        if promote {
            let lf = self.to_float(lv)?;
            let rf = self.to_float(rv)?;
            return Ok(Some(self.lower_float_op(op, lf, rf)?));
        }
        Ok(Some(self.lower_int_op(op, lv.into_int_value(), rv.into_int_value())?))
    }

    /// Short-circuit logical operators: explicit branches and a phi
    /// join.
    fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<BasicValueEnum<'ctx>> {
        let function = self.current_function()?;
        let lv = self.lower_bool(lhs)?;
        let lhs_end = self.builder.get_insert_block().unwrap();
        let rhs_bb = self.context.append_basic_block(function, "logic.rhs");
        let merge = self.context.append_basic_block(function, "logic.end");

        if op == BinaryOp::And {
            self.builder.build_conditional_branch(lv, rhs_bb, merge)?;
        } else {
            self.builder.build_conditional_branch(lv, merge, rhs_bb)?;
        }

        self.builder.position_at_end(rhs_bb);
        let rv = self.lower_bool(rhs)?;
        let rhs_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(merge);
        let phi = self.builder.build_phi(self.context.bool_type(), "logic")?;
        let short_value = self
            .context
            .bool_type()
            .const_int(u64::from(op == BinaryOp::Or), false);
        phi.add_incoming(&[(&short_value, lhs_end), (&rv, rhs_end)]);
        Ok(phi.as_basic_value())
    }

    fn lower_string_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let lv = self.lower_expr(lhs)?.unwrap();
        let rv = self.lower_expr(rhs)?.unwrap();
        match op {
            BinaryOp::Add => Ok(Some(
                self.builder
                    .build_call(
                        self.runtime.string_concat,
                        &[lv.into(), rv.into()],
                        "concat",
                    )?
                    .try_as_basic_value()
                    .left()
                    .unwrap(),
            )),
            BinaryOp::Eq | BinaryOp::Ne => {
                let eq = self
                    .builder
                    .build_call(self.runtime.string_eq, &[lv.into(), rv.into()], "eq")?
                    .try_as_basic_value()
                    .left()
                    .unwrap()
                    .into_int_value();
                let result = if op == BinaryOp::Eq {
                    eq
                } else {
                    self.builder.build_not(eq, "ne")?
                };
                Ok(Some(result.into()))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let cmp = self
                    .builder
                    .build_call(self.runtime.string_cmp, &[lv.into(), rv.into()], "cmp")?
                    .try_as_basic_value()
                    .left()
                    .unwrap()
                    .into_int_value();
                let zero = self.context.i32_type().const_zero();
                let predicate = match op {
                    BinaryOp::Lt => IntPredicate::SLT,
                    BinaryOp::Le => IntPredicate::SLE,
                    BinaryOp::Gt => IntPredicate::SGT,
                    _ => IntPredicate::SGE,
                };
                Ok(Some(
                    self.builder
                        .build_int_compare(predicate, cmp, zero, "strcmp")?
                        .into(),
                ))
            }
            _ => Err(CodeGenError::Unsupported(format!(
                "string operator `{}`",
                op.symbol()
            ))),
        }
    }

    fn to_float(&mut self, v: BasicValueEnum<'ctx>) -> Result<inkwell::values::FloatValue<'ctx>> {
        match v {
            BasicValueEnum::FloatValue(f) => Ok(f),
            BasicValueEnum::IntValue(i) => Ok(self.builder.build_signed_int_to_float(
                i,
                self.context.f64_type(),
                "promoted",
            )?),
            _ => Err(CodeGenError::Internal("non-numeric operand".into())),
        }
    }

    fn lower_float_op(
        &mut self,
        op: BinaryOp,
        l: inkwell::values::FloatValue<'ctx>,
        r: inkwell::values::FloatValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        use BinaryOp::*;
        Ok(match op {
            Add => self.builder.build_float_add(l, r, "fadd")?.into(),
            Sub => self.builder.build_float_sub(l, r, "fsub")?.into(),
            Mul => self.builder.build_float_mul(l, r, "fmul")?.into(),
            Div => self.builder.build_float_div(l, r, "fdiv")?.into(),
            Rem => self.builder.build_float_rem(l, r, "frem")?.into(),
            Eq | Ne | Lt | Le | Gt | Ge => {
                let predicate = match op {
                    Eq => FloatPredicate::OEQ,
                    Ne => FloatPredicate::ONE,
                    Lt => FloatPredicate::OLT,
                    Le => FloatPredicate::OLE,
                    Gt => FloatPredicate::OGT,
                    _ => FloatPredicate::OGE,
                };
                self.builder
                    .build_float_compare(predicate, l, r, "fcmp")?
                    .into()
            }
            _ => {
                return Err(CodeGenError::Unsupported(format!(
                    "float operator `{}`",
                    op.symbol()
                )));
            }
        })
    }

    fn lower_int_op(
        &mut self,
        op: BinaryOp,
        l: IntValue<'ctx>,
        r: IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        use BinaryOp::*;
        Ok(match op {
            Add => self.builder.build_int_add(l, r, "add")?.into(),
            Sub => self.builder.build_int_sub(l, r, "sub")?.into(),
            Mul => self.builder.build_int_mul(l, r, "mul")?.into(),
            Div => self.builder.build_int_signed_div(l, r, "div")?.into(),
            Rem => self.builder.build_int_signed_rem(l, r, "rem")?.into(),
            BitAnd => self.builder.build_and(l, r, "and")?.into(),
            BitOr => self.builder.build_or(l, r, "or")?.into(),
            BitXor => self.builder.build_xor(l, r, "xor")?.into(),
            Shl => self.builder.build_left_shift(l, r, "shl")?.into(),
            Shr => self.builder.build_right_shift(l, r, true, "shr")?.into(),
            Eq | Ne | Lt | Le | Gt | Ge => {
                let predicate = match op {
                    Eq => IntPredicate::EQ,
                    Ne => IntPredicate::NE,
                    Lt => IntPredicate::SLT,
                    Le => IntPredicate::SLE,
                    Gt => IntPredicate::SGT,
                    _ => IntPredicate::SGE,
                };
                self.builder
                    .build_int_compare(predicate, l, r, "cmp")?
                    .into()
            }
            And | Or => {
                return Err(CodeGenError::Internal(
                    "logical operators take the short-circuit path".into(),
                ));
            }
        })
    }

    // ----- assignment and lvalues ---------------------------------------

    fn lower_assign(
        &mut self,
        target: &Expr,
        op: Option<BinaryOp>,
        value: &Expr,
    ) -> Result<()> {
        let (slot, slot_ty) = self.lvalue_slot(target)?;
        let from = self.expr_ty(value);
        match op {
            None => {
                let v = self.lower_expr(value)?;
                if let Some(v) = self.coerce(v, from, slot_ty)? {
                    self.builder.build_store(slot, v)?;
                }
            }
            Some(op) => {
                let mapped = self.map_ty(slot_ty);
                let current = self.builder.build_load(mapped, slot, "cur")?;
                let rhs = self
                    .lower_expr(value)?
                    .ok_or_else(|| CodeGenError::Internal("operand has no value".into()))?;
                let combined: BasicValueEnum = if current.is_float_value()
                    || rhs.is_float_value()
                {
                    let l = self.to_float(current)?;
                    let r = self.to_float(rhs)?;
                    self.lower_float_op(op, l, r)?
                } else if slot_ty == self.analysis.types.string && op == BinaryOp::Add {
                    self.builder
                        .build_call(
                            self.runtime.string_concat,
                            &[current.into(), rhs.into()],
                            "concat",
                        )?
                        .try_as_basic_value()
                        .left()
                        .unwrap()
                } else {
                    self.lower_int_op(op, current.into_int_value(), rhs.into_int_value())?
                };
                self.builder.build_store(slot, combined)?;
            }
        }
        Ok(())
    }

    /// Resolve an assignable expression to a slot pointer and its type.
    fn lvalue_slot(&mut self, target: &Expr) -> Result<(PointerValue<'ctx>, TypeId)> {
        match &target.kind {
            ExprKind::Var(name) => {
                let local = self.lookup_local(*name).ok_or_else(|| {
                    CodeGenError::Internal(format!("unknown local `{name}`"))
                })?;
                Ok((local.ptr, local.ty))
            }
            ExprKind::Field { object, name } => {
                let obj_ty = self.expr_ty(object);
                let obj = self
                    .lower_expr(object)?
                    .ok_or_else(|| CodeGenError::Internal("object has no value".into()))?
                    .into_pointer_value();
                let TypeKind::Named { name: class, args } =
                    self.analysis.types.kind(obj_ty).clone()
                else {
                    return Err(CodeGenError::Unsupported(
                        "field store on a non-class value".into(),
                    ));
                };
                let (index, field_ty) = self.field_slot(class, &args, *name)?;
                let struct_ty = self.mapper.class_struct(
                    &mut self.analysis.types,
                    &self.analysis.registry,
                    class,
                    &args,
                );
                let ptr = self
                    .builder
                    .build_struct_gep(struct_ty, obj, index, "field.ptr")?;
                Ok((ptr, field_ty))
            }
            ExprKind::Index { object, index } => {
                let obj_ty = self.expr_ty(object);
                match self.analysis.types.kind(obj_ty).clone() {
                    TypeKind::Array { elem, .. } => {
                        let list = self
                            .lower_expr(object)?
                            .ok_or_else(|| {
                                CodeGenError::Internal("list has no value".into())
                            })?
                            .into_struct_value();
                        let data = self
                            .builder
                            .build_extract_value(list, 1, "data")?
                            .into_pointer_value();
                        let idx = self.lower_expr(index)?.unwrap().into_int_value();
                        let elem_mapped = self.map_ty(elem);
                        let ptr = unsafe {
                            self.builder.build_in_bounds_gep(
                                elem_mapped,
                                data,
                                &[idx],
                                "elem.ptr",
                            )?
                        };
                        Ok((ptr, elem))
                    }
                    _ => Err(CodeGenError::Unsupported(
                        "index store on a non-list value".into(),
                    )),
                }
            }
            _ => Err(CodeGenError::Unsupported(
                "assignment target shape".into(),
            )),
        }
    }

    /// Flattened field index plus the field's (instance-substituted)
    /// type.
    fn field_slot(
        &mut self,
        class: Symbol,
        args: &[TypeId],
        field: Symbol,
    ) -> Result<(u32, TypeId)> {
        let index = TypeMapper::field_index(&self.analysis.registry, class, field)
            .ok_or_else(|| {
                CodeGenError::Internal(format!("unknown field `{field}` on `{class}`"))
            })?;
        let raw = flat_fields(&self.analysis.registry, class)
            .iter()
            .find(|(n, _)| *n == field)
            .map(|(_, t)| *t)
            .unwrap();
        let map: FxHashMap<Symbol, TypeId> = self
            .analysis
            .registry
            .classes
            .get(&class)
            .map(|info| {
                info.generics
                    .iter()
                    .map(|(n, _)| *n)
                    .zip(args.iter().copied())
                    .collect()
            })
            .unwrap_or_default();
        let ty = self.analysis.types.substitute(raw, &map, 0).unwrap_or(raw);
        Ok((index, ty))
    }

    // ----- member access -------------------------------------------------

    fn lower_field(
        &mut self,
        expr: &Expr,
        object: &Expr,
        name: Symbol,
        safe: bool,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let obj_ty = self.expr_ty(object);
        if safe {
            if let TypeKind::Nullable(inner) = self.analysis.types.kind(obj_ty).clone() {
                return self.lower_safe_access(expr, object, |this, base_val| {
                    this.load_field(base_val, inner, name)
                });
            }
        }
        let obj = self
            .lower_expr(object)?
            .ok_or_else(|| CodeGenError::Internal("object has no value".into()))?;
        self.load_field(obj, obj_ty, name).map(Some)
    }

    fn load_field(
        &mut self,
        obj: BasicValueEnum<'ctx>,
        obj_ty: TypeId,
        name: Symbol,
    ) -> Result<BasicValueEnum<'ctx>> {
        let TypeKind::Named { name: class, args } = self.analysis.types.kind(obj_ty).clone()
        else {
            return Err(CodeGenError::Unsupported(
                "field access on a non-class value".into(),
            ));
        };
        let (index, field_ty) = self.field_slot(class, &args, name)?;
        let struct_ty = self.mapper.class_struct(
            &mut self.analysis.types,
            &self.analysis.registry,
            class,
            &args,
        );
        let ptr = self.builder.build_struct_gep(
            struct_ty,
            obj.into_pointer_value(),
            index,
            "field.ptr",
        )?;
        let mapped = self.map_ty(field_ty);
        Ok(self.builder.build_load(mapped, ptr, name.as_str())?)
    }

    /// Shared shape of `?.` access: branch on the presence flag, run
    /// the access on the payload, and rejoin with a nullable result.
    fn lower_safe_access(
        &mut self,
        expr: &Expr,
        object: &Expr,
        access: impl FnOnce(&mut Self, BasicValueEnum<'ctx>) -> Result<BasicValueEnum<'ctx>>,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let function = self.current_function()?;
        let value = self
            .lower_expr(object)?
            .ok_or_else(|| CodeGenError::Internal("object has no value".into()))?
            .into_struct_value();
        let present = self
            .builder
            .build_extract_value(value, 0, "present")?
            .into_int_value();

        let then_bb = self.context.append_basic_block(function, "safe.some");
        let else_bb = self.context.append_basic_block(function, "safe.none");
        let merge = self.context.append_basic_block(function, "safe.end");
        self.builder
            .build_conditional_branch(present, then_bb, else_bb)?;

        let result_ty = self.expr_ty(expr);
        let mapped_result = self.map_ty(result_ty);

        self.builder.position_at_end(then_bb);
        let payload = self.builder.build_extract_value(value, 1, "payload")?;
        let accessed = access(self, payload)?;
        let accessed_ty = match self.analysis.types.kind(result_ty) {
            TypeKind::Nullable(inner) => *inner,
            _ => result_ty,
        };
        let some_val = self.wrap_nullable(accessed, accessed_ty)?;
        let then_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(else_bb);
        let none_val = self.null_nullable(accessed_ty)?;
        let else_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(merge);
        let phi = self.builder.build_phi(mapped_result, "safe")?;
        phi.add_incoming(&[(&some_val, then_end), (&none_val, else_end)]);
        Ok(Some(phi.as_basic_value()))
    }

    fn wrap_nullable(
        &mut self,
        value: BasicValueEnum<'ctx>,
        inner_ty: TypeId,
    ) -> Result<BasicValueEnum<'ctx>> {
        let nullable = {
            let inner_mapped = self.map_ty(inner_ty);
            self.context
                .struct_type(&[self.context.bool_type().into(), inner_mapped], false)
        };
        let undef = nullable.get_undef();
        let with_flag = self.builder.build_insert_value(
            undef,
            self.context.bool_type().const_int(1, false),
            0,
            "some",
        )?;
        let full = self
            .builder
            .build_insert_value(with_flag, value, 1, "some.val")?;
        Ok(full.as_basic_value_enum())
    }

    fn null_nullable(&mut self, inner_ty: TypeId) -> Result<BasicValueEnum<'ctx>> {
        let nullable = {
            let inner_mapped = self.map_ty(inner_ty);
            self.context
                .struct_type(&[self.context.bool_type().into(), inner_mapped], false)
        };
        let undef = nullable.get_undef();
        let with_flag = self.builder.build_insert_value(
            undef,
            self.context.bool_type().const_zero(),
            0,
            "none",
        )?;
        Ok(with_flag.as_basic_value_enum())
    }

    fn lower_null_coalesce(
        &mut self,
        expr: &Expr,
        value: &Expr,
        fallback: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let function = self.current_function()?;
        let v = self
            .lower_expr(value)?
            .ok_or_else(|| CodeGenError::Internal("coalesce operand has no value".into()))?
            .into_struct_value();
        let present = self
            .builder
            .build_extract_value(v, 0, "present")?
            .into_int_value();

        let some_bb = self.context.append_basic_block(function, "coalesce.some");
        let none_bb = self.context.append_basic_block(function, "coalesce.none");
        let merge = self.context.append_basic_block(function, "coalesce.end");
        self.builder
            .build_conditional_branch(present, some_bb, none_bb)?;

        let result_ty = self.expr_ty(expr);
        let mapped = self.map_ty(result_ty);

        self.builder.position_at_end(some_bb);
        let payload = self.builder.build_extract_value(v, 1, "payload")?;
        let some_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(none_bb);
        let fallback_from = self.expr_ty(fallback);
        let fb = self.lower_expr(fallback)?;
        let fb = self
            .coerce(fb, fallback_from, result_ty)?
            .ok_or_else(|| CodeGenError::Internal("fallback has no value".into()))?;
        let none_end = self.builder.get_insert_block().unwrap();
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(merge);
        let phi = self.builder.build_phi(mapped, "coalesce")?;
        phi.add_incoming(&[(&payload, some_end), (&fb, none_end)]);
        Ok(Some(phi.as_basic_value()))
    }

    // ----- indexing and literals ----------------------------------------

    fn lower_index(
        &mut self,
        expr: &Expr,
        object: &Expr,
        index: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let obj_ty = self.expr_ty(object);
        match self.analysis.types.kind(obj_ty).clone() {
            TypeKind::Array { elem, .. } => {
                let list = self
                    .lower_expr(object)?
                    .ok_or_else(|| CodeGenError::Internal("list has no value".into()))?
                    .into_struct_value();
                let data = self
                    .builder
                    .build_extract_value(list, 1, "data")?
                    .into_pointer_value();
                let idx = self.lower_expr(index)?.unwrap().into_int_value();
                let mapped = self.map_ty(elem);
                let ptr = unsafe {
                    self.builder
                        .build_in_bounds_gep(mapped, data, &[idx], "elem.ptr")?
                };
                Ok(Some(self.builder.build_load(mapped, ptr, "elem")?))
            }
            TypeKind::Str => {
                // Length-prefixed bytes: data starts 8 bytes in.
                let base = self.lower_expr(object)?.unwrap().into_pointer_value();
                let idx = self.lower_expr(index)?.unwrap().into_int_value();
                let offset = self.builder.build_int_add(
                    idx,
                    self.context.i64_type().const_int(8, false),
                    "offset",
                )?;
                let byte_ptr = unsafe {
                    self.builder.build_in_bounds_gep(
                        self.context.i8_type(),
                        base,
                        &[offset],
                        "byte.ptr",
                    )?
                };
                let byte = self
                    .builder
                    .build_load(self.context.i8_type(), byte_ptr, "byte")?
                    .into_int_value();
                Ok(Some(
                    self.builder
                        .build_int_z_extend(byte, self.context.i32_type(), "char")?
                        .into(),
                ))
            }
            TypeKind::Dict { key, value } => {
                let dict_ty = self.map_ty(obj_ty);
                let dict = self.lower_expr(object)?.unwrap();
                let dict_slot = self.builder.build_alloca(dict_ty, "dict")?;
                self.builder.build_store(dict_slot, dict)?;

                let key_mapped = self.map_ty(key);
                let key_v = self.lower_expr(index)?.unwrap();
                let key_slot = self.builder.build_alloca(key_mapped, "key")?;
                self.builder.build_store(key_slot, key_v)?;

                let found = self
                    .builder
                    .build_call(
                        self.runtime.dict_get,
                        &[dict_slot.into(), key_slot.into()],
                        "found",
                    )?
                    .try_as_basic_value()
                    .left()
                    .unwrap()
                    .into_pointer_value();
                let value_mapped = self.map_ty(value);
                Ok(Some(self.builder.build_load(value_mapped, found, "value")?))
            }
            _ => {
                let _ = expr;
                Err(CodeGenError::Unsupported("index on this type".into()))
            }
        }
    }

    fn lower_list(
        &mut self,
        expr: &Expr,
        elems: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let list_ty = self.expr_ty(expr);
        let elem_ty = match self.analysis.types.kind(list_ty) {
            TypeKind::Array { elem, .. } => *elem,
            _ => self.analysis.types.unknown,
        };
        let elem_mapped = self.map_ty(elem_ty);
        let i64_t = self.context.i64_type();
        let len = i64_t.const_int(elems.len() as u64, false);

        let elem_size = self
            .mapper
            .size_of(&mut self.analysis.types, &self.analysis.registry, elem_ty);
        let bytes = self.builder.build_int_mul(len, elem_size, "bytes")?;
        let data = self
            .builder
            .build_call(self.runtime.alloc, &[bytes.into()], "list.data")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();

        for (i, elem) in elems.iter().enumerate() {
            let from = self.expr_ty(elem);
            let v = self.lower_expr(elem)?;
            let v = self
                .coerce(v, from, elem_ty)?
                .ok_or_else(|| CodeGenError::Internal("list element has no value".into()))?;
            let idx = i64_t.const_int(i as u64, false);
            let slot = unsafe {
                self.builder
                    .build_in_bounds_gep(elem_mapped, data, &[idx], "slot")?
            };
            self.builder.build_store(slot, v)?;
        }

        let struct_ty = self
            .context
            .struct_type(&[i64_t.into(), self.context.ptr_type(AddressSpace::default()).into()], false);
        let undef = struct_ty.get_undef();
        let with_len = self.builder.build_insert_value(undef, len, 0, "list.len")?;
        let full = self
            .builder
            .build_insert_value(with_len, data, 1, "list")?;
        Ok(Some(full.as_basic_value_enum()))
    }

    fn lower_dict(
        &mut self,
        expr: &Expr,
        entries: &[(Expr, Expr)],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let dict_ty = self.expr_ty(expr);
        let (key_ty, value_ty) = match self.analysis.types.kind(dict_ty) {
            TypeKind::Dict { key, value } => (*key, *value),
            _ => (self.analysis.types.unknown, self.analysis.types.unknown),
        };
        let key_mapped = self.map_ty(key_ty);
        let value_mapped = self.map_ty(value_ty);
        let i64_t = self.context.i64_type();
        let len = i64_t.const_int(entries.len() as u64, false);

        let key_size = self
            .mapper
            .size_of(&mut self.analysis.types, &self.analysis.registry, key_ty);
        let value_size =
            self.mapper
                .size_of(&mut self.analysis.types, &self.analysis.registry, value_ty);
        let key_bytes = self.builder.build_int_mul(len, key_size, "kbytes")?;
        let value_bytes = self.builder.build_int_mul(len, value_size, "vbytes")?;
        let keys = self
            .builder
            .build_call(self.runtime.alloc, &[key_bytes.into()], "dict.keys")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        let values = self
            .builder
            .build_call(self.runtime.alloc, &[value_bytes.into()], "dict.values")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();

        for (i, (k, v)) in entries.iter().enumerate() {
            let idx = i64_t.const_int(i as u64, false);
            let kf = self.expr_ty(k);
            let kv = self.lower_expr(k)?;
            let kv = self.coerce(kv, kf, key_ty)?.unwrap();
            let kslot = unsafe {
                self.builder
                    .build_in_bounds_gep(key_mapped, keys, &[idx], "kslot")?
            };
            self.builder.build_store(kslot, kv)?;

            let vf = self.expr_ty(v);
            let vv = self.lower_expr(v)?;
            let vv = self.coerce(vv, vf, value_ty)?.unwrap();
            let vslot = unsafe {
                self.builder
                    .build_in_bounds_gep(value_mapped, values, &[idx], "vslot")?
            };
            self.builder.build_store(vslot, vv)?;
        }

        let ptr_t = self.context.ptr_type(AddressSpace::default());
        let struct_ty = self
            .context
            .struct_type(&[i64_t.into(), ptr_t.into(), ptr_t.into()], false);
        let undef = struct_ty.get_undef();
        let a = self.builder.build_insert_value(undef, len, 0, "dict.len")?;
        let b = self.builder.build_insert_value(a, keys, 1, "dict.keys")?;
        let c = self.builder.build_insert_value(b, values, 2, "dict")?;
        Ok(Some(c.as_basic_value_enum()))
    }

    /// Lambdas lift to named functions; function values are bare
    /// function pointers, so a lambda may only use its own parameters.
    fn lower_lambda(
        &mut self,
        expr: &Expr,
        params: &[tocin_par::ast::Param],
        body: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let fn_ty_id = self.expr_ty(expr);
        let TypeKind::Func {
            params: param_tys,
            ret,
            ..
        } = self.analysis.types.kind(fn_ty_id).clone()
        else {
            return Err(CodeGenError::Internal("lambda without function type".into()));
        };
        let sig = FuncSig {
            params: param_tys.clone(),
            moves: vec![false; param_tys.len()],
            ret,
            is_async: false,
            has_self: false,
            generics: Vec::new(),
        };
        let name = self.fresh("__lambda_");
        let fn_type = self.llvm_fn_type(&sig, false);
        let function = self.module.add_function(&name, fn_type, None);

        let saved_block = self.builder.get_insert_block();
        let saved_locals = std::mem::take(&mut self.locals);
        let saved_ret = self.current_ret;
        let saved_async = self.current_async;
        self.current_ret = ret;
        self.current_async = false;

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.locals.push(FxHashMap::default());
        for (i, param) in params.iter().enumerate() {
            let ty = param_tys.get(i).copied().unwrap_or(self.analysis.types.unknown);
            let mapped = self.map_ty(ty);
            let slot = self.builder.build_alloca(mapped, param.name.as_str())?;
            if let Some(v) = function.get_nth_param(i as u32) {
                self.builder.build_store(slot, v)?;
            }
            self.define_local(param.name, slot, ty);
        }
        let body_from = self.expr_ty(body);
        let result = self.lower_expr(body)?;
        let result = self.coerce(result, body_from, ret)?;
        match result {
            Some(v) => self.builder.build_return(Some(&v))?,
            None => self.builder.build_return(None)?,
        };

        self.locals = saved_locals;
        self.current_ret = saved_ret;
        self.current_async = saved_async;
        if let Some(block) = saved_block {
            self.builder.position_at_end(block);
        }
        self.functions.insert(name.clone(), (function, sig));
        Ok(Some(function.as_global_value().as_pointer_value().into()))
    }

    fn lower_await(
        &mut self,
        expr: &Expr,
        inner: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let future = self
            .lower_expr(inner)?
            .ok_or_else(|| CodeGenError::Internal("await on void".into()))?;
        let slot = self
            .builder
            .build_call(self.runtime.future_get, &[future.into()], "await")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        let result_ty = self.expr_ty(expr);
        if self.mapper.is_void(&self.analysis.types, result_ty) {
            return Ok(None);
        }
        let mapped = self.map_ty(result_ty);
        Ok(Some(self.builder.build_load(mapped, slot, "value")?))
    }

    /// String interpolation: runtime `to_string` conversions folded
    /// with `string_concat`.
    fn lower_interp(&mut self, parts: &[InterpPart]) -> Result<BasicValueEnum<'ctx>> {
        let mut acc: Option<BasicValueEnum<'ctx>> = None;
        for part in parts {
            let piece = match part {
                InterpPart::Text(text) => self.string_const(text.as_bytes()).into(),
                InterpPart::Expr(e) => {
                    let ty = self.expr_ty(e);
                    let v = self.lower_expr(e)?;
                    self.to_string_value(v, ty)?
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => self
                    .builder
                    .build_call(
                        self.runtime.string_concat,
                        &[prev.into(), piece.into()],
                        "concat",
                    )?
                    .try_as_basic_value()
                    .left()
                    .unwrap(),
            });
        }
        Ok(acc.unwrap_or_else(|| self.string_const(b"").into()))
    }

    pub(crate) fn to_string_value(
        &mut self,
        v: Option<BasicValueEnum<'ctx>>,
        ty: TypeId,
    ) -> Result<BasicValueEnum<'ctx>> {
        let Some(v) = v else {
            return Ok(self.string_const(b"").into());
        };
        let kind = self.analysis.types.kind(ty).clone();
        let converted = match kind {
            TypeKind::Str => v,
            TypeKind::Int => self
                .builder
                .build_call(self.runtime.int_to_string, &[v.into()], "str")?
                .try_as_basic_value()
                .left()
                .unwrap(),
            TypeKind::Float => self
                .builder
                .build_call(self.runtime.float_to_string, &[v.into()], "str")?
                .try_as_basic_value()
                .left()
                .unwrap(),
            TypeKind::Bool => self
                .builder
                .build_call(self.runtime.bool_to_string, &[v.into()], "str")?
                .try_as_basic_value()
                .left()
                .unwrap(),
            TypeKind::Char => self
                .builder
                .build_call(self.runtime.char_to_string, &[v.into()], "str")?
                .try_as_basic_value()
                .left()
                .unwrap(),
            other => {
                // Structured values print their type name.
                let shown = {
                    let id = self.analysis.types.intern(other);
                    self.analysis.types.display(id)
                };
                self.string_const(shown.as_bytes()).into()
            }
        };
        Ok(converted)
    }

    // ----- allocation, channels, sums -----------------------------------

    fn lower_new(
        &mut self,
        expr: &Expr,
        args: &[Expr],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let obj_ty = self.expr_ty(expr);
        let TypeKind::Named { name: class, args: type_args } =
            self.analysis.types.kind(obj_ty).clone()
        else {
            return Err(CodeGenError::Unsupported("new on a non-class type".into()));
        };
        let struct_ty = self.mapper.class_struct(
            &mut self.analysis.types,
            &self.analysis.registry,
            class,
            &type_args,
        );
        let size = struct_ty
            .size_of()
            .unwrap_or_else(|| self.context.i64_type().const_int(8, false));
        let obj = self
            .builder
            .build_call(self.runtime.alloc, &[size.into()], "new")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();

        // Object header: the vtable slot. Null until the object is
        // coerced to a trait object, which substitutes the real table.
        let vtable_ptr = self.builder.build_struct_gep(struct_ty, obj, 0, "vtable")?;
        self.builder.build_store(
            vtable_ptr,
            self.context.ptr_type(AddressSpace::default()).const_null(),
        )?;

        // Prefer the synthesized initializer; otherwise arguments fill
        // fields in declaration order.
        let init = Symbol::intern("init");
        if let Some((symbol, sig)) = self.resolve_static_method(obj_ty, init) {
            let mut call_args: Vec<BasicMetadataValueEnum> = vec![obj.into()];
            for (arg, &param_ty) in args.iter().zip(&sig.params) {
                let from = self.expr_ty(arg);
                let v = self.lower_expr(arg)?;
                let param_ty = self.concrete(param_ty);
                if let Some(v) = self.coerce(v, from, param_ty)? {
                    call_args.push(v.into());
                }
            }
            let function = self
                .functions
                .get(&symbol)
                .map(|(f, _)| *f)
                .ok_or(CodeGenError::FunctionNotFound(symbol))?;
            self.builder.build_call(function, &call_args, "")?;
        } else {
            let fields = flat_fields(&self.analysis.registry, class);
            for (arg, (field, _)) in args.iter().zip(fields) {
                let (index, field_ty) = self.field_slot(class, &type_args, field)?;
                let from = self.expr_ty(arg);
                let v = self.lower_expr(arg)?;
                if let Some(v) = self.coerce(v, from, field_ty)? {
                    let slot = self.builder.build_struct_gep(
                        struct_ty,
                        obj,
                        index,
                        "init.field",
                    )?;
                    self.builder.build_store(slot, v)?;
                }
            }
        }
        Ok(Some(obj.into()))
    }

    fn lower_delete(&mut self, inner: &Expr) -> Result<Option<BasicValueEnum<'ctx>>> {
        let obj_ty = self.expr_ty(inner);
        let obj = self
            .lower_expr(inner)?
            .ok_or_else(|| CodeGenError::Internal("delete on void".into()))?;
        // Run the destructor when one is registered.
        let deinit = Symbol::intern("deinit");
        if let Some((symbol, _)) = self.resolve_static_method(obj_ty, deinit) {
            if let Some((function, _)) = self.functions.get(&symbol) {
                let function = *function;
                self.builder.build_call(function, &[obj.into()], "")?;
            }
        }
        self.builder
            .build_call(self.runtime.free, &[obj.into()], "")?;
        Ok(None)
    }

    fn lower_chan_send(&mut self, chan: &Expr, value: &Expr) -> Result<()> {
        let chan_ty = self.expr_ty(chan);
        let elem = match self.analysis.types.kind(chan_ty) {
            TypeKind::Chan { elem, .. } => *elem,
            _ => self.analysis.types.unknown,
        };
        let chan_v = self
            .lower_expr(chan)?
            .ok_or_else(|| CodeGenError::Internal("channel has no value".into()))?;
        let from = self.expr_ty(value);
        let v = self.lower_expr(value)?;
        let mapped = self.map_ty(elem);
        let slot = self.builder.build_alloca(mapped, "send.val")?;
        if let Some(v) = self.coerce(v, from, elem)? {
            self.builder.build_store(slot, v)?;
        }
        self.builder.build_call(
            self.runtime.chan_send,
            &[chan_v.into(), slot.into()],
            "",
        )?;
        Ok(())
    }

    fn lower_chan_recv(
        &mut self,
        expr: &Expr,
        inner: &Expr,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let chan_v = self
            .lower_expr(inner)?
            .ok_or_else(|| CodeGenError::Internal("channel has no value".into()))?;
        let slot = self
            .builder
            .build_call(self.runtime.chan_recv, &[chan_v.into()], "recv")?
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        let elem_ty = self.expr_ty(expr);
        let mapped = self.map_ty(elem_ty);
        Ok(Some(self.builder.build_load(mapped, slot, "received")?))
    }

    /// Option/Result constructors build the tagged struct.
    fn lower_tagged(
        &mut self,
        expr: &Expr,
        tag: u64,
        payload: Option<&Expr>,
        payload_index: u32,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let result_ty = self.expr_ty(expr);
        let mapped = self.map_ty(result_ty).into_struct_type();
        let undef = mapped.get_undef();
        let tagged = self.builder.build_insert_value(
            undef,
            self.context.i32_type().const_int(tag, false),
            0,
            "tag",
        )?;
        let full = match payload {
            Some(payload_expr) => {
                let expected = payload_slot_type(
                    &self.analysis.types,
                    result_ty,
                    payload_index,
                );
                let from = self.expr_ty(payload_expr);
                let v = self.lower_expr(payload_expr)?;
                let v = self
                    .coerce(v, from, expected)?
                    .ok_or_else(|| CodeGenError::Internal("payload has no value".into()))?;
                self.builder
                    .build_insert_value(tagged, v, payload_index, "payload")?
            }
            None => tagged,
        };
        Ok(Some(full.as_basic_value_enum()))
    }

    // ----- shared value helpers -----------------------------------------

    /// Length-prefixed string constant. Takes raw bytes: string
    /// literal values may carry non-UTF-8 bytes verbatim.
    pub(crate) fn string_const(&mut self, bytes: &[u8]) -> PointerValue<'ctx> {
        let len = self.context.i64_type().const_int(bytes.len() as u64, false);
        let data = self.context.const_string(bytes, false);
        let initializer = self.context.const_struct(&[len.into(), data.into()], false);
        let name = self.fresh("str.");
        let global = self
            .module
            .add_global(initializer.get_type(), None, &name);
        global.set_initializer(&initializer);
        global.set_constant(true);
        global.as_pointer_value()
    }

    /// Implicit conversions: numeric widening, `T -> T?`, nil into a
    /// nullable, and class-to-trait-object fattening.
    pub(crate) fn coerce(
        &mut self,
        value: Option<BasicValueEnum<'ctx>>,
        from: TypeId,
        to: TypeId,
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        if from == to {
            return Ok(value);
        }
        let Some(v) = value else {
            return Ok(None);
        };
        let from_kind = self.analysis.types.kind(from).clone();
        let to_kind = self.analysis.types.kind(to).clone();
        match (from_kind, to_kind) {
            (TypeKind::Int, TypeKind::Float) => Ok(Some(
                self.builder
                    .build_signed_int_to_float(
                        v.into_int_value(),
                        self.context.f64_type(),
                        "promoted",
                    )?
                    .into(),
            )),
            (TypeKind::NilLiteral, TypeKind::Nullable(inner)) => {
                Ok(Some(self.null_nullable(inner)?))
            }
            // Nullable-to-nullable keeps the representation.
            (TypeKind::Nullable(_), TypeKind::Nullable(_)) => Ok(Some(v)),
            (_, TypeKind::Nullable(inner)) => {
                let v = self
                    .coerce(Some(v), from, inner)?
                    .ok_or_else(|| CodeGenError::Internal("cannot wrap void".into()))?;
                Ok(Some(self.wrap_nullable(v, inner)?))
            }
            (TypeKind::Named { name: class, .. }, TypeKind::TraitObject { name: trait_name, .. }) => {
                let vtable = self.vtable_for(trait_name, class)?;
                let ptr_t = self.context.ptr_type(AddressSpace::default());
                let fat_ty = self
                    .context
                    .struct_type(&[ptr_t.into(), ptr_t.into()], false);
                let undef = fat_ty.get_undef();
                let with_data = self.builder.build_insert_value(undef, v, 0, "fat.data")?;
                let full = self
                    .builder
                    .build_insert_value(with_data, vtable, 1, "fat")?;
                Ok(Some(full.as_basic_value_enum()))
            }
            _ => Ok(Some(v)),
        }
    }

    /// The per-(trait, class) table of method pointers, in the trait's
    /// method declaration order.
    pub(crate) fn vtable_for(
        &mut self,
        trait_name: Symbol,
        class: Symbol,
    ) -> Result<PointerValue<'ctx>> {
        let key = format!("vtable.{trait_name}.{class}");
        if let Some(&existing) = self.vtables.get(&key) {
            return Ok(existing);
        }
        let ptr_t = self.context.ptr_type(AddressSpace::default());
        let methods: Vec<Symbol> = self
            .analysis
            .registry
            .traits
            .get(&trait_name)
            .map(|t| t.methods.keys().copied().collect())
            .unwrap_or_default();
        let mut slots = Vec::with_capacity(methods.len());
        for method in methods {
            let symbol = trait_method_symbol(trait_name, class, method);
            let slot = self
                .functions
                .get(&symbol)
                .map(|(f, _)| f.as_global_value().as_pointer_value())
                .unwrap_or_else(|| ptr_t.const_null());
            slots.push(slot);
        }
        let arr = ptr_t.const_array(&slots);
        let global = self.module.add_global(arr.get_type(), None, &key);
        global.set_initializer(&arr);
        global.set_constant(true);
        let ptr = global.as_pointer_value();
        self.vtables.insert(key, ptr);
        Ok(ptr)
    }

    /// Static method resolution mirroring the analyzer's order:
    /// inherent (superclass chain), single trait impl, extension.
    pub(crate) fn resolve_static_method(
        &mut self,
        recv_ty: TypeId,
        method: Symbol,
    ) -> Option<(String, FuncSig)> {
        // Generic class instances dispatch to the instantiation's
        // mangled method set.
        if let TypeKind::Named { name, args } = self.analysis.types.kind(recv_ty).clone() {
            if !args.is_empty() {
                if let Some(info) = self.analysis.registry.classes.get(&name) {
                    if let Some(sig) = info.methods.get(&method).cloned() {
                        let map: FxHashMap<Symbol, TypeId> = info
                            .generics
                            .iter()
                            .map(|(n, _)| *n)
                            .zip(args.iter().copied())
                            .collect();
                        let sig = self.substitute_sig(&sig, &map);
                        let mangled = self.analysis.types.mangle(name, &args);
                        return Some((format!("{mangled}_{method}"), sig));
                    }
                }
            }
        }

        let head = match self.analysis.types.kind(recv_ty) {
            TypeKind::Named { name, .. } => Some(*name),
            TypeKind::Str => Some(Symbol::intern("string")),
            TypeKind::Int => Some(Symbol::intern("int")),
            TypeKind::Float => Some(Symbol::intern("float")),
            TypeKind::Bool => Some(Symbol::intern("bool")),
            TypeKind::Char => Some(Symbol::intern("char")),
            _ => None,
        }?;

        // Inherent methods, walking the superclass chain so the symbol
        // is emitted under the defining class.
        let mut current = Some(head);
        while let Some(class) = current {
            let info = self.analysis.registry.classes.get(&class);
            if let Some(info) = info {
                if let Some(sig) = info.methods.get(&method) {
                    return Some((method_symbol(class, method), sig.clone()));
                }
                current = info.superclass;
            } else {
                current = None;
            }
        }

        // Trait impls.
        let mut candidates = Vec::new();
        for im in &self.analysis.registry.impls {
            if im.target != head {
                continue;
            }
            if let Some(sig) = im.methods.get(&method) {
                candidates.push((
                    trait_method_symbol(im.trait_name, head, method),
                    sig.clone(),
                ));
            } else if let Some(trait_info) = self.analysis.registry.traits.get(&im.trait_name) {
                if let Some(m) = trait_info.methods.get(&method) {
                    if m.has_default {
                        candidates.push((
                            trait_method_symbol(im.trait_name, head, method),
                            m.sig.clone(),
                        ));
                    }
                }
            }
        }
        if candidates.len() == 1 {
            return candidates.pop();
        }

        // Extensions, first registered wins.
        if let Some(entries) = self.analysis.registry.extensions.get(&head) {
            if let Some((_, sig)) = entries.iter().find(|(n, _)| *n == method) {
                return Some((extension_symbol(head, method), sig.clone()));
            }
        }
        None
    }
}

/// The declared type of the payload slot inside an Option/Result
/// struct.
fn payload_slot_type(
    types: &tocin_sem::TypeTable,
    sum_ty: TypeId,
    payload_index: u32,
) -> TypeId {
    match types.kind(sum_ty) {
        TypeKind::Option(inner) => *inner,
        TypeKind::Result { ok, err } => {
            if payload_index == 1 {
                *ok
            } else {
                *err
            }
        }
        _ => TypeId::UNKNOWN,
    }
}
