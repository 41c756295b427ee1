//! Expression inference and the checks that ride along with it:
//! assignability, method resolution, null-safety flow narrowing,
//! ownership/move tracking, generic instantiation, and pattern
//! matching.

use tocin_par::ast::{
    Expr, ExprKind, InterpPart, LiteralPat, MatchCase, Pattern, PatternKind, SelectCase, SelectOp,
    Stmt, TypeExpr, UnaryOp,
};
use tocin_par::ast::BinaryOp;
use tocin_util::diagnostic::codes;
use tocin_util::{FxHashMap, Span, Symbol, TypeId};

use crate::analysis::{primitive_head, Analyzer};
use crate::registry::FuncSig;
use crate::scope::{OwnState, ScopeKind, SymbolInfo, SymbolKind};
use crate::types::TypeKind;

impl<'a> Analyzer<'a> {
    /// Type an expression, filling its annotation slot. Never returns
    /// `None`-equivalent: poisoned subtrees get the `unknown` type.
    pub(crate) fn check_expr(&mut self, expr: &mut Expr) -> TypeId {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Int(_) => self.types.int,
            ExprKind::Float(_) => self.types.float,
            ExprKind::Bool(_) => self.types.bool_,
            ExprKind::Str(_) => self.types.string,
            ExprKind::Char(_) => self.types.char_,
            ExprKind::Nil => self.types.nil,
            ExprKind::Var(name) => {
                let name = *name;
                self.check_var(name, span)
            }
            ExprKind::Qualified { module, name } => {
                let (module, name) = (*module, *name);
                self.check_qualified(module, name, span)
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_ty = self.check_expr(operand);
                let operand_span = operand.span;
                let is_lvalue = matches!(operand.kind, ExprKind::Var(_));
                self.check_unary(op, operand_ty, is_lvalue, operand_span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lhs_ty = self.check_expr(lhs);
                let rhs_ty = self.check_expr(rhs);
                self.check_binary(op, lhs_ty, rhs_ty, span)
            }
            ExprKind::Group(inner) => self.check_expr(inner),
            ExprKind::Assign { target, op, value } => {
                let op = *op;
                self.check_assign(target, op, value, span)
            }
            ExprKind::Call {
                callee,
                generic_args,
                args,
            } => {
                let generic_args = generic_args.clone();
                self.check_call(callee, &generic_args, args, span)
            }
            ExprKind::Field { object, name } => {
                let name = *name;
                self.check_field(object, name, false, span)
            }
            ExprKind::SafeField { object, name } => {
                let name = *name;
                self.check_field(object, name, true, span)
            }
            ExprKind::NullAssert(inner) => {
                let inner_ty = self.check_expr(inner);
                self.types.non_nullable(inner_ty)
            }
            ExprKind::NullCoalesce { value, fallback } => {
                let value_ty = self.check_expr(value);
                let fallback_ty = self.check_expr(fallback);
                let result = self.types.non_nullable(value_ty);
                self.require_assignable(fallback_ty, result, fallback.span);
                result
            }
            ExprKind::Index { object, index } => {
                let object_ty = self.check_expr(object);
                let index_ty = self.check_expr(index);
                let index_span = index.span;
                self.check_index(object_ty, index_ty, index_span, span)
            }
            ExprKind::List(elems) => {
                let mut elem_ty = self.types.unknown;
                for elem in elems.iter_mut() {
                    let ty = self.check_expr(elem);
                    if self.types.is_unknown(elem_ty) {
                        elem_ty = ty;
                    } else {
                        self.require_assignable(ty, elem_ty, elem.span);
                    }
                }
                self.types.intern(TypeKind::Array {
                    elem: elem_ty,
                    len: None,
                })
            }
            ExprKind::Dict(entries) => {
                let mut key_ty = self.types.unknown;
                let mut value_ty = self.types.unknown;
                for (key, value) in entries.iter_mut() {
                    let kt = self.check_expr(key);
                    let vt = self.check_expr(value);
                    if self.types.is_unknown(key_ty) {
                        key_ty = kt;
                    } else {
                        self.require_assignable(kt, key_ty, key.span);
                    }
                    if self.types.is_unknown(value_ty) {
                        value_ty = vt;
                    } else {
                        self.require_assignable(vt, value_ty, value.span);
                    }
                }
                self.types.intern(TypeKind::Dict {
                    key: key_ty,
                    value: value_ty,
                })
            }
            ExprKind::Lambda { params, ret, body } => {
                let params = params.clone();
                let ret = ret.clone();
                self.check_lambda(&params, ret.as_ref(), body)
            }
            ExprKind::Await(inner) => {
                let inner_ty = self.check_expr(inner);
                let inner_span = inner.span;
                self.check_await(inner_ty, inner_span, span)
            }
            ExprKind::Interp(parts) => {
                for part in parts.iter_mut() {
                    if let InterpPart::Expr(e) = part {
                        self.check_expr(e);
                    }
                }
                self.types.string
            }
            ExprKind::New { class, args } => {
                let class = class.clone();
                self.check_new(&class, args, span)
            }
            ExprKind::Delete(inner) => {
                let inner_ty = self.check_expr(inner);
                if !matches!(
                    self.types.kind(inner_ty),
                    TypeKind::Named { .. } | TypeKind::Pointer(_) | TypeKind::Unknown
                ) {
                    let shown = self.types.display(inner_ty);
                    self.handler.error(
                        codes::T006_INVALID_OPERANDS,
                        format!("`delete` needs an object or pointer, got `{shown}`"),
                        span,
                    );
                }
                self.types.void
            }
            ExprKind::Move(inner) => self.check_move(inner, span),
            ExprKind::ChanSend { chan, value } => {
                let chan_ty = self.check_expr(chan);
                let value_ty = self.check_expr(value);
                let value_span = value.span;
                self.check_chan_send(chan_ty, value_ty, value_span, span)
            }
            ExprKind::ChanRecv(inner) => {
                let chan_ty = self.check_expr(inner);
                self.check_chan_recv(chan_ty, span)
            }
            ExprKind::OptionSome(inner) => {
                let inner_ty = self.check_expr(inner);
                self.types.intern(TypeKind::Option(inner_ty))
            }
            ExprKind::OptionNone => {
                let unknown = self.types.unknown;
                self.types.intern(TypeKind::Option(unknown))
            }
            ExprKind::ResultOk(inner) => {
                let inner_ty = self.check_expr(inner);
                let unknown = self.types.unknown;
                self.types.intern(TypeKind::Result {
                    ok: inner_ty,
                    err: unknown,
                })
            }
            ExprKind::ResultErr(inner) => {
                let inner_ty = self.check_expr(inner);
                let unknown = self.types.unknown;
                self.types.intern(TypeKind::Result {
                    ok: unknown,
                    err: inner_ty,
                })
            }
            ExprKind::Error => self.types.unknown,
        };
        expr.ty = Some(ty);
        ty
    }

    // ----- names --------------------------------------------------------

    fn check_var(&mut self, name: Symbol, span: Span) -> TypeId {
        let Some((info, _)) = self.scopes.lookup_with_capture(name) else {
            self.handler.error(
                codes::T002_UNDEFINED_VARIABLE,
                format!("undefined variable `{name}`"),
                span,
            );
            return self.types.unknown;
        };
        let ty = info.ty;
        let state = info.state;
        if state == OwnState::Moved {
            self.handler.error(
                codes::O002_USE_AFTER_MOVE,
                format!("use of `{name}` after it was moved"),
                span,
            );
        }
        self.narrowed_type_of(name).unwrap_or(ty)
    }

    fn check_qualified(&mut self, module: Symbol, name: Symbol, span: Span) -> TypeId {
        let Some(info) = self.scopes.lookup(module) else {
            self.handler.error(
                codes::T036_UNDEFINED_MODULE,
                format!("unknown module alias `{module}`"),
                span,
            );
            return self.types.unknown;
        };
        if info.kind != SymbolKind::ModuleAlias {
            self.handler.error(
                codes::T036_UNDEFINED_MODULE,
                format!("`{module}` is not a module alias"),
                span,
            );
            return self.types.unknown;
        }
        let Some(module_key) = info.module else {
            return self.types.unknown;
        };
        match self.exports.get(&module_key).and_then(|e| e.get(&name)) {
            Some(symbol) => symbol.ty,
            None => {
                self.handler.error(
                    codes::T002_UNDEFINED_VARIABLE,
                    format!("module `{module_key}` does not export `{name}`"),
                    span,
                );
                self.types.unknown
            }
        }
    }

    // ----- operators ----------------------------------------------------

    fn check_unary(&mut self, op: UnaryOp, operand: TypeId, is_lvalue: bool, span: Span) -> TypeId {
        if self.types.is_unknown(operand) {
            return self.types.unknown;
        }
        match op {
            UnaryOp::Neg => {
                if self.types.is_numeric(operand) {
                    operand
                } else {
                    self.invalid_operand(op.symbol(), operand, span)
                }
            }
            UnaryOp::Not => {
                if operand == self.types.bool_ {
                    self.types.bool_
                } else {
                    self.invalid_operand(op.symbol(), operand, span)
                }
            }
            UnaryOp::BitNot => {
                if operand == self.types.int {
                    self.types.int
                } else {
                    self.invalid_operand(op.symbol(), operand, span)
                }
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                if !is_lvalue {
                    self.handler.error(
                        codes::T006_INVALID_OPERANDS,
                        format!("`{}` needs a variable operand", op.symbol()),
                        span,
                    );
                    return self.types.unknown;
                }
                if self.types.is_numeric(operand) {
                    operand
                } else {
                    self.invalid_operand(op.symbol(), operand, span)
                }
            }
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: TypeId, rhs: TypeId, span: Span) -> TypeId {
        use BinaryOp::*;
        let unknown_involved = self.types.is_unknown(lhs) || self.types.is_unknown(rhs);
        match op {
            Add => {
                if lhs == self.types.string && rhs == self.types.string {
                    return self.types.string;
                }
                self.arith(op, lhs, rhs, span)
            }
            Sub | Mul | Div | Rem => self.arith(op, lhs, rhs, span),
            Eq | Ne => {
                if unknown_involved || self.comparable(lhs, rhs) {
                    self.types.bool_
                } else {
                    self.invalid_operands(op.symbol(), lhs, rhs, span);
                    self.types.bool_
                }
            }
            Lt | Le | Gt | Ge => {
                let ordered = (self.types.is_numeric(lhs) && self.types.is_numeric(rhs))
                    || (lhs == rhs && (lhs == self.types.string || lhs == self.types.char_));
                if unknown_involved || ordered {
                    self.types.bool_
                } else {
                    self.invalid_operands(op.symbol(), lhs, rhs, span);
                    self.types.bool_
                }
            }
            And | Or => {
                if unknown_involved || (lhs == self.types.bool_ && rhs == self.types.bool_) {
                    self.types.bool_
                } else {
                    self.invalid_operands(op.symbol(), lhs, rhs, span);
                    self.types.bool_
                }
            }
            BitAnd | BitOr | BitXor | Shl | Shr => {
                if unknown_involved {
                    self.types.unknown
                } else if lhs == self.types.int && rhs == self.types.int {
                    self.types.int
                } else {
                    self.invalid_operands(op.symbol(), lhs, rhs, span);
                    self.types.unknown
                }
            }
        }
    }

    /// Numeric arithmetic with int-to-float promotion.
    fn arith(&mut self, op: BinaryOp, lhs: TypeId, rhs: TypeId, span: Span) -> TypeId {
        if self.types.is_unknown(lhs) || self.types.is_unknown(rhs) {
            return self.types.unknown;
        }
        if self.types.is_numeric(lhs) && self.types.is_numeric(rhs) {
            if lhs == self.types.float || rhs == self.types.float {
                self.types.float
            } else {
                self.types.int
            }
        } else {
            self.invalid_operands(op.symbol(), lhs, rhs, span);
            self.types.unknown
        }
    }

    fn comparable(&self, lhs: TypeId, rhs: TypeId) -> bool {
        if lhs == rhs {
            return true;
        }
        if self.types.is_numeric(lhs) && self.types.is_numeric(rhs) {
            return true;
        }
        // `x == nil` on a nullable.
        let nil = self.types.nil;
        (lhs == nil && self.types.is_nullable(rhs)) || (rhs == nil && self.types.is_nullable(lhs))
    }

    fn invalid_operand(&mut self, op: &str, ty: TypeId, span: Span) -> TypeId {
        let shown = self.types.display(ty);
        self.handler.error(
            codes::T006_INVALID_OPERANDS,
            format!("invalid operand for `{op}`: `{shown}`"),
            span,
        );
        self.types.unknown
    }

    fn invalid_operands(&mut self, op: &str, lhs: TypeId, rhs: TypeId, span: Span) {
        let lhs = self.types.display(lhs);
        let rhs = self.types.display(rhs);
        self.handler.error(
            codes::T006_INVALID_OPERANDS,
            format!("invalid operands for `{op}`: `{lhs}` and `{rhs}`"),
            span,
        );
    }

    // ----- assignment ---------------------------------------------------

    fn check_assign(
        &mut self,
        target: &mut Expr,
        op: Option<BinaryOp>,
        value: &mut Expr,
        span: Span,
    ) -> TypeId {
        let target_ty = match &target.kind {
            ExprKind::Var(name) => {
                let name = *name;
                let info = self.scopes.lookup(name).cloned();
                let ty = match info {
                    Some(info) => {
                        if !info.mutable || info.kind == SymbolKind::Function {
                            self.handler.error(
                                codes::T014_ASSIGN_TO_IMMUTABLE,
                                format!("cannot assign to immutable binding `{name}`"),
                                target.span,
                            );
                        }
                        info.ty
                    }
                    None => {
                        self.handler.error(
                            codes::T002_UNDEFINED_VARIABLE,
                            format!("undefined variable `{name}`"),
                            target.span,
                        );
                        self.types.unknown
                    }
                };
                // Reassignment re-initializes a moved binding and
                // invalidates any null narrowing.
                if let Some(info) = self.scopes.lookup_mut(name) {
                    info.state = OwnState::Owned;
                }
                self.invalidate_narrowing(name);
                target.ty = Some(ty);
                ty
            }
            _ => self.check_expr(target),
        };

        let value_ty = self.check_expr(value);
        let effective = match op {
            Some(op) => self.check_binary(op, target_ty, value_ty, span),
            None => value_ty,
        };
        self.require_assignable(effective, target_ty, value.span);
        self.types.void
    }

    // ----- assignability ------------------------------------------------

    pub(crate) fn require_bool(&mut self, ty: TypeId, span: Span) {
        if ty != self.types.bool_ && !self.types.is_unknown(ty) {
            let shown = self.types.display(ty);
            self.handler.error(
                codes::T001_TYPE_MISMATCH,
                format!("condition must be `bool`, got `{shown}`"),
                span,
            );
        }
    }

    pub(crate) fn require_assignable(&mut self, from: TypeId, to: TypeId, span: Span) {
        if self.is_assignable(from, to) {
            return;
        }
        if self.types.contains_unknown(from) || self.types.contains_unknown(to) {
            return;
        }
        let from_shown = self.types.display(from);
        let to_shown = self.types.display(to);
        if self.types.is_nullable(from) && !self.types.is_nullable(to) {
            self.handler.error(
                codes::N001_NULLABLE_ASSIGNMENT,
                format!("cannot assign nullable `{from_shown}` to non-nullable `{to_shown}`"),
                span,
            );
        } else {
            self.handler.error(
                codes::T001_TYPE_MISMATCH,
                format!("expected `{to_shown}`, found `{from_shown}`"),
                span,
            );
        }
    }

    /// Directional assignability per the language rules: equal types,
    /// implicit `int -> float`, `T -> T?`, trait objects accept
    /// implementors; generic arguments are invariant.
    pub(crate) fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return true;
        }
        if self.types.contains_unknown(from) || self.types.contains_unknown(to) {
            return true;
        }
        match (self.types.kind(from).clone(), self.types.kind(to).clone()) {
            (TypeKind::Int, TypeKind::Float) => true,
            (TypeKind::NilLiteral, TypeKind::Nullable(_)) => true,
            (TypeKind::Nullable(from_inner), TypeKind::Nullable(to_inner)) => {
                self.is_assignable(from_inner, to_inner)
            }
            (_, TypeKind::Nullable(inner)) => self.is_assignable(from, inner),
            (TypeKind::Named { name, .. }, TypeKind::TraitObject { name: trait_name, .. }) => {
                self.registry.implements(name, trait_name)
            }
            (other, TypeKind::TraitObject { name: trait_name, .. }) => {
                match primitive_head(&other) {
                    Some(head) => self.registry.impl_of(trait_name, head).is_some(),
                    None => false,
                }
            }
            (
                TypeKind::Array {
                    elem: from_elem,
                    len: Some(_),
                },
                TypeKind::Array {
                    elem: to_elem,
                    len: None,
                },
            ) => from_elem == to_elem,
            (
                TypeKind::Chan {
                    elem: from_elem,
                    can_send,
                    can_recv,
                },
                TypeKind::Chan {
                    elem: to_elem,
                    can_send: need_send,
                    can_recv: need_recv,
                },
            ) => from_elem == to_elem && (can_send || !need_send) && (can_recv || !need_recv),
            _ => false,
        }
    }

    // ----- calls ----------------------------------------------------------

    fn check_call(
        &mut self,
        callee: &mut Expr,
        generic_args: &[TypeExpr],
        args: &mut Vec<Expr>,
        span: Span,
    ) -> TypeId {
        // Method call: receiver.method(args)
        let safe = matches!(callee.kind, ExprKind::SafeField { .. });
        if matches!(
            callee.kind,
            ExprKind::Field { .. } | ExprKind::SafeField { .. }
        ) {
            let (object_ty, object_span, name) = match &mut callee.kind {
                ExprKind::Field { object, name } | ExprKind::SafeField { object, name } => {
                    let name = *name;
                    let ty = self.check_expr(object);
                    (ty, object.span, name)
                }
                _ => unreachable!(),
            };
            let (ret, fn_ty) =
                self.check_method_call(object_ty, name, safe, args, object_span, span);
            callee.ty = Some(fn_ty);
            return ret;
        }

        // Possibly-generic named function call.
        if let ExprKind::Var(fname) = callee.kind {
            if let Some(generics) = self.fn_generics.get(&fname).cloned() {
                let ret = self.check_generic_call(fname, &generics, generic_args, args, span);
                callee.ty = Some(ret);
                return ret;
            }
        }

        let callee_ty = self.check_expr(callee);
        self.check_plain_call(callee_ty, args, span)
    }

    fn check_plain_call(&mut self, callee_ty: TypeId, args: &mut [Expr], span: Span) -> TypeId {
        match self.types.kind(callee_ty).clone() {
            TypeKind::Func { params, ret, .. } => {
                self.check_args(&params, &[], args, span);
                ret
            }
            TypeKind::Unknown => {
                for arg in args.iter_mut() {
                    self.check_expr(arg);
                }
                self.types.unknown
            }
            other => {
                for arg in args.iter_mut() {
                    self.check_expr(arg);
                }
                let id = self.types_id_of(&other);
                let shown = self.types.display(id);
                self.handler.error(
                    codes::T005_NOT_CALLABLE,
                    format!("`{shown}` is not callable"),
                    span,
                );
                self.types.unknown
            }
        }
    }

    /// Check argument expressions against parameter types and apply
    /// move-by-value semantics.
    fn check_args(&mut self, params: &[TypeId], moves: &[bool], args: &mut [Expr], span: Span) {
        if params.len() != args.len() {
            self.handler.error(
                codes::T004_ARITY_MISMATCH,
                format!("expected {} argument(s), got {}", params.len(), args.len()),
                span,
            );
        }
        for (i, arg) in args.iter_mut().enumerate() {
            let ty = self.check_expr(arg);
            if let Some(&param_ty) = params.get(i) {
                self.require_assignable(ty, param_ty, arg.span);
                if moves.get(i).copied().unwrap_or(false) {
                    self.move_out_of(arg);
                }
            }
        }
    }

    /// Mark the source of a move-by-value argument as moved.
    fn move_out_of(&mut self, arg: &Expr) {
        let name = match &arg.kind {
            ExprKind::Var(name) => *name,
            ExprKind::Move(inner) => match &inner.kind {
                ExprKind::Var(name) => *name,
                _ => return,
            },
            _ => return,
        };
        if let Some(info) = self.scopes.lookup_mut(name) {
            info.state = OwnState::Moved;
        }
    }

    fn check_generic_call(
        &mut self,
        fname: Symbol,
        generics: &[(Symbol, Vec<Symbol>)],
        generic_args: &[TypeExpr],
        args: &mut [Expr],
        span: Span,
    ) -> TypeId {
        let Some(info) = self.scopes.lookup(fname) else {
            self.handler.error(
                codes::T002_UNDEFINED_VARIABLE,
                format!("undefined function `{fname}`"),
                span,
            );
            return self.types.unknown;
        };
        let fn_ty = info.ty;
        let TypeKind::Func { params, ret, .. } = self.types.kind(fn_ty).clone() else {
            return self.types.unknown;
        };

        // Check arguments first; explicit type arguments win, otherwise
        // the argument types bind the parameters.
        let arg_tys: Vec<TypeId> = args.iter_mut().map(|a| self.check_expr(a)).collect();

        let mut map: FxHashMap<Symbol, TypeId> = FxHashMap::default();
        if !generic_args.is_empty() {
            if generic_args.len() != generics.len() {
                self.handler.error(
                    codes::T004_ARITY_MISMATCH,
                    format!(
                        "`{fname}` expects {} type argument(s), got {}",
                        generics.len(),
                        generic_args.len()
                    ),
                    span,
                );
                return self.types.unknown;
            }
            for ((param, _), te) in generics.iter().zip(generic_args) {
                let ty = self.resolve_type(te);
                map.insert(*param, ty);
            }
        } else {
            for (&param_ty, &arg_ty) in params.iter().zip(&arg_tys) {
                self.bind_type(param_ty, arg_ty, &mut map);
            }
            for (param, _) in generics {
                if !map.contains_key(param) {
                    self.handler.error(
                        codes::T030_TRAIT_BOUND_NOT_SATISFIED,
                        format!("cannot infer type argument `{param}` for `{fname}`; spell it out explicitly"),
                        span,
                    );
                    map.insert(*param, self.types.unknown);
                }
            }
        }

        let ordered_args: Vec<TypeId> = generics
            .iter()
            .map(|(p, _)| map.get(p).copied().unwrap_or(self.types.unknown))
            .collect();
        self.check_bounds(generics, &ordered_args, span);

        // Substitute and verify the call shape.
        let (subst_params, subst_ret) = match self.substitute_fn(&params, ret, &map, span) {
            Some(pair) => pair,
            None => return self.types.unknown,
        };
        if subst_params.len() != args.len() {
            self.handler.error(
                codes::T004_ARITY_MISMATCH,
                format!(
                    "expected {} argument(s), got {}",
                    subst_params.len(),
                    args.len()
                ),
                span,
            );
        }
        for ((&expected, arg), &actual) in subst_params.iter().zip(args.iter()).zip(&arg_tys) {
            self.require_assignable(actual, expected, arg.span);
        }

        // Every concrete use shares one cached instantiation.
        if !ordered_args.iter().any(|&a| self.types.is_unknown(a)) {
            let mangled = self.types.mangle(fname, &ordered_args);
            self.cache.insert(fname, ordered_args, mangled);
        }
        subst_ret
    }

    fn substitute_fn(
        &mut self,
        params: &[TypeId],
        ret: TypeId,
        map: &FxHashMap<Symbol, TypeId>,
        span: Span,
    ) -> Option<(Vec<TypeId>, TypeId)> {
        let mut out = Vec::with_capacity(params.len());
        for &p in params {
            match self.types.substitute(p, map, 0) {
                Ok(ty) => out.push(ty),
                Err(()) => {
                    self.generic_recursion_limit(span);
                    return None;
                }
            }
        }
        match self.types.substitute(ret, map, 0) {
            Ok(ret) => Some((out, ret)),
            Err(()) => {
                self.generic_recursion_limit(span);
                None
            }
        }
    }

    fn generic_recursion_limit(&mut self, span: Span) {
        self.handler.error(
            codes::T034_GENERIC_RECURSION_LIMIT,
            "generic instantiation exceeds the recursion limit",
            span,
        );
    }

    /// Structural first-occurrence binding of type parameters against
    /// an actual type.
    fn bind_type(&mut self, declared: TypeId, actual: TypeId, map: &mut FxHashMap<Symbol, TypeId>) {
        match (
            self.types.kind(declared).clone(),
            self.types.kind(actual).clone(),
        ) {
            (TypeKind::TypeParam { name, .. }, _) => {
                map.entry(name).or_insert(actual);
            }
            (TypeKind::Option(d), TypeKind::Option(a)) => self.bind_type(d, a, map),
            (TypeKind::Nullable(d), TypeKind::Nullable(a)) => self.bind_type(d, a, map),
            (TypeKind::Future(d), TypeKind::Future(a)) => self.bind_type(d, a, map),
            (TypeKind::Array { elem: d, .. }, TypeKind::Array { elem: a, .. }) => {
                self.bind_type(d, a, map)
            }
            (TypeKind::Chan { elem: d, .. }, TypeKind::Chan { elem: a, .. }) => {
                self.bind_type(d, a, map)
            }
            (
                TypeKind::Result { ok: d_ok, err: d_err },
                TypeKind::Result { ok: a_ok, err: a_err },
            ) => {
                self.bind_type(d_ok, a_ok, map);
                self.bind_type(d_err, a_err, map);
            }
            (
                TypeKind::Dict {
                    key: dk,
                    value: dv,
                },
                TypeKind::Dict {
                    key: ak,
                    value: av,
                },
            ) => {
                self.bind_type(dk, ak, map);
                self.bind_type(dv, av, map);
            }
            (
                TypeKind::Func {
                    params: dp,
                    ret: dr,
                    ..
                },
                TypeKind::Func {
                    params: ap,
                    ret: ar,
                    ..
                },
            ) => {
                for (&d, &a) in dp.iter().zip(&ap) {
                    self.bind_type(d, a, map);
                }
                self.bind_type(dr, ar, map);
            }
            (TypeKind::Named { name: dn, args: da }, TypeKind::Named { name: an, args: aa })
                if dn == an =>
            {
                for (&d, &a) in da.iter().zip(&aa) {
                    self.bind_type(d, a, map);
                }
            }
            (TypeKind::Tuple(de), TypeKind::Tuple(ae)) => {
                for (&d, &a) in de.iter().zip(&ae) {
                    self.bind_type(d, a, map);
                }
            }
            _ => {}
        }
    }

    // ----- members ------------------------------------------------------

    fn check_field(&mut self, object: &mut Expr, name: Symbol, safe: bool, span: Span) -> TypeId {
        let object_ty = self.check_expr(object);
        if self.types.is_unknown(object_ty) {
            return self.types.unknown;
        }
        let base = if self.types.is_nullable(object_ty) {
            if !safe {
                let shown = self.types.display(object_ty);
                self.handler.error(
                    codes::N003_NULLABLE_DEREFERENCE,
                    format!("cannot access member of nullable `{shown}` without `?.`, `?:`, or `!!`"),
                    span,
                );
                return self.types.unknown;
            }
            self.types.non_nullable(object_ty)
        } else {
            object_ty
        };

        let member = self.member_type(base, name);
        match member {
            Some(ty) => {
                if safe && self.types.is_nullable(object_ty) {
                    self.types.nullable(ty)
                } else {
                    ty
                }
            }
            None => {
                let shown = self.types.display(base);
                self.handler.error(
                    codes::M002_UNDEFINED_METHOD,
                    format!("`{shown}` has no member named `{name}`"),
                    span,
                );
                self.types.unknown
            }
        }
    }

    /// Field first, then a bound method as a function value.
    fn member_type(&mut self, base: TypeId, name: Symbol) -> Option<TypeId> {
        if let TypeKind::Named {
            name: class,
            args,
        } = self.types.kind(base).clone()
        {
            if let Some(field_ty) = self.registry.field_of(class, name) {
                return Some(self.instance_type(class, &args, field_ty));
            }
        }
        let sig = self.find_method(base, name, Span::DUMMY, false)?;
        let external_ret = if sig.is_async {
            self.types.intern(TypeKind::Future(sig.ret))
        } else {
            sig.ret
        };
        Some(self.types.intern(TypeKind::Func {
            params: sig.params,
            ret: external_ret,
            is_async: sig.is_async,
        }))
    }

    /// Substitute a generic class's parameters with the instance's
    /// arguments inside a member type.
    fn instance_type(&mut self, class: Symbol, args: &[TypeId], member: TypeId) -> TypeId {
        if args.is_empty() {
            return member;
        }
        let Some(info) = self.registry.classes.get(&class) else {
            return member;
        };
        let map: FxHashMap<Symbol, TypeId> = info
            .generics
            .iter()
            .map(|(name, _)| *name)
            .zip(args.iter().copied())
            .collect();
        self.types.substitute(member, &map, 0).unwrap_or(member)
    }

    /// Returns the call's result type and the resolved method's
    /// function type (for the callee node's annotation).
    fn check_method_call(
        &mut self,
        object_ty: TypeId,
        name: Symbol,
        safe: bool,
        args: &mut [Expr],
        object_span: Span,
        span: Span,
    ) -> (TypeId, TypeId) {
        if self.types.is_unknown(object_ty) {
            for arg in args.iter_mut() {
                self.check_expr(arg);
            }
            return (self.types.unknown, self.types.unknown);
        }
        let base = if self.types.is_nullable(object_ty) {
            if !safe {
                let shown = self.types.display(object_ty);
                self.handler.error(
                    codes::N002_NULLABLE_CALL,
                    format!("cannot call a method on nullable `{shown}` without `?.`"),
                    object_span,
                );
                for arg in args.iter_mut() {
                    self.check_expr(arg);
                }
                return (self.types.unknown, self.types.unknown);
            }
            self.types.non_nullable(object_ty)
        } else {
            object_ty
        };

        let Some(sig) = self.find_method(base, name, span, true) else {
            for arg in args.iter_mut() {
                self.check_expr(arg);
            }
            return (self.types.unknown, self.types.unknown);
        };
        self.check_args(&sig.params, &sig.moves, args, span);
        let ret = if sig.is_async {
            self.types.intern(TypeKind::Future(sig.ret))
        } else {
            sig.ret
        };
        let fn_ty = self.types.intern(TypeKind::Func {
            params: sig.params,
            ret,
            is_async: sig.is_async,
        });
        let result = if safe && self.types.is_nullable(object_ty) && ret != self.types.void {
            self.types.nullable(ret)
        } else {
            ret
        };
        (result, fn_ty)
    }

    /// Method resolution: inherent methods win, then trait methods via
    /// impls (ambiguity is an error), then extension functions in
    /// registration order. Reports M001/M002 when `report` is set.
    fn find_method(
        &mut self,
        base: TypeId,
        name: Symbol,
        span: Span,
        report: bool,
    ) -> Option<FuncSig> {
        // 1. Inherent methods on the receiver's class.
        if let TypeKind::Named { name: class, args } = self.types.kind(base).clone() {
            if let Some(sig) = self.registry.inherent_method(class, name).cloned() {
                return Some(self.instance_sig(class, &args, sig));
            }
        }

        // 2. Trait methods visible via impls (or directly on a trait
        // object / bounded type parameter).
        let head = self.head_symbol(base);
        let mut candidates: Vec<FuncSig> = Vec::new();
        match self.types.kind(base).clone() {
            TypeKind::TraitObject { name: trait_name, .. } => {
                if let Some(trait_info) = self.registry.traits.get(&trait_name) {
                    if let Some(m) = trait_info.methods.get(&name) {
                        candidates.push(m.sig.clone());
                    }
                }
            }
            TypeKind::TypeParam { bounds, .. } => {
                for bound in bounds {
                    if let Some(trait_info) = self.registry.traits.get(&bound) {
                        if let Some(m) = trait_info.methods.get(&name) {
                            candidates.push(m.sig.clone());
                        }
                    }
                }
            }
            _ => {
                if let Some(head) = head {
                    let impls: Vec<(Symbol, Option<FuncSig>)> = self
                        .registry
                        .impls
                        .iter()
                        .filter(|im| im.target == head)
                        .map(|im| (im.trait_name, im.methods.get(&name).cloned()))
                        .collect();
                    for (trait_name, direct) in impls {
                        if let Some(sig) = direct {
                            candidates.push(sig);
                        } else if let Some(trait_info) = self.registry.traits.get(&trait_name) {
                            if let Some(m) = trait_info.methods.get(&name) {
                                if m.has_default {
                                    candidates.push(m.sig.clone());
                                }
                            }
                        }
                    }
                }
            }
        }
        match candidates.len() {
            0 => {}
            1 => return candidates.pop(),
            _ => {
                if report {
                    let shown = self.types.display(base);
                    self.handler.error(
                        codes::M001_AMBIGUOUS_METHOD,
                        format!("multiple traits provide `{name}` for `{shown}`"),
                        span,
                    );
                }
                return None;
            }
        }

        // 3. Extension functions, first registered wins.
        if let Some(head) = head {
            if let Some(entries) = self.registry.extensions.get(&head) {
                if let Some((_, sig)) = entries.iter().find(|(n, _)| *n == name) {
                    return Some(sig.clone());
                }
            }
        }

        if report {
            let shown = self.types.display(base);
            self.handler.error(
                codes::M002_UNDEFINED_METHOD,
                format!("no method `{name}` on `{shown}`"),
                span,
            );
        }
        None
    }

    fn instance_sig(&mut self, class: Symbol, args: &[TypeId], sig: FuncSig) -> FuncSig {
        if args.is_empty() {
            return sig;
        }
        let Some(info) = self.registry.classes.get(&class) else {
            return sig;
        };
        let map: FxHashMap<Symbol, TypeId> = info
            .generics
            .iter()
            .map(|(name, _)| *name)
            .zip(args.iter().copied())
            .collect();
        let params = sig
            .params
            .iter()
            .map(|&p| self.types.substitute(p, &map, 0).unwrap_or(p))
            .collect();
        let ret = self.types.substitute(sig.ret, &map, 0).unwrap_or(sig.ret);
        FuncSig {
            params,
            ret,
            ..sig
        }
    }

    fn head_symbol(&self, ty: TypeId) -> Option<Symbol> {
        match self.types.kind(ty) {
            TypeKind::Named { name, .. } | TypeKind::TraitObject { name, .. } => Some(*name),
            other => primitive_head(other),
        }
    }

    fn types_id_of(&mut self, kind: &TypeKind) -> TypeId {
        self.types.intern(kind.clone())
    }

    // ----- null-safety flow ---------------------------------------------

    /// Recognize `x != nil` / `x == nil` conditions. Returns the
    /// variable and whether the *then* branch is the non-nil one.
    pub(crate) fn narrowing_of(&self, cond: &Expr) -> Option<(Symbol, bool)> {
        match &cond.kind {
            ExprKind::Group(inner) => self.narrowing_of(inner),
            ExprKind::Binary { op, lhs, rhs } => {
                let var = match (&lhs.kind, &rhs.kind) {
                    (ExprKind::Var(name), ExprKind::Nil) => *name,
                    (ExprKind::Nil, ExprKind::Var(name)) => *name,
                    _ => return None,
                };
                match op {
                    BinaryOp::Ne => Some((var, true)),
                    BinaryOp::Eq => Some((var, false)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Run `f` with `name` narrowed to its non-nullable type, when that
    /// narrowing applies.
    pub(crate) fn with_narrowing<R>(
        &mut self,
        name: Option<Symbol>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let overlay = name.and_then(|n| {
            let info = self.scopes.lookup(n)?;
            if self.types.is_nullable(info.ty) {
                let narrowed = self.types.non_nullable(info.ty);
                let mut map = FxHashMap::default();
                map.insert(n, narrowed);
                Some(map)
            } else {
                None
            }
        });
        match overlay {
            Some(map) => {
                self.narrowed.push(map);
                let result = f(self);
                self.narrowed.pop();
                result
            }
            None => f(self),
        }
    }

    fn narrowed_type_of(&self, name: Symbol) -> Option<TypeId> {
        self.narrowed
            .iter()
            .rev()
            .find_map(|overlay| overlay.get(&name).copied())
    }

    /// Any assignment to a variable invalidates its narrowing.
    pub(crate) fn invalidate_narrowing(&mut self, name: Symbol) {
        for overlay in &mut self.narrowed {
            overlay.remove(&name);
        }
    }

    // ----- ownership ----------------------------------------------------

    fn check_move(&mut self, inner: &mut Expr, span: Span) -> TypeId {
        let ExprKind::Var(name) = inner.kind else {
            self.handler.error(
                codes::T006_INVALID_OPERANDS,
                "`move` needs a named binding",
                span,
            );
            return self.check_expr(inner);
        };
        let Some((info, captured)) = self.scopes.lookup_with_capture(name) else {
            self.handler.error(
                codes::T002_UNDEFINED_VARIABLE,
                format!("undefined variable `{name}`"),
                span,
            );
            return self.types.unknown;
        };
        let ty = info.ty;
        let state = info.state;
        inner.ty = Some(ty);
        if captured {
            self.handler.error(
                codes::O003_MOVE_OF_CAPTURED,
                format!("cannot move `{name}`: it is captured from an enclosing function"),
                span,
            );
            return ty;
        }
        if state == OwnState::Moved {
            self.handler.error(
                codes::O002_USE_AFTER_MOVE,
                format!("use of `{name}` after it was moved"),
                span,
            );
            return ty;
        }
        if let Some(info) = self.scopes.lookup_mut(name) {
            info.state = OwnState::Moved;
        }
        ty
    }

    // ----- lambdas, async, channels -------------------------------------

    fn check_lambda(
        &mut self,
        params: &[tocin_par::ast::Param],
        ret: Option<&TypeExpr>,
        body: &mut Expr,
    ) -> TypeId {
        // Captures are taken by value when the lambda is built; a
        // captured binding that is already moved is reported at its use
        // site inside the body.
        self.with_scope(ScopeKind::Lambda, |this| {
            let mut param_tys = Vec::with_capacity(params.len());
            for param in params {
                let ty = this.resolve_type(&param.ty);
                param_tys.push(ty);
                let depth = this.scopes.depth();
                let mut info = SymbolInfo::variable(param.name, ty, true, depth, param.span);
                info.kind = SymbolKind::Parameter;
                this.scopes.define(info);
            }
            let declared_ret = ret.map(|t| this.resolve_type(t));
            let body_ty = this.check_expr(body);
            let final_ret = match declared_ret {
                Some(declared) => {
                    this.require_assignable(body_ty, declared, body.span);
                    declared
                }
                None => body_ty,
            };
            this.types.intern(TypeKind::Func {
                params: param_tys,
                ret: final_ret,
                is_async: false,
            })
        })
    }

    fn check_await(&mut self, inner_ty: TypeId, inner_span: Span, span: Span) -> TypeId {
        if !self.toggles.allow_async {
            self.handler.error(
                codes::G001_FEATURE_DISABLED,
                "`await` is disabled (--no-async)",
                span,
            );
        }
        if !self.fn_stack.last().is_some_and(|c| c.is_async) {
            self.handler.error(
                codes::T009_AWAIT_OUTSIDE_ASYNC,
                "`await` is only legal inside an async function",
                span,
            );
        }
        match self.types.kind(inner_ty).clone() {
            TypeKind::Future(inner) => inner,
            TypeKind::Unknown => self.types.unknown,
            other => {
                let id = self.types_id_of(&other);
                let shown = self.types.display(id);
                self.handler.error(
                    codes::T001_TYPE_MISMATCH,
                    format!("`await` needs a `Future`, got `{shown}`"),
                    inner_span,
                );
                self.types.unknown
            }
        }
    }

    fn check_chan_send(
        &mut self,
        chan_ty: TypeId,
        value_ty: TypeId,
        value_span: Span,
        span: Span,
    ) -> TypeId {
        self.require_concurrency(span);
        match self.types.kind(chan_ty).clone() {
            TypeKind::Chan {
                elem, can_send, ..
            } => {
                if !can_send {
                    self.handler.error(
                        codes::T011_CHANNEL_CAPABILITY,
                        "this channel does not permit sending",
                        span,
                    );
                }
                self.require_assignable(value_ty, elem, value_span);
            }
            TypeKind::Unknown => {}
            other => {
                let id = self.types_id_of(&other);
                let shown = self.types.display(id);
                self.handler.error(
                    codes::T011_CHANNEL_CAPABILITY,
                    format!("send needs a channel, got `{shown}`"),
                    span,
                );
            }
        }
        self.types.void
    }

    fn check_chan_recv(&mut self, chan_ty: TypeId, span: Span) -> TypeId {
        self.require_concurrency(span);
        match self.types.kind(chan_ty).clone() {
            TypeKind::Chan {
                elem, can_recv, ..
            } => {
                if !can_recv {
                    self.handler.error(
                        codes::T011_CHANNEL_CAPABILITY,
                        "this channel does not permit receiving",
                        span,
                    );
                }
                elem
            }
            TypeKind::Unknown => self.types.unknown,
            other => {
                let id = self.types_id_of(&other);
                let shown = self.types.display(id);
                self.handler.error(
                    codes::T011_CHANNEL_CAPABILITY,
                    format!("receive needs a channel, got `{shown}`"),
                    span,
                );
                self.types.unknown
            }
        }
    }

    pub(crate) fn require_concurrency(&mut self, span: Span) {
        if !self.toggles.allow_concurrency {
            self.handler.error(
                codes::G001_FEATURE_DISABLED,
                "channel and goroutine constructs are disabled (--no-concurrency)",
                span,
            );
        }
    }

    fn check_new(&mut self, class: &TypeExpr, args: &mut [Expr], span: Span) -> TypeId {
        let resolved = self.resolve_type(class);
        let TypeKind::Named {
            name,
            args: type_args,
        } = self.types.kind(resolved).clone()
        else {
            for arg in args.iter_mut() {
                self.check_expr(arg);
            }
            return self.types.unknown;
        };

        // Prefer an explicit `init` method; otherwise arguments
        // initialize the fields in declaration order.
        let init = Symbol::intern("init");
        if let Some(sig) = self.registry.inherent_method(name, init).cloned() {
            let sig = self.instance_sig(name, &type_args, sig);
            self.check_args(&sig.params, &sig.moves, args, span);
            return resolved;
        }

        let field_tys: Vec<TypeId> = match self.registry.classes.get(&name) {
            Some(info) => info.fields.values().copied().collect(),
            None => Vec::new(),
        };
        let field_tys: Vec<TypeId> = field_tys
            .into_iter()
            .map(|t| self.instance_type(name, &type_args, t))
            .collect();
        self.check_args(&field_tys, &[], args, span);
        resolved
    }

    fn check_index(
        &mut self,
        object_ty: TypeId,
        index_ty: TypeId,
        index_span: Span,
        span: Span,
    ) -> TypeId {
        if self.types.is_nullable(object_ty) {
            let shown = self.types.display(object_ty);
            self.handler.error(
                codes::N004_NULLABLE_INDEX,
                format!("cannot index nullable `{shown}` without a nil check"),
                span,
            );
            return self.types.unknown;
        }
        match self.types.kind(object_ty).clone() {
            TypeKind::Array { elem, .. } => {
                self.require_assignable(index_ty, self.types.int, index_span);
                elem
            }
            TypeKind::Dict { key, value } => {
                self.require_assignable(index_ty, key, index_span);
                value
            }
            TypeKind::Str => {
                self.require_assignable(index_ty, self.types.int, index_span);
                self.types.char_
            }
            TypeKind::Unknown => self.types.unknown,
            other => {
                let id = self.types_id_of(&other);
                let shown = self.types.display(id);
                self.handler.error(
                    codes::T012_NOT_INDEXABLE,
                    format!("`{shown}` cannot be indexed"),
                    span,
                );
                self.types.unknown
            }
        }
    }

    // ----- match, go, select --------------------------------------------

    pub(crate) fn check_match(
        &mut self,
        scrutinee: &mut Expr,
        cases: &mut [MatchCase],
        span: Span,
    ) {
        let scrut_ty = self.check_expr(scrutinee);
        for case in cases.iter_mut() {
            self.with_scope(ScopeKind::Block, |this| {
                this.bind_pattern(&case.pattern, scrut_ty);
                for stmt in &mut case.body {
                    this.check_stmt(stmt);
                }
            });
        }
        self.check_exhaustiveness(scrut_ty, cases, span);
    }

    fn bind_pattern(&mut self, pattern: &Pattern, scrut_ty: TypeId) {
        match &pattern.kind {
            PatternKind::Wildcard => {}
            PatternKind::Binding(name) => {
                let depth = self.scopes.depth();
                self.scopes.define(SymbolInfo::variable(
                    *name,
                    scrut_ty,
                    false,
                    depth,
                    pattern.span,
                ));
            }
            PatternKind::Literal(lit) => {
                let lit_ty = match lit {
                    LiteralPat::Int(_) => self.types.int,
                    LiteralPat::Float(_) => self.types.float,
                    LiteralPat::Str(_) => self.types.string,
                    LiteralPat::Char(_) => self.types.char_,
                    LiteralPat::Bool(_) => self.types.bool_,
                    LiteralPat::Nil => self.types.nil,
                };
                self.require_assignable(lit_ty, scrut_ty, pattern.span);
            }
            PatternKind::Constructor { name, args } => {
                let payloads: Vec<TypeId> = match (name.as_str(), self.types.kind(scrut_ty).clone())
                {
                    ("Some", TypeKind::Option(inner)) => vec![inner],
                    ("None", TypeKind::Option(_)) => vec![],
                    ("Ok", TypeKind::Result { ok, .. }) => vec![ok],
                    ("Err", TypeKind::Result { err, .. }) => vec![err],
                    (_, TypeKind::Unknown) => vec![self.types.unknown; args.len()],
                    _ => {
                        let shown = self.types.display(scrut_ty);
                        self.handler.error(
                            codes::T001_TYPE_MISMATCH,
                            format!("pattern `{name}(…)` does not match `{shown}`"),
                            pattern.span,
                        );
                        vec![self.types.unknown; args.len()]
                    }
                };
                if args.len() != payloads.len() {
                    self.handler.error(
                        codes::T004_ARITY_MISMATCH,
                        format!(
                            "pattern `{name}` expects {} argument(s), got {}",
                            payloads.len(),
                            args.len()
                        ),
                        pattern.span,
                    );
                }
                for (arg, &payload) in args.iter().zip(&payloads) {
                    self.bind_pattern(arg, payload);
                }
            }
        }
    }

    /// Option must cover Some and None; Result must cover Ok and Err; a
    /// wildcard (or bare binding) covers everything.
    fn check_exhaustiveness(&mut self, scrut_ty: TypeId, cases: &[MatchCase], span: Span) {
        let catch_all = cases.iter().any(|c| {
            matches!(
                c.pattern.kind,
                PatternKind::Wildcard | PatternKind::Binding(_)
            )
        });
        if catch_all {
            return;
        }
        let has = |ctor: &str| {
            cases.iter().any(|c| {
                matches!(&c.pattern.kind, PatternKind::Constructor { name, .. } if name.as_str() == ctor)
            })
        };
        let missing: Vec<&str> = match self.types.kind(scrut_ty) {
            TypeKind::Option(_) => ["Some", "None"]
                .into_iter()
                .filter(|c| !has(c))
                .collect(),
            TypeKind::Result { .. } => {
                ["Ok", "Err"].into_iter().filter(|c| !has(c)).collect()
            }
            _ => return,
        };
        if !missing.is_empty() {
            let shown = self.types.display(scrut_ty);
            self.handler.error(
                codes::P001_NON_EXHAUSTIVE_PATTERNS,
                format!(
                    "match on `{shown}` does not cover {}",
                    missing
                        .iter()
                        .map(|m| format!("`{m}`"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                span,
            );
        }
    }

    pub(crate) fn check_go(&mut self, expr: &mut Expr, span: Span) {
        self.require_concurrency(span);
        self.check_expr(expr);
        if !matches!(expr.kind, ExprKind::Call { .. }) {
            self.handler.error(
                codes::T010_INVALID_GO_TARGET,
                "`go` must spawn a function call",
                span,
            );
        }
    }

    pub(crate) fn check_select(
        &mut self,
        cases: &mut [SelectCase],
        default: &mut Option<Vec<Stmt>>,
        span: Span,
    ) {
        self.require_concurrency(span);
        for case in cases.iter_mut() {
            match &mut case.op {
                SelectOp::Recv { chan, binding } => {
                    let chan_ty = self.check_expr(chan);
                    let chan_span = chan.span;
                    let elem = self.check_chan_recv(chan_ty, chan_span);
                    let binding = *binding;
                    self.with_scope(ScopeKind::Block, |this| {
                        if let Some(name) = binding {
                            let depth = this.scopes.depth();
                            this.scopes.define(SymbolInfo::variable(
                                name, elem, false, depth, case.span,
                            ));
                        }
                        for stmt in &mut case.body {
                            this.check_stmt(stmt);
                        }
                    });
                }
                SelectOp::Send { chan, value } => {
                    let chan_ty = self.check_expr(chan);
                    let value_ty = self.check_expr(value);
                    let value_span = value.span;
                    let case_span = case.span;
                    self.check_chan_send(chan_ty, value_ty, value_span, case_span);
                    self.with_scope(ScopeKind::Block, |this| {
                        for stmt in &mut case.body {
                            this.check_stmt(stmt);
                        }
                    });
                }
            }
        }
        if let Some(default) = default {
            self.check_block(default);
        }
    }
}
