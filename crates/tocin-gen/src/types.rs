//! Mapping from Tocin types to LLVM IR types.
//!
//! | Source type          | Emitted representation                  |
//! |----------------------|-----------------------------------------|
//! | bool                 | `i1`                                    |
//! | int                  | `i64`                                   |
//! | float                | `double`                                |
//! | char                 | `i32`                                   |
//! | string               | pointer to length-prefixed UTF-8 bytes  |
//! | `[T]` / list         | `{ i64 len, ptr data }`                 |
//! | `{K: V}`             | `{ i64 size, ptr keys, ptr values }`    |
//! | class `C`            | pointer to named struct (vtable first)  |
//! | function             | function pointer                        |
//! | `T?`                 | `{ i1 present, T }`                     |
//! | `Option<T>`          | `{ i32 tag, T }`                        |
//! | `Result<T, E>`       | `{ i32 tag, T, E }`                     |
//! | trait object         | `{ ptr data, ptr vtable }`              |
//! | `Chan<T>` / `Future` | opaque pointer handed to the runtime    |

use std::cell::RefCell;

use inkwell::context::Context;
use inkwell::types::{BasicType, BasicTypeEnum, StructType};
use inkwell::AddressSpace;
use rustc_hash::FxHashMap;

use tocin_sem::{Registries, TypeKind, TypeTable};
use tocin_util::{Symbol, TypeId};

pub struct TypeMapper<'ctx> {
    pub context: &'ctx Context,
    /// Named struct bodies per class instantiation, keyed by mangled
    /// name, created once and reused.
    class_structs: RefCell<FxHashMap<String, StructType<'ctx>>>,
}

impl<'ctx> TypeMapper<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            class_structs: RefCell::new(FxHashMap::default()),
        }
    }

    /// Map an interned type to its LLVM representation. `void` has no
    /// basic type; callers handle it through [`TypeMapper::is_void`].
    pub fn map(
        &self,
        types: &mut TypeTable,
        registry: &Registries,
        id: TypeId,
    ) -> BasicTypeEnum<'ctx> {
        let ptr = self.context.ptr_type(AddressSpace::default());
        match types.kind(id).clone() {
            TypeKind::Bool => self.context.bool_type().into(),
            TypeKind::Int => self.context.i64_type().into(),
            TypeKind::Float => self.context.f64_type().into(),
            TypeKind::Char => self.context.i32_type().into(),
            TypeKind::Str => ptr.into(),
            // Objects are heap pointers to their named struct.
            TypeKind::Named { .. } => ptr.into(),
            TypeKind::TraitObject { .. } => self
                .context
                .struct_type(&[ptr.into(), ptr.into()], false)
                .into(),
            TypeKind::Func { .. } => ptr.into(),
            TypeKind::Tuple(elems) => {
                let mapped: Vec<BasicTypeEnum> = elems
                    .iter()
                    .map(|&e| self.map(types, registry, e))
                    .collect();
                self.context.struct_type(&mapped, false).into()
            }
            TypeKind::Array { .. } => self
                .context
                .struct_type(&[self.context.i64_type().into(), ptr.into()], false)
                .into(),
            TypeKind::Dict { .. } => self
                .context
                .struct_type(
                    &[self.context.i64_type().into(), ptr.into(), ptr.into()],
                    false,
                )
                .into(),
            TypeKind::Pointer(_) | TypeKind::Ref { .. } => ptr.into(),
            TypeKind::Nullable(inner) => {
                let payload = self.map(types, registry, inner);
                self.context
                    .struct_type(&[self.context.bool_type().into(), payload], false)
                    .into()
            }
            TypeKind::Option(inner) => {
                let payload = self.map(types, registry, inner);
                self.context
                    .struct_type(&[self.context.i32_type().into(), payload], false)
                    .into()
            }
            TypeKind::Result { ok, err } => {
                let ok = self.map(types, registry, ok);
                let err = self.map(types, registry, err);
                self.context
                    .struct_type(&[self.context.i32_type().into(), ok, err], false)
                    .into()
            }
            TypeKind::Chan { .. } | TypeKind::Future(_) => ptr.into(),
            // Degraded mode (`unknown`), the nil literal before
            // coercion, and unsubstituted parameters all land on i64 so
            // the module still verifies.
            TypeKind::Unknown | TypeKind::NilLiteral | TypeKind::TypeParam { .. } => {
                self.context.i64_type().into()
            }
            TypeKind::Void => self.context.bool_type().into(),
        }
    }

    pub fn is_void(&self, types: &TypeTable, id: TypeId) -> bool {
        matches!(types.kind(id), TypeKind::Void)
    }

    /// The named struct for a class instantiation: a vtable pointer
    /// followed by the fields in declaration order. Field `i` of the
    /// source class is struct member `i + 1`.
    pub fn class_struct(
        &self,
        types: &mut TypeTable,
        registry: &Registries,
        class: Symbol,
        args: &[TypeId],
    ) -> StructType<'ctx> {
        let key = types.mangle(class, args);
        if let Some(&existing) = self.class_structs.borrow().get(&key) {
            return existing;
        }
        let named = self.context.opaque_struct_type(&format!("class.{key}"));
        // Insert before building the body so recursive classes
        // terminate (they refer to themselves through pointers).
        self.class_structs.borrow_mut().insert(key, named);

        let ptr = self.context.ptr_type(AddressSpace::default());
        let mut members: Vec<BasicTypeEnum> = vec![ptr.into()];
        let map: FxHashMap<Symbol, TypeId> = registry
            .classes
            .get(&class)
            .map(|info| {
                info.generics
                    .iter()
                    .map(|(name, _)| *name)
                    .zip(args.iter().copied())
                    .collect()
            })
            .unwrap_or_default();
        for (_, field) in flat_fields(registry, class) {
            let field = types.substitute(field, &map, 0).unwrap_or(field);
            members.push(self.map(types, registry, field));
        }
        named.set_body(&members, false);
        named
    }

    /// The flattened member index of a named field (vtable slot 0, then
    /// superclass fields root-first, then own fields).
    pub fn field_index(registry: &Registries, class: Symbol, field: Symbol) -> Option<u32> {
        flat_fields(registry, class)
            .iter()
            .position(|(name, _)| *name == field)
            .map(|i| i as u32 + 1)
    }

    /// Size in bytes of a mapped type, as an i64 constant.
    pub fn size_of(
        &self,
        types: &mut TypeTable,
        registry: &Registries,
        id: TypeId,
    ) -> inkwell::values::IntValue<'ctx> {
        self.map(types, registry, id)
            .size_of()
            .unwrap_or_else(|| self.context.i64_type().const_int(8, false))
    }
}

/// Fields of a class in object layout order: superclass chain
/// root-first, then the class's own fields.
pub fn flat_fields(registry: &Registries, class: Symbol) -> Vec<(Symbol, TypeId)> {
    let mut chain = Vec::new();
    let mut current = Some(class);
    while let Some(name) = current {
        match registry.classes.get(&name) {
            Some(info) => {
                chain.push(info);
                current = info.superclass;
            }
            None => break,
        }
    }
    let mut fields = Vec::new();
    for info in chain.iter().rev() {
        for (&name, &ty) in &info.fields {
            fields.push((name, ty));
        }
    }
    fields
}
