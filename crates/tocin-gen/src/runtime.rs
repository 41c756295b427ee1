//! Runtime ABI declarations.
//!
//! The compiler never implements channels, goroutines, futures, or
//! allocation; it only emits calls to these externally-linked symbols
//! with the C calling convention. The runtime library provides them.

use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

/// Handles to every runtime function the lowerer may call.
pub struct Runtime<'ctx> {
    pub alloc: FunctionValue<'ctx>,
    pub free: FunctionValue<'ctx>,
    pub go_launch: FunctionValue<'ctx>,
    pub chan_send: FunctionValue<'ctx>,
    pub chan_recv: FunctionValue<'ctx>,
    pub chan_select: FunctionValue<'ctx>,
    pub promise_create: FunctionValue<'ctx>,
    pub promise_get_future: FunctionValue<'ctx>,
    pub promise_set: FunctionValue<'ctx>,
    pub future_get: FunctionValue<'ctx>,
    pub int_to_string: FunctionValue<'ctx>,
    pub float_to_string: FunctionValue<'ctx>,
    pub bool_to_string: FunctionValue<'ctx>,
    pub char_to_string: FunctionValue<'ctx>,
    pub string_concat: FunctionValue<'ctx>,
    pub string_eq: FunctionValue<'ctx>,
    pub string_cmp: FunctionValue<'ctx>,
    pub dict_get: FunctionValue<'ctx>,
    pub dict_set: FunctionValue<'ctx>,
    pub iter_next: FunctionValue<'ctx>,
    pub print: FunctionValue<'ctx>,
    pub println: FunctionValue<'ctx>,
}

impl<'ctx> Runtime<'ctx> {
    /// Declare the whole ABI in `module`.
    pub fn declare(context: &'ctx Context, module: &Module<'ctx>) -> Self {
        let ptr = context.ptr_type(AddressSpace::default());
        let i64_t = context.i64_type();
        let i32_t = context.i32_type();
        let i1_t = context.bool_type();
        let f64_t = context.f64_type();
        let void = context.void_type();

        let declare = |name: &str, ty: inkwell::types::FunctionType<'ctx>| {
            module.add_function(name, ty, Some(Linkage::External))
        };

        Self {
            alloc: declare("__tocin_alloc", ptr.fn_type(&[i64_t.into()], false)),
            free: declare("__tocin_free", void.fn_type(&[ptr.into()], false)),
            go_launch: declare(
                "__tocin_go_launch",
                void.fn_type(&[ptr.into(), ptr.into()], false),
            ),
            chan_send: declare(
                "__tocin_chan_send",
                void.fn_type(&[ptr.into(), ptr.into()], false),
            ),
            chan_recv: declare("__tocin_chan_recv", ptr.fn_type(&[ptr.into()], false)),
            chan_select: declare(
                "__tocin_chan_select",
                i32_t.fn_type(&[i32_t.into(), ptr.into()], false),
            ),
            promise_create: declare("Promise_create", ptr.fn_type(&[], false)),
            promise_get_future: declare("Promise_getFuture", ptr.fn_type(&[ptr.into()], false)),
            promise_set: declare(
                "Promise_set",
                void.fn_type(&[ptr.into(), ptr.into()], false),
            ),
            future_get: declare("Future_get", ptr.fn_type(&[ptr.into()], false)),
            int_to_string: declare("int_to_string", ptr.fn_type(&[i64_t.into()], false)),
            float_to_string: declare("float_to_string", ptr.fn_type(&[f64_t.into()], false)),
            bool_to_string: declare("bool_to_string", ptr.fn_type(&[i1_t.into()], false)),
            char_to_string: declare("char_to_string", ptr.fn_type(&[i32_t.into()], false)),
            string_concat: declare(
                "string_concat",
                ptr.fn_type(&[ptr.into(), ptr.into()], false),
            ),
            string_eq: declare("string_eq", i1_t.fn_type(&[ptr.into(), ptr.into()], false)),
            string_cmp: declare(
                "string_cmp",
                i32_t.fn_type(&[ptr.into(), ptr.into()], false),
            ),
            dict_get: declare(
                "__tocin_dict_get",
                ptr.fn_type(&[ptr.into(), ptr.into()], false),
            ),
            dict_set: declare(
                "__tocin_dict_set",
                void.fn_type(&[ptr.into(), ptr.into(), ptr.into()], false),
            ),
            iter_next: declare("__tocin_iter_next", ptr.fn_type(&[ptr.into()], false)),
            print: declare("print", void.fn_type(&[ptr.into()], false)),
            println: declare("println", void.fn_type(&[ptr.into()], false)),
        }
    }
}
