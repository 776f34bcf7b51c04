//! Runtime intrinsics callable from generated code.
//!
//! Operations that are too heavy to inline (growth, bulk copies,
//! indirect-call checks) compile to calls against this table. Every
//! intrinsic uses the context-args ABI: it receives the caller's context
//! runtime-data pointer, reads its typed arguments from the argument
//! buffer and writes results back to it. The compartment is recovered
//! from the context pointer with the documented mask, and failures
//! unwind to the invoke anchor as typed traps.

use crate::{
    compartment::CompartmentInner,
    func::unpack_func_bits,
    ids::{MemoryId, TableId},
    runtime_data::RuntimeDataRegion,
    sys,
    table::TableElement,
    trap::{Trap, TrapKind},
};
use cove_core::UntypedValue;

/// Recovers the compartment from a context runtime-data pointer.
///
/// # Safety
///
/// `ctx` must point into a live compartment's runtime-data region; the
/// compartment outlives every guest invocation into it, which the invoke
/// path guarantees by holding the context (and thereby the compartment)
/// across the call.
unsafe fn compartment<'a>(ctx: *mut u8) -> &'a CompartmentInner {
    let owner = RuntimeDataRegion::compartment_from_context(ctx);
    &*(owner as *const CompartmentInner)
}

unsafe fn arg(args: *mut UntypedValue, index: usize) -> UntypedValue {
    args.add(index).read()
}

unsafe fn ret(args: *mut UntypedValue, value: UntypedValue) {
    args.write(value);
}

/// `memory.grow(memory_id, delta) -> previous size or -1`.
unsafe extern "C" fn intrinsic_memory_grow(ctx: *mut u8, args: *mut UntypedValue) -> *mut u8 {
    let compartment = compartment(ctx);
    let memory_id = MemoryId::from_u32(arg(args, 0).to_bits64() as u32);
    let delta = arg(args, 1).to_bits64() as u32;
    let memory = compartment
        .state
        .lock()
        .memories
        .get(memory_id)
        .cloned();
    let result = match memory {
        Some(memory) => match memory.grow(delta) {
            Ok(previous) => previous as i32,
            Err(_) => -1,
        },
        None => -1,
    };
    ret(args, UntypedValue::from(result));
    ctx
}

/// `memory.size(memory_id) -> pages`.
unsafe extern "C" fn intrinsic_memory_size(ctx: *mut u8, args: *mut UntypedValue) -> *mut u8 {
    let compartment = compartment(ctx);
    let memory_id = MemoryId::from_u32(arg(args, 0).to_bits64() as u32);
    let size = compartment
        .state
        .lock()
        .memories
        .get(memory_id)
        .map(|memory| memory.size())
        .unwrap_or(0);
    ret(args, UntypedValue::from(size));
    ctx
}

/// `table.grow(table_id, init, delta) -> previous size or -1`.
unsafe extern "C" fn intrinsic_table_grow(ctx: *mut u8, args: *mut UntypedValue) -> *mut u8 {
    let compartment = compartment(ctx);
    let table_id = TableId::from_u32(arg(args, 0).to_bits64() as u32);
    let init = arg(args, 1).to_ref();
    let delta = arg(args, 2).to_bits64() as u32;
    let table = compartment.state.lock().tables.get(table_id).cloned();
    let result = match table {
        Some(table) => match table.grow(delta, TableElement::Ref(init)) {
            Ok(previous) => previous as i32,
            Err(_) => -1,
        },
        None => -1,
    };
    ret(args, UntypedValue::from(result));
    ctx
}

/// `table.size(table_id) -> elements`.
unsafe extern "C" fn intrinsic_table_size(ctx: *mut u8, args: *mut UntypedValue) -> *mut u8 {
    let compartment = compartment(ctx);
    let table_id = TableId::from_u32(arg(args, 0).to_bits64() as u32);
    let size = compartment
        .state
        .lock()
        .tables
        .get(table_id)
        .map(|table| table.size())
        .unwrap_or(0);
    ret(args, UntypedValue::from(size));
    ctx
}

/// `callee.check(table_id, index, expected_type_key) -> entry address`.
///
/// The slow half of `call_indirect`: loads the slot, rejects the
/// sentinel and null, compares the callee's encoded function type and
/// returns the entry address.
unsafe extern "C" fn intrinsic_call_indirect_check(
    ctx: *mut u8,
    args: *mut UntypedValue,
) -> *mut u8 {
    let compartment = compartment(ctx);
    let table_id = TableId::from_u32(arg(args, 0).to_bits64() as u32);
    let index = arg(args, 1).to_bits64();
    let expected_key = arg(args, 2).to_bits64();

    let table = compartment.state.lock().tables.get(table_id).cloned();
    let Some(table) = table else {
        sys::raise_trap(Trap::new(TrapKind::UndefinedElement));
    };
    let element = match table.get(index) {
        Ok(element) => element,
        Err(trap) => sys::raise_trap(trap),
    };
    let bits = match element {
        TableElement::Uninitialized => {
            sys::raise_trap(Trap::new(TrapKind::UninitializedTableElement))
        }
        TableElement::Null | TableElement::Ref(cove_core::RefValue::Null) => {
            sys::raise_trap(Trap::new(TrapKind::UndefinedElement))
        }
        TableElement::Ref(cove_core::RefValue::Extern(_)) => {
            sys::raise_trap(Trap::new(TrapKind::IndirectCallSignatureMismatch))
        }
        TableElement::Ref(cove_core::RefValue::Func(bits)) => bits,
    };
    let (instance_id, func_index) = unpack_func_bits(bits);
    let instance = compartment.state.lock().instances.get(instance_id).cloned();
    let Some(instance) = instance else {
        sys::raise_trap(Trap::new(TrapKind::UndefinedElement));
    };
    let Some(ty) = instance.module().func_type(func_index) else {
        sys::raise_trap(Trap::new(TrapKind::UndefinedElement));
    };
    if ty.key() != expected_key {
        sys::raise_trap(Trap::new(TrapKind::IndirectCallSignatureMismatch));
    }
    let num_imported = instance.module().num_imported_funcs();
    let entry = instance
        .code()
        .and_then(|code| code.entry(func_index - num_imported));
    let Some(entry) = entry else {
        sys::raise_trap(Trap::new(TrapKind::UndefinedElement));
    };
    ret(args, UntypedValue::from(entry.addr as usize as u64));
    ctx
}

/// `trap(code)`: raises the trap with the given [`cove_core::TrapCode`]
/// discriminant. Generated code calls this for inline trap paths such as
/// division by zero.
unsafe extern "C" fn intrinsic_trap(_ctx: *mut u8, args: *mut UntypedValue) -> *mut u8 {
    use cove_core::TrapCode;
    let code = match arg(args, 0).to_bits64() {
        0 => TrapCode::Unreachable,
        1 => TrapCode::IntegerDivideByZeroOrOverflow,
        2 => TrapCode::InvalidConversionToInteger,
        3 => TrapCode::OutOfBoundsMemoryAccess,
        4 => TrapCode::OutOfBoundsTableAccess,
        _ => TrapCode::Unreachable,
    };
    sys::raise_trap(Trap::from(code))
}

/// Looks up the runtime intrinsic with the given name.
///
/// Returns the address generated call sites are bound to, or `None` for
/// unknown names (the loader reports those as unimplemented intrinsics).
pub(crate) fn lookup(name: &str) -> Option<u64> {
    type IntrinsicFn = unsafe extern "C" fn(*mut u8, *mut UntypedValue) -> *mut u8;
    let f: IntrinsicFn = match name {
        "memory.grow" => intrinsic_memory_grow,
        "memory.size" => intrinsic_memory_size,
        "table.grow" => intrinsic_table_grow,
        "table.size" => intrinsic_table_size,
        "call_indirect.check" => intrinsic_call_indirect_check,
        "trap" => intrinsic_trap,
        _ => return None,
    };
    Some(f as usize as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_intrinsics_resolve() {
        assert!(lookup("memory.grow").is_some());
        assert!(lookup("call_indirect.check").is_some());
        assert_eq!(lookup("definitely.not.an.intrinsic"), None);
    }
}
