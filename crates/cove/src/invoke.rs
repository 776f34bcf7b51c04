//! Calling guest functions from the host.
//!
//! Arguments travel through an untyped buffer in the thunk-ABI layout:
//! the invoke path packs the typed [`Value`]s, transfers control to the
//! function's context-args entry under the signal-to-trap anchor, and
//! unpacks the results. Host functions short-circuit to their callback.

use crate::{
    codegen::{CallingAbi, ContextArgsFn},
    context::Context,
    func::{Function, FunctionKind},
    runtime_data::THUNK_SCRATCH_BYTES,
    sys,
    trap::{Trap, TrapKind},
};
use cove_core::{UntypedValue, Value};

/// The maximum number of argument/result slots of the thunk buffer.
const MAX_THUNK_SLOTS: usize = THUNK_SCRATCH_BYTES / core::mem::size_of::<UntypedValue>();

/// Invokes `function` in `context` with the given arguments.
///
/// # Errors
///
/// - [`TrapKind::InvalidArgument`] if the argument count or types do not
///   match the function type, or if the tuples exceed the thunk buffer.
/// - Any [`Trap`] raised by the function.
///
/// # Panics
///
/// If `function` is a guest function of a different compartment than
/// `context`; cross-compartment calls are forbidden by invariant.
pub fn invoke(context: &Context, function: &Function, args: &[Value]) -> Result<Vec<Value>, Trap> {
    let ty = function.ty();
    if args.len() != ty.params().len() {
        return Err(Trap::new(TrapKind::InvalidArgument));
    }
    for (value, param) in args.iter().zip(ty.params()) {
        if !value.ty().is_subtype_of(param) {
            return Err(Trap::new(TrapKind::InvalidArgument));
        }
    }
    if args.len() > MAX_THUNK_SLOTS || ty.results().len() > MAX_THUNK_SLOTS {
        return Err(Trap::new(TrapKind::InvalidArgument));
    }

    let packed: Vec<UntypedValue> = args.iter().map(Value::to_untyped).collect();

    match &function.kind {
        FunctionKind::Host(host) => {
            let mut results = vec![UntypedValue::default(); ty.results().len()];
            host.call(context, &packed, &mut results)?;
            Ok(ty
                .results()
                .iter()
                .zip(results)
                .map(|(ty, value)| Value::from_untyped(value, *ty))
                .collect())
        }
        FunctionKind::Wasm { instance, index } => {
            let instance = instance
                .upgrade()
                .ok_or_else(|| Trap::new(TrapKind::UndefinedElement))?;
            context.check_compartment(instance.compartment);
            let num_imported = instance.module().num_imported_funcs();
            let defined = index
                .checked_sub(num_imported)
                .ok_or_else(|| Trap::new(TrapKind::InvalidArgument))?;
            let code = instance
                .code()
                .ok_or_else(|| Trap::new(TrapKind::CalledUnimplementedIntrinsic))?;
            let entry = code
                .entry(defined)
                .ok_or_else(|| Trap::new(TrapKind::CalledUnimplementedIntrinsic))?;
            if entry.abi != CallingAbi::ContextArgs {
                // Native-ABI entries need a generator-built invoke thunk.
                return Err(Trap::new(TrapKind::CalledUnimplementedIntrinsic));
            }

            // Marshal through the context's thunk scratch buffer: the
            // callee reads arguments and writes results in place.
            let scratch = context.scratch_ptr();
            unsafe {
                for (slot, value) in packed.iter().enumerate() {
                    scratch.add(slot).write(*value);
                }
            }
            let ctx_ptr = context.runtime_data_ptr();
            let entry_fn: ContextArgsFn = unsafe { core::mem::transmute(entry.addr) };
            let result = sys::call_with_signals_caught(|| {
                // The callee may migrate execution to another context of
                // the same compartment; the returned pointer names it.
                unsafe { entry_fn(ctx_ptr, scratch) }
            })
            .map_err(|mut trap| {
                trap.push_frame(instance.func_debug_name(*index));
                trap
            })?;
            debug_assert!(!result.is_null());

            let results = ty
                .results()
                .iter()
                .enumerate()
                .map(|(slot, ty)| {
                    let value = unsafe { scratch.add(slot).read() };
                    Value::from_untyped(value, *ty)
                })
                .collect();
            Ok(results)
        }
    }
}
