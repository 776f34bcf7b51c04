//! Core primitives for the Cove WebAssembly runtime.
//!
//! This crate defines the value and type universe shared by the IR, the
//! validator and the runtime:
//!
//! - [`Value`], [`UntypedValue`] and the [`V128`] vector value
//! - [`ValType`] and its subtype lattice, [`FuncType`] and the extern types
//! - [`TrapCode`], the typed failure codes of Wasm operations
//! - [`VirtualMemory`], the reserve-then-commit byte buffer backing linear
//!   memories

mod func_type;
mod trap;
mod types;
mod untyped;
mod v128;
mod value;
pub mod vmem;

pub use self::{
    func_type::{FuncType, FuncTypeError},
    trap::TrapCode,
    types::{GlobalType, MemoryType, Mutability, TableType, TagType},
    untyped::UntypedValue,
    v128::V128,
    value::{RefValue, ValType, Value},
    vmem::{VirtualMemory, VirtualMemoryError},
};

/// The number of bytes of a Wasm linear-memory page: 64 KiB.
pub const PAGE_SIZE: u32 = 65536;

/// Log2 of the Wasm page size.
pub const PAGE_SIZE_LOG2: u32 = 16;
