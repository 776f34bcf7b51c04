//! A sandboxed ahead-of-time WebAssembly runtime.
//!
//! `cove` validates binary modules against a typed instruction set,
//! compiles them through an opaque code generator and executes the result
//! inside *compartments*: isolation domains owning every object a guest
//! can reach. Linear memories reserve large spans of virtual address
//! space so that generated code can elide bounds checks; the resulting
//! faults are converted into typed [`Trap`]s.
//!
//! The typical embedding pipeline:
//!
//! 1. [`cove_ir::decode`] the binary bytes,
//! 2. [`validate`](crate::validate::validate) the module against a
//!    [`Config`],
//! 3. [`Engine::compile`] it into a [`CompiledModule`],
//! 4. resolve its imports with a [`Resolver`] (or a [`StubResolver`]),
//! 5. [`instantiate`](crate::instantiate) it inside a [`Compartment`] and
//!    [`invoke`](crate::invoke) its exports from a [`Context`].

mod code_memory;
mod compartment;
mod config;
mod context;
mod engine;
mod extern_;
mod func;
mod gc;
mod global;
mod ids;
mod instance;
mod instantiate;
mod intrinsics;
mod invoke;
mod linker;
mod memory;
mod module;
mod runtime_data;
mod sys;
mod table;
mod tag;
mod trap;
pub mod codegen;
pub mod validate;

pub use self::{
    compartment::{Compartment, CompartmentError},
    config::Config,
    context::Context,
    engine::Engine,
    extern_::{Extern, ExternType},
    func::{Function, HostFunc},
    gc::collect_garbage,
    global::Global,
    ids::{CompartmentId, ContextId, GlobalId, InstanceId, MemoryId, TableId, TagId},
    instance::Instance,
    instantiate::{instantiate, InstantiationError},
    invoke::invoke,
    linker::{
        link,
        ImportDescriptor,
        LinkResult,
        NamespaceResolver,
        Resolver,
        StubBehavior,
        StubResolver,
    },
    memory::{Memory, MemoryError},
    module::{CompiledModule, ModuleError, PRECOMPILED_SECTION},
    table::{Table, TableError},
    tag::Tag,
    trap::{Trap, TrapFrame, TrapKind},
};

/// The `cove_core` primitives, re-exported for embedders.
pub mod core {
    pub use cove_core::*;
}

/// The `cove_ir` module IR and codec, re-exported for embedders.
pub mod ir {
    pub use cove_ir::*;
}
