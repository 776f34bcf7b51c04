//! Entity arena data structures for the Cove runtime.
//!
//! Compartment-owned objects (tables, memories, globals, exception tags,
//! module instances, contexts) live in per-kind [`SparseArena`]s and are
//! referred to by typed index instead of by pointer. Indices stay stable
//! for the lifetime of their entity; reclamation frees slots one by one
//! and later allocations reuse them.

#![no_std]

#[cfg(not(feature = "std"))]
extern crate alloc as std;

#[cfg(feature = "std")]
extern crate std;

pub mod arena;

#[doc(inline)]
pub use self::arena::{ArenaIndex, SparseArena};
