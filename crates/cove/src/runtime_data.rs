//! The per-compartment runtime-data region.
//!
//! Generated code reaches every live object through one 4 GiB-aligned,
//! 4 GiB-reserved block per compartment. Its committed head holds a
//! pointer back to the compartment and the memory/table base-pointer
//! arrays indexed by runtime id; the rest is a linear array of page-sized
//! per-context blocks, each committed when its context is created.
//!
//! The alignment is load-bearing: masking any context pointer by the low
//! 32 bits recovers the region base (see
//! [`RuntimeDataRegion::compartment_from_context`]), which is how
//! generated code finds the compartment from nothing but its context
//! pointer.

use core::sync::atomic::{AtomicUsize, Ordering};
use cove_core::{UntypedValue, VirtualMemory, VirtualMemoryError};
use spin::Mutex;

/// The reserved size of the region: 4 GiB.
pub(crate) const COMPARTMENT_RESERVED_BYTES: usize = 4 << 30;

/// Log2 of the region alignment: aligned to its own 4 GiB size.
const REGION_ALIGN_LOG2: u32 = 32;

/// The maximum number of memories per compartment.
pub(crate) const MAX_MEMORIES: usize = 255;

/// The maximum number of tables per compartment.
pub(crate) const MAX_TABLES: usize = 3840;

/// The committed head: compartment pointer plus the base-pointer arrays.
///
/// Sized so the context array starts page-aligned at 32 KiB.
const HEADER_BYTES: usize = 8 + MAX_MEMORIES * 8 + MAX_TABLES * 8;

/// The offset of the first context block.
const CONTEXTS_OFFSET: usize = 32768;

/// The size of one per-context block.
pub(crate) const CONTEXT_BYTES: usize = 4096;

/// The scratch area at the head of each context block used by invoke and
/// intrinsic thunks to marshal arguments and results.
pub(crate) const THUNK_SCRATCH_BYTES: usize = 256;

/// The maximum number of mutable-global slots per compartment.
pub(crate) const MAX_MUTABLE_GLOBALS: usize =
    (CONTEXT_BYTES - THUNK_SCRATCH_BYTES) / core::mem::size_of::<UntypedValue>();

/// The maximum number of contexts per compartment.
pub(crate) const MAX_CONTEXTS: usize =
    (COMPARTMENT_RESERVED_BYTES - CONTEXTS_OFFSET) / CONTEXT_BYTES;

const _: () = assert!(HEADER_BYTES <= CONTEXTS_OFFSET);
const _: () = assert!(CONTEXTS_OFFSET % 4096 == 0);

/// The runtime-data region of one compartment.
pub(crate) struct RuntimeDataRegion {
    /// The reservation. Committed lazily: head eagerly, context blocks on
    /// context creation.
    vmem: Mutex<VirtualMemory>,
    /// Cached base address of the aligned reservation.
    base: *mut u8,
    /// The number of context blocks covered by the committed prefix.
    committed_contexts: AtomicUsize,
}

// The region is plain memory owned by the compartment; concurrent access
// to context blocks is coordinated by their contexts.
unsafe impl Send for RuntimeDataRegion {}
unsafe impl Sync for RuntimeDataRegion {}

impl core::fmt::Debug for RuntimeDataRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuntimeDataRegion")
            .field("base", &self.base)
            .field(
                "committed_contexts",
                &self.committed_contexts.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl RuntimeDataRegion {
    /// Reserves a new region and commits its head.
    pub fn new() -> Result<Self, VirtualMemoryError> {
        let mut vmem =
            VirtualMemory::reserve_aligned(COMPARTMENT_RESERVED_BYTES, REGION_ALIGN_LOG2)?;
        vmem.commit(CONTEXTS_OFFSET)?;
        let base = vmem.as_ptr();
        debug_assert_eq!(base as usize & (COMPARTMENT_RESERVED_BYTES - 1), 0);
        Ok(Self {
            vmem: Mutex::new(vmem),
            base,
            committed_contexts: AtomicUsize::new(0),
        })
    }

    /// Returns the base address of the region.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Records the owning compartment in the region head.
    ///
    /// Generated code (and [`Self::compartment_from_context`] callers)
    /// read the recorded pointer after masking a context pointer.
    pub fn set_owner(&self, owner: *const ()) {
        unsafe {
            (self.base as *mut *const ()).write(owner);
        }
    }

    /// Publishes the base pointer of the memory with runtime id `id`.
    pub fn set_memory_base(&self, id: usize, ptr: *mut u8) {
        assert!(id < MAX_MEMORIES, "memory id {id} exceeds the region layout");
        unsafe {
            (self.base.add(8) as *mut *mut u8).add(id).write(ptr);
        }
    }

    /// Publishes the base pointer of the table with runtime id `id`.
    pub fn set_table_base(&self, id: usize, ptr: *mut u8) {
        assert!(id < MAX_TABLES, "table id {id} exceeds the region layout");
        unsafe {
            (self.base.add(8 + MAX_MEMORIES * 8) as *mut *mut u8)
                .add(id)
                .write(ptr);
        }
    }

    /// Commits the context block at `index` and returns its address.
    ///
    /// # Errors
    ///
    /// If the region is out of context slots or the commit fails.
    pub fn commit_context(&self, index: usize) -> Result<*mut u8, VirtualMemoryError> {
        if index >= MAX_CONTEXTS {
            return Err(VirtualMemoryError::OutOfBounds);
        }
        let needed = CONTEXTS_OFFSET + (index + 1) * CONTEXT_BYTES;
        let mut vmem = self.vmem.lock();
        vmem.commit(needed)?;
        self.committed_contexts
            .fetch_max(index + 1, Ordering::AcqRel);
        Ok(self.context_ptr(index))
    }

    /// Returns the address of the context block at `index`.
    pub fn context_ptr(&self, index: usize) -> *mut u8 {
        unsafe { self.base.add(CONTEXTS_OFFSET + index * CONTEXT_BYTES) }
    }

    /// Returns the mutable-global slot array of the context at `index`.
    pub fn context_globals(&self, index: usize) -> *mut UntypedValue {
        unsafe { self.context_ptr(index).add(THUNK_SCRATCH_BYTES) as *mut UntypedValue }
    }

    /// Returns the thunk scratch area of the context at `index`.
    pub fn context_scratch(&self, index: usize) -> *mut UntypedValue {
        self.context_ptr(index) as *mut UntypedValue
    }

    /// Recovers the owner recorded by [`Self::set_owner`] from any
    /// pointer into a context block.
    ///
    /// The region is reserved at 4 GiB alignment, so clearing the low
    /// 32 bits of a context pointer yields the region base; the owner
    /// pointer sits in its first word.
    pub fn compartment_from_context(context_ptr: *const u8) -> *const () {
        let base = (context_ptr as usize) & !(COMPARTMENT_RESERVED_BYTES - 1);
        unsafe { (base as *const *const ()).read() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_are_consistent() {
        assert_eq!(MAX_MUTABLE_GLOBALS, 240);
        assert_eq!(HEADER_BYTES, 32768);
        assert!(CONTEXTS_OFFSET + MAX_CONTEXTS * CONTEXT_BYTES <= COMPARTMENT_RESERVED_BYTES);
    }

    #[test]
    fn context_mask_recovers_owner() {
        let region = RuntimeDataRegion::new().expect("cannot reserve region");
        let owner = 0x1234_usize as *const ();
        region.set_owner(owner);
        let ctx = region.commit_context(3).expect("cannot commit context");
        assert_eq!(RuntimeDataRegion::compartment_from_context(ctx), owner);
        // Pointers into the middle of a context block work as well.
        let inner = unsafe { ctx.add(100) };
        assert_eq!(RuntimeDataRegion::compartment_from_context(inner), owner);
    }

    #[test]
    fn context_blocks_are_page_aligned_and_disjoint() {
        let region = RuntimeDataRegion::new().expect("cannot reserve region");
        let a = region.commit_context(0).expect("commit");
        let b = region.commit_context(1).expect("commit");
        assert_eq!(a as usize % CONTEXT_BYTES, 0);
        assert_eq!(b as usize - a as usize, CONTEXT_BYTES);
    }
}
