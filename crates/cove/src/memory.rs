//! The sandboxed linear-memory engine.
//!
//! On 64-bit hosts every memory reserves 8 GiB of virtual address space
//! plus one guard page and commits pages only as the memory grows. Any
//! `i32` address plus a static offset of up to 4 GiB therefore lands
//! inside the reservation, letting generated code elide bounds checks:
//! out-of-bounds accesses hit uncommitted pages and fault, and the signal
//! bridge turns the fault into a typed trap using the process-wide index
//! of live reservations.
//!
//! Reads and writes are lock-free against concurrent non-resizing access;
//! `grow` serializes on the resizing mutex and commits in place, so the
//! base address never changes.

use crate::{
    ids::{CompartmentId, MemoryId},
    trap::{Trap, TrapKind},
};
use core::fmt::{self, Debug, Display};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use cove_core::{MemoryType, VirtualMemory, VirtualMemoryError, PAGE_SIZE};
use spin::Mutex;
use std::sync::Arc;

/// The reserved address-space size per memory: 8 GiB.
const MEMORY_RESERVED_BYTES: usize = 8 << 30;

/// Errors that can occur when creating or growing a [`Memory`].
#[derive(Debug)]
pub enum MemoryError {
    /// Growth would exceed the declared maximum or the engine cap.
    OutOfBoundsGrowth,
    /// The operating system refused the reservation or commit.
    Virtual(VirtualMemoryError),
    /// The compartment is out of memory ids.
    TooManyMemories,
}

impl From<VirtualMemoryError> for MemoryError {
    fn from(error: VirtualMemoryError) -> Self {
        Self::Virtual(error)
    }
}

impl Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBoundsGrowth => write!(f, "memory cannot grow beyond its limits"),
            Self::Virtual(error) => write!(f, "virtual memory failure: {error}"),
            Self::TooManyMemories => write!(f, "the compartment is out of memory ids"),
        }
    }
}

impl core::error::Error for MemoryError {}

/// A process-wide entry of the live-reservation index.
struct LiveMemory {
    base: usize,
    len: usize,
    compartment: CompartmentId,
    memory: MemoryId,
}

/// The process-wide index of live memory reservations.
///
/// Touched only on memory creation/destruction and on faulting-address
/// lookups from the signal bridge.
static LIVE_MEMORIES: Mutex<Vec<LiveMemory>> = Mutex::new(Vec::new());

/// Looks up the memory whose reservation contains `addr`.
///
/// Returns the owning compartment, the memory id and the offset of the
/// address within the memory.
pub(crate) fn lookup_faulting_address(addr: usize) -> Option<(CompartmentId, MemoryId, u64)> {
    let live = LIVE_MEMORIES.lock();
    live.iter()
        .find(|memory| addr >= memory.base && addr < memory.base + memory.len)
        .map(|memory| (memory.compartment, memory.memory, (addr - memory.base) as u64))
}

/// The compartment-owned state of one linear memory.
pub(crate) struct MemoryEntity {
    pub id: MemoryId,
    pub compartment: CompartmentId,
    ty: MemoryType,
    /// The effective page cap: declared maximum clamped by the engine.
    max_pages: u32,
    pub root_count: AtomicUsize,
    pub debug_name: String,
    /// Held while growing; data access does not take it.
    resizing: Mutex<VirtualMemory>,
    /// Cached reservation base; never changes.
    base: *mut u8,
    /// The committed size in Wasm pages.
    num_pages: AtomicU32,
}

// Data access goes through raw pointers into the committed prefix; the
// committed prefix only ever grows.
unsafe impl Send for MemoryEntity {}
unsafe impl Sync for MemoryEntity {}

impl Debug for MemoryEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEntity")
            .field("id", &self.id)
            .field("pages", &self.num_pages.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryEntity {
    pub fn new(
        id: MemoryId,
        compartment: CompartmentId,
        ty: MemoryType,
        engine_max_pages: u32,
        debug_name: String,
    ) -> Result<Self, MemoryError> {
        let max_pages = MemoryType::max(&ty).unwrap_or(u32::MAX).min(engine_max_pages);
        if MemoryType::min(&ty) > max_pages {
            return Err(MemoryError::OutOfBoundsGrowth);
        }
        let guard = region::page::size();
        let mut vmem = VirtualMemory::reserve(MEMORY_RESERVED_BYTES + guard)?;
        vmem.commit(MemoryType::min(&ty) as usize * PAGE_SIZE as usize)?;
        let base = vmem.as_ptr();

        LIVE_MEMORIES.lock().push(LiveMemory {
            base: base as usize,
            len: MEMORY_RESERVED_BYTES + guard,
            compartment,
            memory: id,
        });

        Ok(Self {
            id,
            compartment,
            ty,
            max_pages,
            root_count: AtomicUsize::new(0),
            debug_name,
            base,
            num_pages: AtomicU32::new(MemoryType::min(&ty)),
            resizing: Mutex::new(vmem),
        })
    }

    /// Returns the declared type of the memory.
    pub fn ty(&self) -> MemoryType {
        self.ty
    }

    /// Returns the current size in Wasm pages.
    pub fn size(&self) -> u32 {
        self.num_pages.load(Ordering::Acquire)
    }

    /// Returns the current size in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        u64::from(self.size()) * u64::from(PAGE_SIZE)
    }

    /// Returns the reservation base address.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Grows the memory by `delta` pages, returning the previous size.
    ///
    /// `grow(0)` returns the current size without taking the resizing
    /// mutex exclusively long and modifies nothing.
    ///
    /// # Errors
    ///
    /// If growth would exceed the declared maximum, the engine cap, or
    /// the operating system refuses the commit. The memory is unchanged
    /// on error.
    pub fn grow(&self, delta: u32) -> Result<u32, MemoryError> {
        let mut vmem = self.resizing.lock();
        let current = self.size();
        if delta == 0 {
            return Ok(current);
        }
        let desired = current
            .checked_add(delta)
            .ok_or(MemoryError::OutOfBoundsGrowth)?;
        if desired > self.max_pages {
            return Err(MemoryError::OutOfBoundsGrowth);
        }
        vmem.commit(desired as usize * PAGE_SIZE as usize)?;
        self.num_pages.store(desired, Ordering::Release);
        Ok(current)
    }

    fn oob(&self, end: u64) -> Trap {
        Trap::new(TrapKind::OutOfBoundsMemoryAccess {
            memory: self.id,
            offset: end,
        })
    }

    /// Checks that `[offset, offset+len)` is inside the committed size
    /// and returns the in-range prefix length.
    fn prefix_len(&self, offset: u64, len: u64) -> u64 {
        self.size_in_bytes().saturating_sub(offset).min(len)
    }

    /// Reads `buffer.len()` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Traps without side effects if the range is out of bounds.
    pub fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<(), Trap> {
        let len = buffer.len() as u64;
        if self.prefix_len(offset, len) != len {
            return Err(self.oob(offset.saturating_add(len)));
        }
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.base.add(offset as usize),
                buffer.as_mut_ptr(),
                buffer.len(),
            );
        }
        Ok(())
    }

    /// Writes `buffer` at `offset`.
    ///
    /// # Errors
    ///
    /// Traps without side effects if the range is out of bounds.
    pub fn write(&self, offset: u64, buffer: &[u8]) -> Result<(), Trap> {
        let len = buffer.len() as u64;
        if self.prefix_len(offset, len) != len {
            return Err(self.oob(offset.saturating_add(len)));
        }
        unsafe {
            core::ptr::copy_nonoverlapping(
                buffer.as_ptr(),
                self.base.add(offset as usize),
                buffer.len(),
            );
        }
        Ok(())
    }

    /// `memory.fill`: writes `len` copies of `value` at `dst`.
    ///
    /// On a partially out-of-bounds range the in-range prefix is written
    /// before the trap is raised.
    pub fn fill(&self, dst: u64, value: u8, len: u64) -> Result<(), Trap> {
        let prefix = self.prefix_len(dst, len);
        if prefix > 0 {
            unsafe {
                core::ptr::write_bytes(self.base.add(dst as usize), value, prefix as usize);
            }
        }
        if prefix != len {
            return Err(self.oob(dst.saturating_add(len)));
        }
        Ok(())
    }

    /// `memory.init`: copies `len` bytes from `bytes[src..]` to `dst`.
    ///
    /// The in-range prefix (of both the segment and the memory) is
    /// written before any trap is raised.
    pub fn init_from(
        &self,
        bytes: &[u8],
        dst: u64,
        src: u64,
        len: u64,
        segment_oob: impl FnOnce(u64) -> Trap,
    ) -> Result<(), Trap> {
        let src_avail = (bytes.len() as u64).saturating_sub(src);
        let prefix = self.prefix_len(dst, len).min(src_avail);
        if prefix > 0 {
            unsafe {
                core::ptr::copy_nonoverlapping(
                    bytes.as_ptr().add(src as usize),
                    self.base.add(dst as usize),
                    prefix as usize,
                );
            }
        }
        if src_avail < len {
            return Err(segment_oob(src.saturating_add(len)));
        }
        if prefix != len {
            return Err(self.oob(dst.saturating_add(len)));
        }
        Ok(())
    }
}

impl Drop for MemoryEntity {
    fn drop(&mut self) {
        let base = self.base as usize;
        LIVE_MEMORIES.lock().retain(|memory| memory.base != base);
    }
}

/// `memory.copy`: copies `len` bytes from `src_mem[src]` to `dst_mem[dst]`.
///
/// Overlap is allowed when both ranges are in the same memory. The
/// in-range prefix is copied before any trap is raised, and the trap
/// reports the first memory whose bound was exceeded.
pub(crate) fn copy_between(
    dst_mem: &MemoryEntity,
    src_mem: &MemoryEntity,
    dst: u64,
    src: u64,
    len: u64,
) -> Result<(), Trap> {
    let src_avail = src_mem.size_in_bytes().saturating_sub(src);
    let dst_avail = dst_mem.size_in_bytes().saturating_sub(dst);
    let prefix = len.min(src_avail).min(dst_avail);
    if prefix > 0 {
        unsafe {
            // `copy` handles the overlapping same-memory case.
            core::ptr::copy(
                src_mem.base.add(src as usize),
                dst_mem.base.add(dst as usize),
                prefix as usize,
            );
        }
    }
    if src_avail < len {
        return Err(src_mem.oob(src.saturating_add(len)));
    }
    if dst_avail < len {
        return Err(dst_mem.oob(dst.saturating_add(len)));
    }
    Ok(())
}

/// A linear memory owned by a compartment.
///
/// The handle can be cloned cheaply; the underlying memory lives until
/// reclamation removes it from its compartment and the last handle is
/// dropped.
#[derive(Debug, Clone)]
pub struct Memory {
    pub(crate) entity: Arc<MemoryEntity>,
}

impl Memory {
    /// Returns the runtime id of the memory within its compartment.
    pub fn id(&self) -> MemoryId {
        self.entity.id
    }

    /// Returns the id of the owning compartment.
    pub fn compartment_id(&self) -> CompartmentId {
        self.entity.compartment
    }

    /// Returns the declared type of the memory.
    pub fn ty(&self) -> MemoryType {
        self.entity.ty()
    }

    /// Returns the type with the current size as its minimum.
    ///
    /// Import subtype checks use this so that a grown memory satisfies
    /// larger minimums.
    pub fn dynamic_ty(&self) -> MemoryType {
        MemoryType::new(
            self.entity.size(),
            MemoryType::max(&self.entity.ty()),
            self.entity.ty().is_shared(),
        )
            .expect("the current size is always within the declared limits")
    }

    /// Returns the current size in Wasm pages.
    pub fn size(&self) -> u32 {
        self.entity.size()
    }

    /// Grows the memory by `delta` pages, returning the previous size.
    ///
    /// # Errors
    ///
    /// See [`MemoryEntity::grow`]; guests observe failures as `-1`.
    pub fn grow(&self, delta: u32) -> Result<u32, MemoryError> {
        self.entity.grow(delta)
    }

    /// Reads `buffer.len()` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Traps without side effects if the range is out of bounds.
    pub fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<(), Trap> {
        self.entity.read(offset, buffer)
    }

    /// Writes `buffer` at `offset`.
    ///
    /// # Errors
    ///
    /// Traps without side effects if the range is out of bounds.
    pub fn write(&self, offset: u64, buffer: &[u8]) -> Result<(), Trap> {
        self.entity.write(offset, buffer)
    }

    /// `memory.fill` with partial-progress semantics.
    ///
    /// # Errors
    ///
    /// Traps after writing the in-range prefix if the range is out of
    /// bounds.
    pub fn fill(&self, dst: u64, value: u8, len: u64) -> Result<(), Trap> {
        self.entity.fill(dst, value, len)
    }

    /// `memory.copy` with partial-progress semantics; `self` is the
    /// destination.
    ///
    /// # Errors
    ///
    /// Traps after copying the in-range prefix if either range is out of
    /// bounds.
    pub fn copy(&self, src: &Memory, dst: u64, src_offset: u64, len: u64) -> Result<(), Trap> {
        copy_between(&self.entity, &src.entity, dst, src_offset, len)
    }

    /// Adds a root reference, protecting the memory from reclamation.
    pub fn add_root(&self) {
        self.entity.root_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.entity.root_count.fetch_sub(1, Ordering::AcqRel);
    }
}
