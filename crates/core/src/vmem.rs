//! Reserve-then-commit virtual memory buffers.
//!
//! Linear memories and the compartment runtime-data region reserve large
//! spans of address space up front and commit pages on demand. Reserved
//! but uncommitted pages are mapped with no access rights, so any touch,
//! including from generated code that elided a bounds check, faults
//! synchronously and is converted to a trap by the signal bridge.

use std::{
    fmt,
    fmt::{Debug, Display},
    slice,
};
use region::{Allocation, Protection};

/// Errors that can occur operating on a [`VirtualMemory`].
#[derive(Debug)]
pub enum VirtualMemoryError {
    /// The operating system refused the reservation or commit.
    Region(region::Error),
    /// The requested reservation or commit is outside the supported bounds.
    OutOfBounds,
}

impl From<region::Error> for VirtualMemoryError {
    #[inline]
    fn from(error: region::Error) -> Self {
        Self::Region(error)
    }
}

impl Display for VirtualMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Region(error) => {
                write!(f, "encountered failure while operating with virtual memory: {error}")
            }
            Self::OutOfBounds => write!(f, "virtual memory request is out of bounds"),
        }
    }
}

impl core::error::Error for VirtualMemoryError {}

/// A buffer of reserved virtual address space with a committed prefix.
///
/// The reservation is fixed at construction; only the committed prefix is
/// readable and writable. Growing commits further pages in place so the
/// base address never moves for the lifetime of the buffer.
pub struct VirtualMemory {
    /// The underlying page reservation. Dropping it unmaps the whole range.
    allocation: Allocation,
    /// Offset of the aligned base inside the reservation.
    base_offset: usize,
    /// The usable length starting at the aligned base.
    reserved_len: usize,
    /// The committed (accessible) prefix length.
    committed_len: usize,
}

impl Debug for VirtualMemory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VirtualMemory")
            .field("reserved_len", &self.reserved_len)
            .field("committed_len", &self.committed_len)
            .finish()
    }
}

// The committed prefix is plain memory owned by this value.
unsafe impl Send for VirtualMemory {}
unsafe impl Sync for VirtualMemory {}

impl VirtualMemory {
    /// Reserves `len` bytes of virtual address space without committing any.
    ///
    /// # Errors
    ///
    /// If the operating system refuses the reservation.
    pub fn reserve(len: usize) -> Result<Self, VirtualMemoryError> {
        assert_ne!(len, 0, "cannot reserve an empty virtual memory");
        let allocation = region::alloc(len, Protection::NONE)?;
        Ok(Self {
            allocation,
            base_offset: 0,
            reserved_len: len,
            committed_len: 0,
        })
    }

    /// Reserves `len` bytes whose base address is aligned to `1 << align_log2`.
    ///
    /// Over-reserves by the alignment and uses the first aligned address
    /// inside the reservation as the base. The compartment runtime-data
    /// region relies on this for its 4 GiB alignment.
    ///
    /// # Errors
    ///
    /// If the operating system refuses the reservation.
    pub fn reserve_aligned(len: usize, align_log2: u32) -> Result<Self, VirtualMemoryError> {
        let align = 1_usize
            .checked_shl(align_log2)
            .ok_or(VirtualMemoryError::OutOfBounds)?;
        let total = len
            .checked_add(align)
            .ok_or(VirtualMemoryError::OutOfBounds)?;
        let allocation = region::alloc(total, Protection::NONE)?;
        let addr = allocation.as_ptr::<u8>() as usize;
        let base_offset = addr.next_multiple_of(align) - addr;
        Ok(Self {
            allocation,
            base_offset,
            reserved_len: len,
            committed_len: 0,
        })
    }

    /// Returns the base pointer of the (aligned) reservation.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        // Allocation hands out the pointer of the full reservation.
        unsafe { self.allocation.as_ptr::<u8>().cast_mut().add(self.base_offset) }
    }

    /// Returns the reserved length in bytes.
    #[inline]
    pub fn reserved_len(&self) -> usize {
        self.reserved_len
    }

    /// Returns the committed prefix length in bytes.
    #[inline]
    pub fn committed_len(&self) -> usize {
        self.committed_len
    }

    /// Returns `true` if `addr` lies within the reserved address range.
    pub fn contains_addr(&self, addr: usize) -> bool {
        let base = self.as_ptr() as usize;
        addr >= base && addr < base + self.reserved_len
    }

    /// Commits the prefix `[0, new_len)`, making it readable and writable.
    ///
    /// The commit is rounded up to the host page size (clamped to the
    /// reservation). Shrinking is not supported; committing less than is
    /// already committed is a no-op.
    ///
    /// # Errors
    ///
    /// - If `new_len` exceeds the reservation.
    /// - If the operating system refuses the commit.
    pub fn commit(&mut self, new_len: usize) -> Result<(), VirtualMemoryError> {
        if new_len > self.reserved_len {
            return Err(VirtualMemoryError::OutOfBounds);
        }
        let new_len = new_len
            .next_multiple_of(region::page::size())
            .min(self.reserved_len);
        if new_len <= self.committed_len {
            return Ok(());
        }
        unsafe {
            region::protect(
                self.as_ptr().add(self.committed_len),
                new_len - self.committed_len,
                Protection::READ_WRITE,
            )?;
        }
        self.committed_len = new_len;
        Ok(())
    }

    /// Returns a shared slice over the committed prefix.
    #[inline]
    pub fn data(&self) -> &[u8] {
        // The committed prefix is mapped readable for the lifetime of self.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.committed_len) }
    }

    /// Returns an exclusive slice over the committed prefix.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        // The committed prefix is mapped writable and uniquely borrowed.
        unsafe { slice::from_raw_parts_mut(self.as_ptr(), self.committed_len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_grows_accessible_prefix() {
        let page = region::page::size();
        let mut vmem = VirtualMemory::reserve(16 * page).unwrap();
        assert_eq!(vmem.data().len(), 0);
        vmem.commit(2 * page).unwrap();
        vmem.data_mut()[2 * page - 1] = 0xaa;
        assert_eq!(vmem.data()[2 * page - 1], 0xaa);
        // Growing keeps prior contents and the base address.
        let base = vmem.as_ptr();
        vmem.commit(4 * page).unwrap();
        assert_eq!(vmem.as_ptr(), base);
        assert_eq!(vmem.data()[2 * page - 1], 0xaa);
    }

    #[test]
    fn commit_out_of_reservation_fails() {
        let page = region::page::size();
        let mut vmem = VirtualMemory::reserve(page).unwrap();
        assert!(matches!(
            vmem.commit(2 * page),
            Err(VirtualMemoryError::OutOfBounds)
        ));
    }

    #[test]
    fn aligned_reservation_is_aligned() {
        // 1 MiB alignment keeps the test cheap while exercising the logic.
        let vmem = VirtualMemory::reserve_aligned(4 * region::page::size(), 20).unwrap();
        assert_eq!(vmem.as_ptr() as usize % (1 << 20), 0);
    }
}
