//! The typed syscall surface.
//!
//! Every syscall follows one template: look up the current process
//! state, validate descriptors and paths (returning an errno before any
//! observable side effect on failure), perform the I/O through the
//! filesystem capability, and write results back to guest memory with
//! bounds checks. Guest-memory faults surface as `EFAULT`; everything
//! else maps through the total [`FsError`](crate::fs::FsError) table.

mod fd;
mod misc;
mod paths;

use crate::{
    fs::{SyncLevel, VfdFlags},
    process::{Fde, WasiProcess},
    rights::Rights,
    types::{fdflags, Errno, Fd, GuestPtr},
};
use cove::Memory;
use std::sync::Arc;

/// The result type of syscall bodies: an errno on failure.
pub(crate) type Result<T> = core::result::Result<T, Errno>;

/// Reads `len` bytes of guest memory.
pub(crate) fn mem_read(memory: &Memory, ptr: GuestPtr, len: u32) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len as usize];
    memory
        .read(u64::from(ptr), &mut bytes)
        .map_err(|_| Errno::Fault)?;
    Ok(bytes)
}

/// Writes bytes into guest memory.
pub(crate) fn mem_write(memory: &Memory, ptr: GuestPtr, bytes: &[u8]) -> Result<()> {
    memory
        .write(u64::from(ptr), bytes)
        .map_err(|_| Errno::Fault)
}

/// Writes a little-endian `u32` into guest memory.
pub(crate) fn write_u32(memory: &Memory, ptr: GuestPtr, value: u32) -> Result<()> {
    mem_write(memory, ptr, &value.to_le_bytes())
}

/// Writes a little-endian `u64` into guest memory.
pub(crate) fn write_u64(memory: &Memory, ptr: GuestPtr, value: u64) -> Result<()> {
    mem_write(memory, ptr, &value.to_le_bytes())
}

/// Reads a little-endian `u32` from guest memory.
pub(crate) fn read_u32(memory: &Memory, ptr: GuestPtr) -> Result<u32> {
    let bytes = mem_read(memory, ptr, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
}

/// Reads a little-endian `u64` from guest memory.
pub(crate) fn read_u64(memory: &Memory, ptr: GuestPtr) -> Result<u64> {
    let bytes = mem_read(memory, ptr, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
}

/// Reads a guest UTF-8 string.
pub(crate) fn read_string(memory: &Memory, ptr: GuestPtr, len: u32) -> Result<String> {
    let bytes = mem_read(memory, ptr, len)?;
    String::from_utf8(bytes).map_err(|_| Errno::Ilseq)
}

/// Reads a scatter-gather list of `(ptr, len)` pairs.
pub(crate) fn read_iovs(
    memory: &Memory,
    iovs: GuestPtr,
    iovs_len: u32,
) -> Result<Vec<(GuestPtr, u32)>> {
    let mut entries = Vec::with_capacity(iovs_len.min(1024) as usize);
    for index in 0..iovs_len {
        let base = iovs
            .checked_add(index.checked_mul(8).ok_or(Errno::Inval)?)
            .ok_or(Errno::Inval)?;
        let ptr = read_u32(memory, base)?;
        let len = read_u32(memory, base + 4)?;
        entries.push((ptr, len));
    }
    Ok(entries)
}

/// Translates guest `fdflags` into descriptor flags.
///
/// Also returns the rights the flags require, mirroring the sync bits:
/// requesting write-synchronized behavior requires the corresponding
/// sync right on the descriptor.
pub(crate) fn translate_fdflags(flags: u16) -> Result<(VfdFlags, Rights)> {
    if flags & !fdflags::ALL != 0 {
        return Err(Errno::Inval);
    }
    let mut result = VfdFlags::default();
    let mut required = Rights::empty();
    if flags & fdflags::DSYNC != 0 {
        result.sync_level = if flags & fdflags::RSYNC != 0 {
            SyncLevel::ContentsAfterWriteAndBeforeRead
        } else {
            SyncLevel::ContentsAfterWrite
        };
        required |= Rights::FD_DATASYNC;
    }
    if flags & fdflags::SYNC != 0 {
        result.sync_level = if flags & fdflags::RSYNC != 0 {
            SyncLevel::ContentsAndMetadataAfterWriteAndBeforeRead
        } else {
            SyncLevel::ContentsAndMetadataAfterWrite
        };
        required |= Rights::FD_SYNC;
    }
    if flags & fdflags::NONBLOCK != 0 {
        result.non_blocking = true;
    }
    if flags & fdflags::APPEND != 0 {
        result.append = true;
    }
    Ok((result, required))
}

/// Translates descriptor flags back into guest `fdflags`.
pub(crate) fn untranslate_fdflags(flags: &VfdFlags) -> u16 {
    let mut result = 0;
    if flags.append {
        result |= fdflags::APPEND;
    }
    if flags.non_blocking {
        result |= fdflags::NONBLOCK;
    }
    match flags.sync_level {
        SyncLevel::None => {}
        SyncLevel::ContentsAfterWrite => result |= fdflags::DSYNC,
        SyncLevel::ContentsAfterWriteAndBeforeRead => {
            result |= fdflags::DSYNC | fdflags::RSYNC;
        }
        SyncLevel::ContentsAndMetadataAfterWrite => result |= fdflags::SYNC,
        SyncLevel::ContentsAndMetadataAfterWriteAndBeforeRead => {
            result |= fdflags::SYNC | fdflags::RSYNC;
        }
    }
    result
}

impl WasiProcess {
    /// Looks up a descriptor and checks its rights, cloning the handle
    /// out so the process mutex is not held across the I/O.
    pub(crate) fn vfd_checked(
        &self,
        fd: Fd,
        rights: Rights,
        inheriting: Rights,
    ) -> Result<Arc<dyn crate::fs::Vfd>> {
        let state = self.lock();
        let fde = state.fds.get(&fd).ok_or(Errno::Badf)?;
        fde.check_rights(rights, inheriting)?;
        Ok(fde.vfd.clone())
    }

    /// Runs `body` on the descriptor's table entry under the process
    /// mutex.
    pub(crate) fn with_fde<T>(
        &self,
        fd: Fd,
        body: impl FnOnce(&mut Fde) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        let fde = state.fds.get_mut(&fd).ok_or(Errno::Badf)?;
        body(fde)
    }
}
