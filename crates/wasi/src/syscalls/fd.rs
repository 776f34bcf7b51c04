//! The `fd_*` syscalls.

use super::{
    mem_read,
    mem_write,
    read_iovs,
    translate_fdflags,
    untranslate_fdflags,
    write_u32,
    write_u64,
    Result,
};
use crate::{
    fs::SyncKind,
    process::WasiProcess,
    rights::Rights,
    types::{advice, fstflags, Dirent, Errno, Fd, Fdstat, Filestat, GuestPtr, Whence},
};
use tracing::trace;

impl WasiProcess {
    /// `fd_prestat_get(fd, *prestat) -> errno`
    pub fn fd_prestat_get(&self, fd: Fd, out: GuestPtr) -> Result<()> {
        trace!("fd_prestat_get({fd})");
        let memory = self.memory()?;
        let state = self.lock();
        let fde = state.fds.get(&fd).ok_or(Errno::Badf)?;
        if !fde.is_preopened || !fde.is_directory {
            return Err(Errno::Badf);
        }
        let mut prestat = [0u8; 8];
        // Tag 0: a preopened directory; the payload is the name length.
        prestat[4..8].copy_from_slice(&(fde.original_path.len() as u32).to_le_bytes());
        drop(state);
        mem_write(&memory, out, &prestat)
    }

    /// `fd_prestat_dir_name(fd, *buf, len) -> errno`
    pub fn fd_prestat_dir_name(&self, fd: Fd, buf: GuestPtr, len: u32) -> Result<()> {
        trace!("fd_prestat_dir_name({fd}, len={len})");
        let memory = self.memory()?;
        let state = self.lock();
        let fde = state.fds.get(&fd).ok_or(Errno::Badf)?;
        if !fde.is_preopened || !fde.is_directory {
            return Err(Errno::Badf);
        }
        if (len as usize) < fde.original_path.len() {
            return Err(Errno::Inval);
        }
        let path = fde.original_path.clone();
        drop(state);
        mem_write(&memory, buf, path.as_bytes())
    }

    /// `fd_close(fd) -> errno`
    pub fn fd_close(&self, fd: Fd) -> Result<()> {
        trace!("fd_close({fd})");
        let mut state = self.lock();
        state.fds.remove(&fd).ok_or(Errno::Badf)?;
        Ok(())
    }

    /// `fd_datasync(fd) -> errno`
    pub fn fd_datasync(&self, fd: Fd) -> Result<()> {
        trace!("fd_datasync({fd})");
        let vfd = self.vfd_checked(fd, Rights::FD_DATASYNC, Rights::empty())?;
        vfd.sync(SyncKind::Contents).map_err(Errno::from)
    }

    /// `fd_sync(fd) -> errno`
    pub fn fd_sync(&self, fd: Fd) -> Result<()> {
        trace!("fd_sync({fd})");
        let vfd = self.vfd_checked(fd, Rights::FD_SYNC, Rights::empty())?;
        vfd.sync(SyncKind::ContentsAndMetadata).map_err(Errno::from)
    }

    /// `fd_read(fd, *iovs, iovs_len, *nread) -> errno`
    pub fn fd_read(&self, fd: Fd, iovs: GuestPtr, iovs_len: u32, nread: GuestPtr) -> Result<()> {
        trace!("fd_read({fd}, iovs={iovs_len})");
        let memory = self.memory()?;
        let vfd = self.vfd_checked(fd, Rights::FD_READ, Rights::empty())?;
        let entries = read_iovs(&memory, iovs, iovs_len)?;
        let mut total: u64 = 0;
        for (ptr, len) in entries {
            let mut buffer = vec![0u8; len as usize];
            let count = vfd.read(&mut buffer).map_err(Errno::from)?;
            mem_write(&memory, ptr, &buffer[..count])?;
            total += count as u64;
            if count < buffer.len() {
                break;
            }
        }
        let total = u32::try_from(total).map_err(|_| Errno::Overflow)?;
        write_u32(&memory, nread, total)
    }

    /// `fd_write(fd, *iovs, iovs_len, *nwritten) -> errno`
    pub fn fd_write(
        &self,
        fd: Fd,
        iovs: GuestPtr,
        iovs_len: u32,
        nwritten: GuestPtr,
    ) -> Result<()> {
        trace!("fd_write({fd}, iovs={iovs_len})");
        let memory = self.memory()?;
        let vfd = self.vfd_checked(fd, Rights::FD_WRITE, Rights::empty())?;
        let entries = read_iovs(&memory, iovs, iovs_len)?;
        let mut total: u64 = 0;
        for (ptr, len) in entries {
            let bytes = mem_read(&memory, ptr, len)?;
            let count = vfd.write(&bytes).map_err(Errno::from)?;
            total += count as u64;
            if count < bytes.len() {
                break;
            }
        }
        let total = u32::try_from(total).map_err(|_| Errno::Overflow)?;
        write_u32(&memory, nwritten, total)
    }

    /// `fd_pread(fd, *iovs, iovs_len, offset, *nread) -> errno`
    pub fn fd_pread(
        &self,
        fd: Fd,
        iovs: GuestPtr,
        iovs_len: u32,
        offset: u64,
        nread: GuestPtr,
    ) -> Result<()> {
        trace!("fd_pread({fd}, offset={offset})");
        let memory = self.memory()?;
        let vfd = self.vfd_checked(fd, Rights::FD_READ | Rights::FD_SEEK, Rights::empty())?;
        let entries = read_iovs(&memory, iovs, iovs_len)?;
        let mut total: u64 = 0;
        for (ptr, len) in entries {
            let mut buffer = vec![0u8; len as usize];
            let count = vfd.read_at(offset + total, &mut buffer).map_err(Errno::from)?;
            mem_write(&memory, ptr, &buffer[..count])?;
            total += count as u64;
            if count < buffer.len() {
                break;
            }
        }
        let total = u32::try_from(total).map_err(|_| Errno::Overflow)?;
        write_u32(&memory, nread, total)
    }

    /// `fd_pwrite(fd, *iovs, iovs_len, offset, *nwritten) -> errno`
    pub fn fd_pwrite(
        &self,
        fd: Fd,
        iovs: GuestPtr,
        iovs_len: u32,
        offset: u64,
        nwritten: GuestPtr,
    ) -> Result<()> {
        trace!("fd_pwrite({fd}, offset={offset})");
        let memory = self.memory()?;
        let vfd = self.vfd_checked(fd, Rights::FD_WRITE | Rights::FD_SEEK, Rights::empty())?;
        let entries = read_iovs(&memory, iovs, iovs_len)?;
        let mut total: u64 = 0;
        for (ptr, len) in entries {
            let bytes = mem_read(&memory, ptr, len)?;
            let count = vfd.write_at(offset + total, &bytes).map_err(Errno::from)?;
            total += count as u64;
            if count < bytes.len() {
                break;
            }
        }
        let total = u32::try_from(total).map_err(|_| Errno::Overflow)?;
        write_u32(&memory, nwritten, total)
    }

    /// `fd_seek(fd, offset, whence, *newoffset) -> errno`
    pub fn fd_seek(&self, fd: Fd, offset: i64, whence: u8, out: GuestPtr) -> Result<()> {
        trace!("fd_seek({fd}, {offset}, whence={whence})");
        let memory = self.memory()?;
        let whence = Whence::from_u8(whence).ok_or(Errno::Inval)?;
        let vfd = self.vfd_checked(fd, Rights::FD_SEEK, Rights::empty())?;
        let position = vfd.seek(offset, Some(whence)).map_err(Errno::from)?;
        write_u64(&memory, out, position)
    }

    /// `fd_tell(fd, *offset) -> errno`
    pub fn fd_tell(&self, fd: Fd, out: GuestPtr) -> Result<()> {
        trace!("fd_tell({fd})");
        let memory = self.memory()?;
        let vfd = self.vfd_checked(fd, Rights::FD_TELL, Rights::empty())?;
        let position = vfd.seek(0, Some(Whence::Cur)).map_err(Errno::from)?;
        write_u64(&memory, out, position)
    }

    /// `fd_fdstat_get(fd, *fdstat) -> errno`
    pub fn fd_fdstat_get(&self, fd: Fd, out: GuestPtr) -> Result<()> {
        trace!("fd_fdstat_get({fd})");
        let memory = self.memory()?;
        let (vfd, rights, inheriting) = {
            let state = self.lock();
            let fde = state.fds.get(&fd).ok_or(Errno::Badf)?;
            (fde.vfd.clone(), fde.rights, fde.inheriting_rights)
        };
        let info = vfd.info().map_err(Errno::from)?;
        let stat = Fdstat {
            filetype: info.filetype(),
            flags: untranslate_fdflags(&vfd.flags()),
            rights_base: rights.bits(),
            rights_inheriting: inheriting.bits(),
        };
        mem_write(&memory, out, &stat.to_bytes())
    }

    /// `fd_fdstat_set_flags(fd, fdflags) -> errno`
    pub fn fd_fdstat_set_flags(&self, fd: Fd, flags: u16) -> Result<()> {
        trace!("fd_fdstat_set_flags({fd}, {flags:#x})");
        let (vfd_flags, required) = translate_fdflags(flags)?;
        let vfd = self.vfd_checked(fd, Rights::FD_FDSTAT_SET_FLAGS | required, Rights::empty())?;
        vfd.set_flags(vfd_flags).map_err(Errno::from)
    }

    /// `fd_fdstat_set_rights(fd, rights, inheriting_rights) -> errno`
    ///
    /// Rights are monotonic: the new sets must be subsets of the current
    /// ones, and on success they become exactly the requested sets.
    pub fn fd_fdstat_set_rights(&self, fd: Fd, rights: u64, inheriting: u64) -> Result<()> {
        trace!("fd_fdstat_set_rights({fd})");
        let rights = Rights::from_bits(rights).ok_or(Errno::Inval)?;
        let inheriting = Rights::from_bits(inheriting).ok_or(Errno::Inval)?;
        self.with_fde(fd, |fde| {
            if !fde.rights.contains(rights) || !fde.inheriting_rights.contains(inheriting) {
                return Err(Errno::Notcapable);
            }
            fde.rights = rights;
            fde.inheriting_rights = inheriting;
            Ok(())
        })
    }

    /// `fd_filestat_get(fd, *filestat) -> errno`
    pub fn fd_filestat_get(&self, fd: Fd, out: GuestPtr) -> Result<()> {
        trace!("fd_filestat_get({fd})");
        let memory = self.memory()?;
        let vfd = self.vfd_checked(fd, Rights::FD_FILESTAT_GET, Rights::empty())?;
        let info = vfd.info().map_err(Errno::from)?;
        let stat = Filestat {
            dev: info.device,
            ino: info.file_id,
            filetype: info.filetype(),
            nlink: info.num_links,
            size: info.num_bytes,
            atim: info.last_access_time,
            mtim: info.last_write_time,
            ctim: info.last_write_time,
        };
        mem_write(&memory, out, &stat.to_bytes())
    }

    /// `fd_filestat_set_size(fd, size) -> errno`
    pub fn fd_filestat_set_size(&self, fd: Fd, size: u64) -> Result<()> {
        trace!("fd_filestat_set_size({fd}, {size})");
        let vfd = self.vfd_checked(fd, Rights::FD_FILESTAT_SET_SIZE, Rights::empty())?;
        vfd.set_size(size).map_err(Errno::from)
    }

    /// `fd_filestat_set_times(fd, atim, mtim, fstflags) -> errno`
    pub fn fd_filestat_set_times(&self, fd: Fd, atim: u64, mtim: u64, flags: u16) -> Result<()> {
        trace!("fd_filestat_set_times({fd})");
        let (atime, mtime) = self.resolve_times(atim, mtim, flags)?;
        let vfd = self.vfd_checked(fd, Rights::FD_FILESTAT_SET_TIMES, Rights::empty())?;
        vfd.set_times(atime, mtime).map_err(Errno::from)
    }

    /// Resolves `fstflags` into optional timestamps, substituting the
    /// current wall clock for the `*_NOW` bits.
    pub(crate) fn resolve_times(
        &self,
        atim: u64,
        mtim: u64,
        flags: u16,
    ) -> Result<(Option<u64>, Option<u64>)> {
        if flags & !(fstflags::ATIM | fstflags::ATIM_NOW | fstflags::MTIM | fstflags::MTIM_NOW)
            != 0
        {
            return Err(Errno::Inval);
        }
        let now = || self.realtime_now_ns();
        let atime = match (flags & fstflags::ATIM != 0, flags & fstflags::ATIM_NOW != 0) {
            (true, true) => return Err(Errno::Inval),
            (true, false) => Some(atim),
            (false, true) => Some(now()),
            (false, false) => None,
        };
        let mtime = match (flags & fstflags::MTIM != 0, flags & fstflags::MTIM_NOW != 0) {
            (true, true) => return Err(Errno::Inval),
            (true, false) => Some(mtim),
            (false, true) => Some(now()),
            (false, false) => None,
        };
        Ok((atime, mtime))
    }

    /// `fd_advise(fd, offset, len, advice) -> errno`
    ///
    /// Advisory only; validated and discarded.
    pub fn fd_advise(&self, fd: Fd, _offset: u64, _len: u64, advice_byte: u8) -> Result<()> {
        trace!("fd_advise({fd})");
        if advice_byte > advice::NOREUSE {
            return Err(Errno::Inval);
        }
        self.vfd_checked(fd, Rights::FD_ADVISE, Rights::empty())?;
        Ok(())
    }

    /// `fd_allocate(fd, offset, len) -> errno`
    ///
    /// Accepted but unsupported: hosts without a preallocation
    /// capability report `ENOTSUP`.
    pub fn fd_allocate(&self, fd: Fd, _offset: u64, _len: u64) -> Result<()> {
        trace!("fd_allocate({fd})");
        self.vfd_checked(fd, Rights::FD_ALLOCATE, Rights::empty())?;
        Err(Errno::Notsup)
    }

    /// `fd_renumber(from, to) -> errno`
    ///
    /// Atomically replaces descriptor `to` with `from`.
    pub fn fd_renumber(&self, from: Fd, to: Fd) -> Result<()> {
        trace!("fd_renumber({from}, {to})");
        let mut state = self.lock();
        let from_preopened = state
            .fds
            .get(&from)
            .map(|fde| fde.is_preopened)
            .ok_or(Errno::Badf)?;
        let to_preopened = state
            .fds
            .get(&to)
            .map(|fde| fde.is_preopened)
            .ok_or(Errno::Badf)?;
        if from_preopened || to_preopened {
            return Err(Errno::Notsup);
        }
        let fde = state.fds.remove(&from).expect("checked above");
        state.fds.insert(to, fde);
        Ok(())
    }

    /// `fd_readdir(fd, *buf, buf_len, cookie, *bufused) -> errno`
    ///
    /// The directory cursor is cached on the descriptor and re-seeked
    /// when the guest restarts at an earlier `dircookie`. Output is the
    /// standard packed stream of dirent headers and names; a final entry
    /// that does not fit is truncated so the guest knows to come back
    /// with a larger buffer.
    pub fn fd_readdir(
        &self,
        fd: Fd,
        buf: GuestPtr,
        buf_len: u32,
        cookie: u64,
        out_used: GuestPtr,
    ) -> Result<()> {
        trace!("fd_readdir({fd}, cookie={cookie})");
        let memory = self.memory()?;
        let mut output = Vec::with_capacity(buf_len as usize);

        self.with_fde(fd, |fde| {
            fde.check_rights(Rights::FD_READDIR, Rights::empty())?;
            if fde.dir_stream.is_none() {
                fde.dir_stream = Some(fde.vfd.open_dir().map_err(Errno::from)?);
            }
            let stream = fde.dir_stream.as_mut().expect("created above");
            if stream.tell() != cookie {
                stream.seek(cookie).map_err(Errno::from)?;
            }
            while output.len() < buf_len as usize {
                let Some(entry) = stream.next_entry().map_err(Errno::from)? else {
                    break;
                };
                let dirent = Dirent {
                    next: stream.tell(),
                    ino: entry.file_id,
                    namlen: entry.name.len() as u32,
                    filetype: entry.file_type as u8,
                };
                output.extend_from_slice(&dirent.to_bytes());
                output.extend_from_slice(entry.name.as_bytes());
            }
            Ok(())
        })?;

        output.truncate(buf_len as usize);
        mem_write(&memory, buf, &output)?;
        write_u32(&memory, out_used, output.len() as u32)
    }
}
