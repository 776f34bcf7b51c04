//! The `path_*` syscalls.

use super::{read_string, translate_fdflags, write_u32, Result};
use crate::{
    fs::{AccessMode, CreateMode, FileSystem},
    path::canonicalize,
    process::{Fde, WasiProcess},
    rights::Rights,
    types::{oflags, Errno, Fd, Filestat, Filetype, GuestPtr},
};
use cove::Memory;
use std::sync::Arc;
use tracing::trace;

impl WasiProcess {
    /// Validates a `(directory_fd, path)` pair: rights on the directory,
    /// a faultable read of the path bytes, and lexical canonicalization
    /// against the directory's capability path.
    ///
    /// Returns the canonical path and the filesystem capability. Every
    /// failure is reported before any filesystem access.
    pub(crate) fn validate_path(
        &self,
        memory: &Memory,
        dir_fd: Fd,
        _lookup_flags: u32,
        required_rights: Rights,
        required_inheriting: Rights,
        path: GuestPtr,
        path_len: u32,
    ) -> Result<(String, Arc<dyn FileSystem>)> {
        let (dir_path, filesystem) = {
            let state = self.lock();
            let filesystem = state.filesystem.clone().ok_or(Errno::Notcapable)?;
            let fde = state.fds.get(&dir_fd).ok_or(Errno::Badf)?;
            fde.check_rights(required_rights, required_inheriting)?;
            (fde.original_path.clone(), filesystem)
        };
        let relative = read_string(memory, path, path_len)?;
        let canonical = canonicalize(&dir_path, &relative).ok_or(Errno::Notcapable)?;
        Ok((canonical, filesystem))
    }

    /// `path_open(dir_fd, lookupflags, *path, path_len, oflags, rights,
    /// rights_inheriting, fdflags, *fd) -> errno`
    #[allow(clippy::too_many_arguments)]
    pub fn path_open(
        &self,
        dir_fd: Fd,
        lookup_flags: u32,
        path: GuestPtr,
        path_len: u32,
        open_flags: u16,
        rights: u64,
        rights_inheriting: u64,
        fd_flags: u16,
        out_fd: GuestPtr,
    ) -> Result<()> {
        trace!("path_open({dir_fd}, oflags={open_flags:#x})");
        let memory = self.memory()?;
        let requested = Rights::from_bits(rights).ok_or(Errno::Inval)?;
        let requested_inheriting = Rights::from_bits(rights_inheriting).ok_or(Errno::Inval)?;
        let (vfd_flags, flag_rights) = translate_fdflags(fd_flags)?;

        // Opening with some right set requires that right to be
        // inheritable through the directory descriptor.
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            lookup_flags,
            Rights::PATH_OPEN,
            requested | requested_inheriting | flag_rights,
            path,
            path_len,
        )?;

        // The create/exclusive/truncate table; other combinations are
        // invalid.
        let creat = open_flags & oflags::CREAT != 0;
        let excl = open_flags & oflags::EXCL != 0;
        let trunc = open_flags & oflags::TRUNC != 0;
        let create_mode = match (creat, excl, trunc) {
            (false, false, false) => CreateMode::OpenExisting,
            (true, false, false) => CreateMode::OpenAlways,
            (true, true, false) => CreateMode::CreateNew,
            (true, false, true) => CreateMode::CreateAlways,
            (false, false, true) => CreateMode::TruncateExisting,
            _ => return Err(Errno::Inval),
        };
        if creat {
            // Creating needs the corresponding path right as well.
            let state = self.lock();
            let fde = state.fds.get(&dir_fd).ok_or(Errno::Badf)?;
            fde.check_rights(Rights::PATH_CREATE_FILE, Rights::empty())?;
        }

        let wants_read = requested.intersects(Rights::FD_READ | Rights::FD_READDIR);
        let wants_write = requested.intersects(
            Rights::FD_WRITE
                | Rights::FD_ALLOCATE
                | Rights::FD_FILESTAT_SET_SIZE,
        );
        let access = match (wants_read, wants_write) {
            (true, true) => AccessMode::ReadWrite,
            (true, false) => AccessMode::Read,
            (false, true) => AccessMode::Write,
            (false, false) => AccessMode::None,
        };

        let vfd = filesystem
            .open(&canonical, access, create_mode, vfd_flags)
            .map_err(Errno::from)?;

        let info = vfd.info().map_err(Errno::from)?;
        let is_directory = info.file_type == Some(Filetype::Directory);
        if open_flags & oflags::DIRECTORY != 0 && !is_directory {
            return Err(Errno::Notdir);
        }

        let fd = self.insert_fde(Fde {
            vfd,
            rights: requested,
            inheriting_rights: requested_inheriting,
            original_path: canonical,
            is_preopened: false,
            is_directory,
            dir_stream: None,
        })?;
        write_u32(&memory, out_fd, fd)
    }

    /// `path_create_directory(fd, *path, path_len) -> errno`
    pub fn path_create_directory(&self, dir_fd: Fd, path: GuestPtr, path_len: u32) -> Result<()> {
        trace!("path_create_directory({dir_fd})");
        let memory = self.memory()?;
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            0,
            Rights::PATH_CREATE_DIRECTORY,
            Rights::empty(),
            path,
            path_len,
        )?;
        filesystem.create_dir(&canonical).map_err(Errno::from)
    }

    /// `path_remove_directory(fd, *path, path_len) -> errno`
    pub fn path_remove_directory(&self, dir_fd: Fd, path: GuestPtr, path_len: u32) -> Result<()> {
        trace!("path_remove_directory({dir_fd})");
        let memory = self.memory()?;
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            0,
            Rights::PATH_REMOVE_DIRECTORY,
            Rights::empty(),
            path,
            path_len,
        )?;
        filesystem.remove_dir(&canonical).map_err(Errno::from)
    }

    /// `path_unlink_file(fd, *path, path_len) -> errno`
    pub fn path_unlink_file(&self, dir_fd: Fd, path: GuestPtr, path_len: u32) -> Result<()> {
        trace!("path_unlink_file({dir_fd})");
        let memory = self.memory()?;
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            0,
            Rights::PATH_UNLINK_FILE,
            Rights::empty(),
            path,
            path_len,
        )?;
        filesystem.unlink_file(&canonical).map_err(Errno::from)
    }

    /// `path_filestat_get(fd, lookupflags, *path, path_len, *filestat) -> errno`
    pub fn path_filestat_get(
        &self,
        dir_fd: Fd,
        lookup_flags: u32,
        path: GuestPtr,
        path_len: u32,
        out: GuestPtr,
    ) -> Result<()> {
        trace!("path_filestat_get({dir_fd})");
        let memory = self.memory()?;
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            lookup_flags,
            Rights::PATH_FILESTAT_GET,
            Rights::empty(),
            path,
            path_len,
        )?;
        let info = filesystem.file_info(&canonical).map_err(Errno::from)?;
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
        super::mem_write(&memory, out, &stat.to_bytes())
    }

    /// `path_filestat_set_times(fd, lookupflags, *path, path_len, atim,
    /// mtim, fstflags) -> errno`
    #[allow(clippy::too_many_arguments)]
    pub fn path_filestat_set_times(
        &self,
        dir_fd: Fd,
        lookup_flags: u32,
        path: GuestPtr,
        path_len: u32,
        atim: u64,
        mtim: u64,
        fst_flags: u16,
    ) -> Result<()> {
        trace!("path_filestat_set_times({dir_fd})");
        let memory = self.memory()?;
        let (atime, mtime) = self.resolve_times(atim, mtim, fst_flags)?;
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            lookup_flags,
            Rights::PATH_FILESTAT_SET_TIMES,
            Rights::empty(),
            path,
            path_len,
        )?;
        filesystem
            .set_file_times(&canonical, atime, mtime)
            .map_err(Errno::from)
    }

    /// `path_link(old_fd, old_flags, *old_path, old_path_len, new_fd,
    /// *new_path, new_path_len) -> errno`
    #[allow(clippy::too_many_arguments)]
    pub fn path_link(
        &self,
        old_fd: Fd,
        old_flags: u32,
        old_path: GuestPtr,
        old_path_len: u32,
        new_fd: Fd,
        new_path: GuestPtr,
        new_path_len: u32,
    ) -> Result<()> {
        trace!("path_link({old_fd} -> {new_fd})");
        let memory = self.memory()?;
        let (from, filesystem) = self.validate_path(
            &memory,
            old_fd,
            old_flags,
            Rights::PATH_LINK_SOURCE,
            Rights::empty(),
            old_path,
            old_path_len,
        )?;
        let (to, _) = self.validate_path(
            &memory,
            new_fd,
            0,
            Rights::PATH_LINK_TARGET,
            Rights::empty(),
            new_path,
            new_path_len,
        )?;
        filesystem.link(&from, &to).map_err(Errno::from)
    }

    /// `path_rename(old_fd, *old_path, old_path_len, new_fd, *new_path,
    /// new_path_len) -> errno`
    #[allow(clippy::too_many_arguments)]
    pub fn path_rename(
        &self,
        old_fd: Fd,
        old_path: GuestPtr,
        old_path_len: u32,
        new_fd: Fd,
        new_path: GuestPtr,
        new_path_len: u32,
    ) -> Result<()> {
        trace!("path_rename({old_fd} -> {new_fd})");
        let memory = self.memory()?;
        let (from, filesystem) = self.validate_path(
            &memory,
            old_fd,
            0,
            Rights::PATH_RENAME_SOURCE,
            Rights::empty(),
            old_path,
            old_path_len,
        )?;
        let (to, _) = self.validate_path(
            &memory,
            new_fd,
            0,
            Rights::PATH_RENAME_TARGET,
            Rights::empty(),
            new_path,
            new_path_len,
        )?;
        filesystem.rename(&from, &to).map_err(Errno::from)
    }

    /// `path_symlink(*target, target_len, fd, *path, path_len) -> errno`
    pub fn path_symlink(
        &self,
        target: GuestPtr,
        target_len: u32,
        dir_fd: Fd,
        path: GuestPtr,
        path_len: u32,
    ) -> Result<()> {
        trace!("path_symlink({dir_fd})");
        let memory = self.memory()?;
        // The target is the link's content, not a capability path.
        let target = read_string(&memory, target, target_len)?;
        let (link, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            0,
            Rights::PATH_SYMLINK,
            Rights::empty(),
            path,
            path_len,
        )?;
        filesystem.symlink(&target, &link).map_err(Errno::from)
    }

    /// `path_readlink(fd, *path, path_len, *buf, buf_len, *bufused) -> errno`
    #[allow(clippy::too_many_arguments)]
    pub fn path_readlink(
        &self,
        dir_fd: Fd,
        path: GuestPtr,
        path_len: u32,
        buf: GuestPtr,
        buf_len: u32,
        out_used: GuestPtr,
    ) -> Result<()> {
        trace!("path_readlink({dir_fd})");
        let memory = self.memory()?;
        let (canonical, filesystem) = self.validate_path(
            &memory,
            dir_fd,
            0,
            Rights::PATH_READLINK,
            Rights::empty(),
            path,
            path_len,
        )?;
        let target = filesystem.read_link(&canonical).map_err(Errno::from)?;
        if target.len() > buf_len as usize {
            return Err(Errno::Overflow);
        }
        super::mem_write(&memory, buf, target.as_bytes())?;
        write_u32(&memory, out_used, target.len() as u32)
    }
}
