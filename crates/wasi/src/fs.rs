//! The filesystem capability consumed by the host-call layer.
//!
//! The core never touches a host filesystem directly: every path and
//! descriptor operation is delegated through [`FileSystem`], [`Vfd`] and
//! [`DirStream`]. Implementations are external collaborators; this crate
//! only ships [`crate::memfs`] for tests and simple embeddings, plus the
//! in-memory [`ReadPipe`]/[`WritePipe`] used for the standard streams.

use crate::types::{Errno, Filetype, Timestamp};
use std::sync::{Arc, Mutex};

/// The host-side result taxonomy of filesystem operations.
///
/// Mapped to guest errnos by [`Errno::from`]; the mapping is total so
/// new variants cannot silently leak host errors to guests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("operation is still pending")]
    IoPending,
    #[error("device error")]
    DeviceError,
    #[error("interrupted")]
    Interrupted,
    #[error("operation would block")]
    WouldBlock,
    #[error("invalid buffer")]
    InvalidBuffer,
    #[error("invalid offset")]
    InvalidOffset,
    #[error("not seekable")]
    NotSeekable,
    #[error("not permitted")]
    NotPermitted,
    #[error("not accessible")]
    NotAccessible,
    #[error("not synchronizable")]
    NotSynchronizable,
    #[error("size limit exceeded")]
    SizeLimitExceeded,
    #[error("out of system file descriptors")]
    OutOfSystemFds,
    #[error("out of process file descriptors")]
    OutOfProcessFds,
    #[error("out of memory")]
    OutOfMemory,
    #[error("out of quota")]
    OutOfQuota,
    #[error("out of space")]
    OutOfSpace,
    #[error("too many links")]
    TooManyLinks,
    #[error("already exists")]
    AlreadyExists,
    #[error("does not exist")]
    DoesNotExist,
    #[error("is a directory")]
    IsDirectory,
    #[error("is not a directory")]
    IsNotDirectory,
    #[error("is not empty")]
    IsNotEmpty,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("busy")]
    Busy,
    #[error("name too long")]
    NameTooLong,
}

impl From<FsError> for Errno {
    /// The total host-result to guest-errno mapping.
    fn from(error: FsError) -> Self {
        match error {
            FsError::IoPending => Errno::Inprogress,
            FsError::DeviceError => Errno::Io,
            FsError::Interrupted => Errno::Intr,
            FsError::WouldBlock => Errno::Again,
            FsError::InvalidBuffer => Errno::Fault,
            FsError::InvalidOffset => Errno::Inval,
            FsError::NotSeekable => Errno::Spipe,
            FsError::NotPermitted => Errno::Perm,
            FsError::NotAccessible => Errno::Acces,
            FsError::NotSynchronizable => Errno::Inval,
            FsError::SizeLimitExceeded => Errno::Fbig,
            FsError::OutOfSystemFds => Errno::Nfile,
            FsError::OutOfProcessFds => Errno::Mfile,
            FsError::OutOfMemory => Errno::Nomem,
            FsError::OutOfQuota => Errno::Dquot,
            FsError::OutOfSpace => Errno::Nospc,
            FsError::TooManyLinks => Errno::Mlink,
            FsError::AlreadyExists => Errno::Exist,
            FsError::DoesNotExist => Errno::Noent,
            FsError::IsDirectory => Errno::Isdir,
            FsError::IsNotDirectory => Errno::Notdir,
            FsError::IsNotEmpty => Errno::Notempty,
            FsError::BrokenPipe => Errno::Pipe,
            FsError::Busy => Errno::Busy,
            FsError::NameTooLong => Errno::Nametoolong,
        }
    }
}

/// How `open` treats an existing or missing file, per the
/// create/exclusive/truncate combination table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreateMode {
    /// Open only if the file exists.
    OpenExisting,
    /// Open the file, creating it if missing.
    OpenAlways,
    /// Create the file; fail if it exists.
    CreateNew,
    /// Create or truncate the file.
    CreateAlways,
    /// Open and truncate; fail if missing.
    TruncateExisting,
}

/// The requested access of an `open`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessMode {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
    /// Neither: metadata access only.
    None,
}

/// The five durability levels of descriptor writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SyncLevel {
    /// No implicit synchronization.
    #[default]
    None,
    /// File contents are synchronized after each write.
    ContentsAfterWrite,
    /// Contents synchronized after writes and before reads.
    ContentsAfterWriteAndBeforeRead,
    /// Contents and metadata synchronized after each write.
    ContentsAndMetadataAfterWrite,
    /// Contents and metadata after writes, and before reads.
    ContentsAndMetadataAfterWriteAndBeforeRead,
}

/// The descriptor-level flags translated from guest `fdflags`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct VfdFlags {
    /// Writes append to the end of the file.
    pub append: bool,
    /// Operations fail with [`FsError::WouldBlock`] instead of blocking.
    pub non_blocking: bool,
    /// The implicit synchronization level.
    pub sync_level: SyncLevel,
}

/// What `sync` must flush.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncKind {
    /// File contents only.
    Contents,
    /// Contents and metadata.
    ContentsAndMetadata,
}

/// Metadata of a file or directory.
#[derive(Debug, Copy, Clone, Default)]
pub struct FileInfo {
    /// Device id.
    pub device: u64,
    /// File id on its device.
    pub file_id: u64,
    /// The file type.
    pub file_type: Option<Filetype>,
    /// Hard-link count.
    pub num_links: u64,
    /// Size in bytes.
    pub num_bytes: u64,
    /// Last access time in nanoseconds.
    pub last_access_time: Timestamp,
    /// Last write time in nanoseconds.
    pub last_write_time: Timestamp,
}

impl FileInfo {
    /// Returns the WASI file type byte.
    pub fn filetype(&self) -> u8 {
        self.file_type.unwrap_or(Filetype::Unknown) as u8
    }
}

/// A directory entry yielded by a [`DirStream`].
#[derive(Debug, Clone)]
pub struct DirEnt {
    /// The entry name.
    pub name: String,
    /// The entry type.
    pub file_type: Filetype,
    /// The file id, reported as the inode.
    pub file_id: u64,
}

/// A stateful directory cursor.
///
/// `fd_readdir` caches one stream per descriptor and re-seeks it when
/// the guest restarts enumeration at a `dircookie`.
pub trait DirStream: Send {
    /// Returns the next entry, or `None` at the end.
    ///
    /// # Errors
    ///
    /// If the underlying enumeration fails.
    fn next_entry(&mut self) -> Result<Option<DirEnt>, FsError>;

    /// Restarts enumeration at the given cookie.
    ///
    /// Cookie `0` restarts from the beginning; other values are the
    /// `tell` positions of previously yielded entries.
    ///
    /// # Errors
    ///
    /// If the cookie does not name a valid position.
    fn seek(&mut self, cookie: u64) -> Result<(), FsError>;

    /// Returns the cookie of the next entry.
    fn tell(&self) -> u64;
}

/// An open file handle.
pub trait Vfd: Send + Sync {
    /// Reads at the current offset, advancing it.
    ///
    /// # Errors
    ///
    /// If the handle is not readable or the device fails.
    fn read(&self, buffer: &mut [u8]) -> Result<usize, FsError>;

    /// Writes at the current offset (or the end in append mode),
    /// advancing it.
    ///
    /// # Errors
    ///
    /// If the handle is not writable or the device fails.
    fn write(&self, buffer: &[u8]) -> Result<usize, FsError>;

    /// Reads at an explicit offset without moving the cursor.
    ///
    /// # Errors
    ///
    /// If the handle is not seekable or the device fails.
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize, FsError>;

    /// Writes at an explicit offset without moving the cursor.
    ///
    /// # Errors
    ///
    /// If the handle is not seekable or the device fails.
    fn write_at(&self, offset: u64, buffer: &[u8]) -> Result<usize, FsError>;

    /// Moves the cursor and returns the new absolute offset.
    ///
    /// # Errors
    ///
    /// [`FsError::NotSeekable`] on pipes and other unseekable handles,
    /// [`FsError::InvalidOffset`] if the target is out of range.
    fn seek(&self, offset: i64, relative_to_end: Option<crate::types::Whence>) -> Result<u64, FsError>;

    /// Flushes buffered state.
    ///
    /// # Errors
    ///
    /// If the handle cannot synchronize.
    fn sync(&self, kind: SyncKind) -> Result<(), FsError>;

    /// Updates the descriptor flags.
    ///
    /// # Errors
    ///
    /// If the handle does not support the requested flags.
    fn set_flags(&self, flags: VfdFlags) -> Result<(), FsError>;

    /// Returns the descriptor flags.
    fn flags(&self) -> VfdFlags;

    /// Returns the file metadata.
    ///
    /// # Errors
    ///
    /// If the metadata cannot be read.
    fn info(&self) -> Result<FileInfo, FsError>;

    /// Truncates or extends the file.
    ///
    /// # Errors
    ///
    /// If the handle is not a writable regular file.
    fn set_size(&self, size: u64) -> Result<(), FsError>;

    /// Updates the file times.
    ///
    /// # Errors
    ///
    /// If the times cannot be set.
    fn set_times(
        &self,
        atime: Option<Timestamp>,
        mtime: Option<Timestamp>,
    ) -> Result<(), FsError>;

    /// Opens a directory cursor over the handle.
    ///
    /// # Errors
    ///
    /// [`FsError::IsNotDirectory`] unless the handle is a directory.
    fn open_dir(&self) -> Result<Box<dyn DirStream>, FsError>;
}

/// The filesystem capability.
///
/// All paths are canonical (see [`crate::path`]) and absolute within the
/// capability's namespace.
pub trait FileSystem: Send + Sync {
    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Per [`FsError`]; notably [`FsError::DoesNotExist`] when a parent
    /// directory is missing even under a creating [`CreateMode`].
    fn open(
        &self,
        path: &str,
        access: AccessMode,
        create: CreateMode,
        flags: VfdFlags,
    ) -> Result<Arc<dyn Vfd>, FsError>;

    /// Returns the metadata of `path` without opening it.
    ///
    /// # Errors
    ///
    /// If the path does not resolve.
    fn file_info(&self, path: &str) -> Result<FileInfo, FsError>;

    /// Sets the times of `path`.
    ///
    /// # Errors
    ///
    /// If the path does not resolve or times cannot be set.
    fn set_file_times(
        &self,
        path: &str,
        atime: Option<Timestamp>,
        mtime: Option<Timestamp>,
    ) -> Result<(), FsError>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// [`FsError::IsDirectory`] if the path names a directory.
    fn unlink_file(&self, path: &str) -> Result<(), FsError>;

    /// Removes the empty directory at `path`.
    ///
    /// # Errors
    ///
    /// [`FsError::IsNotEmpty`] if the directory has entries.
    fn remove_dir(&self, path: &str) -> Result<(), FsError>;

    /// Creates a directory at `path`.
    ///
    /// # Errors
    ///
    /// [`FsError::AlreadyExists`] if the path exists.
    fn create_dir(&self, path: &str) -> Result<(), FsError>;

    /// Creates a hard link. Optional; defaults to not-permitted.
    ///
    /// # Errors
    ///
    /// [`FsError::NotPermitted`] unless the capability supports links.
    fn link(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    /// Renames `from` to `to`.
    ///
    /// # Errors
    ///
    /// If either path does not resolve.
    fn rename(&self, from: &str, to: &str) -> Result<(), FsError>;

    /// Creates a symlink at `to` pointing at `from`. Optional.
    ///
    /// # Errors
    ///
    /// [`FsError::NotPermitted`] unless the capability supports
    /// symlinks.
    fn symlink(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    /// Reads the target of the symlink at `path`. Optional.
    ///
    /// # Errors
    ///
    /// [`FsError::NotPermitted`] unless the capability supports
    /// symlinks.
    fn read_link(&self, _path: &str) -> Result<String, FsError> {
        Err(FsError::NotPermitted)
    }
}

/// An in-memory readable stream, usable as guest stdin.
#[derive(Debug, Clone)]
pub struct ReadPipe {
    state: Arc<Mutex<(Vec<u8>, usize)>>,
    flags: Arc<Mutex<VfdFlags>>,
}

impl ReadPipe {
    /// Creates a pipe yielding the given bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            state: Arc::new(Mutex::new((bytes.into(), 0))),
            flags: Arc::new(Mutex::new(VfdFlags::default())),
        }
    }
}

impl Vfd for ReadPipe {
    fn read(&self, buffer: &mut [u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock().expect("pipe lock");
        let (bytes, cursor) = &mut *state;
        let available = &bytes[(*cursor).min(bytes.len())..];
        let count = available.len().min(buffer.len());
        buffer[..count].copy_from_slice(&available[..count]);
        *cursor += count;
        Ok(count)
    }

    fn write(&self, _buffer: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotPermitted)
    }

    fn read_at(&self, _offset: u64, _buffer: &mut [u8]) -> Result<usize, FsError> {
        Err(FsError::NotSeekable)
    }

    fn write_at(&self, _offset: u64, _buffer: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSeekable)
    }

    fn seek(&self, _offset: i64, _whence: Option<crate::types::Whence>) -> Result<u64, FsError> {
        Err(FsError::NotSeekable)
    }

    fn sync(&self, _kind: SyncKind) -> Result<(), FsError> {
        Ok(())
    }

    fn set_flags(&self, flags: VfdFlags) -> Result<(), FsError> {
        *self.flags.lock().expect("pipe lock") = flags;
        Ok(())
    }

    fn flags(&self) -> VfdFlags {
        *self.flags.lock().expect("pipe lock")
    }

    fn info(&self) -> Result<FileInfo, FsError> {
        Ok(FileInfo {
            file_type: Some(Filetype::CharacterDevice),
            ..FileInfo::default()
        })
    }

    fn set_size(&self, _size: u64) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    fn set_times(
        &self,
        _atime: Option<Timestamp>,
        _mtime: Option<Timestamp>,
    ) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    fn open_dir(&self) -> Result<Box<dyn DirStream>, FsError> {
        Err(FsError::IsNotDirectory)
    }
}

/// An in-memory writable stream, usable as guest stdout/stderr.
#[derive(Debug, Clone, Default)]
pub struct WritePipe {
    state: Arc<Mutex<Vec<u8>>>,
    flags: Arc<Mutex<VfdFlags>>,
}

impl WritePipe {
    /// Creates an empty pipe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().expect("pipe lock").clone()
    }
}

impl Vfd for WritePipe {
    fn read(&self, _buffer: &mut [u8]) -> Result<usize, FsError> {
        Err(FsError::NotPermitted)
    }

    fn write(&self, buffer: &[u8]) -> Result<usize, FsError> {
        self.state
            .lock()
            .expect("pipe lock")
            .extend_from_slice(buffer);
        Ok(buffer.len())
    }

    fn read_at(&self, _offset: u64, _buffer: &mut [u8]) -> Result<usize, FsError> {
        Err(FsError::NotSeekable)
    }

    fn write_at(&self, _offset: u64, _buffer: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSeekable)
    }

    fn seek(&self, _offset: i64, _whence: Option<crate::types::Whence>) -> Result<u64, FsError> {
        Err(FsError::NotSeekable)
    }

    fn sync(&self, _kind: SyncKind) -> Result<(), FsError> {
        Ok(())
    }

    fn set_flags(&self, flags: VfdFlags) -> Result<(), FsError> {
        *self.flags.lock().expect("pipe lock") = flags;
        Ok(())
    }

    fn flags(&self) -> VfdFlags {
        *self.flags.lock().expect("pipe lock")
    }

    fn info(&self) -> Result<FileInfo, FsError> {
        Ok(FileInfo {
            file_type: Some(Filetype::CharacterDevice),
            ..FileInfo::default()
        })
    }

    fn set_size(&self, _size: u64) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    fn set_times(
        &self,
        _atime: Option<Timestamp>,
        _mtime: Option<Timestamp>,
    ) -> Result<(), FsError> {
        Err(FsError::NotPermitted)
    }

    fn open_dir(&self) -> Result<Box<dyn DirStream>, FsError> {
        Err(FsError::IsNotDirectory)
    }
}
