//! The guest-visible WASI preview1 ABI: error numbers, flag words and
//! the packed structures written into guest memory.
//!
//! Layouts are fixed by the ABI and written field by field in little
//! endian; nothing here derives its layout from Rust.

/// A WASI errno, returned to the guest from every syscall.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Errno {
    Success = 0,
    Toobig = 1,
    Acces = 2,
    Addrinuse = 3,
    Addrnotavail = 4,
    Afnosupport = 5,
    Again = 6,
    Already = 7,
    Badf = 8,
    Badmsg = 9,
    Busy = 10,
    Canceled = 11,
    Child = 12,
    Connaborted = 13,
    Connrefused = 14,
    Connreset = 15,
    Deadlk = 16,
    Destaddrreq = 17,
    Dom = 18,
    Dquot = 19,
    Exist = 20,
    Fault = 21,
    Fbig = 22,
    Hostunreach = 23,
    Idrm = 24,
    Ilseq = 25,
    Inprogress = 26,
    Intr = 27,
    Inval = 28,
    Io = 29,
    Isconn = 30,
    Isdir = 31,
    Loop = 32,
    Mfile = 33,
    Mlink = 34,
    Msgsize = 35,
    Multihop = 36,
    Nametoolong = 37,
    Netdown = 38,
    Netreset = 39,
    Netunreach = 40,
    Nfile = 41,
    Nobufs = 42,
    Nodev = 43,
    Noent = 44,
    Noexec = 45,
    Nolck = 46,
    Nolink = 47,
    Nomem = 48,
    Nomsg = 49,
    Noprotoopt = 50,
    Nospc = 51,
    Nosys = 52,
    Notconn = 53,
    Notdir = 54,
    Notempty = 55,
    Notrecoverable = 56,
    Notsock = 57,
    Notsup = 58,
    Notty = 59,
    Nxio = 60,
    Overflow = 61,
    Ownerdead = 62,
    Perm = 63,
    Pipe = 64,
    Proto = 65,
    Protonosupport = 66,
    Prototype = 67,
    Range = 68,
    Rofs = 69,
    Spipe = 70,
    Srch = 71,
    Stale = 72,
    Timedout = 73,
    Txtbsy = 74,
    Xdev = 75,
    Notcapable = 76,
}

/// The guest file-descriptor number type.
pub type Fd = u32;

/// A guest pointer into linear memory.
pub type GuestPtr = u32;

/// The WASI file types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Filetype {
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

/// `fdflags`: the per-descriptor flag word.
pub mod fdflags {
    /// Append mode.
    pub const APPEND: u16 = 1 << 0;
    /// Data sync after every write.
    pub const DSYNC: u16 = 1 << 1;
    /// Non-blocking mode.
    pub const NONBLOCK: u16 = 1 << 2;
    /// Sync before reads as well.
    pub const RSYNC: u16 = 1 << 3;
    /// Full (contents and metadata) sync after every write.
    pub const SYNC: u16 = 1 << 4;
    /// Every defined flag.
    pub const ALL: u16 = APPEND | DSYNC | NONBLOCK | RSYNC | SYNC;
}

/// `oflags`: the `path_open` open flags.
pub mod oflags {
    /// Create the file if it does not exist.
    pub const CREAT: u16 = 1 << 0;
    /// Fail unless the path names a directory.
    pub const DIRECTORY: u16 = 1 << 1;
    /// Fail if the file already exists.
    pub const EXCL: u16 = 1 << 2;
    /// Truncate the file to length zero.
    pub const TRUNC: u16 = 1 << 3;
}

/// `lookupflags`: path resolution flags.
pub mod lookupflags {
    /// Follow symlinks in the final component.
    pub const SYMLINK_FOLLOW: u32 = 1 << 0;
}

/// `fstflags`: which timestamps `*_set_times` updates.
pub mod fstflags {
    /// Set the access time to the supplied timestamp.
    pub const ATIM: u16 = 1 << 0;
    /// Set the access time to now.
    pub const ATIM_NOW: u16 = 1 << 1;
    /// Set the modification time to the supplied timestamp.
    pub const MTIM: u16 = 1 << 2;
    /// Set the modification time to now.
    pub const MTIM_NOW: u16 = 1 << 3;
}

/// `whence` values of `fd_seek`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Whence {
    /// Seek relative to the file start.
    Set = 0,
    /// Seek relative to the current offset.
    Cur = 1,
    /// Seek relative to the file end.
    End = 2,
}

impl Whence {
    /// Decodes a guest `whence` byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Set,
            1 => Self::Cur,
            2 => Self::End,
            _ => return None,
        })
    }
}

/// The clock ids of `clock_time_get`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ClockId {
    /// Wall-clock time since the epoch.
    Realtime = 0,
    /// Monotonic time since an arbitrary origin.
    Monotonic = 1,
    /// CPU time consumed by the process.
    ProcessCputime = 2,
    /// CPU time consumed by the calling thread.
    ThreadCputime = 3,
}

impl ClockId {
    /// Decodes a guest clock id.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Realtime,
            1 => Self::Monotonic,
            2 => Self::ProcessCputime,
            3 => Self::ThreadCputime,
            _ => return None,
        })
    }
}

/// A timestamp in nanoseconds.
pub type Timestamp = u64;

/// The `filestat` structure (64 bytes).
#[derive(Debug, Copy, Clone, Default)]
pub struct Filestat {
    /// Device id.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// File type.
    pub filetype: u8,
    /// Hard link count.
    pub nlink: u64,
    /// File size in bytes.
    pub size: u64,
    /// Last access timestamp.
    pub atim: Timestamp,
    /// Last modification timestamp.
    pub mtim: Timestamp,
    /// Last status-change timestamp.
    pub ctim: Timestamp,
}

impl Filestat {
    /// The packed ABI size.
    pub const SIZE: u32 = 64;

    /// Packs the structure into its ABI bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..8].copy_from_slice(&self.dev.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.ino.to_le_bytes());
        bytes[16] = self.filetype;
        bytes[24..32].copy_from_slice(&self.nlink.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.size.to_le_bytes());
        bytes[40..48].copy_from_slice(&self.atim.to_le_bytes());
        bytes[48..56].copy_from_slice(&self.mtim.to_le_bytes());
        bytes[56..64].copy_from_slice(&self.ctim.to_le_bytes());
        bytes
    }
}

/// The `fdstat` structure (24 bytes).
#[derive(Debug, Copy, Clone)]
pub struct Fdstat {
    /// The file type behind the descriptor.
    pub filetype: u8,
    /// The descriptor flags.
    pub flags: u16,
    /// The rights of the descriptor.
    pub rights_base: u64,
    /// The rights inherited by descriptors opened through it.
    pub rights_inheriting: u64,
}

impl Fdstat {
    /// The packed ABI size.
    pub const SIZE: u32 = 24;

    /// Packs the structure into its ABI bytes.
    pub fn to_bytes(&self) -> [u8; 24] {
        let mut bytes = [0u8; 24];
        bytes[0] = self.filetype;
        bytes[2..4].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.rights_base.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.rights_inheriting.to_le_bytes());
        bytes
    }
}

/// The `dirent` header preceding each name in `fd_readdir` output
/// (24 bytes).
#[derive(Debug, Copy, Clone)]
pub struct Dirent {
    /// The cookie of the *next* entry.
    pub next: u64,
    /// Inode number.
    pub ino: u64,
    /// Length of the following name.
    pub namlen: u32,
    /// File type.
    pub filetype: u8,
}

impl Dirent {
    /// The packed ABI size.
    pub const SIZE: u32 = 24;

    /// Packs the structure into its ABI bytes.
    pub fn to_bytes(&self) -> [u8; 24] {
        let mut bytes = [0u8; 24];
        bytes[0..8].copy_from_slice(&self.next.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.ino.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.namlen.to_le_bytes());
        bytes[20] = self.filetype;
        bytes
    }
}

/// Subscription tags of `poll_oneoff`.
pub mod eventtype {
    /// A clock timeout.
    pub const CLOCK: u8 = 0;
    /// A descriptor became readable.
    pub const FD_READ: u8 = 1;
    /// A descriptor became writable.
    pub const FD_WRITE: u8 = 2;
}

/// The `subscription.clock` flag marking an absolute timeout.
pub const SUBCLOCKFLAGS_ABSTIME: u16 = 1 << 0;

/// The advice values of `fd_advise`.
pub mod advice {
    /// No particular access pattern.
    pub const NORMAL: u8 = 0;
    /// Sequential access expected.
    pub const SEQUENTIAL: u8 = 1;
    /// Random access expected.
    pub const RANDOM: u8 = 2;
    /// The range will be needed soon.
    pub const WILLNEED: u8 = 3;
    /// The range will not be needed soon.
    pub const DONTNEED: u8 = 4;
    /// The range will be accessed once.
    pub const NOREUSE: u8 = 5;
}
