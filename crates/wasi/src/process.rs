//! The WASI process: argument and environment vectors, the descriptor
//! table with its capability rights, and the clocks.

use crate::{
    fs::{DirStream, FileSystem, ReadPipe, Vfd, WritePipe},
    rights::Rights,
    types::{Errno, Fd},
};
use cove::Memory;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A file-descriptor table entry.
pub(crate) struct Fde {
    /// The underlying handle.
    pub vfd: Arc<dyn Vfd>,
    /// The rights exercisable through this descriptor.
    pub rights: Rights,
    /// The rights descriptors opened through this one may carry.
    pub inheriting_rights: Rights,
    /// The canonical path the descriptor was opened with.
    ///
    /// Path syscalls resolve their operands against this.
    pub original_path: String,
    /// Whether the descriptor was inserted at process start.
    pub is_preopened: bool,
    /// Whether the preopen names a directory.
    pub is_directory: bool,
    /// The cached `fd_readdir` cursor, created on first use and
    /// re-seeked when the guest restarts at a cookie.
    pub dir_stream: Option<Box<dyn DirStream>>,
}

impl Fde {
    /// Checks the required rights, failing with `ENOTCAPABLE`.
    pub fn check_rights(&self, rights: Rights, inheriting: Rights) -> Result<(), Errno> {
        if !self.rights.contains(rights) || !self.inheriting_rights.contains(inheriting) {
            return Err(Errno::Notcapable);
        }
        Ok(())
    }
}

pub(crate) struct ProcessState {
    pub args: Vec<String>,
    /// Environment entries in `KEY=VALUE` form.
    pub envs: Vec<String>,
    pub fds: BTreeMap<Fd, Fde>,
    /// Descriptor numbers are stable and monotonic.
    pub next_fd: Fd,
    pub filesystem: Option<Arc<dyn FileSystem>>,
    /// The guest memory, registered after instantiation.
    pub memory: Option<Memory>,
}

/// An isolated WASI process.
///
/// Holds everything the syscall surface needs: argv/env, the descriptor
/// table, the filesystem capability and the start-time clocks. Shared
/// with the host functions behind an [`Arc`].
pub struct WasiProcess {
    pub(crate) state: Mutex<ProcessState>,
    /// Wall-clock nanoseconds at process creation.
    pub(crate) start_realtime_ns: u64,
    /// Monotonic origin of the process.
    pub(crate) start_instant: Instant,
}

impl WasiProcess {
    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().expect("process state lock")
    }

    /// Registers the guest memory the syscalls marshal through.
    ///
    /// Call once after instantiating the guest module with this
    /// process's imports.
    pub fn set_memory(&self, memory: Memory) {
        self.lock().memory = Some(memory);
    }

    /// Returns the registered guest memory.
    pub(crate) fn memory(&self) -> Result<Memory, Errno> {
        self.lock().memory.clone().ok_or(Errno::Inval)
    }

    /// Returns the wall-clock nanoseconds of process start.
    pub fn start_realtime_ns(&self) -> u64 {
        self.start_realtime_ns
    }

    /// Inserts a descriptor, returning its number.
    pub(crate) fn insert_fde(&self, fde: Fde) -> Result<Fd, Errno> {
        let mut state = self.lock();
        let fd = state.next_fd;
        state.next_fd = state.next_fd.checked_add(1).ok_or(Errno::Mfile)?;
        state.fds.insert(fd, fde);
        Ok(fd)
    }
}

/// Builds a [`WasiProcess`].
///
/// Standard streams default to an empty stdin pipe and in-memory
/// stdout/stderr pipes; a root preopen appears at descriptor 3 when a
/// filesystem capability is supplied.
pub struct WasiProcessBuilder {
    args: Vec<String>,
    envs: Vec<String>,
    stdin: Arc<dyn Vfd>,
    stdout: Arc<dyn Vfd>,
    stderr: Arc<dyn Vfd>,
    filesystem: Option<(Arc<dyn FileSystem>, String)>,
}

impl Default for WasiProcessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WasiProcessBuilder {
    /// Creates a builder with empty vectors and pipe streams.
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            envs: Vec::new(),
            stdin: Arc::new(ReadPipe::new(Vec::new())),
            stdout: Arc::new(WritePipe::new()),
            stderr: Arc::new(WritePipe::new()),
            filesystem: None,
        }
    }

    /// Appends a program argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Replaces the stdin stream.
    pub fn stdin(mut self, vfd: Arc<dyn Vfd>) -> Self {
        self.stdin = vfd;
        self
    }

    /// Replaces the stdout stream.
    pub fn stdout(mut self, vfd: Arc<dyn Vfd>) -> Self {
        self.stdout = vfd;
        self
    }

    /// Replaces the stderr stream.
    pub fn stderr(mut self, vfd: Arc<dyn Vfd>) -> Self {
        self.stderr = vfd;
        self
    }

    /// Grants the process a filesystem capability rooted at
    /// `preopen_path`.
    pub fn filesystem(
        mut self,
        filesystem: Arc<dyn FileSystem>,
        preopen_path: impl Into<String>,
    ) -> Self {
        self.filesystem = Some((filesystem, preopen_path.into()));
        self
    }

    /// Builds the process with its preopened descriptors.
    ///
    /// # Errors
    ///
    /// If the preopen path cannot be opened on the supplied filesystem.
    pub fn build(self) -> Result<Arc<WasiProcess>, crate::fs::FsError> {
        use crate::fs::{AccessMode, CreateMode, VfdFlags};
        let stdio = |vfd: Arc<dyn Vfd>| Fde {
            vfd,
            rights: Rights::stdio_defaults(),
            inheriting_rights: Rights::empty(),
            original_path: String::new(),
            is_preopened: true,
            is_directory: false,
            dir_stream: None,
        };
        let mut fds = BTreeMap::new();
        fds.insert(0, stdio(self.stdin));
        fds.insert(1, stdio(self.stdout));
        fds.insert(2, stdio(self.stderr));
        let mut next_fd = 3;

        let filesystem = match self.filesystem {
            Some((filesystem, preopen_path)) => {
                let root = filesystem.open(
                    &preopen_path,
                    AccessMode::None,
                    CreateMode::OpenExisting,
                    VfdFlags::default(),
                )?;
                fds.insert(
                    3,
                    Fde {
                        vfd: root,
                        rights: Rights::directory_defaults(),
                        inheriting_rights: Rights::directory_defaults()
                            | Rights::file_defaults(),
                        original_path: preopen_path,
                        is_preopened: true,
                        is_directory: true,
                        dir_stream: None,
                    },
                );
                next_fd = 4;
                Some(filesystem)
            }
            None => None,
        };

        let start_realtime_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);

        Ok(Arc::new(WasiProcess {
            state: Mutex::new(ProcessState {
                args: self.args,
                envs: self.envs,
                fds,
                next_fd,
                filesystem,
                memory: None,
            }),
            start_realtime_ns,
            start_instant: Instant::now(),
        }))
    }
}
