//! Capability-based WASI preview1 support for the Cove runtime.
//!
//! Guests authored against the preview1 ABI run as isolated processes:
//! a [`WasiProcess`] owns the argument and environment vectors, a
//! file-descriptor table whose entries carry explicit [`Rights`], an
//! optional [`FileSystem`] capability reachable only through preopened
//! directory descriptors, and the process clocks. The [`WasiResolver`]
//! exposes the syscall surface as host functions for import resolution.
//!
//! ```no_run
//! use cove_wasi::{WasiProcessBuilder, WasiResolver};
//!
//! let process = WasiProcessBuilder::new()
//!     .arg("guest")
//!     .env("LANG", "C")
//!     .build()
//!     .unwrap();
//! let resolver = WasiResolver::new(process.clone());
//! // Link and instantiate the guest with `resolver`, then:
//! // process.set_memory(exported_memory);
//! ```

mod process;
mod resolver;
mod rights;
mod syscalls;
pub mod fs;
pub mod memfs;
pub mod path;
pub mod types;

pub use self::{
    fs::{FileSystem, FsError, ReadPipe, Vfd, WritePipe},
    memfs::MemFs,
    process::{WasiProcess, WasiProcessBuilder},
    resolver::{WasiResolver, WASI_MODULE_NAME},
    rights::Rights,
    types::Errno,
};
