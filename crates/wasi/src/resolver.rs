//! Binding the syscall surface to guest imports.
//!
//! [`WasiResolver`] resolves imports from the `wasi_snapshot_preview1`
//! module to host functions that unpack the guest's integer arguments,
//! dispatch to the typed [`WasiProcess`] methods and return the errno.
//! `proc_exit` is the exception: it raises a typed exit trap that
//! unwinds to the launcher.

use crate::{
    process::WasiProcess,
    types::Errno,
};
use cove::{
    core::{FuncType, UntypedValue, ValType},
    Extern,
    ExternType,
    Function,
    HostFunc,
    Resolver,
    Trap,
};
use std::sync::Arc;

/// The module name the syscalls are exported under.
pub const WASI_MODULE_NAME: &str = "wasi_snapshot_preview1";

fn u(args: &[UntypedValue], index: usize) -> u32 {
    args[index].to_bits64() as u32
}

fn s64(args: &[UntypedValue], index: usize) -> i64 {
    args[index].to_bits64() as i64
}

fn u64_arg(args: &[UntypedValue], index: usize) -> u64 {
    args[index].to_bits64()
}

/// Builds one errno-returning host function.
fn syscall(
    process: &Arc<WasiProcess>,
    name: &str,
    params: &[ValType],
    body: impl Fn(&WasiProcess, &[UntypedValue]) -> Result<(), Errno> + Send + Sync + 'static,
) -> Extern {
    let ty = FuncType::new(params.iter().copied(), [ValType::I32])
        .expect("syscall signatures are small");
    let process = process.clone();
    let host = HostFunc::new(
        format!("{WASI_MODULE_NAME}!{name}"),
        ty,
        move |_context, args, results| {
            let errno = match body(&process, args) {
                Ok(()) => Errno::Success,
                Err(errno) => errno,
            };
            results[0] = UntypedValue::from(errno as u16 as u32);
            Ok(())
        },
    );
    Extern::Func(Function::host(Arc::new(host)))
}

/// A [`Resolver`] exposing a process's syscalls.
///
/// Wrap it around (or chain it before) the embedder's own resolver when
/// linking a guest that imports WASI.
pub struct WasiResolver {
    process: Arc<WasiProcess>,
}

impl WasiResolver {
    /// Creates a resolver over the given process.
    pub fn new(process: Arc<WasiProcess>) -> Self {
        Self { process }
    }

    /// Returns the process the resolver dispatches to.
    pub fn process(&self) -> &Arc<WasiProcess> {
        &self.process
    }

    #[allow(clippy::too_many_lines)]
    fn resolve_syscall(&self, name: &str) -> Option<Extern> {
        use ValType::{I32, I64};
        let p = &self.process;
        Some(match name {
            "args_sizes_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.args_sizes_get(u(a, 0), u(a, 1))
            }),
            "args_get" => syscall(p, name, &[I32, I32], |p, a| p.args_get(u(a, 0), u(a, 1))),
            "environ_sizes_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.environ_sizes_get(u(a, 0), u(a, 1))
            }),
            "environ_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.environ_get(u(a, 0), u(a, 1))
            }),
            "clock_res_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.clock_res_get(u(a, 0), u(a, 1))
            }),
            "clock_time_get" => syscall(p, name, &[I32, I64, I32], |p, a| {
                p.clock_time_get(u(a, 0), u64_arg(a, 1), u(a, 2))
            }),
            "random_get" => syscall(p, name, &[I32, I32], |p, a| p.random_get(u(a, 0), u(a, 1))),
            "sched_yield" => syscall(p, name, &[], |p, _| p.sched_yield()),
            "proc_raise" => syscall(p, name, &[I32], |p, a| p.proc_raise(u(a, 0) as u8)),
            "poll_oneoff" => syscall(p, name, &[I32, I32, I32, I32], |p, a| {
                p.poll_oneoff(u(a, 0), u(a, 1), u(a, 2), u(a, 3))
            }),
            "fd_prestat_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.fd_prestat_get(u(a, 0), u(a, 1))
            }),
            "fd_prestat_dir_name" => syscall(p, name, &[I32, I32, I32], |p, a| {
                p.fd_prestat_dir_name(u(a, 0), u(a, 1), u(a, 2))
            }),
            "fd_close" => syscall(p, name, &[I32], |p, a| p.fd_close(u(a, 0))),
            "fd_datasync" => syscall(p, name, &[I32], |p, a| p.fd_datasync(u(a, 0))),
            "fd_sync" => syscall(p, name, &[I32], |p, a| p.fd_sync(u(a, 0))),
            "fd_read" => syscall(p, name, &[I32, I32, I32, I32], |p, a| {
                p.fd_read(u(a, 0), u(a, 1), u(a, 2), u(a, 3))
            }),
            "fd_write" => syscall(p, name, &[I32, I32, I32, I32], |p, a| {
                p.fd_write(u(a, 0), u(a, 1), u(a, 2), u(a, 3))
            }),
            "fd_pread" => syscall(p, name, &[I32, I32, I32, I64, I32], |p, a| {
                p.fd_pread(u(a, 0), u(a, 1), u(a, 2), u64_arg(a, 3), u(a, 4))
            }),
            "fd_pwrite" => syscall(p, name, &[I32, I32, I32, I64, I32], |p, a| {
                p.fd_pwrite(u(a, 0), u(a, 1), u(a, 2), u64_arg(a, 3), u(a, 4))
            }),
            "fd_seek" => syscall(p, name, &[I32, I64, I32, I32], |p, a| {
                p.fd_seek(u(a, 0), s64(a, 1), u(a, 2) as u8, u(a, 3))
            }),
            "fd_tell" => syscall(p, name, &[I32, I32], |p, a| p.fd_tell(u(a, 0), u(a, 1))),
            "fd_fdstat_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.fd_fdstat_get(u(a, 0), u(a, 1))
            }),
            "fd_fdstat_set_flags" => syscall(p, name, &[I32, I32], |p, a| {
                p.fd_fdstat_set_flags(u(a, 0), u(a, 1) as u16)
            }),
            "fd_fdstat_set_rights" => syscall(p, name, &[I32, I64, I64], |p, a| {
                p.fd_fdstat_set_rights(u(a, 0), u64_arg(a, 1), u64_arg(a, 2))
            }),
            "fd_filestat_get" => syscall(p, name, &[I32, I32], |p, a| {
                p.fd_filestat_get(u(a, 0), u(a, 1))
            }),
            "fd_filestat_set_size" => syscall(p, name, &[I32, I64], |p, a| {
                p.fd_filestat_set_size(u(a, 0), u64_arg(a, 1))
            }),
            "fd_filestat_set_times" => syscall(p, name, &[I32, I64, I64, I32], |p, a| {
                p.fd_filestat_set_times(u(a, 0), u64_arg(a, 1), u64_arg(a, 2), u(a, 3) as u16)
            }),
            "fd_advise" => syscall(p, name, &[I32, I64, I64, I32], |p, a| {
                p.fd_advise(u(a, 0), u64_arg(a, 1), u64_arg(a, 2), u(a, 3) as u8)
            }),
            "fd_allocate" => syscall(p, name, &[I32, I64, I64], |p, a| {
                p.fd_allocate(u(a, 0), u64_arg(a, 1), u64_arg(a, 2))
            }),
            "fd_renumber" => syscall(p, name, &[I32, I32], |p, a| {
                p.fd_renumber(u(a, 0), u(a, 1))
            }),
            "fd_readdir" => syscall(p, name, &[I32, I32, I32, I64, I32], |p, a| {
                p.fd_readdir(u(a, 0), u(a, 1), u(a, 2), u64_arg(a, 3), u(a, 4))
            }),
            "path_open" => syscall(
                p,
                name,
                &[I32, I32, I32, I32, I32, I64, I64, I32, I32],
                |p, a| {
                    p.path_open(
                        u(a, 0),
                        u(a, 1),
                        u(a, 2),
                        u(a, 3),
                        u(a, 4) as u16,
                        u64_arg(a, 5),
                        u64_arg(a, 6),
                        u(a, 7) as u16,
                        u(a, 8),
                    )
                },
            ),
            "path_create_directory" => syscall(p, name, &[I32, I32, I32], |p, a| {
                p.path_create_directory(u(a, 0), u(a, 1), u(a, 2))
            }),
            "path_remove_directory" => syscall(p, name, &[I32, I32, I32], |p, a| {
                p.path_remove_directory(u(a, 0), u(a, 1), u(a, 2))
            }),
            "path_unlink_file" => syscall(p, name, &[I32, I32, I32], |p, a| {
                p.path_unlink_file(u(a, 0), u(a, 1), u(a, 2))
            }),
            "path_filestat_get" => syscall(p, name, &[I32, I32, I32, I32, I32], |p, a| {
                p.path_filestat_get(u(a, 0), u(a, 1), u(a, 2), u(a, 3), u(a, 4))
            }),
            "path_filestat_set_times" => {
                syscall(p, name, &[I32, I32, I32, I32, I64, I64, I32], |p, a| {
                    p.path_filestat_set_times(
                        u(a, 0),
                        u(a, 1),
                        u(a, 2),
                        u(a, 3),
                        u64_arg(a, 4),
                        u64_arg(a, 5),
                        u(a, 6) as u16,
                    )
                })
            }
            "path_link" => syscall(p, name, &[I32, I32, I32, I32, I32, I32, I32], |p, a| {
                p.path_link(u(a, 0), u(a, 1), u(a, 2), u(a, 3), u(a, 4), u(a, 5), u(a, 6))
            }),
            "path_rename" => syscall(p, name, &[I32, I32, I32, I32, I32, I32], |p, a| {
                p.path_rename(u(a, 0), u(a, 1), u(a, 2), u(a, 3), u(a, 4), u(a, 5))
            }),
            "path_symlink" => syscall(p, name, &[I32, I32, I32, I32, I32], |p, a| {
                p.path_symlink(u(a, 0), u(a, 1), u(a, 2), u(a, 3), u(a, 4))
            }),
            "path_readlink" => syscall(p, name, &[I32, I32, I32, I32, I32, I32], |p, a| {
                p.path_readlink(u(a, 0), u(a, 1), u(a, 2), u(a, 3), u(a, 4), u(a, 5))
            }),
            // Sockets return ENOSYS unless a socket capability is wired
            // up, which this layer does not provide.
            "sock_accept" => syscall(p, name, &[I32, I32, I32], |_, _| Err(Errno::Nosys)),
            "sock_recv" => syscall(p, name, &[I32, I32, I32, I32, I32, I32], |_, _| {
                Err(Errno::Nosys)
            }),
            "sock_send" => syscall(p, name, &[I32, I32, I32, I32, I32], |_, _| {
                Err(Errno::Nosys)
            }),
            "sock_shutdown" => syscall(p, name, &[I32, I32], |_, _| Err(Errno::Nosys)),
            "proc_exit" => {
                let ty = FuncType::new([ValType::I32], []).expect("small signature");
                let host = HostFunc::new(
                    format!("{WASI_MODULE_NAME}!proc_exit"),
                    ty,
                    move |_context, args, _results| {
                        // Unwinds to the launcher, which maps the value
                        // to the process exit code.
                        Err(Trap::exit(u(args, 0) as i32))
                    },
                );
                Extern::Func(Function::host(Arc::new(host)))
            }
            _ => return None,
        })
    }
}

impl Resolver for WasiResolver {
    fn resolve(&self, module: &str, name: &str, _expected: &ExternType) -> Option<Extern> {
        if module != WASI_MODULE_NAME {
            return None;
        }
        self.resolve_syscall(name)
    }
}
