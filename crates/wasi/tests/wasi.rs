//! Host-call surface tests driven directly against a guest memory.
//!
//! The syscalls marshal through an ordinary compartment memory, so the
//! whole capability layer is exercised without running generated code.

use cove::{core::MemoryType, Compartment, Memory};
use cove_wasi::{
    types::{fdflags, lookupflags, oflags},
    Errno,
    FileSystem,
    MemFs,
    ReadPipe,
    Rights,
    WasiProcess,
    WasiProcessBuilder,
    WasiResolver,
    WritePipe,
};
use std::sync::Arc;

struct Harness {
    process: Arc<WasiProcess>,
    memory: Memory,
    stdout: WritePipe,
    #[allow(dead_code)]
    compartment: Compartment,
}

fn harness() -> Harness {
    let fs = Arc::new(MemFs::new());
    fs.create_dir("/data").unwrap();
    let stdout = WritePipe::new();
    let process = WasiProcessBuilder::new()
        .arg("guest")
        .arg("--flag")
        .env("HOME", "/")
        .stdin(Arc::new(ReadPipe::new(b"hello stdin".to_vec())))
        .stdout(Arc::new(stdout.clone()))
        .filesystem(fs, "/")
        .build()
        .expect("preopen must exist");

    let compartment = Compartment::new().unwrap();
    let memory = compartment
        .create_memory(MemoryType::new(1, None, false).unwrap(), "guest")
        .unwrap();
    process.set_memory(memory.clone());
    Harness {
        process,
        memory,
        stdout,
        compartment,
    }
}

/// Writes a path string into guest memory, returning `(ptr, len)`.
fn put(memory: &Memory, at: u32, bytes: &[u8]) -> (u32, u32) {
    memory.write(u64::from(at), bytes).unwrap();
    (at, bytes.len() as u32)
}

fn read_u32(memory: &Memory, at: u32) -> u32 {
    let mut bytes = [0u8; 4];
    memory.read(u64::from(at), &mut bytes).unwrap();
    u32::from_le_bytes(bytes)
}

fn read_u64(memory: &Memory, at: u32) -> u64 {
    let mut bytes = [0u8; 8];
    memory.read(u64::from(at), &mut bytes).unwrap();
    u64::from_le_bytes(bytes)
}

/// Builds one iovec list entry at `at`.
fn put_iov(memory: &Memory, at: u32, ptr: u32, len: u32) {
    memory.write(u64::from(at), &ptr.to_le_bytes()).unwrap();
    memory
        .write(u64::from(at) + 4, &len.to_le_bytes())
        .unwrap();
}

const PREOPEN_FD: u32 = 3;

#[test]
fn fd_write_reaches_stdout() {
    let h = harness();
    put(&h.memory, 64, b"hi there");
    put_iov(&h.memory, 16, 64, 8);
    h.process.fd_write(1, 16, 1, 8).unwrap();
    assert_eq!(read_u32(&h.memory, 8), 8);
    assert_eq!(h.stdout.contents(), b"hi there");
}

#[test]
fn fd_read_scatters_from_stdin() {
    let h = harness();
    put_iov(&h.memory, 16, 100, 5);
    put_iov(&h.memory, 24, 200, 6);
    h.process.fd_read(0, 16, 2, 8).unwrap();
    assert_eq!(read_u32(&h.memory, 8), 11);
    let mut bytes = [0u8; 5];
    h.memory.read(100, &mut bytes).unwrap();
    assert_eq!(&bytes, b"hello");
    let mut bytes = [0u8; 6];
    h.memory.read(200, &mut bytes).unwrap();
    assert_eq!(&bytes, b" stdin");
}

#[test]
fn args_layout_matches_sizes() {
    let h = harness();
    h.process.args_sizes_get(0, 4).unwrap();
    let argc = read_u32(&h.memory, 0);
    let buf_size = read_u32(&h.memory, 4);
    assert_eq!(argc, 2);
    assert_eq!(buf_size as usize, "guest".len() + 1 + "--flag".len() + 1);

    h.process.args_get(16, 64).unwrap();
    let arg0 = read_u32(&h.memory, 16);
    let arg1 = read_u32(&h.memory, 20);
    assert_eq!(arg0, 64);
    assert_eq!(arg1, 64 + "guest".len() as u32 + 1);
    let mut bytes = vec![0u8; buf_size as usize];
    h.memory.read(64, &mut bytes).unwrap();
    assert_eq!(bytes, b"guest\0--flag\0");
}

#[test]
fn prestat_exposes_the_preopen() {
    let h = harness();
    h.process.fd_prestat_get(PREOPEN_FD, 0).unwrap();
    // Tag 0 (directory), name length 1 ("/").
    assert_eq!(read_u32(&h.memory, 0), 0);
    assert_eq!(read_u32(&h.memory, 4), 1);
    h.process.fd_prestat_dir_name(PREOPEN_FD, 32, 1).unwrap();
    let mut byte = [0u8; 1];
    h.memory.read(32, &mut byte).unwrap();
    assert_eq!(&byte, b"/");
    // Stdio descriptors are not directory preopens.
    assert_eq!(h.process.fd_prestat_get(1, 0), Err(Errno::Badf));
}

#[test]
fn open_missing_parent_reports_noent() {
    let h = harness();
    // `path_open(CREAT|EXCL, "a/b")` with `/a` missing: the miss is
    // ENOENT, not a capability error and not EEXIST.
    let (path, len) = put(&h.memory, 128, b"a/b");
    let result = h.process.path_open(
        PREOPEN_FD,
        lookupflags::SYMLINK_FOLLOW,
        path,
        len,
        oflags::CREAT | oflags::EXCL,
        Rights::file_defaults().bits(),
        0,
        0,
        0,
    );
    assert_eq!(result, Err(Errno::Noent));
}

#[test]
fn path_escapes_report_notcapable_without_fs_access() {
    let h = harness();
    for escape in [&b".."[..], b"../x", b"a/../../x"] {
        let (path, len) = put(&h.memory, 128, escape);
        let result = h.process.path_open(
            PREOPEN_FD,
            0,
            path,
            len,
            0,
            Rights::FD_READ.bits(),
            0,
            0,
            0,
        );
        assert_eq!(result, Err(Errno::Notcapable), "escape {escape:?}");
    }
}

#[test]
fn open_flag_table_is_enforced() {
    let h = harness();
    let open = |path_bytes: &[u8], flags: u16| {
        let (path, len) = put(&h.memory, 128, path_bytes);
        h.process.path_open(
            PREOPEN_FD,
            0,
            path,
            len,
            flags,
            (Rights::FD_READ | Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL).bits(),
            0,
            0,
            0,
        )
    };

    // createNew succeeds once, then fails with EEXIST.
    open(b"data/file", oflags::CREAT | oflags::EXCL).unwrap();
    assert_eq!(
        open(b"data/file", oflags::CREAT | oflags::EXCL),
        Err(Errno::Exist)
    );
    // openExisting works; truncateExisting empties it.
    open(b"data/file", 0).unwrap();
    open(b"data/file", oflags::TRUNC).unwrap();
    // EXCL without CREAT is not a defined combination.
    assert_eq!(open(b"data/file", oflags::EXCL), Err(Errno::Inval));
    // truncateExisting on a missing file is a miss.
    assert_eq!(open(b"data/none", oflags::TRUNC), Err(Errno::Noent));
}

#[test]
fn file_io_roundtrips_through_the_fs() {
    let h = harness();
    let (path, len) = put(&h.memory, 128, b"data/notes.txt");
    h.process
        .path_open(
            PREOPEN_FD,
            0,
            path,
            len,
            oflags::CREAT,
            (Rights::FD_READ | Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL).bits(),
            0,
            0,
            0,
        )
        .unwrap();
    let fd = read_u32(&h.memory, 0);
    assert!(fd >= 4, "descriptor numbers are monotonic from 4");

    put(&h.memory, 64, b"wasm");
    put_iov(&h.memory, 16, 64, 4);
    h.process.fd_write(fd, 16, 1, 8).unwrap();

    // Seek back and read it again.
    h.process.fd_seek(fd, 0, 0, 8).unwrap();
    assert_eq!(read_u64(&h.memory, 8), 0);
    put_iov(&h.memory, 16, 300, 4);
    h.process.fd_read(fd, 16, 1, 8).unwrap();
    let mut bytes = [0u8; 4];
    h.memory.read(300, &mut bytes).unwrap();
    assert_eq!(&bytes, b"wasm");

    // fd_pread at an explicit offset does not move the cursor.
    h.process.fd_tell(fd, 8).unwrap();
    let before = read_u64(&h.memory, 8);
    put_iov(&h.memory, 16, 320, 2);
    h.process.fd_pread(fd, 16, 1, 2, 8).unwrap();
    let mut bytes = [0u8; 2];
    h.memory.read(320, &mut bytes).unwrap();
    assert_eq!(&bytes, b"sm");
    h.process.fd_tell(fd, 8).unwrap();
    assert_eq!(read_u64(&h.memory, 8), before);
}

#[test]
fn fdstat_set_rights_is_monotonic() {
    let h = harness();
    let (path, len) = put(&h.memory, 128, b"data/rights.txt");
    h.process
        .path_open(
            PREOPEN_FD,
            0,
            path,
            len,
            oflags::CREAT,
            (Rights::FD_READ | Rights::FD_WRITE).bits(),
            0,
            0,
            0,
        )
        .unwrap();
    let fd = read_u32(&h.memory, 0);

    // Widening is a capability violation.
    assert_eq!(
        h.process
            .fd_fdstat_set_rights(fd, (Rights::FD_READ | Rights::FD_SEEK).bits(), 0),
        Err(Errno::Notcapable)
    );
    // Narrowing to exactly FD_READ succeeds and is exact.
    h.process
        .fd_fdstat_set_rights(fd, Rights::FD_READ.bits(), 0)
        .unwrap();
    put(&h.memory, 64, b"x");
    put_iov(&h.memory, 16, 64, 1);
    assert_eq!(h.process.fd_write(fd, 16, 1, 8), Err(Errno::Notcapable));
}

#[test]
fn readdir_enumerates_with_cookies() {
    let h = harness();
    for name in [&b"data/a"[..], b"data/b", b"data/c"] {
        let (path, len) = put(&h.memory, 128, name);
        h.process
            .path_open(
                PREOPEN_FD,
                0,
                path,
                len,
                oflags::CREAT,
                Rights::FD_WRITE.bits(),
                0,
                0,
                0,
            )
            .unwrap();
    }
    let (path, len) = put(&h.memory, 128, b"data");
    h.process
        .path_open(
            PREOPEN_FD,
            0,
            path,
            len,
            oflags::DIRECTORY,
            (Rights::FD_READDIR).bits(),
            0,
            0,
            0,
        )
        .unwrap();
    let dir_fd = read_u32(&h.memory, 0);

    h.process.fd_readdir(dir_fd, 512, 512, 0, 8).unwrap();
    let used = read_u32(&h.memory, 8);
    // Three entries: a dirent header (24 bytes) plus a one-byte name.
    assert_eq!(used, 3 * 25);

    // Restart from cookie 2: only the final entry remains.
    h.process.fd_readdir(dir_fd, 512, 512, 2, 8).unwrap();
    let used = read_u32(&h.memory, 8);
    assert_eq!(used, 24 + 1);
    let mut name = [0u8; 1];
    h.memory.read(512 + 24, &mut name).unwrap();
    assert_eq!(&name, b"c");
}

#[test]
fn rename_unlink_and_directories() {
    let h = harness();
    let (path, len) = put(&h.memory, 128, b"data/old");
    h.process
        .path_open(PREOPEN_FD, 0, path, len, oflags::CREAT, 0, 0, 0, 0)
        .unwrap();

    let (old, old_len) = put(&h.memory, 128, b"data/old");
    let (new, new_len) = put(&h.memory, 192, b"data/new");
    h.process
        .path_rename(PREOPEN_FD, old, old_len, PREOPEN_FD, new, new_len)
        .unwrap();

    let (path, len) = put(&h.memory, 128, b"data/new");
    h.process.path_unlink_file(PREOPEN_FD, path, len).unwrap();

    let (path, len) = put(&h.memory, 128, b"data/sub");
    h.process.path_create_directory(PREOPEN_FD, path, len).unwrap();
    // Removing the non-empty parent fails.
    let (parent, parent_len) = put(&h.memory, 192, b"data");
    assert_eq!(
        h.process
            .path_remove_directory(PREOPEN_FD, parent, parent_len),
        Err(Errno::Notempty)
    );
    h.process.path_remove_directory(PREOPEN_FD, path, len).unwrap();
}

#[test]
fn clock_and_random_behave() {
    let h = harness();
    h.process.clock_time_get(1, 0, 0).unwrap();
    let first = read_u64(&h.memory, 0);
    h.process.clock_time_get(1, 0, 0).unwrap();
    let second = read_u64(&h.memory, 0);
    assert!(second >= first, "monotonic time went backwards");
    assert_eq!(h.process.clock_time_get(9, 0, 0), Err(Errno::Inval));

    h.process.random_get(64, 16).unwrap();
    let mut bytes = [0u8; 16];
    h.memory.read(64, &mut bytes).unwrap();
    // 16 zero bytes from the OS generator would be remarkable.
    assert_ne!(bytes, [0u8; 16]);
}

#[test]
fn fdflags_translate_both_ways() {
    let h = harness();
    h.process
        .fd_fdstat_set_flags(1, fdflags::APPEND | fdflags::NONBLOCK)
        .unwrap();
    h.process.fd_fdstat_get(1, 0).unwrap();
    let mut bytes = [0u8; 2];
    h.memory.read(2, &mut bytes).unwrap();
    let flags = u16::from_le_bytes(bytes);
    assert_eq!(flags & fdflags::APPEND, fdflags::APPEND);
    assert_eq!(flags & fdflags::NONBLOCK, fdflags::NONBLOCK);
    // Sync flags require sync rights stdio descriptors do not carry.
    assert_eq!(
        h.process.fd_fdstat_set_flags(1, fdflags::SYNC),
        Err(Errno::Notcapable)
    );
}

#[test]
fn proc_exit_raises_the_exit_trap() {
    let h = harness();
    let compartment = Compartment::new().unwrap();
    let context = compartment.create_context().unwrap();
    let resolver = WasiResolver::new(h.process.clone());
    let exit = cove::Resolver::resolve(
        &resolver,
        "wasi_snapshot_preview1",
        "proc_exit",
        &cove::ExternType::Func(
            cove::core::FuncType::new([cove::core::ValType::I32], []).unwrap(),
        ),
    )
    .and_then(cove::Extern::into_func)
    .expect("proc_exit resolves");

    let error = cove::invoke(&context, &exit, &[cove::core::Value::I32(17)]).unwrap_err();
    assert_eq!(error.exit_code(), Some(17));
}

#[test]
fn wasi_imports_link_and_instantiate() {
    let h = harness();
    let engine = cove::Engine::default();
    let bytes = wat::parse_str(
        r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func (param i32 i32 i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "random_get"
                (func (param i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
            (memory (export "memory") 1))
        "#,
    )
    .unwrap();
    let module = engine.load(&bytes).expect("guest loads");
    let compartment = Compartment::new().unwrap();
    let context = compartment.create_context().unwrap();
    let resolver = WasiResolver::new(h.process.clone());
    let imports = cove::link(module.module(), &resolver)
        .into_imports()
        .expect("every wasi import resolves with a matching type");
    let instance =
        cove::instantiate(&compartment, &context, &module, &imports, "wasi-guest").unwrap();
    // The guest's exported memory becomes the process's syscall memory.
    let memory = instance
        .export("memory")
        .and_then(cove::Extern::into_memory)
        .expect("exported memory");
    h.process.set_memory(memory);
}

#[test]
fn sockets_are_not_wired() {
    let h = harness();
    let resolver = WasiResolver::new(h.process.clone());
    let ty = cove::ExternType::Func(
        cove::core::FuncType::new(
            [cove::core::ValType::I32, cove::core::ValType::I32],
            [cove::core::ValType::I32],
        )
        .unwrap(),
    );
    assert!(cove::Resolver::resolve(&resolver, "wasi_snapshot_preview1", "sock_shutdown", &ty)
        .is_some());
    assert!(
        cove::Resolver::resolve(&resolver, "wasi_snapshot_preview1", "no_such_call", &ty)
            .is_none()
    );
}
