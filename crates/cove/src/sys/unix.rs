use crate::{
    memory::lookup_faulting_address,
    trap::{Trap, TrapKind},
};
use core::cell::{Cell, RefCell};
use core::ffi::c_void;
use core::mem::MaybeUninit;
use std::sync::Once;

extern "C" {
    /// Records a jump buffer in `buf_storage` and calls `body(payload)`.
    ///
    /// Returns 1 if `body` returned normally and 0 if [`cove_unwind`]
    /// jumped back.
    fn cove_setjmp_and_call(
        buf_storage: *mut *mut c_void,
        body: unsafe extern "C" fn(*mut c_void),
        payload: *mut c_void,
    ) -> i32;

    /// Long-jumps to the buffer recorded by [`cove_setjmp_and_call`].
    fn cove_unwind(buf: *mut c_void) -> !;
}

thread_local! {
    /// The innermost guest-entry anchor of this thread.
    static JMP_BUF: Cell<*mut c_void> = const { Cell::new(core::ptr::null_mut()) };
    /// The trap recorded before unwinding to the anchor.
    static PENDING_TRAP: RefCell<Option<Trap>> = const { RefCell::new(None) };
}

/// Raises `trap` out of the current guest invocation.
///
/// Unwinds straight to the innermost [`call_with_signals_caught`]
/// anchor; every intermediate frame belongs to generated code or to
/// intrinsics that keep no state needing destructors.
///
/// # Panics
///
/// If no guest invocation is in flight on this thread.
pub(crate) fn raise_trap(trap: Trap) -> ! {
    let buf = JMP_BUF.with(Cell::get);
    assert!(
        !buf.is_null(),
        "trap raised outside a guest invocation: {trap}"
    );
    PENDING_TRAP.with(|pending| *pending.borrow_mut() = Some(trap));
    unsafe { cove_unwind(buf) }
}

/// The SIGSEGV/SIGBUS handler.
///
/// Faults inside a live memory reservation during a guest invocation
/// become out-of-bounds traps; anything else is forwarded to the default
/// disposition by reinstating it and returning (the faulting instruction
/// re-executes and the process dies with the original signal).
#[cfg(target_os = "linux")]
unsafe fn fault_addr(info: *mut libc::siginfo_t) -> usize {
    (*info).si_addr() as usize
}

#[cfg(not(target_os = "linux"))]
unsafe fn fault_addr(info: *mut libc::siginfo_t) -> usize {
    (*info).si_addr as usize
}

unsafe extern "C" fn fault_handler(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut c_void,
) {
    let addr = fault_addr(info);
    let anchor = JMP_BUF.with(Cell::get);
    if !anchor.is_null() {
        if let Some((_compartment, memory, offset)) = lookup_faulting_address(addr) {
            PENDING_TRAP.with(|pending| {
                *pending.borrow_mut() =
                    Some(Trap::new(TrapKind::OutOfBoundsMemoryAccess { memory, offset }));
            });
            cove_unwind(anchor);
        }
    }
    // Not ours: restore the default handler and re-raise by returning.
    let mut action: libc::sigaction = core::mem::zeroed();
    action.sa_sigaction = libc::SIG_DFL;
    libc::sigaction(signum, &action, core::ptr::null_mut());
}

/// Installs the fault handlers once per process.
fn ensure_signal_handlers() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| unsafe {
        let mut action: libc::sigaction = core::mem::zeroed();
        action.sa_sigaction = fault_handler
            as unsafe extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void)
            as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGSEGV, &action, core::ptr::null_mut());
        libc::sigaction(libc::SIGBUS, &action, core::ptr::null_mut());
    });
}

/// Runs `body` under a guest-entry anchor.
///
/// Guest faults inside live memory reservations and explicit
/// [`raise_trap`] calls unwind here and surface as the `Err` variant;
/// partial progress made by `body` before the trap stays visible, which
/// is what the bulk-operation semantics require.
pub(crate) fn call_with_signals_caught<F: FnOnce() -> R, R>(body: F) -> Result<R, Trap> {
    ensure_signal_handlers();

    struct Payload<F, R> {
        body: Option<F>,
        result: MaybeUninit<R>,
        /// Where the shim records the jump buffer before calling back.
        buf_storage: *mut *mut c_void,
    }

    unsafe extern "C" fn trampoline<F: FnOnce() -> R, R>(raw: *mut c_void) {
        let payload = &mut *(raw as *mut Payload<F, R>);
        // The shim has recorded the jump buffer by now; publish it so
        // the fault handler and `raise_trap` can unwind to it.
        JMP_BUF.with(|cell| cell.set(*payload.buf_storage));
        let body = payload.body.take().expect("trampoline runs once");
        payload.result.write(body());
    }

    let previous_anchor = JMP_BUF.with(Cell::get);
    let mut buf: *mut c_void = core::ptr::null_mut();
    let mut payload = Payload {
        body: Some(body),
        result: MaybeUninit::uninit(),
        buf_storage: &mut buf,
    };
    let completed = unsafe {
        cove_setjmp_and_call(
            &mut buf,
            trampoline::<F, R>,
            &mut payload as *mut _ as *mut c_void,
        )
    };
    JMP_BUF.with(|cell| cell.set(previous_anchor));

    if completed == 1 {
        Ok(unsafe { payload.result.assume_init() })
    } else {
        let trap = PENDING_TRAP
            .with(|pending| pending.borrow_mut().take())
            .unwrap_or_else(|| Trap::new(TrapKind::Unreachable));
        Err(trap)
    }
}
