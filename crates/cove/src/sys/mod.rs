//! Platform plumbing: the signal-to-trap bridge.
//!
//! Guest entries record a `setjmp` anchor (via a small C shim, since
//! `setjmp` is not expressible in Rust). A synchronous SIGSEGV/SIGBUS
//! raised by generated code inside a memory's reserved address range is
//! converted into a typed out-of-bounds trap and control long-jumps back
//! to the anchor, skipping the generated frames. Faults outside any
//! known reservation are re-raised with the default disposition.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub(crate) use self::unix::{call_with_signals_caught, raise_trap};

#[cfg(not(unix))]
mod fallback {
    use crate::trap::Trap;

    /// Runs `body`, converting guest faults into traps.
    ///
    /// Without a signal bridge on this platform only explicit
    /// [`raise_trap`] unwinds are caught, which this stub cannot
    /// provide either.
    pub(crate) fn call_with_signals_caught<R>(body: impl FnOnce() -> R) -> Result<R, Trap> {
        Ok(body())
    }

    /// Raises `trap` out of guest code.
    pub(crate) fn raise_trap(trap: Trap) -> ! {
        panic!("trap raised outside a guest invocation: {trap}");
    }
}

#[cfg(not(unix))]
pub(crate) use self::fallback::{call_with_signals_caught, raise_trap};
