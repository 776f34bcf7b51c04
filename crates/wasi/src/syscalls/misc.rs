//! Arguments, environment, clocks, randomness, polling, scheduling and
//! the process-control syscalls.

use super::{mem_read, mem_write, read_u32, read_u64, write_u32, write_u64, Result};
use crate::{
    process::WasiProcess,
    rights::Rights,
    types::{eventtype, ClockId, Errno, GuestPtr, SUBCLOCKFLAGS_ABSTIME},
};
use rand::RngCore;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

impl WasiProcess {
    /// `args_sizes_get(*argc, *argv_buf_size) -> errno`
    pub fn args_sizes_get(&self, out_argc: GuestPtr, out_buf_size: GuestPtr) -> Result<()> {
        trace!("args_sizes_get");
        let memory = self.memory()?;
        let (count, buf_size) = {
            let state = self.lock();
            let buf_size: usize = state.args.iter().map(|arg| arg.len() + 1).sum();
            (state.args.len(), buf_size)
        };
        write_u32(&memory, out_argc, count as u32)?;
        write_u32(&memory, out_buf_size, buf_size as u32)
    }

    /// `args_get(*argv, *argv_buf) -> errno`
    ///
    /// Writes the pointer vector and the densely packed NUL-terminated
    /// strings; the layout matches `args_sizes_get` exactly.
    pub fn args_get(&self, argv: GuestPtr, argv_buf: GuestPtr) -> Result<()> {
        trace!("args_get");
        let memory = self.memory()?;
        let args = self.lock().args.clone();
        write_string_vector(&memory, &args, argv, argv_buf)
    }

    /// `environ_sizes_get(*count, *buf_size) -> errno`
    pub fn environ_sizes_get(&self, out_count: GuestPtr, out_buf_size: GuestPtr) -> Result<()> {
        trace!("environ_sizes_get");
        let memory = self.memory()?;
        let (count, buf_size) = {
            let state = self.lock();
            let buf_size: usize = state.envs.iter().map(|env| env.len() + 1).sum();
            (state.envs.len(), buf_size)
        };
        write_u32(&memory, out_count, count as u32)?;
        write_u32(&memory, out_buf_size, buf_size as u32)
    }

    /// `environ_get(*environ, *environ_buf) -> errno`
    pub fn environ_get(&self, environ: GuestPtr, environ_buf: GuestPtr) -> Result<()> {
        trace!("environ_get");
        let memory = self.memory()?;
        let envs = self.lock().envs.clone();
        write_string_vector(&memory, &envs, environ, environ_buf)
    }

    /// Returns the current wall clock in nanoseconds since the epoch.
    pub(crate) fn realtime_now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0)
    }

    /// Returns the monotonic clock in nanoseconds since process start.
    pub(crate) fn monotonic_now_ns(&self) -> u64 {
        self.start_instant.elapsed().as_nanos() as u64
    }

    fn clock_now_ns(&self, id: ClockId) -> u64 {
        match id {
            ClockId::Realtime => self.realtime_now_ns(),
            ClockId::Monotonic => self.monotonic_now_ns(),
            // Without an OS-specific CPU-time source the CPU clocks
            // report elapsed time since process start.
            ClockId::ProcessCputime | ClockId::ThreadCputime => self.monotonic_now_ns(),
        }
    }

    /// `clock_res_get(id, *resolution) -> errno`
    pub fn clock_res_get(&self, id: u32, out: GuestPtr) -> Result<()> {
        trace!("clock_res_get({id})");
        let memory = self.memory()?;
        ClockId::from_u32(id).ok_or(Errno::Inval)?;
        write_u64(&memory, out, 1)
    }

    /// `clock_time_get(id, precision, *time) -> errno`
    pub fn clock_time_get(&self, id: u32, _precision: u64, out: GuestPtr) -> Result<()> {
        trace!("clock_time_get({id})");
        let memory = self.memory()?;
        let id = ClockId::from_u32(id).ok_or(Errno::Inval)?;
        write_u64(&memory, out, self.clock_now_ns(id))
    }

    /// `random_get(*buf, buf_len) -> errno`
    pub fn random_get(&self, buf: GuestPtr, buf_len: u32) -> Result<()> {
        trace!("random_get(len={buf_len})");
        let memory = self.memory()?;
        let mut bytes = vec![0u8; buf_len as usize];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        mem_write(&memory, buf, &bytes)
    }

    /// `sched_yield() -> errno`
    pub fn sched_yield(&self) -> Result<()> {
        trace!("sched_yield");
        std::thread::yield_now();
        Ok(())
    }

    /// `proc_raise(sig) -> errno`
    ///
    /// Slated for removal from the ABI; never implemented.
    pub fn proc_raise(&self, _signal: u8) -> Result<()> {
        trace!("proc_raise");
        Err(Errno::Nosys)
    }

    /// `poll_oneoff(*subscriptions, *events, nsubscriptions, *nevents) -> errno`
    ///
    /// Clock subscriptions block the calling host thread until the
    /// earliest deadline. Descriptor subscriptions report ready
    /// immediately: the shipped handle types (regular files and pipes)
    /// never block.
    pub fn poll_oneoff(
        &self,
        subscriptions: GuestPtr,
        events: GuestPtr,
        count: u32,
        out_count: GuestPtr,
    ) -> Result<()> {
        trace!("poll_oneoff(n={count})");
        let memory = self.memory()?;
        if count == 0 {
            return Err(Errno::Inval);
        }

        struct Sub {
            userdata: u64,
            tag: u8,
            /// Deadline in nanoseconds on the subscription's clock, for
            /// clock subscriptions.
            deadline: u64,
            clock_id: ClockId,
            fd: u32,
        }

        let mut subs = Vec::with_capacity(count.min(1024) as usize);
        for index in 0..count {
            let base = subscriptions
                .checked_add(index.checked_mul(48).ok_or(Errno::Inval)?)
                .ok_or(Errno::Inval)?;
            let userdata = read_u64(&memory, base)?;
            let tag = mem_read(&memory, base + 8, 1)?[0];
            match tag {
                eventtype::CLOCK => {
                    let clock_id =
                        ClockId::from_u32(read_u32(&memory, base + 16)?).ok_or(Errno::Inval)?;
                    let timeout = read_u64(&memory, base + 24)?;
                    let flags = mem_read(&memory, base + 40, 2)?;
                    let flags = u16::from_le_bytes(flags.try_into().expect("2 bytes"));
                    let deadline = if flags & SUBCLOCKFLAGS_ABSTIME != 0 {
                        timeout
                    } else {
                        self.clock_now_ns(clock_id).saturating_add(timeout)
                    };
                    subs.push(Sub {
                        userdata,
                        tag,
                        deadline,
                        clock_id,
                        fd: 0,
                    });
                }
                eventtype::FD_READ | eventtype::FD_WRITE => {
                    let fd = read_u32(&memory, base + 16)?;
                    subs.push(Sub {
                        userdata,
                        tag,
                        deadline: 0,
                        clock_id: ClockId::Monotonic,
                        fd,
                    });
                }
                _ => return Err(Errno::Inval),
            }
        }

        // Immediately ready descriptor subscriptions win over timers.
        let mut ready: Vec<(u64, Errno, u8, u64)> = Vec::new();
        for sub in &subs {
            if sub.tag == eventtype::FD_READ || sub.tag == eventtype::FD_WRITE {
                let errno =
                    match self.vfd_checked(sub.fd, Rights::POLL_FD_READWRITE, Rights::empty()) {
                        Ok(_) => Errno::Success,
                        Err(errno) => errno,
                    };
                ready.push((sub.userdata, errno, sub.tag, 1));
            }
        }

        if ready.is_empty() {
            // Sleep until the earliest clock deadline, then report it.
            let earliest = subs
                .iter()
                .filter(|sub| sub.tag == eventtype::CLOCK)
                .min_by_key(|sub| sub.deadline)
                .expect("no ready descriptors implies a clock subscription");
            let now = self.clock_now_ns(earliest.clock_id);
            if earliest.deadline > now {
                std::thread::sleep(Duration::from_nanos(earliest.deadline - now));
            }
            ready.push((earliest.userdata, Errno::Success, eventtype::CLOCK, 0));
        }

        for (index, (userdata, errno, tag, nbytes)) in ready.iter().enumerate() {
            let base = events
                .checked_add(index as u32 * 32)
                .ok_or(Errno::Inval)?;
            let mut event = [0u8; 32];
            event[0..8].copy_from_slice(&userdata.to_le_bytes());
            event[8..10].copy_from_slice(&(*errno as u16).to_le_bytes());
            event[10] = *tag;
            event[16..24].copy_from_slice(&nbytes.to_le_bytes());
            mem_write(&memory, base, &event)?;
        }
        write_u32(&memory, out_count, ready.len() as u32)
    }
}

/// Writes a pointer vector plus its densely packed NUL-terminated
/// strings, the shared layout of `args_get` and `environ_get`.
fn write_string_vector(
    memory: &cove::Memory,
    strings: &[String],
    vector: GuestPtr,
    buffer: GuestPtr,
) -> Result<()> {
    let mut cursor = buffer;
    for (index, string) in strings.iter().enumerate() {
        write_u32(memory, vector + index as u32 * 4, cursor)?;
        mem_write(memory, cursor, string.as_bytes())?;
        mem_write(memory, cursor + string.len() as u32, &[0])?;
        cursor = cursor
            .checked_add(string.len() as u32 + 1)
            .ok_or(Errno::Inval)?;
    }
    Ok(())
}
