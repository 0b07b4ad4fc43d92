//! Syscall hook bodies.
//!
//! Each hook runs every guard as an early return and reports which one fired
//! through [`Verdict`]. Nothing is propagated to the traced syscall: the BPF
//! programs map every verdict to return code 0. Work per invocation is bounded
//! by [`MAX_DATA_SIZE`] and involves no loops over input.

use crate::channel::{EventChannel, EventSlot};
use crate::classify::looks_like_http;
use crate::event::{Direction, MAX_DATA_SIZE, TASK_COMM_LEN};

/// Highest descriptor treated as a standard stream and skipped.
pub const MAX_STD_FD: i32 = 2;

/// Helpers the hooks need from the execution environment.
pub trait ProbeEnv {
    /// `tgid << 32 | pid`, as `bpf_get_current_pid_tgid` returns it.
    fn pid_tgid(&self) -> u64;

    /// Monotonic clock in nanoseconds.
    fn ktime_ns(&self) -> u64;

    fn comm(&self) -> [u8; TASK_COMM_LEN];

    /// Copy `dst.len()` bytes from the traced process's address `src`.
    fn read_user(&self, src: u64, dst: &mut [u8]) -> Result<(), i64>;
}

/// `write(fd, buf, count)` arguments from `sys_enter_write`.
#[derive(Clone, Copy, Debug)]
pub struct WriteArgs {
    pub fd: i32,
    pub buf: u64,
    pub count: u64,
}

/// Why a hook produced no event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    /// No owning user process (pid 0)
    KernelContext,
    /// fd 0, 1, 2 or negative
    ExcludedDescriptor,
    /// Zero, negative or over-capacity byte count
    LengthOutOfBounds,
    /// Ring buffer had no room for a record
    ChannelFull,
    /// User memory could not be read
    CopyFailed,
    /// Bytes did not look like HTTP
    NotHttp,
    /// Read completed, but its buffer is not reachable from the exit probe
    PayloadUnavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Submitted,
    Skipped(Skip),
}

/// Outbound hook, run on entry to `write(2)`.
///
/// Guards run in order; a reservation is only made once pid, descriptor and
/// length have passed, and every reservation ends in exactly one of
/// submit or discard before returning.
#[inline(always)]
pub fn capture_write<E, C>(env: &E, channel: &C, args: WriteArgs) -> Verdict
where
    E: ProbeEnv,
    C: EventChannel,
{
    let pid_tgid = env.pid_tgid();
    let pid = (pid_tgid >> 32) as u32;
    let tid = pid_tgid as u32;

    if pid == 0 {
        return Verdict::Skipped(Skip::KernelContext);
    }

    if args.fd <= MAX_STD_FD {
        return Verdict::Skipped(Skip::ExcludedDescriptor);
    }

    if args.count == 0 || args.count > MAX_DATA_SIZE as u64 {
        return Verdict::Skipped(Skip::LengthOutOfBounds);
    }
    let len = args.count as usize;

    let Some(mut slot) = channel.reserve() else {
        return Verdict::Skipped(Skip::ChannelFull);
    };

    let event = slot.event_mut();
    event.timestamp = env.ktime_ns();
    event.pid = pid;
    event.tid = tid;
    event.direction = Direction::Outbound as u8;
    event._pad = [0; 3];
    event.fd = args.fd as u32;
    event.data_len = len as u32;
    event.comm = env.comm();
    event._reserved = [0; 4];

    if env.read_user(args.buf, &mut event.payload[..len]).is_err() {
        slot.discard();
        return Verdict::Skipped(Skip::CopyFailed);
    }

    if !looks_like_http(&event.payload, len) {
        slot.discard();
        return Verdict::Skipped(Skip::NotHttp);
    }

    slot.submit();
    Verdict::Submitted
}

/// Inbound hook, run on exit from `read(2)`.
///
/// Only the return value is available here; the destination buffer would
/// have to be carried over from a matching `sys_enter_read` probe. The hook
/// validates the read and stops without reserving anything.
#[inline(always)]
pub fn inspect_read_exit<E: ProbeEnv>(env: &E, ret: i64) -> Verdict {
    if ret <= 0 {
        return Verdict::Skipped(Skip::LengthOutOfBounds);
    }

    let pid = (env.pid_tgid() >> 32) as u32;
    if pid == 0 {
        return Verdict::Skipped(Skip::KernelContext);
    }

    Verdict::Skipped(Skip::PayloadUnavailable)
}
