//! HTTP traffic tracepoints.
//!
//! - `trace_write_enter` → `syscalls:sys_enter_write`: copies the written
//!   buffer into an `EVENTS` slot and submits it when it looks like HTTP
//! - `trace_read_exit` → `syscalls:sys_exit_read`: validates the read; the
//!   destination buffer is not available at exit, so nothing is emitted

use core::mem::offset_of;

use aya_ebpf::{
    macros::{map, tracepoint},
    maps::RingBuf,
    programs::TracePointContext,
};
use httptap_common::{EVENTS_RINGBUF_SIZE, Verdict, WriteArgs, capture_write, inspect_read_exit};

use super::syscall_types::{SysEnterWrite, SysExitRead};
use crate::probes::{KernelEnv, RingChannel};

#[map]
pub static EVENTS: RingBuf = RingBuf::with_byte_size(EVENTS_RINGBUF_SIZE, 0);

#[tracepoint]
pub fn trace_write_enter(ctx: TracePointContext) -> u32 {
    match try_write_enter(&ctx) {
        Ok(_) => 0,
        Err(_) => 0,
    }
}

#[tracepoint]
pub fn trace_read_exit(ctx: TracePointContext) -> u32 {
    match try_read_exit(&ctx) {
        Ok(_) => 0,
        Err(_) => 0,
    }
}

#[inline(always)]
fn try_write_enter(ctx: &TracePointContext) -> Result<Verdict, i64> {
    let fd: u64 = unsafe { ctx.read_at(offset_of!(SysEnterWrite, fd))? };
    let buf: u64 = unsafe { ctx.read_at(offset_of!(SysEnterWrite, buf))? };
    let count: u64 = unsafe { ctx.read_at(offset_of!(SysEnterWrite, count))? };

    let args = WriteArgs {
        fd: fd as i32,
        buf,
        count,
    };

    Ok(capture_write(&KernelEnv, &RingChannel::new(&EVENTS), args))
}

#[inline(always)]
fn try_read_exit(ctx: &TracePointContext) -> Result<Verdict, i64> {
    let ret: i64 = unsafe { ctx.read_at(offset_of!(SysExitRead, ret))? };
    Ok(inspect_read_exit(&KernelEnv, ret))
}
