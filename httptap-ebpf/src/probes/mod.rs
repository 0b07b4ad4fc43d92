//! Bindings from the shared hook logic to BPF helpers and maps.

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_user_buf,
    },
    maps::{RingBuf, ring_buf::RingBufEntry},
};
use httptap_common::{EventChannel, EventSlot, HttpEvent, ProbeEnv, TASK_COMM_LEN};

pub mod builtin;

/// Helpers of the current task.
pub struct KernelEnv;

impl ProbeEnv for KernelEnv {
    #[inline(always)]
    fn pid_tgid(&self) -> u64 {
        bpf_get_current_pid_tgid()
    }

    #[inline(always)]
    fn ktime_ns(&self) -> u64 {
        unsafe { bpf_ktime_get_ns() }
    }

    #[inline(always)]
    fn comm(&self) -> [u8; TASK_COMM_LEN] {
        bpf_get_current_comm().unwrap_or([0; TASK_COMM_LEN])
    }

    #[inline(always)]
    fn read_user(&self, src: u64, dst: &mut [u8]) -> Result<(), i64> {
        unsafe { bpf_probe_read_user_buf(src as *const u8, dst) }
    }
}

/// `RingBuf` map viewed as an event channel.
pub struct RingChannel(&'static RingBuf);

impl RingChannel {
    pub const fn new(ring: &'static RingBuf) -> Self {
        Self(ring)
    }
}

impl EventChannel for RingChannel {
    type Slot<'a> = RingSlot;

    #[inline(always)]
    fn reserve(&self) -> Option<RingSlot> {
        self.0.reserve::<HttpEvent>(0).map(RingSlot)
    }
}

pub struct RingSlot(RingBufEntry<HttpEvent>);

impl EventSlot for RingSlot {
    #[inline(always)]
    fn event_mut(&mut self) -> &mut HttpEvent {
        // Ring buffer memory is not zeroed; the hooks write every header field
        // and only the first `data_len` payload bytes are read back.
        unsafe { &mut *self.0.as_mut_ptr() }
    }

    #[inline(always)]
    fn submit(self) {
        self.0.submit(0);
    }

    #[inline(always)]
    fn discard(self) {
        self.0.discard(0);
    }
}
