//! In-process event channel with kernel ring buffer accounting.
//!
//! Used to drive the hook bodies outside the kernel. Capacity is charged per
//! record the way `BPF_MAP_TYPE_RINGBUF` charges it: an 8-byte header plus the
//! record, rounded up to 8 bytes. Committed records hold their space until the
//! consumer pops them; discarded records release it immediately.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{EventChannel, EventSlot};
use crate::event::{EVENTS_RINGBUF_SIZE, HttpEvent};

/// Per-record header the kernel ring buffer prepends (`BPF_RINGBUF_HDR_SZ`).
pub const RINGBUF_HDR_SIZE: usize = 8;

/// Bytes one record of `len` bytes occupies in the ring.
pub const fn record_size(len: usize) -> usize {
    (len + RINGBUF_HDR_SIZE + 7) & !7
}

const EVENT_RECORD_SIZE: usize = record_size(core::mem::size_of::<HttpEvent>());

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Successful reservations
    pub reserved: u64,
    /// Reservations refused because the region was full
    pub rejected: u64,
    pub submitted: u64,
    pub discarded: u64,
    /// Slots dropped without `submit` or `discard`
    pub abandoned: u64,
    /// Submitted records taken by the consumer
    pub consumed: u64,
}

impl ChannelStats {
    /// Reservations not yet resolved.
    pub fn outstanding(&self) -> u64 {
        self.reserved - self.submitted - self.discarded - self.abandoned
    }
}

#[derive(Default)]
struct State {
    used: usize,
    committed: VecDeque<Box<HttpEvent>>,
    stats: ChannelStats,
}

pub struct MemoryChannel {
    capacity: usize,
    state: Mutex<State>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::with_byte_size(EVENTS_RINGBUF_SIZE as usize)
    }
}

impl MemoryChannel {
    pub fn with_byte_size(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held by reserved and not-yet-consumed records.
    pub fn used(&self) -> usize {
        self.lock().used
    }

    pub fn stats(&self) -> ChannelStats {
        self.lock().stats
    }

    /// Number of submitted records waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.lock().committed.len()
    }

    /// Take the oldest submitted record.
    pub fn pop(&self) -> Option<Box<HttpEvent>> {
        let mut state = self.lock();
        let event = state.committed.pop_front()?;
        state.used -= EVENT_RECORD_SIZE;
        state.stats.consumed += 1;
        Some(event)
    }

    /// Take every submitted record, oldest first.
    pub fn drain(&self) -> Vec<Box<HttpEvent>> {
        std::iter::from_fn(|| self.pop()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, f: impl FnOnce(&mut ChannelStats)) {
        let mut state = self.lock();
        state.used -= EVENT_RECORD_SIZE;
        f(&mut state.stats);
    }
}

impl EventChannel for MemoryChannel {
    type Slot<'a> = MemorySlot<'a>;

    fn reserve(&self) -> Option<MemorySlot<'_>> {
        {
            let mut state = self.lock();
            if state.used + EVENT_RECORD_SIZE > self.capacity {
                state.stats.rejected += 1;
                return None;
            }
            state.used += EVENT_RECORD_SIZE;
            state.stats.reserved += 1;
        }
        Some(MemorySlot {
            channel: self,
            event: Some(Box::new(HttpEvent::zeroed())),
        })
    }
}

/// A reserved, zero-filled record. Dropping it unresolved reclaims the space
/// and counts it as abandoned.
pub struct MemorySlot<'a> {
    channel: &'a MemoryChannel,
    event: Option<Box<HttpEvent>>,
}

impl EventSlot for MemorySlot<'_> {
    fn event_mut(&mut self) -> &mut HttpEvent {
        // Only emptied by submit/discard, which consume the slot.
        self.event
            .get_or_insert_with(|| Box::new(HttpEvent::zeroed()))
    }

    fn submit(mut self) {
        if let Some(event) = self.event.take() {
            let mut state = self.channel.lock();
            state.committed.push_back(event);
            state.stats.submitted += 1;
        }
    }

    fn discard(mut self) {
        if self.event.take().is_some() {
            self.channel.release(|stats| stats.discarded += 1);
        }
    }
}

impl Drop for MemorySlot<'_> {
    fn drop(&mut self) {
        if self.event.take().is_some() {
            self.channel.release(|stats| stats.abandoned += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_includes_header_and_rounding() {
        assert_eq!(record_size(0), 8);
        assert_eq!(record_size(1), 16);
        assert_eq!(record_size(8), 16);
        assert_eq!(EVENT_RECORD_SIZE, 16440);
    }

    #[test]
    fn default_region_holds_fifteen_events() {
        let channel = MemoryChannel::default();
        assert_eq!(channel.capacity(), 256 * 1024);

        let mut slots = Vec::new();
        for _ in 0..15 {
            slots.push(channel.reserve().expect("reservation within capacity"));
        }
        assert!(channel.reserve().is_none());
        assert_eq!(channel.stats().rejected, 1);

        for slot in slots {
            slot.discard();
        }
        assert_eq!(channel.used(), 0);
        assert!(channel.reserve().is_some());
    }

    #[test]
    fn reservations_are_zeroed() {
        let channel = MemoryChannel::default();
        let mut slot = channel.reserve().unwrap();
        slot.event_mut().pid = 42;
        slot.event_mut().payload[0] = 0xff;
        slot.discard();

        let mut slot = channel.reserve().unwrap();
        let event = slot.event_mut();
        assert_eq!(event.pid, 0);
        assert_eq!(event.payload[0], 0);
        slot.discard();
    }

    #[test]
    fn submitted_events_keep_order_and_space() {
        let channel = MemoryChannel::default();
        for pid in 1..=3 {
            let mut slot = channel.reserve().unwrap();
            slot.event_mut().pid = pid;
            slot.submit();
        }
        assert_eq!(channel.pending(), 3);
        assert_eq!(channel.used(), 3 * EVENT_RECORD_SIZE);

        let pids: Vec<u32> = channel.drain().iter().map(|e| e.pid).collect();
        assert_eq!(pids, vec![1, 2, 3]);
        assert_eq!(channel.used(), 0);
        assert_eq!(channel.stats().consumed, 3);
    }

    #[test]
    fn discarded_events_are_never_visible() {
        let channel = MemoryChannel::default();
        let mut slot = channel.reserve().unwrap();
        slot.event_mut().pid = 7;
        slot.discard();
        assert!(channel.pop().is_none());
        assert_eq!(channel.stats().discarded, 1);
    }

    #[test]
    fn repeated_cycles_leave_nothing_outstanding() {
        let channel = MemoryChannel::default();
        for i in 0..1000u32 {
            let mut slot = channel.reserve().unwrap();
            slot.event_mut().pid = i;
            if i % 3 == 0 {
                slot.submit();
            } else {
                slot.discard();
            }
            if channel.pending() > 8 {
                channel.drain();
            }
        }
        channel.drain();

        let stats = channel.stats();
        assert_eq!(stats.reserved, 1000);
        assert_eq!(stats.submitted + stats.discarded, 1000);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.abandoned, 0);
        assert_eq!(channel.used(), 0);
    }

    #[test]
    fn dropped_slot_is_reclaimed_as_abandoned() {
        let channel = MemoryChannel::default();
        {
            let _slot = channel.reserve().unwrap();
            assert_eq!(channel.stats().outstanding(), 1);
        }
        let stats = channel.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(channel.used(), 0);
    }
}
