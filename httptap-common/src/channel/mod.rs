//! Reserve/commit contract of the event ring buffer.
//!
//! A producer reserves one [`HttpEvent`] slot, fills it in place and then
//! resolves it exactly once, with [`EventSlot::submit`] (visible to the
//! consumer, in submission order) or [`EventSlot::discard`] (reclaimed, never
//! visible). Both consume the handle. A failed reservation means the region is
//! exhausted and the event is dropped; producers never retry or wait.
//!
//! In the kernel this is the `EVENTS` `RingBuf` map. [`memory::MemoryChannel`]
//! is the host-side equivalent.

use crate::event::HttpEvent;

#[cfg(any(test, feature = "user"))]
pub mod memory;

/// Exclusive handle to one reserved event record.
pub trait EventSlot {
    /// The record being populated. Only valid until the slot is resolved.
    ///
    /// Contents are unspecified on reservation: [`memory::MemoryChannel`]
    /// hands out zero-filled records, but kernel ring buffer memory still
    /// holds whatever an earlier record left there. Producers write every
    /// header field, padding included; consumers read only the first
    /// `data_len` payload bytes.
    fn event_mut(&mut self) -> &mut HttpEvent;

    /// Publish the record to the consumer. Irreversible.
    fn submit(self);

    /// Release the record without publishing it.
    fn discard(self);
}

/// Bounded producer side of the event channel.
pub trait EventChannel {
    type Slot<'a>: EventSlot
    where
        Self: 'a;

    /// Reserve space for one full [`HttpEvent`]. `None` when the channel is full.
    /// The slot is not guaranteed to be zeroed, see [`EventSlot::event_mut`].
    fn reserve(&self) -> Option<Self::Slot<'_>>;
}
