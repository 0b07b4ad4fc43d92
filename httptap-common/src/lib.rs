//! Types and logic shared between the httptap eBPF programs and userspace.
//!
//! Everything outside the `memory` channel is `no_std`, allocation-free and
//! bounded, so the same code runs inside the BPF verifier and in host tests.
//!
//! - [`event`]: the fixed-layout [`HttpEvent`] record and its constants
//! - [`classify`]: the byte-prefix HTTP heuristic
//! - [`channel`]: reserve/submit/discard contract of the event ring buffer
//! - [`hooks`]: syscall hook bodies, generic over the execution environment

#![cfg_attr(not(any(test, feature = "user")), no_std)]

pub mod channel;
pub mod classify;
pub mod event;
pub mod hooks;

pub use channel::{EventChannel, EventSlot};
pub use classify::{Classification, classify, looks_like_http};
pub use event::{
    Direction, EVENTS_RINGBUF_SIZE, HttpEvent, MAX_DATA_SIZE, TASK_COMM_LEN,
};
pub use hooks::{ProbeEnv, Skip, Verdict, WriteArgs, capture_write, inspect_read_exit};

#[cfg(feature = "user")]
unsafe impl aya::Pod for HttpEvent {}
