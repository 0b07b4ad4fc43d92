/// Maximum payload bytes captured per syscall. Larger writes are never staged.
pub const MAX_DATA_SIZE: usize = 16384;

/// Width of the kernel task name (`comm`) field.
pub const TASK_COMM_LEN: usize = 16;

/// Byte size of the `EVENTS` ring buffer backing region (256KB).
pub const EVENTS_RINGBUF_SIZE: u32 = 256 * 1024;

/// Which side of the process the captured bytes were travelling.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes handed to `write(2)`
    Outbound = 1,
    /// Bytes returned from `read(2)`
    Inbound = 2,
}

impl Direction {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Direction::Outbound),
            2 => Some(Direction::Inbound),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "SEND",
            Direction::Inbound => "RECV",
        }
    }
}

/// One captured I/O operation, as written into the `EVENTS` ring buffer.
///
/// Layout (bpfel, 16432 bytes):
///
/// | offset | field       | size  |
/// |--------|-------------|-------|
/// | 0      | `timestamp` | 8     |
/// | 8      | `pid`       | 4     |
/// | 12     | `tid`       | 4     |
/// | 16     | `fd`        | 4     |
/// | 20     | `direction` | 1 (+3 pad) |
/// | 24     | `data_len`  | 4     |
/// | 28     | `comm`      | 16    |
/// | 44     | `payload`   | 16384 |
///
/// The record is always reserved at full size; only the first `data_len`
/// bytes of `payload` are meaningful. Padding is spelled out so every byte of
/// the record is initialized.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HttpEvent {
    /// `bpf_ktime_get_ns()` at capture (CLOCK_MONOTONIC)
    pub timestamp: u64,
    pub pid: u32,
    pub tid: u32,
    pub fd: u32,
    /// [`Direction`] wire tag
    pub direction: u8,
    pub _pad: [u8; 3],
    pub data_len: u32,
    pub comm: [u8; TASK_COMM_LEN],
    pub payload: [u8; MAX_DATA_SIZE],
    pub _reserved: [u8; 4],
}

const _: () = assert!(core::mem::size_of::<HttpEvent>() == 16432);
const _: () = assert!(core::mem::offset_of!(HttpEvent, payload) == 44);

impl HttpEvent {
    pub const fn zeroed() -> Self {
        Self {
            timestamp: 0,
            pid: 0,
            tid: 0,
            fd: 0,
            direction: 0,
            _pad: [0; 3],
            data_len: 0,
            comm: [0; TASK_COMM_LEN],
            payload: [0; MAX_DATA_SIZE],
            _reserved: [0; 4],
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::from_tag(self.direction)
    }

    /// Valid payload bytes, clamped to the buffer capacity.
    pub fn payload(&self) -> &[u8] {
        let len = core::cmp::min(self.data_len as usize, MAX_DATA_SIZE);
        &self.payload[..len]
    }

    /// Process name up to the first NUL.
    pub fn process_name(&self) -> &str {
        let end = self
            .comm
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TASK_COMM_LEN);
        core::str::from_utf8(&self.comm[..end]).unwrap_or("<invalid>")
    }

    /// The record exactly as it crosses the ring buffer.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C), every byte is a named integer field.
        unsafe {
            core::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                core::mem::size_of::<Self>(),
            )
        }
    }
}

impl Default for HttpEvent {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_tags_match_wire_values() {
        assert_eq!(Direction::Outbound as u8, 1);
        assert_eq!(Direction::Inbound as u8, 2);
        assert_eq!(Direction::from_tag(1), Some(Direction::Outbound));
        assert_eq!(Direction::from_tag(2), Some(Direction::Inbound));
        assert_eq!(Direction::from_tag(0), None);
        assert_eq!(Direction::from_tag(3), None);
    }

    #[test]
    fn field_offsets_match_wire_format() {
        use core::mem::offset_of;
        assert_eq!(offset_of!(HttpEvent, timestamp), 0);
        assert_eq!(offset_of!(HttpEvent, pid), 8);
        assert_eq!(offset_of!(HttpEvent, tid), 12);
        assert_eq!(offset_of!(HttpEvent, fd), 16);
        assert_eq!(offset_of!(HttpEvent, direction), 20);
        assert_eq!(offset_of!(HttpEvent, data_len), 24);
        assert_eq!(offset_of!(HttpEvent, comm), 28);
        assert_eq!(offset_of!(HttpEvent, payload), 44);
        assert_eq!(core::mem::align_of::<HttpEvent>(), 8);
    }

    #[test]
    fn process_name_stops_at_nul() {
        let mut e = Box::new(HttpEvent::zeroed());
        e.comm[..5].copy_from_slice(b"curl\0");
        assert_eq!(e.process_name(), "curl");

        e.comm = *b"0123456789abcdef";
        assert_eq!(e.process_name(), "0123456789abcdef");

        e.comm = [0; TASK_COMM_LEN];
        assert_eq!(e.process_name(), "");
    }

    #[test]
    fn payload_is_clamped_to_capacity() {
        let mut e = Box::new(HttpEvent::zeroed());
        e.data_len = 4;
        e.payload[..4].copy_from_slice(b"GET ");
        assert_eq!(e.payload(), b"GET ");

        e.data_len = u32::MAX;
        assert_eq!(e.payload().len(), MAX_DATA_SIZE);
    }

    #[test]
    fn as_bytes_covers_whole_record() {
        let mut e = Box::new(HttpEvent::zeroed());
        e.pid = 0x0102_0304;
        let bytes = e.as_bytes();
        assert_eq!(bytes.len(), 16432);
        assert_eq!(&bytes[8..12], &0x0102_0304u32.to_ne_bytes());
    }
}
