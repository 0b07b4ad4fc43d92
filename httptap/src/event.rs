//! Decoding of `EVENTS` ring buffer records.

use std::fmt;

use chrono::{DateTime, Utc};
use httptap_common::{Classification, Direction, HttpEvent, MAX_DATA_SIZE, classify};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {len} bytes, expected {expected}")]
    TooShort { len: usize, expected: usize },
    #[error("unknown direction tag {0}")]
    UnknownDirection(u8),
    #[error("payload length {0} exceeds capacity {MAX_DATA_SIZE}")]
    PayloadOverflow(u32),
}

impl DecodeError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::TooShort { .. } => "too_short",
            DecodeError::UnknownDirection(_) => "unknown_direction",
            DecodeError::PayloadOverflow(_) => "payload_overflow",
        }
    }
}

/// One decoded capture, detached from the ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Monotonic capture time in nanoseconds
    pub timestamp_ns: u64,
    pub pid: u32,
    pub tid: u32,
    pub fd: u32,
    pub direction: Direction,
    pub comm: String,
    pub payload: Vec<u8>,
}

impl CapturedEvent {
    /// Decode a raw ring buffer record.
    pub fn decode(record: &[u8]) -> Result<Self, DecodeError> {
        let expected = std::mem::size_of::<HttpEvent>();
        if record.len() < expected {
            return Err(DecodeError::TooShort {
                len: record.len(),
                expected,
            });
        }
        let raw = unsafe { std::ptr::read_unaligned(record.as_ptr() as *const HttpEvent) };
        Self::try_from(&raw)
    }

    pub fn kind(&self) -> Option<Classification> {
        classify(&self.payload, self.payload.len())
    }

    pub fn summary(&self) -> HttpSummary {
        HttpSummary::parse(&self.payload)
    }
}

impl TryFrom<&HttpEvent> for CapturedEvent {
    type Error = DecodeError;

    fn try_from(raw: &HttpEvent) -> Result<Self, DecodeError> {
        let direction =
            Direction::from_tag(raw.direction).ok_or(DecodeError::UnknownDirection(raw.direction))?;
        if raw.data_len as usize > MAX_DATA_SIZE {
            return Err(DecodeError::PayloadOverflow(raw.data_len));
        }

        Ok(Self {
            timestamp_ns: raw.timestamp,
            pid: raw.pid,
            tid: raw.tid,
            fd: raw.fd,
            direction,
            comm: raw.process_name().to_string(),
            payload: raw.payload().to_vec(),
        })
    }
}

/// First line of a captured HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpSummary {
    Request {
        method: String,
        path: String,
        version: u8,
    },
    Response {
        version: u8,
        code: u16,
        reason: String,
    },
    /// Not parseable as a start line; holds a lossy preview of the first line
    Unparsed(String),
}

const MAX_HEADERS: usize = 64;
const UNPARSED_PREVIEW_CHARS: usize = 120;

impl HttpSummary {
    pub fn parse(payload: &[u8]) -> Self {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        // Partial parses still fill in the start line.
        if req.parse(payload).is_ok() {
            if let (Some(method), Some(path), Some(version)) = (req.method, req.path, req.version) {
                return HttpSummary::Request {
                    method: method.to_string(),
                    path: path.to_string(),
                    version,
                };
            }
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut headers);
        if resp.parse(payload).is_ok() {
            if let (Some(version), Some(code)) = (resp.version, resp.code) {
                return HttpSummary::Response {
                    version,
                    code,
                    reason: resp.reason.unwrap_or_default().to_string(),
                };
            }
        }

        HttpSummary::Unparsed(first_line_preview(payload))
    }
}

impl fmt::Display for HttpSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpSummary::Request {
                method,
                path,
                version,
            } => write!(f, "{} {} HTTP/1.{}", method, path, version),
            HttpSummary::Response {
                version,
                code,
                reason,
            } => {
                write!(f, "HTTP/1.{} {}", version, code)?;
                if !reason.is_empty() {
                    write!(f, " {}", reason)?;
                }
                Ok(())
            }
            HttpSummary::Unparsed(line) => write!(f, "{}", line),
        }
    }
}

fn first_line_preview(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end])
        .chars()
        .filter(|c| !c.is_control())
        .take(UNPARSED_PREVIEW_CHARS)
        .collect()
}

/// Converts `bpf_ktime_get_ns` (CLOCK_MONOTONIC) readings to wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    /// realtime - monotonic, in nanoseconds
    offset_ns: i128,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let realtime = Utc::now().timestamp_nanos_opt().unwrap_or_default() as i128;
        Self {
            offset_ns: realtime - monotonic_now_ns() as i128,
        }
    }

    pub fn with_offset(offset_ns: i128) -> Self {
        Self { offset_ns }
    }

    pub fn to_wall(&self, monotonic_ns: u64) -> DateTime<Utc> {
        let wall = (monotonic_ns as i128 + self.offset_ns).clamp(0, i64::MAX as i128) as i64;
        DateTime::from_timestamp_nanos(wall)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

fn monotonic_now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC is always available on Linux.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(payload: &[u8]) -> Box<HttpEvent> {
        let mut raw = Box::new(HttpEvent::zeroed());
        raw.timestamp = 42;
        raw.pid = 100;
        raw.tid = 101;
        raw.fd = 5;
        raw.direction = Direction::Outbound as u8;
        raw.data_len = payload.len() as u32;
        raw.comm[..6].copy_from_slice(b"nginx\0");
        raw.payload[..payload.len()].copy_from_slice(payload);
        raw
    }

    #[test]
    fn decode_reads_all_fields() {
        let raw = raw_event(b"GET /health HTTP/1.1\r\n\r\n");
        let event = CapturedEvent::decode(raw.as_bytes()).unwrap();

        assert_eq!(event.timestamp_ns, 42);
        assert_eq!(event.pid, 100);
        assert_eq!(event.tid, 101);
        assert_eq!(event.fd, 5);
        assert_eq!(event.direction, Direction::Outbound);
        assert_eq!(event.comm, "nginx");
        assert_eq!(event.payload, b"GET /health HTTP/1.1\r\n\r\n");
        assert_eq!(event.kind(), Some(Classification::Request));
    }

    #[test]
    fn decode_rejects_short_record() {
        let raw = raw_event(b"GET ");
        let err = CapturedEvent::decode(&raw.as_bytes()[..100]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                len: 100,
                expected: 16432
            }
        );
    }

    #[test]
    fn decode_rejects_unknown_direction() {
        let mut raw = raw_event(b"GET ");
        raw.direction = 9;
        assert_eq!(
            CapturedEvent::decode(raw.as_bytes()),
            Err(DecodeError::UnknownDirection(9))
        );
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let mut raw = raw_event(b"GET ");
        raw.data_len = MAX_DATA_SIZE as u32 + 1;
        assert_eq!(
            CapturedEvent::decode(raw.as_bytes()),
            Err(DecodeError::PayloadOverflow(MAX_DATA_SIZE as u32 + 1))
        );
    }

    #[test]
    fn decode_accepts_unaligned_buffer() {
        let raw = raw_event(b"HTTP/1.1 200 OK\r\n");
        let mut shifted = vec![0u8; 1];
        shifted.extend_from_slice(raw.as_bytes());
        let event = CapturedEvent::decode(&shifted[1..]).unwrap();
        assert_eq!(event.kind(), Some(Classification::Response));
    }

    #[test]
    fn summary_of_request_line() {
        let summary = HttpSummary::parse(b"POST /v1/items?id=3 HTTP/1.1\r\nHost: a\r\n");
        assert_eq!(summary.to_string(), "POST /v1/items?id=3 HTTP/1.1");
    }

    #[test]
    fn summary_of_status_line() {
        let summary = HttpSummary::parse(b"HTTP/1.0 503 Service Unavailable\r\n\r\n");
        assert_eq!(
            summary,
            HttpSummary::Response {
                version: 0,
                code: 503,
                reason: "Service Unavailable".to_string()
            }
        );
        assert_eq!(summary.to_string(), "HTTP/1.0 503 Service Unavailable");
    }

    #[test]
    fn summary_falls_back_to_first_line() {
        let summary = HttpSummary::parse(b"DELEGATE everything\r\nmore");
        assert_eq!(summary, HttpSummary::Unparsed("DELEGATE everything".to_string()));

        let summary = HttpSummary::parse(b"HTTP/x.1 weird\n");
        assert_eq!(summary.to_string(), "HTTP/x.1 weird");
    }

    #[test]
    fn clock_applies_offset() {
        let clock = MonotonicClock::with_offset(1_700_000_000_000_000_000);
        let wall = clock.to_wall(5_000_000_000);
        assert_eq!(wall.timestamp(), 1_700_000_005);
    }
}
