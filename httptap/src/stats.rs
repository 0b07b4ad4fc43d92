use std::sync::atomic::{AtomicU64, Ordering};

use httptap_common::Classification;

/// Counters shared between the ring buffer handler and the shutdown path.
#[derive(Debug, Default)]
pub struct CaptureStats {
    events: AtomicU64,
    requests: AtomicU64,
    responses: AtomicU64,
    payload_bytes: AtomicU64,
    decode_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events: u64,
    pub requests: u64,
    pub responses: u64,
    pub payload_bytes: u64,
    pub decode_errors: u64,
}

impl StatsSnapshot {
    pub fn http_messages(&self) -> u64 {
        self.requests + self.responses
    }
}

impl CaptureStats {
    pub fn record_event(&self, kind: Option<Classification>, payload_len: usize) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.payload_bytes
            .fetch_add(payload_len as u64, Ordering::Relaxed);
        match kind {
            Some(Classification::Request) => {
                self.requests.fetch_add(1, Ordering::Relaxed);
            }
            Some(Classification::Response) => {
                self.responses.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            payload_bytes: self.payload_bytes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_classification() {
        let stats = CaptureStats::default();
        stats.record_event(Some(Classification::Request), 27);
        stats.record_event(Some(Classification::Response), 100);
        stats.record_event(Some(Classification::Request), 3);
        stats.record_decode_error();

        let snap = stats.snapshot();
        assert_eq!(snap.events, 3);
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.responses, 1);
        assert_eq!(snap.http_messages(), 3);
        assert_eq!(snap.payload_bytes, 130);
        assert_eq!(snap.decode_errors, 1);
    }
}
