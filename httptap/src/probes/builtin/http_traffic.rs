use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use aya::Ebpf;
use log::{info, warn};

use crate::{
    event::{CapturedEvent, MonotonicClock},
    output::TraceWriter,
    probes::{AttachedProbe, Probe, TracepointConfig, attach_tracepoint, spawn_ringbuf_handler},
    stats::{CaptureStats, StatsSnapshot},
    telemetry,
};

pub const EVENTS_MAP: &str = "EVENTS";

const WRITE_ENTER: TracepointConfig<'static> = TracepointConfig {
    program_name: "trace_write_enter",
    category: "syscalls",
    name: "sys_enter_write",
};

const READ_EXIT: TracepointConfig<'static> = TracepointConfig {
    program_name: "trace_read_exit",
    category: "syscalls",
    name: "sys_exit_read",
};

const CONSOLE_TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Decodes `EVENTS` records, updates counters and feeds the trace sink.
pub struct TrafficHandler {
    writer: Mutex<TraceWriter>,
    stats: CaptureStats,
    clock: MonotonicClock,
}

impl TrafficHandler {
    pub fn new(writer: TraceWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
            stats: CaptureStats::default(),
            clock: MonotonicClock::new(),
        }
    }

    pub fn handle_record(&self, record: &[u8]) {
        let event = match CapturedEvent::decode(record) {
            Ok(event) => event,
            Err(e) => {
                self.stats.record_decode_error();
                telemetry::record_decode_error(e.reason());
                warn!("Dropping EVENTS record: {}", e);
                return;
            }
        };

        let kind = event.kind();
        self.stats.record_event(kind, event.payload.len());
        telemetry::record_http_event(event.direction, kind, &event.comm, event.payload.len());

        info!(
            "[{}] PID {} ({}) fd={} {}: {}",
            self.clock.to_wall(event.timestamp_ns).format(CONSOLE_TIME_FORMAT),
            event.pid,
            event.comm,
            event.fd,
            event.direction.as_str(),
            event.summary()
        );

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writer.write_event(&event) {
            warn!("Failed to write trace event: {:#}", e);
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn write_banner(&self) -> Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write_banner()
    }

    /// Write the shutdown summary and return the final counters.
    pub fn finish(&self) -> Result<StatsSnapshot> {
        let snapshot = self.stats();
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write_summary(&snapshot)?;
        Ok(snapshot)
    }
}

/// `trace_write_enter` on sys_enter_write, `trace_read_exit` on sys_exit_read.
pub struct HttpTrafficProbe {
    pub write_enter: bool,
    pub read_exit: bool,
    pub handler: Arc<TrafficHandler>,
}

impl Probe for HttpTrafficProbe {
    fn attach(&self, bpf: &mut Ebpf) -> Result<AttachedProbe> {
        let mut programs = 0;

        if self.write_enter && attach_tracepoint(bpf, WRITE_ENTER)? {
            programs += 1;
        }
        if self.read_exit && attach_tracepoint(bpf, READ_EXIT)? {
            programs += 1;
        }

        if programs == 0 {
            bail!("No HTTP traffic tracepoints attached");
        }
        if !self.write_enter {
            warn!("trace_write_enter disabled; no events will be captured");
        }

        let handler = self.handler.clone();
        let consumer = spawn_ringbuf_handler(bpf, EVENTS_MAP, move |record| {
            handler.handle_record(record)
        })?;

        telemetry::record_active_probe("http_traffic", programs);
        info!("HttpTrafficProbe attached successfully");

        Ok(AttachedProbe {
            name: "http_traffic",
            programs,
            consumer: Some(consumer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use httptap_common::{
        ProbeEnv, Verdict, WriteArgs, capture_write, channel::memory::MemoryChannel,
    };
    use std::fs;
    use tempfile::tempdir;

    struct UserProcess {
        memory: Vec<u8>,
    }

    impl ProbeEnv for UserProcess {
        fn pid_tgid(&self) -> u64 {
            (1234u64 << 32) | 1235
        }

        fn ktime_ns(&self) -> u64 {
            2_000_000
        }

        fn comm(&self) -> [u8; 16] {
            *b"python3\0\0\0\0\0\0\0\0\0"
        }

        fn read_user(&self, _src: u64, dst: &mut [u8]) -> Result<(), i64> {
            dst.copy_from_slice(&self.memory[..dst.len()]);
            Ok(())
        }
    }

    fn write(channel: &MemoryChannel, payload: &[u8]) -> Verdict {
        let env = UserProcess {
            memory: payload.to_vec(),
        };
        capture_write(
            &env,
            channel,
            WriteArgs {
                fd: 9,
                buf: 0x7fff_0000,
                count: payload.len() as u64,
            },
        )
    }

    #[test]
    fn captured_writes_reach_the_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let writer = TraceWriter::create(&path, OutputFormat::Text, 512).unwrap();
        let handler = TrafficHandler::new(writer);
        handler.write_banner().unwrap();

        let channel = MemoryChannel::default();
        assert_eq!(write(&channel, b"GET /api/users HTTP/1.1\r\n\r\n"), Verdict::Submitted);
        write(&channel, b"\x16\x03\x01\x02\x00");
        assert_eq!(write(&channel, b"HTTP/1.1 201 Created\r\n\r\n"), Verdict::Submitted);

        for event in channel.drain() {
            handler.handle_record(event.as_bytes());
        }
        let stats = handler.finish().unwrap();

        assert_eq!(stats.events, 2);
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.responses, 1);
        assert_eq!(stats.decode_errors, 0);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("SEND pid=1234 tid=1235 comm=python3 fd=9"));
        assert!(contents.contains("GET /api/users HTTP/1.1"));
        assert!(contents.contains("HTTP/1.1 201 Created"));
        assert!(!contents.contains("\\u{16}"));
        assert!(contents.contains("Total events processed: 2"));
    }

    #[test]
    fn bad_records_are_counted_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let writer = TraceWriter::create(&path, OutputFormat::Text, 512).unwrap();
        let handler = TrafficHandler::new(writer);

        handler.handle_record(&[0u8; 32]);

        let stats = handler.stats();
        assert_eq!(stats.events, 0);
        assert_eq!(stats.decode_errors, 1);
        assert!(fs::read_to_string(&path).unwrap().is_empty());
    }
}
