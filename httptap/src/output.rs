//! Trace sink for captured HTTP traffic.
//!
//! The text format writes a start banner, one block per event and a
//! shutdown summary. The json format writes the same records as one JSON
//! object per line.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    event::{CapturedEvent, MonotonicClock},
    stats::StatsSnapshot,
};

const BANNER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonRecord<'a> {
    Start {
        time: DateTime<Utc>,
    },
    Event {
        time: DateTime<Utc>,
        pid: u32,
        tid: u32,
        fd: u32,
        direction: &'static str,
        comm: &'a str,
        kind: Option<&'static str>,
        summary: String,
        data_len: usize,
        preview: String,
        truncated: bool,
    },
    Summary {
        time: DateTime<Utc>,
        events: u64,
        requests: u64,
        responses: u64,
        payload_bytes: u64,
        decode_errors: u64,
    },
}

pub struct TraceWriter {
    out: BufWriter<File>,
    format: OutputFormat,
    preview_bytes: usize,
    clock: MonotonicClock,
}

impl TraceWriter {
    /// Create (or truncate) the trace file, creating parent directories.
    pub fn create(path: &Path, format: OutputFormat, preview_bytes: usize) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create trace file {}", path.display()))?;

        Ok(Self {
            out: BufWriter::new(file),
            format,
            preview_bytes,
            clock: MonotonicClock::new(),
        })
    }

    pub fn with_clock(mut self, clock: MonotonicClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn write_banner(&mut self) -> Result<()> {
        let now = Utc::now();
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "HTTP trace started at {}\n",
                now.with_timezone(&Local).format(BANNER_TIME_FORMAT)
            )?,
            OutputFormat::Json => self.write_json(&JsonRecord::Start { time: now })?,
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn write_event(&mut self, event: &CapturedEvent) -> Result<()> {
        let time = self.clock.to_wall(event.timestamp_ns);
        let shown = event.payload.len().min(self.preview_bytes);
        let truncated = shown < event.payload.len();

        match self.format {
            OutputFormat::Text => {
                writeln!(
                    self.out,
                    "[{}] {} pid={} tid={} comm={} fd={} len={}",
                    time.with_timezone(&Local).format(EVENT_TIME_FORMAT),
                    event.direction.as_str(),
                    event.pid,
                    event.tid,
                    event.comm,
                    event.fd,
                    event.payload.len()
                )?;
                writeln!(self.out, "{}", escape_preview(&event.payload[..shown]))?;
                if truncated {
                    writeln!(self.out, "... ({} more bytes)", event.payload.len() - shown)?;
                }
                writeln!(self.out)?;
            }
            OutputFormat::Json => {
                let record = JsonRecord::Event {
                    time,
                    pid: event.pid,
                    tid: event.tid,
                    fd: event.fd,
                    direction: event.direction.as_str(),
                    comm: &event.comm,
                    kind: event.kind().map(|k| k.as_str()),
                    summary: event.summary().to_string(),
                    data_len: event.payload.len(),
                    preview: String::from_utf8_lossy(&event.payload[..shown]).into_owned(),
                    truncated,
                };
                self.write_json(&record)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn write_summary(&mut self, stats: &StatsSnapshot) -> Result<()> {
        let now = Utc::now();
        match self.format {
            OutputFormat::Text => {
                writeln!(
                    self.out,
                    "\nHTTP trace stopped at {}",
                    now.with_timezone(&Local).format(BANNER_TIME_FORMAT)
                )?;
                writeln!(self.out, "Total events processed: {}", stats.events)?;
                writeln!(self.out, "HTTP requests: {}", stats.requests)?;
                writeln!(self.out, "HTTP responses: {}", stats.responses)?;
                writeln!(self.out, "Payload bytes: {}", stats.payload_bytes)?;
                writeln!(self.out, "Decode errors: {}", stats.decode_errors)?;
            }
            OutputFormat::Json => self.write_json(&JsonRecord::Summary {
                time: now,
                events: stats.events,
                requests: stats.requests,
                responses: stats.responses,
                payload_bytes: stats.payload_bytes,
                decode_errors: stats.decode_errors,
            })?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn write_json(&mut self, record: &JsonRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

/// Printable rendering of a payload: CR/LF pairs become line breaks, other
/// control bytes and invalid UTF-8 are shown as escapes.
fn escape_preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(text.len());
    for c in text.trim_end_matches(['\r', '\n', '\0']).chars() {
        match c {
            '\r' => {}
            '\n' | '\t' => out.push(c),
            c if c.is_control() => out.extend(c.escape_default()),
            c => out.push(c),
        }
    }
    out
}
