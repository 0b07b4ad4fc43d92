use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use aya::{Ebpf, maps::RingBuf, programs::TracePoint};
use log::{debug, info, warn};
use tokio::task::JoinHandle;

static SHUTDOWN: once_cell::sync::Lazy<Arc<AtomicBool>> =
    once_cell::sync::Lazy::new(|| Arc::new(AtomicBool::new(false)));

pub fn shutdown_flag() -> Arc<AtomicBool> {
    SHUTDOWN.clone()
}

pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub mod builtin;

/// Result of attaching a probe.
pub struct AttachedProbe {
    pub name: &'static str,
    /// Number of programs actually attached
    pub programs: u64,
    /// Ring buffer consumer; finishes after shutdown is requested
    pub consumer: Option<JoinHandle<()>>,
}

pub trait Probe {
    fn attach(&self, bpf: &mut Ebpf) -> Result<AttachedProbe>;
}

pub struct TracepointConfig<'a> {
    pub program_name: &'a str,
    pub category: &'a str,
    pub name: &'a str,
}

pub const POLL_INTERVAL_MS: u64 = 10;

fn tracepoint_exists(category: &str, name: &str) -> bool {
    const TRACEFS_MOUNT_POINTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

    TRACEFS_MOUNT_POINTS.iter().any(|base| {
        Path::new(base)
            .join("events")
            .join(category)
            .join(name)
            .exists()
    })
}

/// Load and attach a tracepoint program. Returns `false` when the
/// tracepoint does not exist on this kernel.
pub fn attach_tracepoint(bpf: &mut Ebpf, config: TracepointConfig) -> Result<bool> {
    if !tracepoint_exists(config.category, config.name) {
        warn!(
            "Tracepoint {}:{} not available; skipping {}",
            config.category, config.name, config.program_name
        );
        return Ok(false);
    }

    info!("Loading program {}", config.program_name);
    let program: &mut TracePoint = bpf
        .program_mut(config.program_name)
        .with_context(|| format!("Failed to find {} program", config.program_name))?
        .try_into()?;
    program.load()?;
    program
        .attach(config.category, config.name)
        .with_context(|| format!("Failed to attach {}:{}", config.category, config.name))?;
    info!(
        "Tracepoint attached to {}:{}",
        config.category, config.name
    );
    Ok(true)
}

/// Drain `map_name` on a blocking thread, handing each record to `handler`.
///
/// Polls every [`POLL_INTERVAL_MS`] while the ring is empty. Records already
/// queued when shutdown is requested are still delivered.
pub fn spawn_ringbuf_handler<F>(bpf: &mut Ebpf, map_name: &str, mut handler: F) -> Result<JoinHandle<()>>
where
    F: FnMut(&[u8]) + Send + 'static,
{
    let mut ring_buf = RingBuf::try_from(
        bpf.take_map(map_name)
            .with_context(|| format!("Failed to get {} map", map_name))?,
    )?;
    let shutdown = shutdown_flag();
    let map_name = map_name.to_string();

    Ok(tokio::task::spawn_blocking(move || {
        loop {
            let mut has_work = false;
            while let Some(item) = ring_buf.next() {
                has_work = true;
                handler(&*item);
            }
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            if !has_work {
                std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
        }
        debug!("{} consumer stopped", map_name);
    }))
}
