pub mod cli;
pub mod event;
pub mod output;
pub mod probes;
pub mod settings;
pub mod stats;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use aya::Ebpf;
use log::{info, warn};
use tokio::signal::{
    self,
    unix::{SignalKind, signal as unix_signal},
};

use crate::{
    output::TraceWriter,
    probes::{AttachedProbe, Probe, builtin::HttpTrafficProbe, builtin::TrafficHandler},
    settings::Settings,
    stats::StatsSnapshot,
};

pub struct HttpTapEngine {
    pub settings: Settings,
    bpf: Ebpf,
}

impl HttpTapEngine {
    pub fn new(settings: Settings, bytecode: &[u8]) -> Result<Self> {
        if bytecode.is_empty() {
            bail!("eBPF object is empty; rebuild with the bpf-linker toolchain available");
        }
        bump_memlock_rlimit();
        let bpf = Ebpf::load(bytecode).context("Failed to load eBPF object")?;
        Ok(Self { settings, bpf })
    }

    pub async fn run(mut self) -> Result<StatsSnapshot> {
        telemetry::init_metrics(self.settings.otel_exporter_otlp_endpoint.as_deref())?;

        let output = self.settings.output_path();
        info!("Output file: {}", output.display());
        let writer = TraceWriter::create(
            &output,
            self.settings.output_format(),
            self.settings.preview_bytes(),
        )?;
        let handler = Arc::new(TrafficHandler::new(writer));
        handler.write_banner()?;

        let attached = self.attach_probes(handler.clone())?;
        for probe in &attached {
            info!("{}: {} program(s) attached", probe.name, probe.programs);
        }

        info!("Monitoring active. Press Ctrl-C to exit.");
        wait_for_shutdown().await?;
        info!("Exiting...");

        probes::request_shutdown();
        for probe in attached {
            if let Some(consumer) = probe.consumer {
                if let Err(e) = consumer.await {
                    warn!("{} consumer failed: {}", probe.name, e);
                }
            }
        }

        let stats = handler.finish()?;
        info!(
            "Processed {} events ({} requests, {} responses)",
            stats.events, stats.requests, stats.responses
        );
        telemetry::shutdown_metrics();
        Ok(stats)
    }

    fn attach_probes(&mut self, handler: Arc<TrafficHandler>) -> Result<Vec<AttachedProbe>> {
        let probe = HttpTrafficProbe {
            write_enter: self.settings.write_enter_enabled(),
            read_exit: self.settings.read_exit_enabled(),
            handler,
        };
        Ok(vec![probe.attach(&mut self.bpf)?])
    }
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = unix_signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        res = signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

/// Loading programs and maps needs locked memory on kernels without
/// memcg-based accounting.
fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to increase rlimit");
    }
}

/// Loading BPF programs requires an effective uid of 0.
pub fn ensure_privileges() -> Result<()> {
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        bail!(
            "httptap must run as root (effective uid is {}); eBPF programs cannot be loaded",
            euid
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_refused_before_loading() {
        let err = HttpTapEngine::new(Settings::default(), &[])
            .err()
            .expect("empty bytecode must be rejected");
        assert!(err.to_string().contains("eBPF object is empty"));
    }
}
