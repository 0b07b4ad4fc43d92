//! OpenTelemetry metrics export
//!
//! Exports capture counters to an OpenTelemetry Collector over OTLP/gRPC.
//! Export is enabled only when `OTEL_EXPORTER_OTLP_ENDPOINT` is configured;
//! every `record_*` helper is a no-op otherwise.

use anyhow::{Context, Result};
use httptap_common::{Classification, Direction};
use log::info;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

/// Metric export interval in seconds
const METRIC_EXPORT_INTERVAL_SECS: u64 = 30;

const EXPORT_TIMEOUT_SECS: u64 = 10;

const SERVICE_NAME: &str = "httptap";

static METRICS: OnceLock<HttpTapMetrics> = OnceLock::new();

static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Attached programs per probe, read by the `active_probes` gauge callback
static ACTIVE_PROBES: OnceLock<RwLock<HashMap<String, u64>>> = OnceLock::new();

fn active_probes_map() -> &'static RwLock<HashMap<String, u64>> {
    ACTIVE_PROBES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Note: no `_total` suffix on counters, Prometheus adds it.
pub struct HttpTapMetrics {
    pub http_events: Counter<u64>,
    pub http_payload_bytes: Counter<u64>,
    pub decode_errors: Counter<u64>,
}

impl HttpTapMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            http_events: meter
                .u64_counter("http_events")
                .with_description("Number of captured HTTP-shaped syscall buffers")
                .with_unit("events")
                .build(),
            http_payload_bytes: meter
                .u64_counter("http_payload_bytes")
                .with_description("Payload bytes carried by captured events")
                .with_unit("bytes")
                .build(),
            decode_errors: meter
                .u64_counter("decode_errors")
                .with_description("Ring buffer records that failed to decode")
                .with_unit("records")
                .build(),
        }
    }
}

/// Adds `http://` when the endpoint has no scheme; empty means disabled.
pub fn normalize_endpoint(raw: &str) -> Option<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return None;
    }

    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        Some(format!("http://{}", endpoint))
    } else {
        Some(endpoint.to_string())
    }
}

/// Initialize the OTLP meter provider.
///
/// Must run inside the tokio runtime; the periodic reader spawns on it.
pub fn init_metrics(endpoint: Option<&str>) -> Result<()> {
    let endpoint = match endpoint.and_then(normalize_endpoint) {
        Some(ep) => ep,
        None => {
            info!("OTEL_EXPORTER_OTLP_ENDPOINT not set. Metrics export disabled.");
            return Ok(());
        }
    };

    info!("Initializing OpenTelemetry metrics exporter");
    info!("OTLP endpoint: {}", endpoint);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_timeout(Duration::from_secs(EXPORT_TIMEOUT_SECS))
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(Duration::from_secs(METRIC_EXPORT_INTERVAL_SECS))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(service_resource())
        .build();

    global::set_meter_provider(provider.clone());
    let _ = METER_PROVIDER.set(provider);

    let meter = global::meter(SERVICE_NAME);
    register_active_probes_gauge(&meter);

    let _ = METRICS.set(HttpTapMetrics::new(&meter));

    info!("OpenTelemetry metrics initialized successfully");
    Ok(())
}

/// SDK defaults plus this binary's name and version.
fn service_resource() -> Resource {
    Resource::default().merge(&Resource::new(vec![
        KeyValue::new("service.name", SERVICE_NAME),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]))
}

fn register_active_probes_gauge(meter: &Meter) {
    // The callback keeps the instrument registered with the provider.
    let _ = meter
        .u64_observable_gauge("active_probes")
        .with_description("Number of attached eBPF programs per probe")
        .with_unit("probes")
        .with_callback(|observer| {
            if let Ok(probes) = active_probes_map().read() {
                for (probe_name, count) in probes.iter() {
                    observer.observe(*count, &[KeyValue::new("probe", probe_name.clone())]);
                }
            }
        })
        .build();
}

pub fn metrics() -> Option<&'static HttpTapMetrics> {
    METRICS.get()
}

pub fn record_http_event(
    direction: Direction,
    kind: Option<Classification>,
    comm: &str,
    payload_len: usize,
) {
    if let Some(m) = metrics() {
        let attrs = [
            KeyValue::new("direction", direction.as_str()),
            KeyValue::new("kind", kind.map_or("unknown", |k| k.as_str())),
            KeyValue::new("process", comm.to_string()),
        ];
        m.http_events.add(1, &attrs);
        m.http_payload_bytes.add(payload_len as u64, &attrs);
    }
}

pub fn record_decode_error(reason: &'static str) {
    if let Some(m) = metrics() {
        m.decode_errors.add(1, &[KeyValue::new("reason", reason)]);
    }
}

/// Updates the map the `active_probes` gauge reports from.
pub fn record_active_probe(probe_name: &str, count: u64) {
    if let Ok(mut probes) = active_probes_map().write() {
        probes.insert(probe_name.to_string(), count);
        info!("Active probe registered: {} = {}", probe_name, count);
    }
}

pub fn active_probe_count(probe_name: &str) -> Option<u64> {
    active_probes_map().read().ok()?.get(probe_name).copied()
}

/// Flushes pending metrics and shuts down the MeterProvider.
pub fn shutdown_metrics() {
    if let Some(provider) = METER_PROVIDER.get() {
        info!("Shutting down OpenTelemetry metrics...");
        if let Err(e) = provider.shutdown() {
            log::warn!("Failed to shutdown MeterProvider: {}", e);
        } else {
            info!("OpenTelemetry metrics shutdown complete");
        }
    }
}
