//! Process setup shared by the subcommands: the log filter and where
//! metrics go.

use std::net::SocketAddr;
use std::str::FromStr;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Metric families recorded by the kapp crates.
pub const KAPP_METRICS: &[&str] = &[
    "admission_calls_total",
    "custom_route_calls_total",
    "custom_route_ms",
    "route_rejections_total",
    "store_ops_total",
    "store_op_ms",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSink {
    Off,
    /// Serve `/metrics` over HTTP.
    Listen(SocketAddr),
    /// Record in process so the caller can render a snapshot.
    Capture,
}

pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::from_str(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

/// Install the global recorder. Only `Capture` hands back a handle.
pub fn init_metrics(sink: MetricsSink) -> Option<PrometheusHandle> {
    match sink {
        MetricsSink::Off => None,
        MetricsSink::Listen(addr) => {
            match PrometheusBuilder::new().with_http_listener(addr).install() {
                Ok(()) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
            None
        }
        MetricsSink::Capture => match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to install metrics recorder");
                None
            }
        },
    }
}

/// Sample lines of a Prometheus text rendering whose metric name is one of
/// `families`, sorted. Comments and `_bucket` series are dropped.
pub fn metric_lines(rendered: &str, families: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = rendered
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| {
            let name = l.split(|c| c == '{' || c == ' ').next().unwrap_or("");
            !name.ends_with("_bucket")
                && families.iter().any(|f| name == *f || name.strip_prefix(f).map_or(false, |s| s.starts_with('_')))
        })
        .map(str::to_string)
        .collect();
    out.sort();
    out
}
