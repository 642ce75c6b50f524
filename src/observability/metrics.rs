//! Metrics collection and exposition.
//!
//! # Metrics
//! - `upstream_host_requests_total` (counter): requests dispatched per host
//! - `upstream_host_request_failures_total` (counter): reported failures per host
//! - `upstream_host_connect_failures_total` (counter): failed pool initialisations
//! - `upstream_host_health` (gauge): 1=healthy, 0=unhealthy
//! - `upstream_lb_selected_total` (counter): selections per cluster and strategy
//! - `upstream_lb_no_healthy_total` (counter): selections with no eligible host
//! - `upstream_lb_subset_fallback_total` (counter): empty subset fell back to all hosts
//! - `upstream_conn_pools_created_total` (counter): pool constructions per protocol
//! - `upstream_log_sink_dropped_total` (counter): log lines discarded on overflow
//!
//! # Design Decisions
//! - Fire-and-forget: recording never blocks and never fails
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_host_request(cluster: &str, host: &str) {
    metrics::counter!(
        "upstream_host_requests_total",
        "cluster" => cluster.to_string(),
        "host" => host.to_string()
    )
    .increment(1);
}

pub fn record_host_failure(cluster: &str, host: &str) {
    metrics::counter!(
        "upstream_host_request_failures_total",
        "cluster" => cluster.to_string(),
        "host" => host.to_string()
    )
    .increment(1);
}

pub fn record_connect_failure(host: &str) {
    metrics::counter!("upstream_host_connect_failures_total", "host" => host.to_string())
        .increment(1);
}

pub fn record_host_health(host: &str, healthy: bool) {
    metrics::gauge!("upstream_host_health", "host" => host.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_lb_selected(cluster: &str, strategy: &'static str) {
    metrics::counter!(
        "upstream_lb_selected_total",
        "cluster" => cluster.to_string(),
        "strategy" => strategy
    )
    .increment(1);
}

pub fn record_no_healthy_upstream(cluster: &str) {
    metrics::counter!("upstream_lb_no_healthy_total", "cluster" => cluster.to_string())
        .increment(1);
}

pub fn record_subset_fallback(cluster: &str) {
    metrics::counter!("upstream_lb_subset_fallback_total", "cluster" => cluster.to_string())
        .increment(1);
}

pub fn record_pool_created(protocol: &str) {
    metrics::counter!("upstream_conn_pools_created_total", "protocol" => protocol.to_string())
        .increment(1);
}

pub fn record_log_dropped() {
    metrics::counter!("upstream_log_sink_dropped_total").increment(1);
}
