//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admin_requests_total` (counter): admin API requests by method, route, status
//! - `admin_request_duration_seconds` (histogram): admin API latency by route
//! - `admin_store_mutations_total` (counter): draft writes by kind and operation
//! - `admin_published_version` (gauge): currently committed published version
//! - `admin_releases_total` (counter): finished releases by scope and state
//! - `admin_release_duration_seconds` (histogram): release wall time by scope
//! - `admin_gateway_pushes_total` (counter): push outcomes by target

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::model::ReleaseScope;
use crate::release::ReleaseState;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    counter!(
        "admin_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("admin_request_duration_seconds", "route" => route.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_store_mutation(kind: &'static str, op: &'static str) {
    counter!("admin_store_mutations_total", "kind" => kind, "op" => op).increment(1);
}

pub fn record_published_version(version: u64) {
    gauge!("admin_published_version").set(version as f64);
}

pub fn record_release(scope: ReleaseScope, state: ReleaseState, elapsed: Duration) {
    counter!(
        "admin_releases_total",
        "scope" => scope.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
    histogram!("admin_release_duration_seconds", "scope" => scope.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_push(target: &str, outcome: &str) {
    counter!(
        "admin_gateway_pushes_total",
        "target" => target.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
