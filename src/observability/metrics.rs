//! Metrics collection and exposition.
//!
//! # Metrics
//! - `handler_init_total` (counter): init attempts by handler, outcome
//! - `handler_init_duration_seconds` (histogram): time spent in `init`
//! - `handlers_active` (gauge): handlers currently published
//! - `handler_cycle_total` (counter): reinit/reload by handler, trigger, result
//! - `proxy_requests_total` (counter): requests by handler, status
//! - `proxy_request_duration_seconds` (histogram): request latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::registry::error::CycleTrigger;
use crate::registry::handler::InitStatus;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_handler_init(handler: &str, status: InitStatus, started: Instant) {
    counter!(
        "handler_init_total",
        "handler" => handler.to_string(),
        "outcome" => status.as_str()
    )
    .increment(1);
    histogram!("handler_init_duration_seconds", "handler" => handler.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn set_active_handlers(count: usize) {
    gauge!("handlers_active").set(count as f64);
}

pub fn record_handler_cycle(handler: &str, trigger: CycleTrigger, ok: bool) {
    counter!(
        "handler_cycle_total",
        "handler" => handler.to_string(),
        "trigger" => trigger.to_string(),
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_request(handler: &str, status: u16, started: Instant) {
    counter!(
        "proxy_requests_total",
        "handler" => handler.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "handler" => handler.to_string())
        .record(started.elapsed().as_secs_f64());
}
