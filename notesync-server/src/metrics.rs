/// Prometheus metrics for the NoteSync reference server
///
/// Handlers record request counts and latencies per route; the binary exposes
/// them at /metrics in Prometheus text format.

use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total number of sync requests by route and status
    ///
    /// Labels:
    /// - route: push, pull or delete
    /// - status: success, client_error or server_error
    pub static ref SYNC_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "notesync_requests_total",
            "Total number of sync requests"
        ),
        &["route", "status"]
    )
    .unwrap();

    /// Request duration in seconds
    pub static ref SYNC_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        histogram_opts!(
            "notesync_request_duration_seconds",
            "Sync request duration in seconds",
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
        ),
        &["route"]
    )
    .unwrap();

    /// Records moved per route
    ///
    /// Labels:
    /// - route: push, pull or delete
    /// - kind: note or tombstone
    pub static ref RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "notesync_records_total",
            "Total number of notes and tombstones handled"
        ),
        &["route", "kind"]
    )
    .unwrap();

    /// Errors by error code
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "notesync_errors_total",
            "Total number of errors by code"
        ),
        &["code"]
    )
    .unwrap();
}

/// Register all metrics with the global registry. Safe to call more than once.
pub fn register_metrics() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(register_all);
}

fn register_all() {
    REGISTRY
        .register(Box::new(SYNC_REQUESTS_TOTAL.clone()))
        .expect("Failed to register SYNC_REQUESTS_TOTAL");
    REGISTRY
        .register(Box::new(SYNC_DURATION_SECONDS.clone()))
        .expect("Failed to register SYNC_DURATION_SECONDS");
    REGISTRY
        .register(Box::new(RECORDS_TOTAL.clone()))
        .expect("Failed to register RECORDS_TOTAL");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("Failed to register ERRORS_TOTAL");
}

/// Encode metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
