//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guess_mime_resolutions_total` (counter): resolved types by source
//! - `guess_mime_deferred_responses_total` (counter): responses whose headers were withheld
//! - `guess_mime_classifier_failures_total` (counter): classifier errors by reason
//! - `guess_mime_requests_total` (counter): requests by route and status
//! - `guess_mime_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality (source, reason, route name, status)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::filter::{ClassifyError, TypeSource};

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_resolution(source: TypeSource) {
    counter!("guess_mime_resolutions_total", "source" => source.as_str()).increment(1);
}

pub fn record_deferred() {
    counter!("guess_mime_deferred_responses_total").increment(1);
}

pub fn record_classifier_failure(error: &ClassifyError) {
    let reason = match error {
        ClassifyError::Unavailable => "unavailable",
        ClassifyError::InvalidMime(_) => "invalid_mime",
    };
    counter!("guess_mime_classifier_failures_total", "reason" => reason).increment(1);
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "guess_mime_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("guess_mime_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}
