//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, core::Collector};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "forgefed_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref ACTIVITYPUB_ACTIVITIES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_activities_received_total", "Total number of activities received"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref ACTIVITYPUB_ACTIVITIES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_activities_sent_total", "Total number of activities sent"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref FEDERATION_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_federation_requests_total", "Total number of federation requests"),
        &["direction", "status"]
    ).expect("metric can be created");
    pub static ref FEDERATION_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "forgefed_federation_request_duration_seconds",
            "Federation request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["direction"]
    ).expect("metric can be created");
    pub static ref ENTITIES_MATERIALIZED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_entities_materialized_total", "Remote entities stored locally"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_delivery_failures_total", "Failed inbox deliveries"),
        &["activity_type"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("forgefed_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

fn register(name: &str, collector: Box<dyn Collector>) {
    if let Err(e) = REGISTRY.register(collector) {
        tracing::warn!(metric = name, error = %e, "Failed to register metric");
    }
}

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        register("HTTP_REQUESTS_TOTAL", Box::new(HTTP_REQUESTS_TOTAL.clone()));
        register(
            "HTTP_REQUEST_DURATION_SECONDS",
            Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        );
        register(
            "ACTIVITYPUB_ACTIVITIES_RECEIVED",
            Box::new(ACTIVITYPUB_ACTIVITIES_RECEIVED.clone()),
        );
        register(
            "ACTIVITYPUB_ACTIVITIES_SENT",
            Box::new(ACTIVITYPUB_ACTIVITIES_SENT.clone()),
        );
        register(
            "FEDERATION_REQUESTS_TOTAL",
            Box::new(FEDERATION_REQUESTS_TOTAL.clone()),
        );
        register(
            "FEDERATION_REQUEST_DURATION_SECONDS",
            Box::new(FEDERATION_REQUEST_DURATION_SECONDS.clone()),
        );
        register(
            "ENTITIES_MATERIALIZED_TOTAL",
            Box::new(ENTITIES_MATERIALIZED_TOTAL.clone()),
        );
        register(
            "DELIVERY_FAILURES_TOTAL",
            Box::new(DELIVERY_FAILURES_TOTAL.clone()),
        );
        register("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone()));

        tracing::info!("Metrics registry initialized");
    });
}
