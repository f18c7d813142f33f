//! Prometheus metrics, gathered for the `/metrics` admin endpoint.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ONLINE_USERS: IntGauge =
        IntGauge::new("strangerlink_online_users", "Currently connected users").unwrap();
    pub static ref ACTIVE_ROOMS: IntGauge =
        IntGauge::new("strangerlink_active_rooms", "Currently active chat rooms").unwrap();
    pub static ref QUEUE_DEPTH: IntGauge =
        IntGauge::new("strangerlink_queue_depth", "Users currently waiting for a match").unwrap();
    pub static ref MATCHES_TOTAL: IntCounter =
        IntCounter::new("strangerlink_matches_total", "Matches made").unwrap();
    pub static ref MESSAGES_RELAYED_TOTAL: IntCounter = IntCounter::new(
        "strangerlink_messages_relayed_total",
        "Chat messages relayed between peers"
    )
    .unwrap();
    pub static ref ROOMS_ENDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("strangerlink_rooms_ended_total", "Rooms ended, by reason"),
        &["reason"]
    )
    .unwrap();
    pub static ref CONTENT_FILTER_HITS_TOTAL: IntCounter = IntCounter::new(
        "strangerlink_content_filter_hits_total",
        "Messages that triggered a content filter replacement"
    )
    .unwrap();
    pub static ref DISPATCH_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("strangerlink_dispatch_errors_total", "Dispatch errors, by code"),
        &["code"]
    )
    .unwrap();
}

/// Registers every metric above with the shared registry. Must run
/// once before `/metrics` is served.
pub fn init() {
    REGISTRY
        .register(Box::new(ONLINE_USERS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_ROOMS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone())).unwrap();
    REGISTRY
        .register(Box::new(MATCHES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(MESSAGES_RELAYED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ROOMS_ENDED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CONTENT_FILTER_HITS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DISPATCH_ERRORS_TOTAL.clone()))
        .unwrap();
}

/// Encodes the registry in Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
