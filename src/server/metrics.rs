use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all jukebox metrics
const PREFIX: &str = "jukebox";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Websocket Metrics
    pub static ref WS_CONNECTIONS: Gauge = Gauge::new(
        format!("{PREFIX}_ws_connections"),
        "Number of open websocket connections"
    ).expect("Failed to create ws_connections metric");

    pub static ref WS_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_requests_total"), "Protocol requests by type and outcome"),
        &["type", "outcome"]
    ).expect("Failed to create ws_requests_total metric");

    // Playlist Metrics
    pub static ref QUEUE_MUTATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_queue_mutations_total"), "Playlist chain mutations by operation"),
        &["op"]
    ).expect("Failed to create queue_mutations_total metric");

    pub static ref INTEGRITY_ERRORS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_integrity_errors_total"),
        "Playlist chain integrity violations"
    ).expect("Failed to create integrity_errors_total metric");

    // Lease Metrics
    pub static ref LEASE_CLAIMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_lease_claims_total"), "Player lease claims by outcome"),
        &["outcome"]
    ).expect("Failed to create lease_claims_total metric");

    // Event Metrics
    pub static ref EVENTS_PUBLISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_events_published_total"), "Channel events published"),
        &["event"]
    ).expect("Failed to create events_published_total metric");

    pub static ref EVENTS_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_events_dropped_total"), "Channel events that were not delivered"),
        &["reason"]
    ).expect("Failed to create events_dropped_total metric");

    // Job Metrics
    pub static ref JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_total"), "Background jobs by kind and outcome"),
        &["kind", "outcome"]
    ).expect("Failed to create jobs_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["kind"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(WS_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_MUTATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(INTEGRITY_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LEASE_CLAIMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EVENTS_PUBLISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EVENTS_DROPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn ws_connection_opened() {
    WS_CONNECTIONS.inc();
}

pub fn ws_connection_closed() {
    WS_CONNECTIONS.dec();
}

pub fn record_ws_request(request_type: &str, outcome: &str) {
    WS_REQUESTS_TOTAL
        .with_label_values(&[request_type, outcome])
        .inc();
}

pub fn record_queue_mutation(op: &str) {
    QUEUE_MUTATIONS_TOTAL.with_label_values(&[op]).inc();
}

pub fn record_integrity_error() {
    INTEGRITY_ERRORS_TOTAL.inc();
}

pub fn record_lease_claim(claimed: bool) {
    let outcome = if claimed { "claimed" } else { "held_elsewhere" };
    LEASE_CLAIMS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_event_published(event: &str) {
    EVENTS_PUBLISHED_TOTAL.with_label_values(&[event]).inc();
}

/// `reason` is one of `queue_full`, `lagged` or `undecodable`.
pub fn record_event_dropped(reason: &str, count: u64) {
    EVENTS_DROPPED_TOTAL
        .with_label_values(&[reason])
        .inc_by(count as f64);
}

pub fn record_job(kind: &str, outcome: &str, duration: Duration) {
    JOBS_TOTAL.with_label_values(&[kind, outcome]).inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb) = line
                        .split_whitespace()
                        .nth(1)
                        .and_then(|kb| kb.parse::<f64>().ok())
                    {
                        PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                        return;
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
