use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

/// Renders every registered metric in the prometheus text format.
pub async fn render_metrics() -> Result<String> {
    let metrics = get_metrics().await;
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Pipeline metrics
    pub requests: IntCounterVec,
    pub request_duration: HistogramVec,
    pub unauthorized_responses: IntCounter,
    pub requests_replayed: IntCounter,

    // Refresh metrics
    pub refresh_attempts: IntCounter,
    pub refresh_failures: IntCounterVec,
    pub pending_requests: IntGauge,

    // Session metrics
    pub session_clears: IntCounter,

    // Config
    pub config_validation_errors: IntCounter,
    pub config_parse_failures: IntCounter,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("sessionagent".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Pipeline
            requests: IntCounterVec::new(Opts::new("requests_total", "Requests executed through the pipeline by outcome"), &["outcome"]).unwrap(),
            request_duration: HistogramVec::new(HistogramOpts::new("request_duration_seconds", "End-to-end request duration including refresh and replay").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["method"]).unwrap(),
            unauthorized_responses: IntCounter::new("unauthorized_responses_total", "Responses rejected with 401").unwrap(),
            requests_replayed: IntCounter::new("requests_replayed_total", "Requests replayed with a refreshed access token").unwrap(),

            // Refresh
            refresh_attempts: IntCounter::new("refresh_attempts_total", "Calls made to the refresh endpoint").unwrap(),
            refresh_failures: IntCounterVec::new(Opts::new("refresh_failures_total", "Refresh failures by reason"), &["reason"]).unwrap(),
            pending_requests: IntGauge::new("pending_requests", "Requests waiting for the in-flight refresh").unwrap(),

            // Session
            session_clears: IntCounter::new("session_clears_total", "Session clears caused by logout or refresh failure").unwrap(),

            // Config
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").unwrap(),
            config_parse_failures: IntCounter::new("config_parse_failures_total", "Config files that failed to parse").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.requests.clone())).unwrap();
        reg.register(Box::new(metrics.request_duration.clone())).unwrap();
        reg.register(Box::new(metrics.unauthorized_responses.clone())).unwrap();
        reg.register(Box::new(metrics.requests_replayed.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_attempts.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_failures.clone())).unwrap();
        reg.register(Box::new(metrics.pending_requests.clone())).unwrap();
        reg.register(Box::new(metrics.session_clears.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.config_parse_failures.clone())).unwrap();

        metrics
    }
}
