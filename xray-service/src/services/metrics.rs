//! Prometheus metrics for xray-service.
//!
//! Provides HTTP and analysis-specific metrics for observability.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// The registry together with every collector registered in it.
///
/// Published as a single value so a reader never sees a collector that
/// belongs to a different registry.
struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    xray_analyses_total: IntCounterVec,
    genai_tokens_total: IntCounterVec,
    genai_provider_latency_seconds: HistogramVec,
    genai_provider_errors_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["method", "path"],
        )?;

        // outcome: success, invalid_request, invalid_output, empty_output, provider_error
        let xray_analyses_total = IntCounterVec::new(
            Opts::new("xray_analyses_total", "Total X-ray analyses by outcome"),
            &["outcome"],
        )?;

        let genai_tokens_total = IntCounterVec::new(
            Opts::new("genai_tokens_total", "Total tokens processed"),
            &["model", "type"], // type: input, output
        )?;

        let genai_provider_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "genai_provider_latency_seconds",
                "AI provider API latency in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["provider", "model"],
        )?;

        let genai_provider_errors_total = IntCounterVec::new(
            Opts::new("genai_provider_errors_total", "Total AI provider errors"),
            &["provider", "error_type"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(xray_analyses_total.clone()))?;
        registry.register(Box::new(genai_tokens_total.clone()))?;
        registry.register(Box::new(genai_provider_latency_seconds.clone()))?;
        registry.register(Box::new(genai_provider_errors_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            xray_analyses_total,
            genai_tokens_total,
            genai_provider_latency_seconds,
            genai_provider_errors_total,
        })
    }
}

/// Initialize all metrics. Safe to call from several threads; the first
/// complete set wins and later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = Metrics::new()?;
    if METRICS.set(metrics).is_ok() {
        tracing::info!("Prometheus metrics initialized");
    }
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let metrics = match METRICS.get() {
        Some(m) => m,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = metrics.registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

// Helper functions for recording metrics

/// Record a completed HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        let status = status.to_string();
        m.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        m.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Record the outcome of one pipeline invocation.
pub fn record_analysis(outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.xray_analyses_total.with_label_values(&[outcome]).inc();
    }
}

/// Record token usage.
pub fn record_tokens(model: &str, input_tokens: i32, output_tokens: i32) {
    if let Some(m) = METRICS.get() {
        m.genai_tokens_total
            .with_label_values(&[model, "input"])
            .inc_by(input_tokens.max(0) as u64);
        m.genai_tokens_total
            .with_label_values(&[model, "output"])
            .inc_by(output_tokens.max(0) as u64);
    }
}

/// Record provider latency.
pub fn record_provider_latency(provider: &str, model: &str, duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        m.genai_provider_latency_seconds
            .with_label_values(&[provider, model])
            .observe(duration_secs);
    }
}

/// Record a provider error.
pub fn record_provider_error(provider: &str, error_type: &str) {
    if let Some(m) = METRICS.get() {
        m.genai_provider_errors_total
            .with_label_values(&[provider, error_type])
            .inc();
    }
}
