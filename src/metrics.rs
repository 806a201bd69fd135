//! Prometheus metrics registration and export.
//!
//! Metrics are registered once by [`init_metrics`] and exported by the
//! webhook server at `/metrics`. Recording functions are no-ops until
//! metrics have been initialized, so library users and tests never need to
//! set them up.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all yamon-ci metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total builds, labeled by project and status.
pub static BUILDS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Build duration in seconds, labeled by project.
pub static BUILD_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of builds currently running.
pub static BUILDS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Webhook events received, labeled by event kind and routing action.
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless; later calls keep the first
/// registry.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let builds_total = CounterVec::new(
        Opts::new("yamon_ci_builds_total", "Total number of builds executed"),
        &["project", "status"],
    )?;

    let build_duration = HistogramVec::new(
        HistogramOpts::new("yamon_ci_build_duration_seconds", "Build duration in seconds")
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["project"],
    )?;

    let builds_in_progress = Gauge::new(
        "yamon_ci_builds_in_progress",
        "Number of builds currently running",
    )?;

    let webhook_events_total = CounterVec::new(
        Opts::new("yamon_ci_webhook_events_total", "Webhook events received"),
        &["kind", "action"],
    )?;

    registry.register(Box::new(builds_total.clone()))?;
    registry.register(Box::new(build_duration.clone()))?;
    registry.register(Box::new(builds_in_progress.clone()))?;
    registry.register(Box::new(webhook_events_total.clone()))?;

    // If any of these fail, metrics were already initialized
    let _ = REGISTRY.set(registry);
    let _ = BUILDS_TOTAL.set(builds_total);
    let _ = BUILD_DURATION.set(build_duration);
    let _ = BUILDS_IN_PROGRESS.set(builds_in_progress);
    let _ = WEBHOOK_EVENTS_TOTAL.set(webhook_events_total);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// Marks a build as started.
pub fn build_started() {
    if let Some(gauge) = BUILDS_IN_PROGRESS.get() {
        gauge.inc();
    }
}

/// Records the end of a build.
pub fn build_finished(project: &str, success: bool, duration_secs: f64) {
    if let Some(gauge) = BUILDS_IN_PROGRESS.get() {
        gauge.dec();
    }
    let status = if success { "success" } else { "failure" };
    if let Some(counter) = BUILDS_TOTAL.get() {
        counter.with_label_values(&[project, status]).inc();
    }
    if let Some(histogram) = BUILD_DURATION.get() {
        histogram
            .with_label_values(&[project])
            .observe(duration_secs);
    }
}

/// Records a routed webhook event.
pub fn webhook_event(kind: &str, action: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[kind, action]).inc();
    }
}
