//! Metrics for uploads, retries and build tracking.

use metrics::{counter, gauge, histogram};

/// Install the Prometheus exporter when a listen address is configured.
pub fn init_metrics(listen: Option<&str>) {
    let Some(addr) = listen else {
        return;
    };

    let addr: std::net::SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!("Invalid metrics address {}: {}", addr, e);
            return;
        }
    };

    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record one file written to a repository.
pub fn file_uploaded() {
    counter!("factory_files_uploaded_total").increment(1);
}

/// Record a retried upload attempt.
pub fn upload_retried() {
    counter!("factory_upload_retries_total").increment(1);
}

/// Record a file that exhausted its attempts.
pub fn upload_failed(kind: &str) {
    counter!("factory_upload_failures_total", "kind" => kind.to_string()).increment(1);
}

/// Record a finished repository push.
pub fn push_duration(duration_ms: u64) {
    histogram!("factory_push_duration_ms").record(duration_ms as f64);
}

/// Record a build state transition.
pub fn build_status_changed(status: &str) {
    counter!("factory_builds_total", "status" => status.to_string()).increment(1);
}

/// Record a failed status poll.
pub fn poll_failed() {
    counter!("factory_poll_errors_total").increment(1);
}

/// Set the number of running pollers.
pub fn active_pollers(count: usize) {
    gauge!("factory_active_pollers").set(count as f64);
}

/// Record an app rendered from a template.
pub fn app_generated(template_id: &str) {
    counter!("factory_apps_generated_total", "template" => template_id.to_string()).increment(1);
}
