//! Prometheus metrics for daemon observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a webhook received event.
pub fn webhook_received(event_type: &str) {
    counter!("shorecast_webhooks_received_total", "event" => event_type.to_string()).increment(1);
}

/// Record a run being queued.
pub fn run_created(trigger: &str) {
    counter!("shorecast_runs_created_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record a run state transition.
pub fn run_status_changed(status: &str) {
    counter!("shorecast_runs_total", "status" => status.to_string()).increment(1);
}

/// Record run duration.
pub fn run_duration(duration_ms: u64) {
    histogram!("shorecast_run_duration_ms").record(duration_ms as f64);
}

/// Record step duration.
pub fn step_duration(step_name: &str, duration_ms: u64) {
    histogram!("shorecast_step_duration_ms", "step" => step_name.to_string())
        .record(duration_ms as f64);
}

/// Record per-cycle stream resolution results.
pub fn streams_resolved(resolved: usize, failed: usize) {
    counter!("shorecast_streams_resolved_total").increment(resolved as u64);
    counter!("shorecast_streams_failed_total").increment(failed as u64);
}

/// Record a publish attempt and whether it pushed.
pub fn publish_outcome(pushed: bool) {
    let result = if pushed { "pushed" } else { "skipped" };
    counter!("shorecast_publishes_total", "result" => result.to_string()).increment(1);
}
