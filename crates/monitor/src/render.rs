//! Plain-text rendering of the telemetry model for the console.

use opsboard_core::metrics::MetricsSnapshot;
use opsboard_core::types::Timestamp;
use opsboard_telemetry::{ConnectionStatus, LogRecord};

/// `LIVE` when the metrics feed is connected, otherwise `OFFLINE`.
pub fn live_badge(status: &ConnectionStatus) -> &'static str {
    if status.is_live() {
        "LIVE"
    } else {
        "OFFLINE"
    }
}

/// One-line summary: link state, headline resource usage, queue totals.
pub fn summary_line(
    status: &ConnectionStatus,
    snapshot: &MetricsSnapshot,
    updated_at: Option<Timestamp>,
) -> String {
    let updated = updated_at
        .map(|ts| ts.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    let mut line = format!(
        "[{}] host={} cpu={:.1}% mem={:.1}% disk={:.1}% containers={}/{} queued={} alerts={} updated={}",
        live_badge(status),
        snapshot.system.hostname,
        snapshot.system.cpu_percent,
        snapshot.system.memory_percent,
        snapshot.system.disk_percent,
        snapshot.running_containers(),
        snapshot.containers.len(),
        snapshot.total_queue_depth(),
        snapshot.alerts.len(),
        updated,
    );

    if let Some(err) = &status.feed_error {
        line.push_str(&format!(" feed_error={err:?}"));
    }
    line
}

/// `12:00:00 WARN  [api] Rate limit approaching`
pub fn log_line(record: &LogRecord) -> String {
    format!(
        "{} {:<5} [{}] {}",
        record.timestamp.format("%H:%M:%S"),
        record.severity.as_str().to_uppercase(),
        record.source,
        record.message,
    )
}
