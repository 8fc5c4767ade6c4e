//! Wire constants for the dashboard feed protocol.
//!
//! The feed speaks JSON text frames. Client-to-server frames carry an
//! `"action"` field; server-to-client frames are discriminated by
//! `"type"`.

/// Client asks the metrics feed to begin pushing snapshots.
pub const ACTION_START_MONITORING: &str = "start_monitoring";

/// Client asks the metrics feed to stop pushing snapshots.
pub const ACTION_STOP_MONITORING: &str = "stop_monitoring";

/// Client asks the log feed to begin streaming log lines.
pub const ACTION_START_LOGS: &str = "start_logs";

/// Client asks the log feed to stop streaming log lines.
pub const ACTION_STOP_LOGS: &str = "stop_logs";

/// Handshake acknowledgment, no payload.
pub const MSG_TYPE_CONNECTED: &str = "connected";

/// Full metrics snapshot under `"data"`.
pub const MSG_TYPE_METRICS: &str = "metrics";

/// One log line.
pub const MSG_TYPE_LOG: &str = "log";

/// Feed-level error notice under `"message"`.
pub const MSG_TYPE_ERROR: &str = "error";

/// Filter token that disables source/level filtering.
pub const FILTER_ALL: &str = "all";

/// Placeholder rendered for string metrics that have not been reported yet.
pub const PLACEHOLDER: &str = "--";
