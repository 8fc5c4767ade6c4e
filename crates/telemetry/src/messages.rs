//! Feed WebSocket frame types and parser.
//!
//! The feed sends JSON text frames discriminated by a `"type"` field.
//! This module deserializes them into a strongly-typed [`FeedMessage`]
//! and builds the outbound `{"action": ...}` control frames.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use opsboard_core::metrics::MetricsSnapshot;
use opsboard_core::types::Timestamp;

/// All known server-to-client frames.
///
/// Deserialized via the internally-tagged `"type"` field. Frames with a
/// `type` this client does not understand decode as [`FeedMessage::Unknown`]
/// so callers can skip them without treating them as malformed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    /// Handshake / monitoring-start acknowledgment.
    #[serde(rename = "connected")]
    Connected(AckFrame),

    /// A full metrics snapshot.
    #[serde(rename = "metrics")]
    Metrics(MetricsFrame),

    /// One log line.
    #[serde(rename = "log")]
    Log(LogFrame),

    /// The feed reported an error of its own.
    #[serde(rename = "error")]
    Error(ErrorFrame),

    #[serde(other)]
    Unknown,
}

/// Payload of `connected` frames. Servers may attach a human-readable note.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckFrame {
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `metrics` frames. `data` is mandatory; a frame without it
/// is malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsFrame {
    pub data: MetricsSnapshot,
}

/// Payload of `log` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct LogFrame {
    /// ISO-8601 instant; kept as text so a bad timestamp does not reject
    /// the whole line.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    pub message: String,
    /// Explicit level, when the upstream supplies one.
    #[serde(default)]
    pub level: Option<String>,
}

impl LogFrame {
    /// Parse [`timestamp`](Self::timestamp), falling back to `received_at`.
    ///
    /// Accepts RFC 3339 as well as offset-less ISO-8601 (`2024-05-01T12:00:00.123`),
    /// which is read as UTC.
    pub fn timestamp_or(&self, received_at: Timestamp) -> Timestamp {
        self.timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(received_at)
    }
}

fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Payload of `error` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    #[serde(default = "default_error_message")]
    pub message: String,
}

fn default_error_message() -> String {
    "Feed reported an error".to_string()
}

/// Parse a feed WebSocket text frame into a typed enum.
///
/// Returns `Err` for malformed JSON, a missing `type`, or a known `type`
/// whose payload does not decode.
pub fn parse_message(text: &str) -> Result<FeedMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Build an outbound control frame, e.g. `{"action":"start_monitoring"}`.
pub fn control_frame(action: &str) -> String {
    serde_json::json!({ "action": action }).to_string()
}
