//! Frame processing for feed sessions.
//!
//! [`FrameProcessor`] is the [`SessionHandler`] every supervised session
//! reports to. Each text frame is parsed via [`parse_message`] and the
//! resulting variant drives a store update, a buffer append and/or a
//! broadcast [`TelemetryEvent`]. Malformed frames are logged and dropped;
//! they never end the session or reach the store or buffer.
//!
//! `metrics` frames are only accepted from the metrics feed and `log`
//! frames only from the logs feed. A frame on the other feed is dropped
//! with a debug log.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::client::{FeedChannel, SessionHandler};
use crate::events::TelemetryEvent;
use crate::logs::{LogBuffer, LogRecord};
use crate::messages::{parse_message, FeedMessage};
use crate::store::MetricsStore;

/// Upper bound on how much of a malformed frame is echoed into logs.
const RAW_PREVIEW_LEN: usize = 256;

#[derive(Clone)]
pub struct FrameProcessor {
    store: Arc<MetricsStore>,
    logs: Arc<LogBuffer>,
    event_tx: broadcast::Sender<TelemetryEvent>,
}

impl FrameProcessor {
    pub fn new(
        store: Arc<MetricsStore>,
        logs: Arc<LogBuffer>,
        event_tx: broadcast::Sender<TelemetryEvent>,
    ) -> Self {
        Self {
            store,
            logs,
            event_tx,
        }
    }

    /// Dispatch a single text frame to the appropriate handler.
    pub fn handle_text(&self, channel: FeedChannel, text: &str) {
        match parse_message(text) {
            Ok(FeedMessage::Metrics(_)) if channel != FeedChannel::Metrics => {
                tracing::debug!(%channel, "Ignoring metrics frame on wrong feed");
            }
            Ok(FeedMessage::Log(_)) if channel != FeedChannel::Logs => {
                tracing::debug!(%channel, "Ignoring log frame on wrong feed");
            }
            Ok(FeedMessage::Metrics(frame)) => {
                let (snapshot, updated_at) = self.store.replace(frame.data);
                tracing::debug!(%channel, "Metrics snapshot applied");
                let _ = self.event_tx.send(TelemetryEvent::SnapshotUpdated {
                    snapshot,
                    updated_at,
                });
            }
            Ok(FeedMessage::Log(frame)) => {
                let record = LogRecord::from_frame(frame, Utc::now());
                self.logs.push(record.clone());
                let _ = self.event_tx.send(TelemetryEvent::LogAppended(record));
            }
            Ok(FeedMessage::Connected(ack)) => {
                tracing::info!(%channel, note = ?ack.message, "Feed acknowledged connection");
                let _ = self.event_tx.send(TelemetryEvent::Acknowledged {
                    channel,
                    message: ack.message,
                });
            }
            Ok(FeedMessage::Error(frame)) => {
                tracing::warn!(%channel, message = %frame.message, "Feed reported an error");
                self.store.set_feed_error(frame.message.clone());
                let _ = self.event_tx.send(TelemetryEvent::FeedError {
                    channel,
                    message: frame.message,
                });
            }
            Ok(FeedMessage::Unknown) => {
                tracing::debug!(%channel, raw_message = %preview(text), "Ignoring frame of unknown type");
            }
            Err(e) => {
                tracing::warn!(
                    %channel,
                    error = %e,
                    raw_message = %preview(text),
                    "Failed to parse feed frame",
                );
            }
        }
    }
}

impl SessionHandler for FrameProcessor {
    fn on_message(&mut self, channel: FeedChannel, text: &str) {
        self.handle_text(channel, text);
    }

    fn on_error(&mut self, channel: FeedChannel, detail: &str) {
        tracing::warn!(%channel, error = %detail, "Feed transport error");
    }

    fn on_close(&mut self, channel: FeedChannel, code: Option<u16>) {
        tracing::debug!(%channel, ?code, "Feed session closed");
    }
}

fn preview(text: &str) -> &str {
    if text.len() <= RAW_PREVIEW_LEN {
        return text;
    }
    let mut end = RAW_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
