//! Events emitted by the telemetry client.
//!
//! These represent high-level state changes that a presentation layer
//! cares about. They are produced by the frame processor and the feed
//! supervisors after interpreting raw WebSocket traffic, and delivered
//! through [`TelemetryHub::subscribe`](crate::hub::TelemetryHub::subscribe).

use std::sync::Arc;

use opsboard_core::metrics::MetricsSnapshot;
use opsboard_core::types::Timestamp;

use crate::client::FeedChannel;
use crate::logs::LogRecord;
use crate::reconnect::LinkState;

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A new snapshot replaced the previous one.
    SnapshotUpdated {
        snapshot: Arc<MetricsSnapshot>,
        updated_at: Timestamp,
    },

    /// A log record was appended to the buffer.
    LogAppended(LogRecord),

    /// The feed reported an error. The last good snapshot stays current.
    FeedError { channel: FeedChannel, message: String },

    /// The feed acknowledged the connection or the start request.
    Acknowledged {
        channel: FeedChannel,
        message: Option<String>,
    },

    /// A feed supervisor changed state.
    StatusChanged { channel: FeedChannel, state: LinkState },
}
