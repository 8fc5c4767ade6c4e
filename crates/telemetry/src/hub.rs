//! Presentation-facing facade over the telemetry core.
//!
//! [`TelemetryHub`] wires one [`FeedSupervisor`] per feed (metrics and
//! logs) to a shared [`MetricsStore`], [`LogBuffer`] and event channel.
//! A presentation layer only ever talks to the hub: it issues
//! start/stop/reconnect requests, reads the current model, and listens
//! for [`TelemetryEvent`]s via [`TelemetryHub::subscribe`].
//!
//! None of the request methods wait on the network; their outcome is
//! reported asynchronously through events and [`connection_status`].
//!
//! [`connection_status`]: TelemetryHub::connection_status

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use opsboard_core::metrics::MetricsSnapshot;
use opsboard_core::types::Timestamp;

use crate::client::{FeedChannel, FeedClient};
use crate::config::TelemetryConfig;
use crate::events::TelemetryEvent;
use crate::logs::{FilterCriteria, LogBuffer, LogQuery};
use crate::processor::FrameProcessor;
use crate::reconnect::{FeedSupervisor, LinkState};
use crate::store::MetricsStore;

/// Broadcast channel capacity for telemetry events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Point-in-time view of both feeds, driving the "LIVE" indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub metrics: LinkState,
    pub logs: LinkState,
    /// Last error reported by the feed itself, if not yet superseded by
    /// fresh data.
    pub feed_error: Option<String>,
}

impl ConnectionStatus {
    /// The dashboard is live when the metrics feed is connected.
    pub fn is_live(&self) -> bool {
        self.metrics == LinkState::Connected
    }
}

pub struct TelemetryHub {
    store: Arc<MetricsStore>,
    logs: Arc<LogBuffer>,
    metrics_feed: FeedSupervisor,
    logs_feed: FeedSupervisor,
    event_tx: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryHub {
    pub fn new(config: &TelemetryConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = Arc::new(MetricsStore::new());
        let logs = Arc::new(LogBuffer::new(config.log_capacity));
        let processor = FrameProcessor::new(Arc::clone(&store), Arc::clone(&logs), event_tx.clone());

        let feed = |url: &str, channel: FeedChannel| {
            FeedSupervisor::new(
                FeedClient::new(url, channel).with_timeouts(config.timeouts()),
                config.reconnect(),
                processor.clone(),
                event_tx.clone(),
            )
        };
        let metrics_feed = feed(&config.metrics_url, FeedChannel::Metrics);
        let logs_feed = feed(&config.logs_url, FeedChannel::Logs);

        Self {
            store,
            logs,
            metrics_feed,
            logs_feed,
            event_tx,
        }
    }

    /// Subscribe to snapshot, log, error and status events.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.event_tx.subscribe()
    }

    /// Start both feeds. No-op for a feed that is already running.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_start(&self) {
        self.metrics_feed.start();
        self.logs_feed.start();
    }

    /// Stop both feeds and cancel any pending reconnect.
    pub fn request_stop(&self) {
        self.metrics_feed.stop();
        self.logs_feed.stop();
    }

    /// Drop the live sessions and reconnect immediately.
    pub fn request_reconnect(&self) {
        self.metrics_feed.reconnect();
        self.logs_feed.reconnect();
    }

    pub fn feed(&self, channel: FeedChannel) -> &FeedSupervisor {
        match channel {
            FeedChannel::Metrics => &self.metrics_feed,
            FeedChannel::Logs => &self.logs_feed,
        }
    }

    pub fn current_snapshot(&self) -> Arc<MetricsSnapshot> {
        self.store.current()
    }

    pub fn last_updated(&self) -> Option<Timestamp> {
        self.store.last_updated()
    }

    pub fn current_logs(&self, criteria: &FilterCriteria) -> LogQuery {
        self.logs.query(criteria)
    }

    /// Empty the log buffer. The feeds keep running.
    pub fn clear_logs(&self) {
        self.logs.clear();
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            metrics: self.metrics_feed.state(),
            logs: self.logs_feed.state(),
            feed_error: self.store.feed_error(),
        }
    }

    /// Stop both feeds and wait for their sessions to close.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down telemetry hub");
        tokio::join!(self.metrics_feed.shutdown(), self.logs_feed.shutdown());
        tracing::info!("Telemetry hub shut down complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_hub_is_disconnected_with_default_model() {
        let hub = TelemetryHub::new(&TelemetryConfig::default());
        let status = hub.connection_status();
        assert_eq!(status.metrics, LinkState::Disconnected);
        assert_eq!(status.logs, LinkState::Disconnected);
        assert!(!status.is_live());
        assert!(status.feed_error.is_none());
        assert_eq!(*hub.current_snapshot(), MetricsSnapshot::default());
        assert!(hub.last_updated().is_none());
        assert_eq!(hub.current_logs(&FilterCriteria::default()).count(), 0);
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let hub = TelemetryHub::new(&TelemetryConfig::default());
        hub.request_stop();
        hub.request_stop();
        assert_eq!(hub.feed(FeedChannel::Metrics).attempts(), 0);
        assert_eq!(hub.feed(FeedChannel::Logs).attempts(), 0);
    }

    #[test]
    fn live_only_when_metrics_connected() {
        let status = ConnectionStatus {
            metrics: LinkState::Connected,
            logs: LinkState::Connecting,
            feed_error: None,
        };
        assert!(status.is_live());
        let status = ConnectionStatus {
            metrics: LinkState::Connecting,
            logs: LinkState::Connected,
            feed_error: None,
        };
        assert!(!status.is_live());
    }
}
