//! Latest-snapshot metrics store.
//!
//! [`MetricsStore`] holds exactly one [`MetricsSnapshot`]. Every valid
//! `metrics` frame replaces it wholesale; there is no history and no
//! merging. Readers get an `Arc` to an immutable snapshot, so a reader
//! never observes a half-written one.
//!
//! Before the first frame arrives the store serves the zero-valued
//! default snapshot. A feed-reported error is kept alongside the last
//! good snapshot rather than replacing it.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use opsboard_core::metrics::MetricsSnapshot;
use opsboard_core::types::Timestamp;

use crate::messages::{parse_message, FeedMessage};

#[derive(Debug)]
struct StoreState {
    snapshot: Arc<MetricsSnapshot>,
    updated_at: Option<Timestamp>,
    feed_error: Option<String>,
}

#[derive(Debug)]
pub struct MetricsStore {
    state: RwLock<StoreState>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                snapshot: Arc::new(MetricsSnapshot::default()),
                updated_at: None,
                feed_error: None,
            }),
        }
    }

    /// Apply a raw `metrics` frame.
    ///
    /// Returns `false`, leaving the store untouched, when the frame is not
    /// valid JSON, its `type` is not `metrics`, or its `data` is missing or
    /// not an object. Mistyped fields inside `data` take their defaults and
    /// do not reject the frame.
    pub fn apply_snapshot(&self, raw: &str) -> bool {
        match parse_message(raw) {
            Ok(FeedMessage::Metrics(frame)) => {
                self.replace(frame.data);
                true
            }
            _ => false,
        }
    }

    /// Apply a raw `connected` acknowledgment. Never touches the snapshot.
    pub fn apply_control_ack(&self, raw: &str) -> bool {
        matches!(parse_message(raw), Ok(FeedMessage::Connected(_)))
    }

    /// Apply a raw `error` frame, recording its message as the current
    /// feed error. The last good snapshot is kept.
    pub fn apply_error(&self, raw: &str) -> bool {
        match parse_message(raw) {
            Ok(FeedMessage::Error(frame)) => {
                self.set_feed_error(frame.message);
                true
            }
            _ => false,
        }
    }

    /// Replace the current snapshot and stamp the update instant.
    ///
    /// Fresh data clears any outstanding feed error.
    pub fn replace(&self, snapshot: MetricsSnapshot) -> (Arc<MetricsSnapshot>, Timestamp) {
        let snapshot = Arc::new(snapshot);
        let now = Utc::now();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.snapshot = Arc::clone(&snapshot);
        state.updated_at = Some(now);
        state.feed_error = None;

        (snapshot, now)
    }

    /// Record an error reported by the feed. The snapshot is kept.
    pub fn set_feed_error(&self, message: String) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.feed_error = Some(message);
    }

    /// Forget the outstanding feed error, if any.
    pub fn reset_feed_error(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.feed_error = None;
    }

    /// The latest snapshot, or the default one before any data arrived.
    pub fn current(&self) -> Arc<MetricsSnapshot> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.snapshot)
    }

    /// When the current snapshot arrived; `None` while still on the default.
    pub fn last_updated(&self) -> Option<Timestamp> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .updated_at
    }

    /// Last error reported by the feed, cleared by the next snapshot.
    pub fn feed_error(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .feed_error
            .clone()
    }
}
