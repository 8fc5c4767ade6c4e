//! Bounded, filterable log stream buffer.
//!
//! [`LogBuffer`] retains at most `capacity` [`LogRecord`]s in arrival
//! order. When full, appending evicts the oldest record. Queries take a
//! cheap snapshot of the retained records and filter lazily, so the
//! buffer is never mutated by a reader and the lock is never held while
//! a consumer iterates.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

use opsboard_core::bounded::BoundedQueue;
use opsboard_core::protocol::FILTER_ALL;
use opsboard_core::severity::{classify, Severity};
use opsboard_core::types::Timestamp;

use crate::messages::{parse_message, FeedMessage, LogFrame};

/// Default number of records retained.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Source recorded for log frames that do not name a service.
const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: Timestamp,
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

impl LogRecord {
    /// Build a record from a decoded `log` frame.
    ///
    /// An explicit, recognised `level` wins; otherwise the severity is
    /// derived from the message text by [`classify`].
    pub fn from_frame(frame: LogFrame, received_at: Timestamp) -> Self {
        let timestamp = frame.timestamp_or(received_at);
        let severity = frame
            .level
            .as_deref()
            .and_then(Severity::parse)
            .unwrap_or_else(|| classify(&frame.message));

        Self {
            timestamp,
            source: frame
                .service
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            severity,
            message: frame.message,
        }
    }
}

/// Presentation-side filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    /// A source name or a severity name; `"all"` disables this filter.
    pub source_or_level: String,
    /// Case-insensitive message substring; empty disables this filter.
    pub search_text: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            source_or_level: FILTER_ALL.to_string(),
            search_text: String::new(),
        }
    }
}

impl FilterCriteria {
    pub fn new(source_or_level: impl Into<String>, search_text: impl Into<String>) -> Self {
        Self {
            source_or_level: source_or_level.into(),
            search_text: search_text.into(),
        }
    }

    /// Compile into a matcher with the search text lowercased once.
    fn matcher(&self) -> Matcher {
        Matcher {
            source_or_level: (self.source_or_level != FILTER_ALL)
                .then(|| self.source_or_level.clone()),
            needle: (!self.search_text.is_empty()).then(|| self.search_text.to_lowercase()),
        }
    }

    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.matcher().matches(record)
    }
}

#[derive(Debug, Clone)]
struct Matcher {
    source_or_level: Option<String>,
    needle: Option<String>,
}

impl Matcher {
    fn matches(&self, record: &LogRecord) -> bool {
        if let Some(want) = &self.source_or_level {
            if record.source != *want && record.severity.as_str() != want {
                return false;
            }
        }
        match &self.needle {
            Some(needle) => record.message.to_lowercase().contains(needle),
            None => true,
        }
    }
}

/// Result of [`LogBuffer::query`].
///
/// Holds the records retained at query time. Filtering happens as the
/// caller iterates, and [`iter`](Self::iter) can be called again to
/// restart from the oldest match.
#[derive(Debug, Clone)]
pub struct LogQuery {
    records: Vec<Arc<LogRecord>>,
    matcher: Matcher,
}

impl LogQuery {
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> + '_ {
        self.records
            .iter()
            .map(Arc::as_ref)
            .filter(|r| self.matcher.matches(r))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Materialize the matches, oldest first.
    pub fn to_vec(&self) -> Vec<LogRecord> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a LogQuery {
    type Item = &'a LogRecord;
    type IntoIter = Box<dyn Iterator<Item = &'a LogRecord> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[derive(Debug)]
pub struct LogBuffer {
    records: Mutex<BoundedQueue<Arc<LogRecord>>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(BoundedQueue::new(capacity)),
        }
    }

    /// Decode a raw `log` frame and append it.
    ///
    /// Returns the appended record, or `None` (buffer untouched) if the
    /// frame is malformed or not a `log` frame.
    pub fn append(&self, raw: &str) -> Option<LogRecord> {
        match parse_message(raw) {
            Ok(FeedMessage::Log(frame)) => {
                let record = LogRecord::from_frame(frame, Utc::now());
                self.push(record.clone());
                Some(record)
            }
            _ => None,
        }
    }

    /// Append an already-built record, evicting the oldest if full.
    pub fn push(&self, record: LogRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push(Arc::new(record));
    }

    /// Matching records in arrival order, as of the time of the call.
    pub fn query(&self, criteria: &FilterCriteria) -> LogQuery {
        let records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        LogQuery {
            records,
            matcher: criteria.matcher(),
        }
    }

    /// Drop every buffered record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records kept before the oldest is evicted.
    pub fn capacity(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_frame(service: &str, message: &str) -> String {
        serde_json::json!({
            "type": "log",
            "timestamp": "2024-05-01T12:00:00Z",
            "service": service,
            "message": message,
        })
        .to_string()
    }

    fn messages(query: &LogQuery) -> Vec<String> {
        query.iter().map(|r| r.message.clone()).collect()
    }

    fn sample_buffer() -> LogBuffer {
        let buffer = LogBuffer::new(10);
        buffer.append(&log_frame("api", "GET /health 200"));
        buffer.append(&log_frame("worker", "Task failed with ERROR code 3"));
        buffer.append(&log_frame("redis", "Connected clients: 5"));
        buffer.append(&log_frame("api", "Rate limit approaching"));
        buffer.append(&log_frame("worker", "Job completed successfully"));
        buffer
    }

    #[test]
    fn append_classifies_severity() {
        let buffer = sample_buffer();
        let severities: Vec<Severity> = buffer
            .query(&FilterCriteria::default())
            .iter()
            .map(|r| r.severity)
            .collect();
        assert_eq!(
            severities,
            vec![
                Severity::Info,
                Severity::Error,
                Severity::Debug,
                Severity::Warn,
                Severity::Info
            ]
        );
    }

    #[test]
    fn explicit_level_wins_over_classifier() {
        let buffer = LogBuffer::new(4);
        let record = buffer
            .append(r#"{"type":"log","service":"api","message":"error budget report","level":"info"}"#)
            .unwrap();
        assert_eq!(record.severity, Severity::Info);

        let record = buffer
            .append(r#"{"type":"log","service":"api","message":"error budget","level":"loud"}"#)
            .unwrap();
        assert_eq!(record.severity, Severity::Error);
    }

    #[test]
    fn missing_service_is_unknown_source() {
        let buffer = LogBuffer::new(4);
        let record = buffer.append(r#"{"type":"log","message":"hello"}"#).unwrap();
        assert_eq!(record.source, "unknown");
    }

    #[test]
    fn non_log_frames_are_ignored() {
        let buffer = LogBuffer::new(4);
        assert!(buffer.append(r#"{"type":"metrics","data":{}}"#).is_none());
        assert!(buffer.append("garbage").is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let buffer = LogBuffer::new(3);
        for i in 0..8 {
            buffer.append(&log_frame("api", &format!("line {i}")));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(
            messages(&buffer.query(&FilterCriteria::default())),
            vec!["line 5", "line 6", "line 7"]
        );
    }

    #[test]
    fn identity_filter_returns_everything() {
        let buffer = sample_buffer();
        let query = buffer.query(&FilterCriteria::default());
        assert_eq!(query.count(), 5);
        assert_eq!(messages(&query)[0], "GET /health 200");
        assert_eq!(messages(&query)[4], "Job completed successfully");
    }

    #[test]
    fn filter_by_severity() {
        let buffer = sample_buffer();
        let query = buffer.query(&FilterCriteria::new("error", ""));
        assert!(query.iter().all(|r| r.severity == Severity::Error));
        assert_eq!(messages(&query), vec!["Task failed with ERROR code 3"]);
    }

    #[test]
    fn filter_by_source() {
        let buffer = sample_buffer();
        let query = buffer.query(&FilterCriteria::new("api", ""));
        assert_eq!(
            messages(&query),
            vec!["GET /health 200", "Rate limit approaching"]
        );
    }

    #[test]
    fn search_is_case_insensitive_and_combines_with_source() {
        let buffer = sample_buffer();
        assert_eq!(
            messages(&buffer.query(&FilterCriteria::new("all", "JOB"))),
            vec!["Job completed successfully"]
        );
        assert_eq!(
            messages(&buffer.query(&FilterCriteria::new("api", "rate"))),
            vec!["Rate limit approaching"]
        );
        assert_eq!(buffer.query(&FilterCriteria::new("redis", "rate")).count(), 0);
    }

    #[test]
    fn query_is_restartable_and_does_not_mutate() {
        let buffer = sample_buffer();
        let query = buffer.query(&FilterCriteria::new("worker", ""));
        let first: Vec<_> = query.iter().collect();
        let second: Vec<_> = (&query).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn query_is_isolated_from_later_appends() {
        let buffer = sample_buffer();
        let query = buffer.query(&FilterCriteria::default());
        buffer.append(&log_frame("api", "late line"));
        assert_eq!(query.count(), 5);
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn clear_empties_buffer() {
        let buffer = sample_buffer();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.query(&FilterCriteria::default()).count(), 0);
    }
}
