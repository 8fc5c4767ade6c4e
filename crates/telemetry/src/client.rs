//! WebSocket transport for one dashboard feed.
//!
//! [`FeedClient`] holds the connection configuration for a single feed
//! endpoint. Call [`FeedClient::session`] to create a fresh [`Session`]
//! for each connection attempt; sessions are never reused.
//!
//! A session reports its lifecycle to a [`SessionHandler`], its single
//! dispatch table: `on_open`, `on_message` per text frame, `on_error` on
//! transport failures, and `on_close` exactly once.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use opsboard_core::protocol::{
    ACTION_START_LOGS, ACTION_START_MONITORING, ACTION_STOP_LOGS, ACTION_STOP_MONITORING,
};

use crate::messages::control_frame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which feed a session subscribes to. Decides the start/stop control
/// actions sent on open and close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedChannel {
    Metrics,
    Logs,
}

impl FeedChannel {
    pub fn start_action(self) -> &'static str {
        match self {
            FeedChannel::Metrics => ACTION_START_MONITORING,
            FeedChannel::Logs => ACTION_START_LOGS,
        }
    }

    pub fn stop_action(self) -> &'static str {
        match self {
            FeedChannel::Metrics => ACTION_STOP_MONITORING,
            FeedChannel::Logs => ACTION_STOP_LOGS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedChannel::Metrics => "metrics",
            FeedChannel::Logs => "logs",
        }
    }
}

impl std::fmt::Display for FeedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Receives the lifecycle of one [`Session`].
pub trait SessionHandler: Send {
    fn on_open(&mut self, _channel: FeedChannel) {}

    fn on_message(&mut self, channel: FeedChannel, text: &str);

    fn on_error(&mut self, _channel: FeedChannel, _detail: &str) {}

    /// Called exactly once per session. `code` is the WebSocket close code
    /// when the close was orderly.
    fn on_close(&mut self, _channel: FeedChannel, _code: Option<u16>) {}
}

/// Timeouts applied to a session's network operations.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Upper bound on the WebSocket handshake.
    pub connect: Duration,
    /// Upper bound on each step of a graceful close.
    pub close: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            close: Duration::from_secs(1),
        }
    }
}

/// Configuration handle for one feed endpoint.
#[derive(Debug, Clone)]
pub struct FeedClient {
    ws_url: String,
    channel: FeedChannel,
    timeouts: SessionTimeouts,
}

impl FeedClient {
    /// * `ws_url`  - WebSocket URL, e.g. `ws://host:8000/ws/monitoring`.
    /// * `channel` - which feed the endpoint serves.
    pub fn new(ws_url: impl Into<String>, channel: FeedChannel) -> Self {
        Self {
            ws_url: ws_url.into(),
            channel,
            timeouts: SessionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn channel(&self) -> FeedChannel {
        self.channel
    }

    /// Create a new, unconnected session for this endpoint.
    pub fn session(&self) -> Session {
        Session {
            id: uuid::Uuid::new_v4().to_string(),
            ws_url: self.ws_url.clone(),
            channel: self.channel,
            timeouts: self.timeouts,
            state: ConnectionState::Idle,
            last_error: None,
            sink: None,
            stream: None,
            close_emitted: false,
        }
    }
}

/// One connection attempt and, if it succeeds, the live connection.
pub struct Session {
    id: String,
    ws_url: String,
    channel: FeedChannel,
    timeouts: SessionTimeouts,
    state: ConnectionState,
    last_error: Option<String>,
    sink: Option<SplitSink<WsStream, Message>>,
    stream: Option<SplitStream<WsStream>>,
    close_emitted: bool,
}

impl Session {
    /// Unique identifier used to correlate log lines for this attempt.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> FeedChannel {
        self.channel
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Perform the WebSocket handshake and declare intent.
    ///
    /// On success the session is `Open`, `on_open` has fired and the
    /// channel's start action has been sent. On failure `on_error` and
    /// `on_close` have fired and the session is `Closed`.
    pub async fn connect(&mut self, handler: &mut dyn SessionHandler) -> Result<(), FeedClientError> {
        if self.state != ConnectionState::Idle {
            return Err(FeedClientError::Protocol(format!(
                "session {} cannot connect from state {:?}",
                self.id, self.state
            )));
        }
        self.state = ConnectionState::Connecting;

        let result = match tokio::time::timeout(self.timeouts.connect, connect_async(&self.ws_url)).await {
            Ok(Ok((ws_stream, _response))) => Ok(ws_stream),
            Ok(Err(e)) => Err(FeedClientError::Connection(format!(
                "Failed to connect to {}: {e}",
                self.ws_url
            ))),
            Err(_) => Err(FeedClientError::Timeout(self.timeouts.connect)),
        };

        let ws_stream = match result {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                self.fail(handler, &e.to_string());
                return Err(e);
            }
        };

        let (sink, stream) = ws_stream.split();
        self.sink = Some(sink);
        self.stream = Some(stream);
        self.state = ConnectionState::Open;

        tracing::info!(
            channel = %self.channel,
            session_id = %self.id,
            "Connected to feed at {}",
            self.ws_url,
        );
        handler.on_open(self.channel);

        self.send_action(self.channel.start_action()).await;
        Ok(())
    }

    /// Wait for the next frame and dispatch it.
    ///
    /// Returns `false` once the session has closed, whether by a close
    /// frame, a receive error, or the stream ending. Safe to cancel.
    pub async fn recv_next(&mut self, handler: &mut dyn SessionHandler) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                handler.on_message(self.channel, &text);
                true
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(channel = %self.channel, "Ignoring binary frame");
                true
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
                true
            }
            Some(Ok(Message::Frame(_))) => true,
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(channel = %self.channel, session_id = %self.id, ?frame, "Feed closed WebSocket");
                let code = frame.map(|f| u16::from(f.code));
                self.finish(handler, code);
                false
            }
            Some(Err(e)) => {
                tracing::error!(channel = %self.channel, session_id = %self.id, error = %e, "WebSocket receive error");
                self.fail(handler, &e.to_string());
                false
            }
            None => {
                tracing::info!(channel = %self.channel, session_id = %self.id, "WebSocket stream exhausted");
                self.finish(handler, None);
                false
            }
        }
    }

    /// Send a JSON payload as a text frame.
    ///
    /// Never fails: when the session is not open, or the write fails, the
    /// problem is logged and the payload dropped.
    pub async fn send<T: Serialize>(&mut self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.send_text(json).await,
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "Dropping unserialisable payload");
            }
        }
    }

    async fn send_action(&mut self, action: &str) {
        self.send_text(control_frame(action)).await;
    }

    async fn send_text(&mut self, text: String) {
        if self.state != ConnectionState::Open {
            tracing::debug!(
                channel = %self.channel,
                session_id = %self.id,
                state = ?self.state,
                "Session not open, dropping outbound frame",
            );
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::warn!(channel = %self.channel, session_id = %self.id, error = %e, "Failed to send frame");
            self.last_error = Some(e.to_string());
        }
    }

    /// Close the session gracefully. Idempotent.
    ///
    /// An open session sends the channel's stop action and then closes
    /// the socket, each step bounded by the close timeout; if either
    /// step stalls or fails, termination proceeds anyway.
    pub async fn close(&mut self, handler: &mut dyn SessionHandler) {
        match self.state {
            ConnectionState::Closing | ConnectionState::Closed => {}
            ConnectionState::Idle | ConnectionState::Connecting => {
                self.finish(handler, None);
            }
            ConnectionState::Open => {
                let budget = self.timeouts.close;
                let stop = control_frame(self.channel.stop_action());
                self.state = ConnectionState::Closing;

                if let Some(sink) = self.sink.as_mut() {
                    match tokio::time::timeout(budget, sink.send(Message::Text(stop))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(channel = %self.channel, error = %e, "Stop action not delivered");
                        }
                        Err(_) => {
                            tracing::debug!(channel = %self.channel, "Stop action timed out");
                        }
                    }
                    if tokio::time::timeout(budget, sink.close()).await.is_err() {
                        tracing::debug!(channel = %self.channel, "WebSocket close handshake timed out");
                    }
                }

                tracing::info!(channel = %self.channel, session_id = %self.id, "Session closed");
                self.finish(handler, Some(u16::from(CloseCode::Normal)));
            }
        }
    }

    fn fail(&mut self, handler: &mut dyn SessionHandler, detail: &str) {
        self.last_error = Some(detail.to_string());
        handler.on_error(self.channel, detail);
        self.finish(handler, None);
    }

    /// Terminal transition. `on_close` fires only the first time.
    fn finish(&mut self, handler: &mut dyn SessionHandler, code: Option<u16>) {
        self.state = ConnectionState::Closed;
        self.sink = None;
        self.stream = None;
        if !self.close_emitted {
            self.close_emitted = true;
            handler.on_close(self.channel, code);
        }
    }
}

/// Errors that can occur while establishing a session.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handshake did not complete in time.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// The session was used out of order.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl SessionHandler for Recorder {
        fn on_open(&mut self, _channel: FeedChannel) {
            self.events.push("open".into());
        }

        fn on_message(&mut self, _channel: FeedChannel, text: &str) {
            self.events.push(format!("message:{text}"));
        }

        fn on_error(&mut self, _channel: FeedChannel, _detail: &str) {
            self.events.push("error".into());
        }

        fn on_close(&mut self, _channel: FeedChannel, code: Option<u16>) {
            self.events.push(format!("close:{code:?}"));
        }
    }

    #[test]
    fn channel_actions() {
        assert_eq!(FeedChannel::Metrics.start_action(), "start_monitoring");
        assert_eq!(FeedChannel::Metrics.stop_action(), "stop_monitoring");
        assert_eq!(FeedChannel::Logs.start_action(), "start_logs");
        assert_eq!(FeedChannel::Logs.stop_action(), "stop_logs");
    }

    #[test]
    fn sessions_are_fresh_per_attempt() {
        let client = FeedClient::new("ws://localhost:1", FeedChannel::Logs);
        let a = client.session();
        let b = client.session();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state(), ConnectionState::Idle);
        assert_eq!(a.channel(), FeedChannel::Logs);
    }

    #[tokio::test]
    async fn send_on_idle_session_is_silent_noop() {
        let client = FeedClient::new("ws://localhost:1", FeedChannel::Metrics);
        let mut session = client.session();
        session.send(&serde_json::json!({"action": "start_monitoring"})).await;
        assert_eq!(session.state(), ConnectionState::Idle);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_emits_once() {
        let client = FeedClient::new("ws://localhost:1", FeedChannel::Metrics);
        let mut session = client.session();
        let mut recorder = Recorder::default();

        session.close(&mut recorder).await;
        session.close(&mut recorder).await;

        assert_eq!(session.state(), ConnectionState::Closed);
        assert_eq!(recorder.events, vec!["close:None"]);
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_close() {
        // Bind and drop a listener to obtain a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = FeedClient::new(format!("ws://{addr}"), FeedChannel::Metrics);
        let mut session = client.session();
        let mut recorder = Recorder::default();

        let result = session.connect(&mut recorder).await;
        assert!(result.is_err());
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.last_error().is_some());
        assert_eq!(recorder.events, vec!["error", "close:None"]);

        // A closed session cannot be reused.
        assert!(matches!(
            session.connect(&mut recorder).await,
            Err(FeedClientError::Protocol(_))
        ));
        assert!(!session.recv_next(&mut recorder).await);
        assert_eq!(recorder.events.len(), 2);
    }
}
