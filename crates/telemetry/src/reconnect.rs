//! Fixed-delay reconnection supervisor for one feed.
//!
//! [`FeedSupervisor`] owns the lifecycle of the sessions for a single
//! [`FeedClient`]. Once started it keeps exactly one session alive:
//! when the feed drops the connection, or a connect attempt fails, it
//! waits a fixed delay and opens a brand-new session, forever, until
//! [`stop`](FeedSupervisor::stop) is called.
//!
//! The delay is constant, not exponential.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{FeedChannel, FeedClient};
use crate::events::TelemetryEvent;
use crate::processor::FrameProcessor;

/// How long [`FeedSupervisor::shutdown`] waits for the loop to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunable parameters for the reconnect policy.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Wait between an unrequested close (or failed attempt) and the next
    /// attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

/// Supervisor-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Publishes [`LinkState`] changes to the watch channel and the event bus.
#[derive(Clone)]
struct StatusReporter {
    channel: FeedChannel,
    state_tx: Arc<watch::Sender<LinkState>>,
    event_tx: broadcast::Sender<TelemetryEvent>,
}

impl StatusReporter {
    /// Set `state` unless the loop has been cancelled. The check runs
    /// under the watch lock, so a concurrent `stop()` always wins.
    fn set(&self, state: LinkState, cancel: &CancellationToken) {
        let changed = self.state_tx.send_if_modified(|current| {
            if cancel.is_cancelled() || *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            self.announce(state);
        }
    }

    fn force(&self, state: LinkState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            self.announce(state);
        }
    }

    fn announce(&self, state: LinkState) {
        tracing::debug!(channel = %self.channel, ?state, "Feed link state changed");
        let _ = self.event_tx.send(TelemetryEvent::StatusChanged {
            channel: self.channel,
            state,
        });
    }
}

/// Bookkeeping for the running loop.
struct RunningFeed {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    /// Wakes the loop to drop the live session and reconnect at once.
    reconnect: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    running: Option<RunningFeed>,
    /// A stopped loop that may still be closing its session gracefully.
    draining: Option<JoinHandle<()>>,
}

pub struct FeedSupervisor {
    client: Arc<FeedClient>,
    config: ReconnectConfig,
    processor: FrameProcessor,
    status: StatusReporter,
    attempts: Arc<AtomicU64>,
    inner: Mutex<Inner>,
}

impl FeedSupervisor {
    pub fn new(
        client: FeedClient,
        config: ReconnectConfig,
        processor: FrameProcessor,
        event_tx: broadcast::Sender<TelemetryEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let status = StatusReporter {
            channel: client.channel(),
            state_tx: Arc::new(state_tx),
            event_tx,
        };

        Self {
            client: Arc::new(client),
            config,
            processor,
            status,
            attempts: Arc::new(AtomicU64::new(0)),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The feed this supervisor connects to.
    pub fn channel(&self) -> FeedChannel {
        self.client.channel()
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.status.state_tx.borrow()
    }

    /// Watch link state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.status.state_tx.subscribe()
    }

    /// Number of connect attempts made since the supervisor was created.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Begin connecting. A no-op while the loop is already running.
    ///
    /// If a previous loop is still closing its session, the new loop
    /// waits for it first so that at most one session is ever live.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            tracing::debug!(channel = %self.channel(), "Feed supervisor already running");
            return;
        }

        let previous = inner.draining.take();
        let cancel = CancellationToken::new();
        let reconnect = Arc::new(Notify::new());

        let ctx = LoopContext {
            client: Arc::clone(&self.client),
            config: self.config,
            processor: self.processor.clone(),
            status: self.status.clone(),
            attempts: Arc::clone(&self.attempts),
            cancel: cancel.clone(),
            reconnect: Arc::clone(&reconnect),
        };

        let channel = self.channel();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            tracing::info!(%channel, "Starting feed supervisor");
            run_feed_loop(ctx).await;
            tracing::info!(%channel, "Feed supervisor exited");
        });

        inner.running = Some(RunningFeed {
            task,
            cancel,
            reconnect,
        });
    }

    /// Stop supervising. Cancels any pending reconnect timer and closes the
    /// live session in the background. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if let Some(running) = inner.running.take() {
            tracing::info!(channel = %self.channel(), "Stopping feed supervisor");
            running.cancel.cancel();
            inner.draining = Some(running.task);
        }
        drop(inner);
        self.status.force(LinkState::Disconnected);
    }

    /// Drop the live session (if any) and connect again immediately,
    /// skipping the delay. Starts the loop when it is not running.
    pub fn reconnect(&self) {
        {
            let inner = self.lock();
            if let Some(running) = inner.running.as_ref().filter(|r| !r.task.is_finished()) {
                tracing::info!(channel = %self.channel(), "Manual reconnect requested");
                running.reconnect.notify_one();
                return;
            }
        }
        self.start();
    }

    /// Stop and wait (bounded) for the loop to finish closing its session.
    pub async fn shutdown(&self) {
        let (running, draining) = {
            let mut inner = self.lock();
            (inner.running.take(), inner.draining.take())
        };
        self.status.force(LinkState::Disconnected);

        let mut tasks = Vec::new();
        if let Some(running) = running {
            running.cancel.cancel();
            tasks.push(running.task);
        }
        tasks.extend(draining);

        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!(channel = %self.channel(), "Feed supervisor did not exit in time");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FeedSupervisor {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = inner.running.take() {
            running.cancel.cancel();
        }
    }
}

struct LoopContext {
    client: Arc<FeedClient>,
    config: ReconnectConfig,
    processor: FrameProcessor,
    status: StatusReporter,
    attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
    reconnect: Arc<Notify>,
}

/// What woke the loop while a session was connecting.
enum ConnectWake {
    Stop,
    Reconnect,
    Done(bool),
}

/// Why a live session ended.
enum SessionEnd {
    Stopped,
    Manual,
    Dropped,
}

/// Core loop: connect -> process frames -> wait fixed delay -> repeat.
///
/// Runs until the cancellation token is triggered. Every `select!` polls
/// cancellation first, so once `stop()` returns no new attempt begins.
async fn run_feed_loop(ctx: LoopContext) {
    let LoopContext {
        client,
        config,
        mut processor,
        status,
        attempts,
        cancel,
        reconnect,
    } = ctx;
    let channel = client.channel();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        status.set(LinkState::Connecting, &cancel);

        let mut session = client.session();
        tracing::info!(
            %channel,
            attempt,
            session_id = %session.id(),
            "Connecting to feed at {}",
            client.ws_url(),
        );

        let wake = tokio::select! {
            biased;
            _ = cancel.cancelled() => ConnectWake::Stop,
            _ = reconnect.notified() => ConnectWake::Reconnect,
            result = session.connect(&mut processor) => ConnectWake::Done(result.is_ok()),
        };

        match wake {
            ConnectWake::Stop => {
                session.close(&mut processor).await;
                break;
            }
            ConnectWake::Reconnect => {
                session.close(&mut processor).await;
                continue;
            }
            ConnectWake::Done(false) => {
                tracing::warn!(
                    %channel,
                    attempt,
                    error = session.last_error().unwrap_or("unknown"),
                    "Feed connect attempt failed",
                );
            }
            ConnectWake::Done(true) => {
                status.set(LinkState::Connected, &cancel);

                let end = loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break SessionEnd::Stopped,
                        _ = reconnect.notified() => break SessionEnd::Manual,
                        open = session.recv_next(&mut processor) => {
                            if !open {
                                break SessionEnd::Dropped;
                            }
                        }
                    }
                };

                match end {
                    SessionEnd::Stopped => {
                        session.close(&mut processor).await;
                        break;
                    }
                    SessionEnd::Manual => {
                        session.close(&mut processor).await;
                        continue;
                    }
                    SessionEnd::Dropped => {
                        tracing::warn!(%channel, session_id = %session.id(), "Feed connection lost");
                    }
                }
            }
        }

        status.set(LinkState::Connecting, &cancel);
        tracing::info!(
            %channel,
            delay_ms = config.delay.as_millis() as u64,
            "Reconnecting to feed after fixed delay",
        );

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = reconnect.notified() => {}
            _ = tokio::time::sleep(config.delay) => {}
        }
    }

    status.force(LinkState::Disconnected);
}
