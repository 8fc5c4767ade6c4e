//! `opsboard-monitor` -- headless console consumer of the dashboard feeds.
//!
//! Connects to the metrics and log feeds, prints matching log lines as
//! they arrive, and prints a one-line status summary on a fixed
//! interval. Reconnection is automatic; Ctrl-C shuts down cleanly.
//!
//! # Environment variables
//!
//! | Variable                      | Required | Default                             |
//! |-------------------------------|----------|-------------------------------------|
//! | `OPSBOARD_METRICS_URL`        | no       | `ws://localhost:8000/ws/monitoring` |
//! | `OPSBOARD_LOGS_URL`           | no       | `ws://localhost:8000/ws/logs`       |
//! | `OPSBOARD_RECONNECT_DELAY_MS` | no       | `2000`                              |
//! | `OPSBOARD_CONNECT_TIMEOUT_MS` | no       | `5000`                              |
//! | `OPSBOARD_CLOSE_TIMEOUT_MS`   | no       | `1000`                              |
//! | `OPSBOARD_LOG_CAPACITY`       | no       | `500`                               |
//! | `MONITOR_FILTER`              | no       | `all` (a source or a severity)      |
//! | `MONITOR_SEARCH`              | no       | empty                               |
//! | `MONITOR_SUMMARY_SECS`        | no       | `10`                                |
//! | `LOG_FORMAT`                  | no       | `text` (`json` for JSON lines)      |

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opsboard_monitor::render;
use opsboard_monitor::settings::MonitorSettings;
use opsboard_telemetry::{TelemetryEvent, TelemetryHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = MonitorSettings::from_env().context("invalid monitor configuration")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "opsboard_monitor=info,opsboard_telemetry=info".into());
    if settings.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        metrics_url = %settings.telemetry.metrics_url,
        logs_url = %settings.telemetry.logs_url,
        reconnect_delay_ms = settings.telemetry.reconnect_delay.as_millis() as u64,
        filter = %settings.filter.source_or_level,
        "Starting opsboard-monitor",
    );

    let hub = TelemetryHub::new(&settings.telemetry);
    let mut events = hub.subscribe();
    hub.request_start();

    let mut ticker = tokio::time::interval(settings.summary_interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
            _ = ticker.tick() => {
                let line = render::summary_line(
                    &hub.connection_status(),
                    &hub.current_snapshot(),
                    hub.last_updated(),
                );
                println!("{line}");
            }
            event = events.recv() => match event {
                Ok(TelemetryEvent::LogAppended(record)) => {
                    if settings.filter.matches(&record) {
                        println!("{}", render::log_line(&record));
                    }
                }
                Ok(TelemetryEvent::FeedError { channel, message }) => {
                    println!("[{channel}] feed error: {message}");
                }
                Ok(TelemetryEvent::StatusChanged { channel, state }) => {
                    tracing::info!(%channel, ?state, "Feed status changed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Console fell behind the event stream");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    hub.shutdown().await;
    Ok(())
}
