use std::time::Duration;

use crate::client::SessionTimeouts;
use crate::logs::DEFAULT_LOG_CAPACITY;
use crate::reconnect::ReconnectConfig;

/// Telemetry client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a dashboard backend running on
/// the same machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// WebSocket endpoint of the metrics feed.
    pub metrics_url: String,
    /// WebSocket endpoint of the log feed.
    pub logs_url: String,
    /// Fixed wait between an unrequested close and the next attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Upper bound on each step of a graceful close.
    pub close_timeout: Duration,
    /// Maximum number of retained log records.
    pub log_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_url: "ws://localhost:8000/ws/monitoring".into(),
            logs_url: "ws://localhost:8000/ws/logs".into(),
            reconnect_delay: Duration::from_millis(2000),
            connect_timeout: Duration::from_millis(5000),
            close_timeout: Duration::from_millis(1000),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                             |
    /// |-------------------------------|-------------------------------------|
    /// | `OPSBOARD_METRICS_URL`        | `ws://localhost:8000/ws/monitoring` |
    /// | `OPSBOARD_LOGS_URL`           | `ws://localhost:8000/ws/logs`       |
    /// | `OPSBOARD_RECONNECT_DELAY_MS` | `2000`                              |
    /// | `OPSBOARD_CONNECT_TIMEOUT_MS` | `5000`                              |
    /// | `OPSBOARD_CLOSE_TIMEOUT_MS`   | `1000`                              |
    /// | `OPSBOARD_LOG_CAPACITY`       | `500`                               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Unset keys fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let metrics_url = lookup("OPSBOARD_METRICS_URL").unwrap_or(defaults.metrics_url);
        let logs_url = lookup("OPSBOARD_LOGS_URL").unwrap_or(defaults.logs_url);
        for (var, url) in [("OPSBOARD_METRICS_URL", &metrics_url), ("OPSBOARD_LOGS_URL", &logs_url)] {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::Invalid {
                    var,
                    value: url.clone(),
                    reason: "must be a ws:// or wss:// URL",
                });
            }
        }

        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: "must be a whole number of milliseconds",
                    }),
            }
        };

        let reconnect_delay = millis("OPSBOARD_RECONNECT_DELAY_MS", defaults.reconnect_delay)?;
        let connect_timeout = millis("OPSBOARD_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?;
        let close_timeout = millis("OPSBOARD_CLOSE_TIMEOUT_MS", defaults.close_timeout)?;

        let log_capacity = match lookup("OPSBOARD_LOG_CAPACITY") {
            None => defaults.log_capacity,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "OPSBOARD_LOG_CAPACITY",
                        value: raw,
                        reason: "must be a positive integer",
                    })
                }
            },
        };

        Ok(Self {
            metrics_url,
            logs_url,
            reconnect_delay,
            connect_timeout,
            close_timeout,
            log_capacity,
        })
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            delay: self.reconnect_delay,
        }
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            connect: self.connect_timeout,
            close: self.close_timeout,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}
