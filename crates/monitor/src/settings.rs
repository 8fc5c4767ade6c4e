//! Console-consumer settings layered on top of [`TelemetryConfig`].

use std::time::Duration;

use opsboard_core::protocol::FILTER_ALL;
use opsboard_telemetry::config::{ConfigError, TelemetryConfig};
use opsboard_telemetry::FilterCriteria;

/// Default interval between status summaries.
const DEFAULT_SUMMARY_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub telemetry: TelemetryConfig,
    /// Filter applied to log lines before they are printed.
    pub filter: FilterCriteria,
    pub summary_interval: Duration,
    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,
}

impl MonitorSettings {
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `MONITOR_FILTER`       | `all`   |
    /// | `MONITOR_SEARCH`       | (empty) |
    /// | `MONITOR_SUMMARY_SECS` | `10`    |
    /// | `LOG_FORMAT`           | `text`  |
    ///
    /// plus every `OPSBOARD_*` variable read by [`TelemetryConfig`].
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telemetry = TelemetryConfig::from_lookup(&lookup)?;

        let filter = FilterCriteria::new(
            lookup("MONITOR_FILTER").unwrap_or_else(|| FILTER_ALL.to_string()),
            lookup("MONITOR_SEARCH").unwrap_or_default(),
        );

        let summary_secs = match lookup("MONITOR_SUMMARY_SECS") {
            None => DEFAULT_SUMMARY_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => return Err(SettingsError::SummaryInterval(raw)),
            },
        };

        let json_logs = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            telemetry,
            filter,
            summary_interval: Duration::from_secs(summary_secs),
            json_logs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Telemetry(#[from] ConfigError),

    #[error("MONITOR_SUMMARY_SECS={0:?} must be a positive integer")]
    SummaryInterval(String),
}
