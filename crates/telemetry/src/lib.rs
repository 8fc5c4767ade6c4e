//! Real-time telemetry ingestion client for the ops dashboard.
//!
//! Maintains push-based WebSocket connections to the dashboard's metrics
//! and log feeds, reconnecting on a fixed delay, and normalizes inbound
//! frames into a latest-snapshot [`store`] and a bounded, filterable
//! [`logs`] buffer. [`hub::TelemetryHub`] is the entry point for
//! presentation code.

pub mod client;
pub mod config;
pub mod events;
pub mod hub;
pub mod logs;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod store;

pub use client::FeedChannel;
pub use config::TelemetryConfig;
pub use events::TelemetryEvent;
pub use hub::{ConnectionStatus, TelemetryHub};
pub use logs::{FilterCriteria, LogRecord};
