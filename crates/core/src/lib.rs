//! Pure domain types shared by the opsboard telemetry client and its
//! consumers. Nothing in this crate performs I/O.

pub mod bounded;
pub mod metrics;
pub mod protocol;
pub mod severity;
pub mod types;
