//! Telemetry Monitor
//!
//! Keeps a live view of a remote sensor backend: a rolling window of
//! readings, the most recent alerts, a connection-health status and a
//! quality signal. Readings arrive through a pluggable [`transport`]
//! (periodic polling or a push stream) and are published as immutable
//! [`models::TelemetrySnapshot`]s.

pub mod buffer;
pub mod config;
pub mod cycle;
pub mod error;
pub mod handlers;
pub mod health;
pub mod models;
pub mod monitor;
pub mod payload;
pub mod simulator;
pub mod source;
pub mod transport;
pub mod validation;
pub mod websocket;

pub use config::Settings;
pub use error::{MonitorError, MonitorResult};
pub use models::{Alert, ConnectionStatus, QualitySignal, Reading, TelemetrySnapshot};
pub use monitor::{MonitorCore, MonitorHandle, TelemetryMonitor};
