//! Data models for readings, alerts and the published snapshot
//!
//! Defines the core data structures used throughout the monitor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// One point-in-time sensor sample decoded from the Telemetry Source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Local identifier, assigned on receipt
    pub id: Uuid,

    /// Temperature (Celsius)
    pub temperature: f64,

    /// Relative humidity (percentage)
    pub humidity: f64,

    /// Air-quality index / gas value as reported upstream
    pub air_quality: f64,

    /// Server-issued sample time. Staleness is computed from this field only;
    /// `None` when the payload carried no usable timestamp.
    pub timestamp: Option<DateTime<Utc>>,

    /// Local receipt time
    pub received_at: DateTime<Utc>,

    /// Smoothed temperature estimate, upstream-provided or synthesized
    pub kalman_temp: Option<f64>,
}

impl Reading {
    pub fn new(
        temperature: f64,
        humidity: f64,
        air_quality: f64,
        timestamp: DateTime<Utc>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            temperature,
            humidity,
            air_quality,
            timestamp: Some(timestamp),
            received_at,
            kalman_temp: None,
        }
    }

    pub fn with_kalman_temp(mut self, kalman_temp: Option<f64>) -> Self {
        self.kalman_temp = kalman_temp;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Age of the sample relative to `now`, measured from the source timestamp
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timestamp.map(|timestamp| now - timestamp)
    }
}

/// Connection health as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No cycle has completed yet
    #[default]
    Connecting,
    /// Last cycle succeeded with a fresh reading
    Online,
    /// Last cycle succeeded but the reading is older than the threshold
    Stale,
    /// Last cycle failed
    Offline,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Online => "ONLINE",
            ConnectionStatus::Stale => "STALE",
            ConnectionStatus::Offline => "OFFLINE",
        };
        f.write_str(label)
    }
}

/// Opaque alert record, passed through exactly as the Alerts Source returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alert(pub Value);

impl Alert {
    /// Alert category (`type`, falling back to the backend's `metric`)
    pub fn kind(&self) -> Option<&str> {
        self.str_field("type").or_else(|| self.str_field("metric"))
    }

    pub fn message(&self) -> Option<&str> {
        self.str_field("message")
    }

    /// Alert time (`time`, falling back to `timestamp`)
    pub fn time(&self) -> Option<&str> {
        self.str_field("time").or_else(|| self.str_field("timestamp"))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Sensor calibration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationStatus {
    #[default]
    Ok,
    Degraded,
}

/// A flagged reading attribute, recorded for the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub time: DateTime<Utc>,
    /// Offending value
    pub value: f64,
}

/// Derived data-quality flags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySignal {
    pub calibration_status: CalibrationStatus,
    pub drift_detected: bool,
    /// Most recent anomalies, oldest first
    pub anomalies: Vec<AnomalyEvent>,
}

/// The externally observable telemetry state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Current reading, `None` before the first successful cycle
    pub data: Option<Reading>,
    /// Recent readings, oldest first
    pub history: Vec<Reading>,
    pub status: ConnectionStatus,
    /// Receipt time of the last successful cycle
    pub last_updated: Option<DateTime<Utc>>,
    pub alerts: Vec<Alert>,
    pub quality: QualitySignal,
    /// Sequence number of the last applied cycle, 0 before any
    pub revision: u64,
}

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// A new snapshot was published
    SnapshotUpdate(TelemetrySnapshot),
    /// Connection acknowledgment
    Connected { client_id: String },
    /// Error message
    Error { message: String },
    /// Heartbeat/ping
    Ping,
    /// Heartbeat/pong response
    Pong,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub connection: ConnectionStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reading_age_uses_source_timestamp() {
        let now = Utc::now();
        let reading = Reading::new(21.0, 40.0, 12.0, now - Duration::seconds(15), now);

        assert_eq!(reading.age_at(now), Some(Duration::seconds(15)));
        assert!(reading.kalman_temp.is_none());

        let undated = reading.with_timestamp(None);
        assert_eq!(undated.age_at(now), None);
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&ConnectionStatus::Stale).unwrap();
        assert_eq!(json, "\"STALE\"");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Connecting);
        assert_eq!(ConnectionStatus::Offline.to_string(), "OFFLINE");
    }

    #[test]
    fn test_alert_passes_through_unmodified() {
        let raw = json!({
            "id": 7,
            "metric": "temperature",
            "message": "Temperature above threshold",
            "timestamp": "2026-10-19T10:00:00",
            "email_sent": false
        });
        let alert: Alert = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(alert.kind(), Some("temperature"));
        assert_eq!(alert.message(), Some("Temperature above threshold"));
        assert_eq!(alert.time(), Some("2026-10-19T10:00:00"));
        assert_eq!(serde_json::to_value(&alert).unwrap(), raw);
    }

    #[test]
    fn test_snapshot_uses_camel_case_fields() {
        let snapshot = TelemetrySnapshot::default();
        let value = serde_json::to_value(&snapshot).unwrap();

        assert!(value.get("lastUpdated").is_some());
        assert_eq!(value["status"], "CONNECTING");
        assert_eq!(value["quality"]["calibrationStatus"], "OK");
        assert_eq!(value["quality"]["driftDetected"], false);
        assert!(value["data"].is_null());
    }

    #[test]
    fn test_anomaly_event_type_field() {
        let event = AnomalyEvent {
            kind: "High Temp".to_string(),
            time: Utc::now(),
            value: 61.0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "High Temp");
    }
}
