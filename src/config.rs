//! Configuration management module
//!
//! Loads and validates environment-based configuration.
//! Every setting has a default, so an empty environment yields a working
//! monitor pointed at a local backend.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

use crate::validation::validate_settings;

/// Poll Driver cadence
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
/// Age after which a reading is considered stale
pub const DEFAULT_STALE_AFTER_MS: u64 = 10_000;
/// Size of the visualization window
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
/// Anomalies kept for the session before the oldest is evicted
pub const DEFAULT_ANOMALY_CAPACITY: usize = 100;
pub const DEFAULT_HIGH_TEMP_THRESHOLD: f64 = 50.0;
pub const DEFAULT_ALERTS_LIMIT: usize = 5;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value for environment variable {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How readings reach the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Poll,
    Push,
}

impl FromStr for TransportKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "push" | "ws" | "websocket" => Ok(Self::Push),
            _ => Err(()),
        }
    }
}

/// Which upstream the poll transport talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Http,
    Simulated,
}

impl FromStr for SourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "simulated" | "fake" => Ok(Self::Simulated),
            _ => Err(()),
        }
    }
}

/// Server configuration settings for the published surface
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Upstream backend settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpstreamSettings {
    /// `<base>` for `/iot/latest` and `/alerts`
    #[validate(url(message = "TELEMETRY_API_BASE_URL must be a URL"))]
    pub api_base_url: String,
    /// `<base>` for the push stream
    #[validate(url(message = "TELEMETRY_WS_BASE_URL must be a URL"))]
    pub ws_base_url: String,
    pub device_id: String,
    pub transport: TransportKind,
    pub source: SourceKind,
    #[validate(range(min = 1, message = "REQUEST_TIMEOUT_MS must be positive"))]
    pub request_timeout_ms: u64,
    #[validate(range(min = 1, max = 100, message = "ALERTS_LIMIT must be between 1 and 100"))]
    pub alerts_limit: usize,
    #[validate(range(min = 1, message = "PUSH_RECONNECT_MS must be positive"))]
    pub push_reconnect_ms: u64,
}

/// Monitor behaviour settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MonitorSettings {
    #[validate(range(min = 1, message = "POLL_INTERVAL_MS must be positive"))]
    pub poll_interval_ms: u64,
    #[validate(range(min = 1, message = "STALE_AFTER_MS must be positive"))]
    pub stale_after_ms: u64,
    #[validate(range(min = 1, message = "HISTORY_CAPACITY must be positive"))]
    pub history_capacity: usize,
    #[validate(range(min = 1, message = "ANOMALY_CAPACITY must be positive"))]
    pub anomaly_capacity: usize,
    pub high_temp_threshold: f64,
    /// Fail the cycle on non-numeric display fields instead of coercing to 0
    pub strict_numeric: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            anomaly_capacity: DEFAULT_ANOMALY_CAPACITY,
            high_temp_threshold: DEFAULT_HIGH_TEMP_THRESHOLD,
            strict_numeric: false,
        }
    }
}

/// Credential store settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialSettings {
    /// JSON key/value file holding the bearer token under `token`
    pub credential_file: Option<PathBuf>,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub monitor: MonitorSettings,
    pub credentials: CredentialSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("TELEMETRY_API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8000".into())
            .trim_end_matches('/')
            .to_string();
        let ws_base_url = lookup("TELEMETRY_WS_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| ws_base_from(&api_base_url));

        let settings = Self {
            server: ServerSettings {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
                port: parse_var(&lookup, "SERVER_PORT", 8090)?,
            },
            upstream: UpstreamSettings {
                api_base_url,
                ws_base_url,
                device_id: lookup("TELEMETRY_DEVICE_ID").unwrap_or_else(|| "ESP32_MAIN".into()),
                transport: parse_var(&lookup, "TELEMETRY_TRANSPORT", TransportKind::Poll)?,
                source: parse_var(&lookup, "TELEMETRY_SOURCE", SourceKind::Http)?,
                request_timeout_ms: parse_var(&lookup, "REQUEST_TIMEOUT_MS", 5000)?,
                alerts_limit: parse_var(&lookup, "ALERTS_LIMIT", DEFAULT_ALERTS_LIMIT)?,
                push_reconnect_ms: parse_var(&lookup, "PUSH_RECONNECT_MS", 2000)?,
            },
            monitor: MonitorSettings {
                poll_interval_ms: parse_var(&lookup, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
                stale_after_ms: parse_var(&lookup, "STALE_AFTER_MS", DEFAULT_STALE_AFTER_MS)?,
                history_capacity: parse_var(&lookup, "HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY)?,
                anomaly_capacity: parse_var(&lookup, "ANOMALY_CAPACITY", DEFAULT_ANOMALY_CAPACITY)?,
                high_temp_threshold: parse_var(
                    &lookup,
                    "HIGH_TEMP_THRESHOLD",
                    DEFAULT_HIGH_TEMP_THRESHOLD,
                )?,
                strict_numeric: parse_var(&lookup, "STRICT_NUMERIC", false)?,
            },
            credentials: CredentialSettings {
                credential_file: lookup("CREDENTIAL_FILE")
                    .filter(|path| !path.trim().is_empty())
                    .map(PathBuf::from),
            },
        };

        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Full URL of the push stream for the configured device
    pub fn push_url(&self) -> String {
        format!(
            "{}/ws/stream/{}",
            self.upstream.ws_base_url, self.upstream.device_id
        )
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SettingsError::ParseError(key.to_string())),
        None => Ok(default),
    }
}

/// `http://` -> `ws://`, `https://` -> `wss://`
fn ws_base_from(api_base_url: &str) -> String {
    match api_base_url.strip_prefix("http") {
        Some(rest) => format!("ws{}", rest),
        None => api_base_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.upstream.api_base_url, "http://localhost:8000");
        assert_eq!(settings.upstream.ws_base_url, "ws://localhost:8000");
        assert_eq!(settings.upstream.transport, TransportKind::Poll);
        assert_eq!(settings.upstream.source, SourceKind::Http);
        assert_eq!(settings.upstream.alerts_limit, 5);
        assert_eq!(settings.monitor.poll_interval_ms, 2000);
        assert_eq!(settings.monitor.stale_after_ms, 10_000);
        assert_eq!(settings.monitor.history_capacity, 50);
        assert!(!settings.monitor.strict_numeric);
        assert!(settings.credentials.credential_file.is_none());
    }

    #[test]
    fn test_custom_settings() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SERVER_PORT", "3000"),
            ("TELEMETRY_API_BASE_URL", "https://sensors.example.org/"),
            ("TELEMETRY_TRANSPORT", "push"),
            ("TELEMETRY_DEVICE_ID", "node-7"),
            ("POLL_INTERVAL_MS", "500"),
            ("STRICT_NUMERIC", "true"),
            ("CREDENTIAL_FILE", "/tmp/creds.json"),
        ]))
        .unwrap();

        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.upstream.api_base_url, "https://sensors.example.org");
        assert_eq!(settings.upstream.transport, TransportKind::Push);
        assert_eq!(settings.monitor.poll_interval_ms, 500);
        assert!(settings.monitor.strict_numeric);
        assert_eq!(settings.push_url(), "wss://sensors.example.org/ws/stream/node-7");
        assert_eq!(
            settings.credentials.credential_file,
            Some(PathBuf::from("/tmp/creds.json"))
        );
    }

    #[test]
    fn test_unparseable_value_names_variable() {
        let err = Settings::from_lookup(lookup_from(&[("POLL_INTERVAL_MS", "fast")])).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_MS"));

        let err = Settings::from_lookup(lookup_from(&[("TELEMETRY_TRANSPORT", "carrier-pigeon")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::ParseError(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = Settings::from_lookup(lookup_from(&[("POLL_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        env::set_var("ANOMALY_CAPACITY", "7");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.monitor.anomaly_capacity, 7);

        env::remove_var("ANOMALY_CAPACITY");
    }
}
