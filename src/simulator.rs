//! Simulated upstream backend
//!
//! ══════════════════════════════════════════════════════════════════════════════
//! DEVELOPMENT STAND-IN FOR THE SENSOR BACKEND
//! ══════════════════════════════════════════════════════════════════════════════
//!
//! Implements both the Telemetry Source and the Alerts Source in-process so the
//! monitor can run without a backend (`TELEMETRY_SOURCE=simulated`).
//!
//! The generated data follows realistic patterns including:
//! - Slow sinusoidal drift of temperature with Gaussian noise
//! - Humidity inversely correlated with temperature
//! - Air-quality baseline with occasional pollution spikes
//! - Rare heat spikes above the anomaly threshold, which also raise an alert

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{MonitorError, MonitorResult};
use crate::models::Alert;
use crate::source::{AlertsSource, TelemetrySource};

/// Alerts retained by the simulator
const MAX_ALERTS: usize = 20;

#[derive(Debug)]
struct SimState {
    drift_factor: f64,
    tick_count: u64,
    alerts: VecDeque<Alert>,
}

/// In-process telemetry and alerts generator
#[derive(Debug)]
pub struct SimulatedBackend {
    /// Base temperature (simulated room temperature)
    base_temperature: f64,
    /// Base humidity (simulated ambient humidity)
    base_humidity: f64,
    /// Base air-quality index
    base_air_quality: f64,
    /// Probability of a heat spike per reading
    heat_spike_probability: f64,
    high_temp_threshold: f64,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    pub fn new(high_temp_threshold: f64) -> Self {
        info!(high_temp_threshold, "Initializing simulated backend");

        Self {
            base_temperature: 24.0,
            base_humidity: 50.0,
            base_air_quality: 40.0,
            heat_spike_probability: 0.02,
            high_temp_threshold,
            state: Mutex::new(SimState {
                drift_factor: 0.0,
                tick_count: 0,
                alerts: VecDeque::with_capacity(MAX_ALERTS),
            }),
        }
    }

    pub fn with_heat_spike_probability(mut self, probability: f64) -> Self {
        self.heat_spike_probability = probability.clamp(0.0, 1.0);
        self
    }

    fn lock(&self) -> MonitorResult<std::sync::MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| MonitorError::MalformedPayload("simulator state poisoned".to_string()))
    }

    fn next_payload(&self) -> MonitorResult<Value> {
        let mut rng = rand::thread_rng();
        let mut state = self.lock()?;

        state.tick_count += 1;
        state.drift_factor += 0.01;
        if state.drift_factor > std::f64::consts::PI * 2.0 {
            state.drift_factor = 0.0;
        }

        let temp_drift = (state.drift_factor * 0.5).sin() * 3.0;
        let heat_spike = if rng.gen::<f64>() < self.heat_spike_probability {
            rng.gen_range(30.0..36.0)
        } else {
            0.0
        };
        let temperature =
            (self.base_temperature + temp_drift + noise(&mut rng, 0.5) + heat_spike).clamp(-20.0, 80.0);

        let humidity = (self.base_humidity - temp_drift * 2.0 + noise(&mut rng, 2.0)).clamp(5.0, 100.0);

        // 5% chance of a pollution event
        let pollution = if rng.gen::<f64>() < 0.05 {
            rng.gen_range(50.0..150.0)
        } else {
            0.0
        };
        let air_quality = (self.base_air_quality + noise(&mut rng, 8.0) + pollution).clamp(0.0, 500.0);

        let now = Utc::now();
        let tick = state.tick_count;
        let temperature = (temperature * 10.0).round() / 10.0;

        if temperature > self.high_temp_threshold {
            if state.alerts.len() >= MAX_ALERTS {
                state.alerts.pop_front();
            }
            state.alerts.push_back(Alert(json!({
                "id": tick,
                "type": "temperature",
                "message": format!("Temperature {:.1}°C above {:.1}°C", temperature, self.high_temp_threshold),
                "time": now.to_rfc3339(),
                "value": temperature,
            })));
        }

        debug!(
            tick,
            temperature,
            humidity,
            air_quality,
            "Generated simulated reading"
        );

        Ok(json!({
            "temperature": temperature,
            "humidity": (humidity * 10.0).round() / 10.0,
            "air_quality": air_quality.round(),
            "timestamp": now.to_rfc3339(),
        }))
    }

    fn recent_alerts(&self, limit: usize) -> MonitorResult<Vec<Alert>> {
        let state = self.lock()?;
        // Newest first, like the backend's alert listing
        Ok(state.alerts.iter().rev().take(limit).cloned().collect())
    }
}

fn noise<R: Rng>(rng: &mut R, std_dev: f64) -> f64 {
    Normal::new(0.0, std_dev)
        .map(|normal| normal.sample(rng))
        .unwrap_or(0.0)
}

#[async_trait]
impl TelemetrySource for SimulatedBackend {
    async fn fetch_latest(&self) -> MonitorResult<Value> {
        self.next_payload()
    }
}

#[async_trait]
impl AlertsSource for SimulatedBackend {
    async fn fetch_recent(&self, limit: usize, _token: Option<&str>) -> MonitorResult<Vec<Alert>> {
        self.recent_alerts(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode_reading;

    #[test]
    fn test_backend_creation() {
        let backend = SimulatedBackend::new(50.0);
        assert_eq!(backend.base_temperature, 24.0);
        assert_eq!(backend.base_humidity, 50.0);
        assert_eq!(backend.heat_spike_probability, 0.02);
    }

    #[tokio::test]
    async fn test_payload_decodes_within_ranges() {
        let backend = SimulatedBackend::new(50.0).with_heat_spike_probability(0.0);

        for _ in 0..50 {
            let payload = backend.fetch_latest().await.unwrap();
            let reading = decode_reading(&payload, Utc::now(), true).unwrap();

            assert!(reading.temperature >= -20.0 && reading.temperature <= 50.0);
            assert!(reading.humidity >= 5.0 && reading.humidity <= 100.0);
            assert!(reading.air_quality >= 0.0 && reading.air_quality <= 500.0);
        }
        assert!(backend.fetch_recent(5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heat_spikes_raise_alerts() {
        let backend = SimulatedBackend::new(50.0).with_heat_spike_probability(1.0);

        for _ in 0..8 {
            let payload = backend.fetch_latest().await.unwrap();
            assert!(payload["temperature"].as_f64().unwrap() > 50.0);
        }

        let alerts = backend.fetch_recent(5, Some("ignored")).await.unwrap();
        assert_eq!(alerts.len(), 5);
        assert_eq!(alerts[0].kind(), Some("temperature"));
        // Newest first
        assert_eq!(alerts[0].0["id"], 8);
    }
}
