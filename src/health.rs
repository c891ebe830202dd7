//! Health Classifier
//!
//! Derives connection status and data-quality signals from successful
//! readings:
//!
//! - staleness: a reading whose source timestamp is older than the threshold
//!   at receipt time is `STALE`, otherwise `ONLINE`. A reading without a
//!   timestamp has no measurable age and is never stale.
//! - smoothed temperature: upstream `kalman_temp` when present, else the
//!   linear fallback `temperature * 0.98 + 0.5`
//! - anomalies: one `High Temp` event per reading above the threshold, kept
//!   in a bounded ring (oldest evicted)
//! - calibration / drift: delegated to a [`QualityProbe`], static by default

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

use crate::buffer::ReadingBuffer;
use crate::config::{
    MonitorSettings, DEFAULT_ANOMALY_CAPACITY, DEFAULT_HIGH_TEMP_THRESHOLD,
    DEFAULT_STALE_AFTER_MS,
};
use crate::models::{AnomalyEvent, CalibrationStatus, ConnectionStatus, QualitySignal, Reading};

pub const HIGH_TEMP: &str = "High Temp";

const SMOOTHING_GAIN: f64 = 0.98;
const SMOOTHING_OFFSET: f64 = 0.5;

/// Smoothed-temperature estimate for a payload.
///
/// An upstream value always wins. Without one, a raw temperature is mapped
/// through the linear fallback; without a raw temperature the result is `None`.
pub fn synthesize_smoothed(upstream: Option<f64>, temperature: Option<f64>) -> Option<f64> {
    upstream.or_else(|| temperature.map(|t| t * SMOOTHING_GAIN + SMOOTHING_OFFSET))
}

/// Calibration and drift verdict for one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QualityAssessment {
    pub calibration_status: CalibrationStatus,
    pub drift_detected: bool,
}

/// Extension point for calibration / drift estimation
pub trait QualityProbe: Send + Sync {
    fn assess(&self, reading: &Reading, history: &ReadingBuffer) -> QualityAssessment;
}

/// Always reports `OK` / no drift
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticQuality;

impl QualityProbe for StaticQuality {
    fn assess(&self, _reading: &Reading, _history: &ReadingBuffer) -> QualityAssessment {
        QualityAssessment::default()
    }
}

pub struct HealthClassifier {
    stale_after: Duration,
    high_temp_threshold: f64,
    probe: Box<dyn QualityProbe>,
}

impl HealthClassifier {
    pub fn new(stale_after_ms: u64, high_temp_threshold: f64) -> Self {
        let stale_after_ms = i64::try_from(stale_after_ms).unwrap_or(i64::MAX);
        Self {
            stale_after: Duration::milliseconds(stale_after_ms),
            high_temp_threshold,
            probe: Box::new(StaticQuality),
        }
    }

    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self::new(settings.stale_after_ms, settings.high_temp_threshold)
    }

    /// Replace the calibration / drift probe
    pub fn with_probe(mut self, probe: Box<dyn QualityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// `(now - source timestamp) > threshold`
    pub fn is_stale(&self, reading: &Reading, now: DateTime<Utc>) -> bool {
        reading
            .age_at(now)
            .is_some_and(|age| age > self.stale_after)
    }

    /// Status after a successful cycle
    pub fn classify(&self, reading: &Reading, now: DateTime<Utc>) -> ConnectionStatus {
        if self.is_stale(reading, now) {
            debug!(
                reading_id = %reading.id,
                age_ms = ?reading.age_at(now).map(|age| age.num_milliseconds()),
                "Reading is stale"
            );
            ConnectionStatus::Stale
        } else {
            ConnectionStatus::Online
        }
    }

    pub fn detect_anomaly(&self, reading: &Reading, now: DateTime<Utc>) -> Option<AnomalyEvent> {
        (reading.temperature > self.high_temp_threshold).then(|| {
            warn!(
                reading_id = %reading.id,
                temperature = reading.temperature,
                threshold = self.high_temp_threshold,
                "High temperature anomaly"
            );
            AnomalyEvent {
                kind: HIGH_TEMP.to_string(),
                time: now,
                value: reading.temperature,
            }
        })
    }

    pub fn assess(&self, reading: &Reading, history: &ReadingBuffer) -> QualityAssessment {
        self.probe.assess(reading, history)
    }
}

impl Default for HealthClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_MS, DEFAULT_HIGH_TEMP_THRESHOLD)
    }
}

impl fmt::Debug for HealthClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthClassifier")
            .field("stale_after_ms", &self.stale_after.num_milliseconds())
            .field("high_temp_threshold", &self.high_temp_threshold)
            .finish_non_exhaustive()
    }
}

/// Session-scoped quality state with a bounded anomaly ring
#[derive(Debug, Clone)]
pub struct QualityTracker {
    assessment: QualityAssessment,
    anomalies: VecDeque<AnomalyEvent>,
    capacity: usize,
    total_anomalies: u64,
}

impl QualityTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            assessment: QualityAssessment::default(),
            anomalies: VecDeque::with_capacity(capacity),
            capacity,
            total_anomalies: 0,
        }
    }

    pub fn record(&mut self, event: AnomalyEvent) {
        self.total_anomalies += 1;
        if self.anomalies.len() >= self.capacity {
            self.anomalies.pop_front();
        }
        self.anomalies.push_back(event);
    }

    pub fn update_assessment(&mut self, assessment: QualityAssessment) {
        self.assessment = assessment;
    }

    /// Anomalies recorded this session, including evicted ones
    pub fn total_anomalies(&self) -> u64 {
        self.total_anomalies
    }

    pub fn signal(&self) -> QualitySignal {
        QualitySignal {
            calibration_status: self.assessment.calibration_status,
            drift_detected: self.assessment.drift_detected,
            anomalies: self.anomalies.iter().cloned().collect(),
        }
    }
}

impl Default for QualityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ANOMALY_CAPACITY)
    }
}
