//! Fetch Cycle
//!
//! One telemetry refresh attempt: read the token, fetch the latest reading
//! and recent alerts concurrently, decode the reading. Every failure is caught
//! here and turned into a [`CycleOutcome`]; nothing propagates to the driver.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::MonitorError;
use crate::models::{Alert, Reading};
use crate::payload::decode_reading;
use crate::source::{AlertsSource, CredentialStore, TelemetrySource};

/// Result of one cycle, ready to be applied to the monitor
#[derive(Debug)]
pub enum CycleOutcome {
    /// Telemetry succeeded. `alerts` is `None` when the Alerts Source failed
    /// and the previous alerts must be kept.
    Succeeded {
        reading: Reading,
        alerts: Option<Vec<Alert>>,
    },
    /// Telemetry failed; the status degrades and nothing else changes
    Failed(MonitorError),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Succeeded { .. })
    }
}

#[derive(Clone)]
pub struct FetchCycle {
    telemetry: Arc<dyn TelemetrySource>,
    alerts: Arc<dyn AlertsSource>,
    credentials: Arc<dyn CredentialStore>,
    alerts_limit: usize,
    strict_numeric: bool,
}

impl FetchCycle {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        alerts: Arc<dyn AlertsSource>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            telemetry,
            alerts,
            credentials,
            alerts_limit: crate::config::DEFAULT_ALERTS_LIMIT,
            strict_numeric: false,
        }
    }

    pub fn with_alerts_limit(mut self, limit: usize) -> Self {
        self.alerts_limit = limit;
        self
    }

    pub fn with_strict_numeric(mut self, strict: bool) -> Self {
        self.strict_numeric = strict;
        self
    }

    pub async fn run(&self) -> CycleOutcome {
        // The token only ever goes to the Alerts Source
        let token = self.credentials.token();

        let (latest, alerts) = tokio::join!(
            self.telemetry.fetch_latest(),
            self.alerts.fetch_recent(self.alerts_limit, token.as_deref()),
        );
        let received_at = Utc::now();

        let reading = match latest.and_then(|payload| {
            decode_reading(&payload, received_at, self.strict_numeric)
        }) {
            Ok(reading) => reading,
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Telemetry fetch failed");
                return CycleOutcome::Failed(e);
            }
        };

        let alerts = match alerts {
            Ok(alerts) => Some(alerts),
            Err(e) => {
                warn!(error = %e, "Alerts fetch failed, keeping previous alerts");
                None
            }
        };

        debug!(
            reading_id = %reading.id,
            temperature = reading.temperature,
            humidity = reading.humidity,
            air_quality = reading.air_quality,
            alerts = alerts.as_ref().map(Vec::len),
            "Fetch cycle completed"
        );

        CycleOutcome::Succeeded { reading, alerts }
    }
}
