//! Telemetry Monitor
//!
//! Owns the shared telemetry state and publishes immutable snapshots.
//!
//! Every cycle is stamped with a monotonically increasing sequence number
//! when it is issued. A completed cycle is applied only if the monitor is
//! still active and no newer cycle has been applied yet, so late or
//! out-of-order completions are discarded instead of overwriting fresher
//! state. Consumers read the latest snapshot or subscribe to a watch channel.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::ReadingBuffer;
use crate::config::{Settings, SourceKind, TransportKind};
use crate::cycle::{CycleOutcome, FetchCycle};
use crate::error::MonitorResult;
use crate::health::{HealthClassifier, QualityTracker};
use crate::models::{Alert, ConnectionStatus, Reading, TelemetrySnapshot};
use crate::simulator::SimulatedBackend;
use crate::source::{
    AlertsSource, CredentialStore, FileCredentialStore, HttpBackend, StaticCredentials,
    TelemetrySource,
};
use crate::transport::{PollTransport, PushTransport, Transport};

/// What happened to a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Applied,
    /// The monitor was stopped before the cycle landed
    TornDown,
    /// A newer cycle was already applied
    Superseded,
}

#[derive(Debug)]
struct MonitorState {
    buffer: ReadingBuffer,
    quality: QualityTracker,
    alerts: Vec<Alert>,
    current: Option<Reading>,
    status: ConnectionStatus,
    last_updated: Option<DateTime<Utc>>,
    last_applied: u64,
}

impl MonitorState {
    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            data: self.current.clone(),
            history: self.buffer.to_vec(),
            status: self.status,
            last_updated: self.last_updated,
            alerts: self.alerts.clone(),
            quality: self.quality.signal(),
            revision: self.last_applied,
        }
    }
}

/// Shared core of a monitor: state, classifier and snapshot publisher
pub struct MonitorCore {
    classifier: HealthClassifier,
    state: RwLock<MonitorState>,
    publisher: watch::Sender<Arc<TelemetrySnapshot>>,
    next_sequence: AtomicU64,
    active: AtomicBool,
    history_capacity: usize,
    started_at: DateTime<Utc>,
}

impl MonitorCore {
    pub fn new(
        classifier: HealthClassifier,
        history_capacity: usize,
        anomaly_capacity: usize,
    ) -> Arc<Self> {
        let buffer = ReadingBuffer::new(history_capacity);
        let history_capacity = buffer.capacity();
        let state = MonitorState {
            buffer,
            quality: QualityTracker::new(anomaly_capacity),
            alerts: Vec::new(),
            current: None,
            status: ConnectionStatus::Connecting,
            last_updated: None,
            last_applied: 0,
        };
        let (publisher, _) = watch::channel(Arc::new(state.snapshot()));

        info!(history_capacity, anomaly_capacity, "Initializing telemetry monitor");

        Arc::new(Self {
            classifier,
            state: RwLock::new(state),
            publisher,
            next_sequence: AtomicU64::new(0),
            active: AtomicBool::new(true),
            history_capacity,
            started_at: Utc::now(),
        })
    }

    /// Stamp a new cycle. Sequences start at 1.
    pub fn begin_cycle(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Apply a completed cycle atomically and publish the resulting snapshot
    pub async fn apply(&self, sequence: u64, outcome: CycleOutcome) -> ApplyResult {
        let mut state = self.state.write().await;

        if !self.is_active() {
            debug!(sequence, "Discarding cycle result after teardown");
            return ApplyResult::TornDown;
        }
        if sequence <= state.last_applied {
            warn!(
                sequence,
                last_applied = state.last_applied,
                "Discarding out-of-order cycle result"
            );
            return ApplyResult::Superseded;
        }
        state.last_applied = sequence;

        match outcome {
            CycleOutcome::Succeeded { reading, alerts } => {
                let now = reading.received_at;
                let status = self.classifier.classify(&reading, now);

                if let Some(event) = self.classifier.detect_anomaly(&reading, now) {
                    state.quality.record(event);
                }

                state.buffer.append(reading.clone());
                let assessment = self.classifier.assess(&reading, &state.buffer);
                state.quality.update_assessment(assessment);

                if let Some(alerts) = alerts {
                    state.alerts = alerts;
                }

                if state.status != status {
                    info!(from = %state.status, to = %status, "Connection status changed");
                }
                state.status = status;
                state.last_updated = Some(now);
                state.current = Some(reading);
            }
            CycleOutcome::Failed(e) => {
                if state.status != ConnectionStatus::Offline {
                    warn!(error = %e, from = %state.status, "Connection lost, status OFFLINE");
                }
                state.status = ConnectionStatus::Offline;
            }
        }

        self.publisher.send_replace(Arc::new(state.snapshot()));
        ApplyResult::Applied
    }

    /// Mark the monitor inactive. After this returns no cycle is applied.
    pub async fn deactivate(&self) {
        let _state = self.state.write().await;
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.publisher.subscribe()
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// A configured monitor that has not been started yet
pub struct TelemetryMonitor {
    core: Arc<MonitorCore>,
    transport: Box<dyn Transport>,
}

impl TelemetryMonitor {
    pub fn new(core: Arc<MonitorCore>, transport: Box<dyn Transport>) -> Self {
        Self { core, transport }
    }

    /// Wire sources, classifier and transport from settings
    pub fn from_settings(settings: &Settings) -> MonitorResult<Self> {
        let monitor = &settings.monitor;
        let upstream = &settings.upstream;

        let core = MonitorCore::new(
            HealthClassifier::from_settings(monitor),
            monitor.history_capacity,
            monitor.anomaly_capacity,
        );

        let transport: Box<dyn Transport> = match upstream.transport {
            TransportKind::Poll => {
                let (telemetry, alerts) = build_sources(settings)?;

                let credentials: Arc<dyn CredentialStore> =
                    match &settings.credentials.credential_file {
                        Some(path) => Arc::new(FileCredentialStore::new(path)),
                        None => Arc::new(StaticCredentials::default()),
                    };

                let cycle = FetchCycle::new(telemetry, alerts, credentials)
                    .with_alerts_limit(upstream.alerts_limit)
                    .with_strict_numeric(monitor.strict_numeric);

                Box::new(PollTransport::new(
                    cycle,
                    Duration::from_millis(monitor.poll_interval_ms),
                ))
            }
            TransportKind::Push => Box::new(
                PushTransport::new(
                    settings.push_url(),
                    Duration::from_millis(upstream.push_reconnect_ms),
                )
                .with_strict_numeric(monitor.strict_numeric),
            ),
        };

        Ok(Self::new(core, transport))
    }

    pub fn core(&self) -> Arc<MonitorCore> {
        self.core.clone()
    }

    /// Activate: the transport runs until the returned handle is stopped
    pub fn start(self) -> MonitorHandle {
        info!(transport = self.transport.name(), "Starting telemetry monitor");
        let driver = self.transport.spawn(self.core.clone());

        MonitorHandle {
            core: self.core,
            driver: Some(driver),
        }
    }
}

fn build_sources(
    settings: &Settings,
) -> MonitorResult<(Arc<dyn TelemetrySource>, Arc<dyn AlertsSource>)> {
    let upstream = &settings.upstream;

    Ok(match upstream.source {
        SourceKind::Http => {
            let backend = Arc::new(HttpBackend::new(
                &upstream.api_base_url,
                Duration::from_millis(upstream.request_timeout_ms),
            )?);
            (
                backend.clone() as Arc<dyn TelemetrySource>,
                backend as Arc<dyn AlertsSource>,
            )
        }
        SourceKind::Simulated => {
            let backend = Arc::new(SimulatedBackend::new(settings.monitor.high_temp_threshold));
            (
                backend.clone() as Arc<dyn TelemetrySource>,
                backend as Arc<dyn AlertsSource>,
            )
        }
    })
}

/// Running monitor. Dropping the handle also stops the transport.
pub struct MonitorHandle {
    core: Arc<MonitorCore>,
    driver: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn core(&self) -> Arc<MonitorCore> {
        self.core.clone()
    }

    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.core.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.core.subscribe()
    }

    /// Deactivate: cancel the schedule and discard any in-flight results
    pub async fn stop(mut self) {
        self.core.deactivate().await;

        if let Some(driver) = self.driver.take() {
            driver.abort();
            let _ = driver.await;
        }

        info!("Telemetry monitor stopped");
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            self.core.active.store(false, Ordering::SeqCst);
            driver.abort();
        }
    }
}
