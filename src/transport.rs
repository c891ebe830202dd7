//! Reading transports
//!
//! A [`Transport`] feeds cycle outcomes into a [`MonitorCore`]. Two
//! implementations share the same classifier and buffer:
//!
//! - [`PollTransport`]: the Poll Driver. Fires one cycle immediately, then one
//!   per interval regardless of how long earlier cycles take. Cycles run as
//!   independent tasks, so slow round trips may overlap; the core discards
//!   completions older than the last applied one.
//! - [`PushTransport`]: subscribes to the backend's WebSocket stream and
//!   applies every frame as a cycle. Connection loss sets `OFFLINE` and the
//!   stream is re-dialed after a fixed delay.

use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::cycle::{CycleOutcome, FetchCycle};
use crate::error::MonitorError;
use crate::monitor::MonitorCore;
use crate::payload::decode_push_frame;

pub trait Transport: Send {
    fn name(&self) -> &'static str;

    /// Start delivering outcomes into `core`. Aborting the returned task
    /// cancels the schedule.
    fn spawn(self: Box<Self>, core: Arc<MonitorCore>) -> JoinHandle<()>;
}

pub struct PollTransport {
    cycle: FetchCycle,
    interval: Duration,
}

/// Shortest cadence the poll driver accepts
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

impl PollTransport {
    /// `interval` is clamped to at least 1 ms
    pub fn new(cycle: FetchCycle, interval: Duration) -> Self {
        Self {
            cycle,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }
}

impl Transport for PollTransport {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn spawn(self: Box<Self>, core: Arc<MonitorCore>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_ms = self.interval.as_millis() as u64, "Starting poll driver");

            // First tick completes immediately: the initial fetch on activation
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !core.is_active() {
                    break;
                }

                let sequence = core.begin_cycle();
                let cycle = self.cycle.clone();
                let core = core.clone();

                tokio::spawn(async move {
                    let outcome = cycle.run().await;
                    let result = core.apply(sequence, outcome).await;
                    debug!(sequence, ?result, "Cycle finished");
                });
            }

            info!("Poll driver stopped");
        })
    }
}

pub struct PushTransport {
    url: String,
    reconnect_delay: Duration,
    strict_numeric: bool,
}

impl PushTransport {
    pub fn new(url: String, reconnect_delay: Duration) -> Self {
        Self {
            url,
            reconnect_delay,
            strict_numeric: false,
        }
    }

    pub fn with_strict_numeric(mut self, strict: bool) -> Self {
        self.strict_numeric = strict;
        self
    }

    /// Read frames until the stream ends; returns why it ended
    async fn stream_once(&self, core: &MonitorCore) -> MonitorError {
        let (mut stream, _) = match connect_async(self.url.as_str()).await {
            Ok(connection) => connection,
            Err(e) => return MonitorError::PushChannel(format!("connect failed: {}", e)),
        };
        info!(url = %self.url, "Push stream connected");

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(frame)) => {
                    let outcome = match decode_push_frame(&frame, Utc::now(), self.strict_numeric) {
                        Ok(reading) => CycleOutcome::Succeeded {
                            reading,
                            alerts: None,
                        },
                        Err(e) => {
                            warn!(error = %e, "Rejected push frame");
                            CycleOutcome::Failed(e)
                        }
                    };
                    core.apply(core.begin_cycle(), outcome).await;
                }
                Ok(Message::Close(reason)) => {
                    return MonitorError::PushChannel(format!("closed by server: {:?}", reason));
                }
                Ok(_) => {}
                Err(e) => return MonitorError::PushChannel(e.to_string()),
            }

            if !core.is_active() {
                break;
            }
        }

        MonitorError::PushChannel("stream ended".to_string())
    }
}

impl Transport for PushTransport {
    fn name(&self) -> &'static str {
        "push"
    }

    fn spawn(self: Box<Self>, core: Arc<MonitorCore>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(url = %self.url, "Starting push transport");

            while core.is_active() {
                let reason = self.stream_once(&core).await;
                warn!(
                    error = %reason,
                    retry_ms = self.reconnect_delay.as_millis() as u64,
                    "Push stream unavailable"
                );
                core.apply(core.begin_cycle(), CycleOutcome::Failed(reason)).await;
                sleep(self.reconnect_delay).await;
            }

            info!("Push transport stopped");
        })
    }
}
