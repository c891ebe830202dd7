//! WebSocket module for real-time snapshot streaming
//!
//! Sends every newly published snapshot to connected clients.

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::models::WsMessage;
use crate::monitor::MonitorCore;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the session checks for a new snapshot revision
const SNAPSHOT_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// WebSocket session actor
pub struct WsSession {
    client_id: String,
    last_heartbeat: Instant,
    monitor: Arc<MonitorCore>,
    last_revision: Option<u64>,
}

impl WsSession {
    pub fn new(client_id: String, monitor: Arc<MonitorCore>) -> Self {
        Self {
            client_id,
            last_heartbeat: Instant::now(),
            monitor,
            last_revision: None,
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    client_id = %act.client_id,
                    "WebSocket heartbeat timeout"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn start_snapshot_stream(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(SNAPSHOT_CHECK_INTERVAL, |act, ctx| {
            act.push_if_changed(ctx);
        });
    }

    fn push_if_changed(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let snapshot = self.monitor.snapshot();

        if self.last_revision == Some(snapshot.revision) {
            return;
        }
        self.last_revision = Some(snapshot.revision);

        let msg = WsMessage::SnapshotUpdate(snapshot.as_ref().clone());
        if let Ok(json) = serde_json::to_string(&msg) {
            ctx.text(json);
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(client_id = %self.client_id, "WebSocket connected");

        self.start_heartbeat(ctx);

        let msg = WsMessage::Connected {
            client_id: self.client_id.clone(),
        };

        if let Ok(json) = serde_json::to_string(&msg) {
            ctx.text(json);
        }

        // Current state first, then changes
        self.push_if_changed(ctx);
        self.start_snapshot_stream(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        info!(client_id = %self.client_id, "WebSocket disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                debug!(client_id = %self.client_id, message = %text);

                match serde_json::from_str::<WsMessage>(&text) {
                    Ok(WsMessage::Ping) => {
                        self.last_heartbeat = Instant::now();
                        if let Ok(json) = serde_json::to_string(&WsMessage::Pong) {
                            ctx.text(json);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(client_id = %self.client_id, error = %e);
                        let err = WsMessage::Error {
                            message: "Invalid message format".into(),
                        };
                        if let Ok(json) = serde_json::to_string(&err) {
                            ctx.text(json);
                        }
                    }
                }
            }
            Ok(ws::Message::Close(reason)) => {
                info!(client_id = %self.client_id, reason = ?reason);
                ctx.stop();
            }
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleOutcome;
    use crate::handlers::configure_routes;
    use crate::health::HealthClassifier;
    use crate::models::Reading;
    use actix_web::{web, App};
    use chrono::Utc;
    use futures::{SinkExt, StreamExt};

    fn text_of(frame: ws::Frame) -> WsMessage {
        match frame {
            ws::Frame::Text(bytes) => serde_json::from_slice(&bytes).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_session_streams_snapshots() {
        let monitor = MonitorCore::new(HealthClassifier::default(), 50, 100);
        let app_monitor = monitor.clone();
        let mut srv = actix_test::start(move || {
            App::new()
                .app_data(web::Data::new(app_monitor.clone()))
                .configure(configure_routes)
        });

        let mut framed = srv.ws_at("/ws").await.unwrap();

        let connected = text_of(framed.next().await.unwrap().unwrap());
        assert!(matches!(connected, WsMessage::Connected { .. }));

        let initial = text_of(framed.next().await.unwrap().unwrap());
        match initial {
            WsMessage::SnapshotUpdate(snapshot) => assert_eq!(snapshot.revision, 0),
            other => panic!("unexpected message: {:?}", other),
        }

        let now = Utc::now();
        let outcome = CycleOutcome::Succeeded {
            reading: Reading::new(24.0, 40.0, 10.0, now, now),
            alerts: None,
        };
        monitor.apply(monitor.begin_cycle(), outcome).await;

        let update = text_of(framed.next().await.unwrap().unwrap());
        match update {
            WsMessage::SnapshotUpdate(snapshot) => {
                assert_eq!(snapshot.revision, 1);
                assert_eq!(snapshot.data.unwrap().temperature, 24.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        framed
            .send(ws::Message::Close(None))
            .await
            .unwrap();
    }
}
