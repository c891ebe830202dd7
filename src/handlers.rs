//! HTTP request handlers
//!
//! Read-only REST view of the published telemetry snapshot.

use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::HealthCheck;
use crate::monitor::MonitorCore;
use crate::validation::validate_history_limit;
use crate::websocket::WsSession;

/// Configure all application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(err.to_string()).into()
            }))
            // Health check
            .route("/health", web::get().to(health_check))
            // Snapshot endpoints
            .route("/telemetry", web::get().to(get_snapshot))
            .route("/telemetry/latest", web::get().to(get_latest_reading))
            .route("/telemetry/history", web::get().to(get_history))
            .route("/alerts", web::get().to(get_alerts))
            .route("/quality", web::get().to(get_quality)),
    )
    // WebSocket endpoint
    .route("/ws", web::get().to(websocket_handler));
}

/// Health check endpoint
///
/// GET /api/health
///
/// Returns service uptime together with the upstream connection status.
pub async fn health_check(
    monitor: web::Data<Arc<MonitorCore>>,
) -> Result<HttpResponse, AppError> {
    let snapshot = monitor.snapshot();

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: monitor.uptime_seconds(),
        connection: snapshot.status,
        last_updated: snapshot.last_updated,
    };

    Ok(HttpResponse::Ok().json(health))
}

/// Whole snapshot
///
/// GET /api/telemetry
pub async fn get_snapshot(monitor: web::Data<Arc<MonitorCore>>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(monitor.snapshot().as_ref()))
}

/// Current reading
///
/// GET /api/telemetry/latest
pub async fn get_latest_reading(
    monitor: web::Data<Arc<MonitorCore>>,
) -> Result<HttpResponse, AppError> {
    let snapshot = monitor.snapshot();

    match &snapshot.data {
        Some(reading) => Ok(HttpResponse::Ok().json(reading)),
        None => Err(AppError::NotFound("No telemetry reading received yet".to_string())),
    }
}

/// Query parameters for reading history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Most recent readings, oldest first
///
/// GET /api/telemetry/history?limit=20
pub async fn get_history(
    monitor: web::Data<Arc<MonitorCore>>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let limit = validate_history_limit(query.limit, monitor.history_capacity())?;
    let snapshot = monitor.snapshot();

    let skip = snapshot.history.len().saturating_sub(limit);
    Ok(HttpResponse::Ok().json(&snapshot.history[skip..]))
}

/// GET /api/alerts
pub async fn get_alerts(monitor: web::Data<Arc<MonitorCore>>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(&monitor.snapshot().alerts))
}

/// GET /api/quality
pub async fn get_quality(monitor: web::Data<Arc<MonitorCore>>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(&monitor.snapshot().quality))
}

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    monitor: web::Data<Arc<MonitorCore>>,
) -> Result<HttpResponse, actix_web::Error> {
    let client_id = extract_correlation_id(&req);

    info!(client_id = %client_id, "WebSocket connection request");

    let ws_session = WsSession::new(client_id, monitor.get_ref().clone());

    actix_web_actors::ws::start(ws_session, &req, stream)
}

/// Extract or generate correlation ID from request headers
fn extract_correlation_id(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleOutcome;
    use crate::health::HealthClassifier;
    use crate::models::{Reading, TelemetrySnapshot};
    use actix_web::{test, App};
    use chrono::Utc;

    fn monitor() -> Arc<MonitorCore> {
        MonitorCore::new(HealthClassifier::default(), 50, 100)
    }

    async fn feed(monitor: &MonitorCore, temperatures: &[f64]) {
        for &temperature in temperatures {
            let now = Utc::now();
            let outcome = CycleOutcome::Succeeded {
                reading: Reading::new(temperature, 40.0, 12.0, now, now),
                alerts: None,
            };
            monitor.apply(monitor.begin_cycle(), outcome).await;
        }
    }

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(monitor()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let health: HealthCheck = test::call_and_read_body_json(&app, req).await;

        assert_eq!(health.status, "healthy");
        assert_eq!(health.connection, crate::models::ConnectionStatus::Connecting);
        assert!(health.last_updated.is_none());
    }

    #[actix_web::test]
    async fn test_get_latest_no_data() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(monitor()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/telemetry/latest")
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn test_snapshot_and_history() {
        let monitor = monitor();
        feed(&monitor, &[20.0, 21.0, 22.0, 23.0]).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(monitor))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/telemetry").to_request();
        let snapshot: TelemetrySnapshot = test::call_and_read_body_json(&app, req).await;
        assert_eq!(snapshot.history.len(), 4);
        assert_eq!(snapshot.data.unwrap().temperature, 23.0);

        let req = test::TestRequest::get()
            .uri("/api/telemetry/history?limit=2")
            .to_request();
        let history: Vec<Reading> = test::call_and_read_body_json(&app, req).await;
        let temps: Vec<f64> = history.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![22.0, 23.0]);
    }

    #[actix_web::test]
    async fn test_history_limit_validation() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(monitor()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/telemetry/history?limit=0")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::get()
            .uri("/api/telemetry/history?limit=500")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::get()
            .uri("/api/telemetry/history?limit=lots")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["error_type"], "BAD_REQUEST");
    }

    #[actix_web::test]
    async fn test_quality_endpoint_reports_anomalies() {
        let monitor = monitor();
        feed(&monitor, &[61.0]).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(monitor))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/quality").to_request();
        let quality: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(quality["calibrationStatus"], "OK");
        assert_eq!(quality["anomalies"][0]["type"], "High Temp");
    }
}
