//! Telemetry Monitor
//!
//! Watches a remote sensor backend and serves the live snapshot over
//! HTTP and WebSocket.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use telemetry_monitor::handlers;
use telemetry_monitor::{Settings, TelemetryMonitor};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,telemetry_monitor=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        upstream = %settings.upstream.api_base_url,
        device_id = %settings.upstream.device_id,
        transport = ?settings.upstream.transport,
        source = ?settings.upstream.source,
        "Starting telemetry monitor"
    );
    info!("Binding server to {}", bind_address);

    let monitor = TelemetryMonitor::from_settings(&settings)
        .context("Failed to build telemetry monitor")?;
    let handle = monitor.start();
    let core = handle.core();

    // ---------------------------------------------------------------------
    // HTTP + WebSocket server
    // ---------------------------------------------------------------------
    let served = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(core.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await;

    handle.stop().await;

    served.context("HTTP server error")
}
