//! Upstream collaborators
//!
//! The monitor depends on three collaborators: a Telemetry Source returning
//! the latest reading, an Alerts Source returning recent alerts and a
//! Credential Store supplying an optional bearer token. `HttpBackend` talks to
//! the real backend; the credential stores read a persisted token.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::models::Alert;

pub const LATEST_PATH: &str = "/iot/latest";
pub const ALERTS_PATH: &str = "/alerts";
pub const TOKEN_KEY: &str = "token";

/// Returns the single latest sensor reading as raw JSON
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_latest(&self) -> MonitorResult<Value>;
}

/// Returns a bounded list of recent alerts
#[async_trait]
pub trait AlertsSource: Send + Sync {
    async fn fetch_recent(&self, limit: usize, token: Option<&str>) -> MonitorResult<Vec<Alert>>;
}

/// Synchronous read of the persisted bearer token
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// HTTP client for the sensor backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> MonitorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn check_status(endpoint: &str, response: &reqwest::Response) -> MonitorResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(MonitorError::UpstreamStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpBackend {
    /// `GET <base>/iot/latest`, unauthenticated
    async fn fetch_latest(&self) -> MonitorResult<Value> {
        let response = self.client.get(self.url(LATEST_PATH)).send().await?;
        check_status(LATEST_PATH, &response)?;

        response
            .json::<Value>()
            .await
            .map_err(|e| MonitorError::MalformedPayload(format!("latest reading body: {}", e)))
    }
}

#[async_trait]
impl AlertsSource for HttpBackend {
    /// `GET <base>/alerts?limit=N`, with `Authorization: Bearer` when a token exists
    async fn fetch_recent(&self, limit: usize, token: Option<&str>) -> MonitorResult<Vec<Alert>> {
        let mut request = self
            .client
            .get(self.url(ALERTS_PATH))
            .query(&[("limit", limit)]);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        check_status(ALERTS_PATH, &response)?;

        response
            .json::<Vec<Alert>>()
            .await
            .map_err(|e| MonitorError::MalformedPayload(format!("alerts body: {}", e)))
    }
}

/// Token persisted in a JSON key/value file under the `token` key.
///
/// The file is re-read on every cycle, so a token written by another process
/// is picked up without a restart. A missing file or key means "no token".
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No credential file");
                return None;
            }
        };

        let entries: Value = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable credential file");
                return None;
            }
        };

        entries
            .get(TOKEN_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}

/// Fixed token, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<String>);

impl CredentialStore for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpRequest, HttpResponse};
    use serde_json::json;
    use std::collections::HashMap;

    async fn latest(req: HttpRequest) -> HttpResponse {
        // The telemetry request is never authenticated
        if req.headers().contains_key("Authorization") {
            return HttpResponse::BadRequest().finish();
        }
        HttpResponse::Ok().json(json!({
            "temperature": 22.0,
            "humidity": 48.0,
            "air_quality": 15,
            "timestamp": "2026-10-19T10:00:00Z"
        }))
    }

    async fn alerts(req: HttpRequest, query: web::Query<HashMap<String, String>>) -> HttpResponse {
        let auth = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none")
            .to_string();
        HttpResponse::Ok().json(json!([
            {"type": "auth", "message": auth, "time": "now"},
            {"type": "limit", "message": query.get("limit").cloned().unwrap_or_default(), "time": "now"}
        ]))
    }

    async fn unavailable() -> HttpResponse {
        HttpResponse::ServiceUnavailable().finish()
    }

    fn backend(srv: &actix_test::TestServer) -> HttpBackend {
        HttpBackend::new(&format!("http://{}/", srv.addr()), Duration::from_secs(5)).unwrap()
    }

    #[actix_web::test]
    async fn test_fetch_latest_without_auth() {
        let srv = actix_test::start(|| App::new().route(LATEST_PATH, web::get().to(latest)));

        let payload = backend(&srv).fetch_latest().await.unwrap();
        assert_eq!(payload["temperature"], 22.0);
    }

    #[actix_web::test]
    async fn test_fetch_alerts_attaches_bearer_token_and_limit() {
        let srv = actix_test::start(|| App::new().route(ALERTS_PATH, web::get().to(alerts)));
        let backend = backend(&srv);

        let with_token = backend.fetch_recent(5, Some("abc123")).await.unwrap();
        assert_eq!(with_token[0].message(), Some("Bearer abc123"));
        assert_eq!(with_token[1].message(), Some("5"));

        let anonymous = backend.fetch_recent(5, None).await.unwrap();
        assert_eq!(anonymous[0].message(), Some("none"));
    }

    #[actix_web::test]
    async fn test_non_success_status_is_error() {
        let srv = actix_test::start(|| {
            App::new()
                .route(LATEST_PATH, web::get().to(unavailable))
                .route(ALERTS_PATH, web::get().to(unavailable))
        });
        let backend = backend(&srv);

        let err = backend.fetch_latest().await.unwrap_err();
        assert!(matches!(err, MonitorError::UpstreamStatus { status: 503, .. }));

        let err = backend.fetch_recent(5, None).await.unwrap_err();
        assert!(matches!(err, MonitorError::UpstreamStatus { status: 503, .. }));
    }

    #[test]
    fn test_file_credential_store() {
        let path = std::env::temp_dir().join(format!("creds-{}.json", uuid::Uuid::new_v4()));
        let store = FileCredentialStore::new(&path);

        assert_eq!(store.token(), None);

        std::fs::write(&path, r#"{"token": "secret", "user": "ops"}"#).unwrap();
        assert_eq!(store.token(), Some("secret".to_string()));

        std::fs::write(&path, r#"{"token": "  "}"#).unwrap();
        assert_eq!(store.token(), None);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(store.token(), None);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_static_credentials() {
        assert_eq!(StaticCredentials::default().token(), None);
        assert_eq!(
            StaticCredentials(Some("t".into())).token(),
            Some("t".to_string())
        );
    }
}
