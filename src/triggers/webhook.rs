/// HTTP webhook trigger
///
/// Each webhook trigger owns its listener: starting binds an axum server exposing the
/// configured (method, path) route plus `GET /health`, stopping shuts it down
/// gracefully. Requests are authenticated, snapshotted and fanned out to subscribers
/// either after (`afterDispatch`) or before (`onReceived`) the response is sent.

use crate::error::TriggerError;
use crate::triggers::base::{TriggerBehavior, TriggerHandle};
use crate::triggers::types::{TriggerConfig, TriggerTestResult};
use crate::triggers::TriggerKind;
use anyhow::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, on, MethodFilter},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

const HEALTH_PATH: &str = "/health";
const ALLOWED_METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// How incoming requests are authenticated
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookAuth {
    #[default]
    None,
    /// `Authorization: Basic base64(username:password)`
    Basic { username: String, password: String },
    /// Exact match on a request header
    Header { name: String, value: String },
    /// Exact match on a query parameter
    Query { name: String, value: String },
}

impl WebhookAuth {
    pub fn mode(&self) -> &'static str {
        match self {
            WebhookAuth::None => "none",
            WebhookAuth::Basic { .. } => "basic",
            WebhookAuth::Header { .. } => "header",
            WebhookAuth::Query { .. } => "query",
        }
    }

    fn authenticate(&self, headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
        match self {
            WebhookAuth::None => true,
            WebhookAuth::Basic { username, password } => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Basic "))
                .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
                .and_then(|decoded| String::from_utf8(decoded).ok())
                .map(|credentials| credentials == format!("{}:{}", username, password))
                .unwrap_or(false),
            WebhookAuth::Header { name, value } => headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(|v| v == value)
                .unwrap_or(false),
            WebhookAuth::Query { name, value } => query.get(name).map(|v| v == value).unwrap_or(false),
        }
    }
}

/// When the canned response is sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseMode {
    /// Respond first, dispatch in the background
    #[default]
    OnReceived,
    /// Respond once every subscriber dispatch has settled
    AfterDispatch,
}

/// Kind-specific parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSettings {
    pub path: String,
    #[serde(default = "default_method")]
    pub http_method: String,
    #[serde(default)]
    pub authentication: WebhookAuth,
    #[serde(default)]
    pub response_mode: ResponseMode,
    #[serde(default = "default_response_code")]
    pub response_code: u16,
    /// Sent as JSON when it is (or parses as) structured data, else as text
    #[serde(default)]
    pub response_body: Option<Value>,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 binds an ephemeral port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_response_code() -> u16 {
    200
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5678
}

impl WebhookSettings {
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        let mut settings: Self = serde_json::from_value(config.parameters.clone())
            .map_err(|e| TriggerError::config("parameters", e.to_string()))?;
        settings.http_method = settings.http_method.to_uppercase();
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), TriggerError> {
        if !self.path.starts_with('/') {
            return Err(TriggerError::config("path", "must start with '/'"));
        }
        if self.path == HEALTH_PATH {
            return Err(TriggerError::config("path", "'/health' is reserved"));
        }
        if self.path.chars().any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '*')) {
            return Err(TriggerError::config("path", "must be a literal path"));
        }
        // axum refuses `:` segments when the route is registered
        if self.path.split('/').any(|segment| segment.starts_with(':')) {
            return Err(TriggerError::config("path", "segments must not start with ':'"));
        }
        if !ALLOWED_METHODS.contains(&self.http_method.as_str()) {
            return Err(TriggerError::config(
                "httpMethod",
                format!("unsupported method '{}'", self.http_method),
            ));
        }
        if StatusCode::from_u16(self.response_code).is_err() {
            return Err(TriggerError::config(
                "responseCode",
                format!("invalid status code {}", self.response_code),
            ));
        }
        for (name, value) in &self.response_headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
                return Err(TriggerError::config("responseHeaders", format!("invalid header '{}'", name)));
            }
        }
        match &self.authentication {
            WebhookAuth::Basic { username, .. } if username.is_empty() => {
                Err(TriggerError::config("authentication", "basic auth needs a username"))
            }
            WebhookAuth::Header { name, .. } if HeaderName::from_bytes(name.as_bytes()).is_err() => Err(
                TriggerError::config("authentication", format!("invalid header name '{}'", name)),
            ),
            WebhookAuth::Query { name, .. } if name.is_empty() => {
                Err(TriggerError::config("authentication", "query auth needs a parameter name"))
            }
            _ => Ok(()),
        }
    }

    fn method_filter(&self) -> Result<MethodFilter> {
        let method = Method::from_bytes(self.http_method.as_bytes())
            .map_err(|e| TriggerError::config("httpMethod", e.to_string()))?;
        let filter = MethodFilter::try_from(method)
            .map_err(|e| TriggerError::config("httpMethod", e.to_string()))?;
        Ok(filter)
    }

    /// The configured response
    fn canned_response(&self) -> Response {
        let mut response = match &self.response_body {
            None => Json(json!({ "message": "Workflow was started" })).into_response(),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(structured) => Json(structured).into_response(),
                Err(_) => text.clone().into_response(),
            },
            Some(structured) => Json(structured.clone()).into_response(),
        };

        *response.status_mut() = StatusCode::from_u16(self.response_code).unwrap_or(StatusCode::OK);
        for (name, value) in &self.response_headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

/// Handler state shared by the routes of one listener
#[derive(Clone)]
struct WebhookState {
    handle: TriggerHandle,
    settings: Arc<WebhookSettings>,
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// HTTP event trigger behavior
pub struct WebhookTrigger {
    server: Mutex<Option<RunningServer>>,
    bound: ArcSwapOption<SocketAddr>,
}

impl Default for WebhookTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookTrigger {
    pub fn new() -> Self {
        Self {
            server: Mutex::new(None),
            bound: ArcSwapOption::empty(),
        }
    }
}

#[async_trait]
impl TriggerBehavior for WebhookTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Webhook
    }

    fn validate(&self, config: &TriggerConfig) -> Result<()> {
        WebhookSettings::from_config(config).map(|_| ())
    }

    async fn on_start(&self, config: &TriggerConfig, handle: TriggerHandle) -> Result<()> {
        let settings = Arc::new(WebhookSettings::from_config(config)?);
        let filter = settings.method_filter()?;
        let trigger_id = handle.trigger_id().to_string();

        let addr = format!("{}:{}", settings.host, settings.port);
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| TriggerError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        let app = Router::new()
            .route(&settings.path, on(filter, handle_webhook))
            .route(HEALTH_PATH, get(health_check))
            .layer(CorsLayer::permissive())
            .with_state(WebhookState {
                handle,
                settings: Arc::clone(&settings),
            });

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let server_trigger_id = trigger_id.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(trigger_id = %server_trigger_id, "❌ Webhook server error: {}", e);
            }
        });

        self.bound.store(Some(Arc::new(local_addr)));
        *self.server.lock().await = Some(RunningServer { shutdown, task });

        tracing::info!(
            trigger_id = %trigger_id,
            "🌐 Webhook listening: {} http://{}{} (auth: {})",
            settings.http_method,
            local_addr,
            settings.path,
            settings.authentication.mode()
        );
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        self.bound.store(None);

        if let Some(server) = self.server.lock().await.take() {
            let _ = server.shutdown.send(());
            server.task.await?;
        }
        Ok(())
    }

    async fn on_test(&self, config: &TriggerConfig) -> Result<TriggerTestResult> {
        let settings = WebhookSettings::from_config(config)?;
        let sample = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "method": settings.http_method,
            "path": settings.path,
            "headers": {},
            "query": {},
            "body": { "test": true },
            "timestamp": Utc::now().to_rfc3339(),
            "remoteAddress": "127.0.0.1",
            "userAgent": null,
        });

        Ok(TriggerTestResult::ok(
            format!(
                "Webhook would accept {} {} on {}:{} (auth: {})",
                settings.http_method,
                settings.path,
                settings.host,
                settings.port,
                settings.authentication.mode()
            ),
            sample,
        ))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.load_full().map(|addr| *addr)
    }
}

/// Configured webhook route
async fn handle_webhook(
    State(state): State<WebhookState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let trigger_id = state.handle.trigger_id().to_string();
    tracing::info!(trigger_id = %trigger_id, request_id = %request_id, "📥 Webhook request: {} {}", method, uri.path());

    let mut response = if !state.handle.is_accepting().await {
        tracing::warn!(trigger_id = %trigger_id, "⏸️ Webhook is not accepting requests");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Webhook is not accepting requests" })),
        )
            .into_response()
    } else if !state.settings.authentication.authenticate(&headers, &query) {
        tracing::warn!(trigger_id = %trigger_id, request_id = %request_id, "🔒 Webhook authentication failed");
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
    } else {
        let snapshot = request_snapshot(&request_id, &method, &uri, &query, &headers, &body, remote);
        dispatch(&state, snapshot).await
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Fan out per response mode and produce the response
async fn dispatch(state: &WebhookState, snapshot: Value) -> Response {
    let handle = state.handle.clone();

    match state.settings.response_mode {
        ResponseMode::OnReceived => {
            tokio::spawn(async move {
                handle.fire(snapshot).await;
            });
            state.settings.canned_response()
        }
        ResponseMode::AfterDispatch => match tokio::spawn(async move { handle.fire(snapshot).await }).await {
            Ok(report) => {
                tracing::debug!(
                    trigger_id = %state.handle.trigger_id(),
                    "📤 Dispatch settled: {}/{} subscriber(s) succeeded",
                    report.succeeded,
                    report.dispatched
                );
                state.settings.canned_response()
            }
            Err(e) => {
                tracing::error!(trigger_id = %state.handle.trigger_id(), "❌ Webhook processing failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Webhook processing failed" })),
                )
                    .into_response()
            }
        },
    }
}

/// Everything subscribers get to see about one request
fn request_snapshot(
    request_id: &str,
    method: &Method,
    uri: &Uri,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &Bytes,
    remote: SocketAddr,
) -> Value {
    // Repeated headers are joined with ", "
    let header_map: Map<String, Value> = headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), Value::String(joined))
        })
        .collect();

    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    };

    json!({
        "id": request_id,
        "method": method.as_str(),
        "path": uri.path(),
        "headers": header_map,
        "query": query,
        "body": body,
        "timestamp": Utc::now().to_rfc3339(),
        "remoteAddress": remote.ip().to_string(),
        "userAgent": headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()),
    })
}

/// `GET /health`
async fn health_check(State(state): State<WebhookState>) -> Json<Value> {
    let status = if state.handle.is_accepting().await { "ok" } else { "unavailable" };
    Json(json!({
        "status": status,
        "webhook": {
            "path": state.settings.path,
            "method": state.settings.http_method,
            "authentication": state.settings.authentication.mode(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(parameters: Value) -> Result<WebhookSettings> {
        WebhookSettings::from_config(&TriggerConfig::new("hook", parameters))
    }

    #[test]
    fn test_settings_validation() {
        assert!(settings(json!({ "path": "/orders" })).is_ok());
        assert!(settings(json!({ "path": "orders" })).is_err());
        assert!(settings(json!({ "path": "/health" })).is_err());
        assert!(settings(json!({ "path": "/orders", "httpMethod": "TRACE" })).is_err());
        assert!(settings(json!({ "path": "/orders", "responseCode": 42 })).is_err());
        assert!(settings(json!({ "path": "/a/{id}" })).is_err());
        assert!(settings(json!({ "path": "/a/b:c" })).is_ok());

        let err = settings(json!({ "path": "/a/:b" })).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TriggerError>(),
            Some(TriggerError::InvalidConfig { field, .. }) if field == "path"
        ));

        let parsed = settings(json!({
            "path": "/orders",
            "httpMethod": "put",
            "authentication": { "type": "header", "name": "X-Token", "value": "secret" },
            "responseMode": "afterDispatch"
        }))
        .unwrap();
        assert_eq!(parsed.http_method, "PUT");
        assert_eq!(parsed.authentication.mode(), "header");
        assert_eq!(parsed.response_mode, ResponseMode::AfterDispatch);
    }

    #[test]
    fn test_authentication_modes() {
        let no_query = HashMap::new();

        let mut headers = HeaderMap::new();
        headers.insert("x-token", HeaderValue::from_static("secret"));
        let header_auth = WebhookAuth::Header {
            name: "X-Token".to_string(),
            value: "secret".to_string(),
        };
        assert!(header_auth.authenticate(&headers, &no_query));
        assert!(!header_auth.authenticate(&HeaderMap::new(), &no_query));

        let basic = WebhookAuth::Basic {
            username: "ada".to_string(),
            password: "lovelace".to_string(),
        };
        let mut basic_headers = HeaderMap::new();
        let encoded = format!("Basic {}", STANDARD.encode("ada:lovelace"));
        basic_headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&encoded).unwrap());
        assert!(basic.authenticate(&basic_headers, &no_query));

        let query_auth = WebhookAuth::Query {
            name: "key".to_string(),
            value: "k1".to_string(),
        };
        let query = HashMap::from([("key".to_string(), "k1".to_string())]);
        assert!(query_auth.authenticate(&HeaderMap::new(), &query));
        assert!(!query_auth.authenticate(&HeaderMap::new(), &no_query));

        assert!(WebhookAuth::None.authenticate(&HeaderMap::new(), &no_query));
    }

    #[test]
    fn test_snapshot_keeps_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("red"));
        headers.append("x-tag", HeaderValue::from_static("blue"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let query = HashMap::from([("page".to_string(), "2".to_string())]);
        let uri: Uri = "/orders?page=2".parse().unwrap();
        let remote: SocketAddr = "10.0.0.7:41000".parse().unwrap();

        let snapshot = request_snapshot(
            "req-1",
            &Method::POST,
            &uri,
            &query,
            &headers,
            &Bytes::from_static(b"{\"n\":1}"),
            remote,
        );

        assert_eq!(snapshot["headers"]["x-tag"], "red, blue");
        assert_eq!(snapshot["userAgent"], "curl/8.0");
        assert_eq!(snapshot["path"], "/orders");
        assert_eq!(snapshot["query"]["page"], "2");
        assert_eq!(snapshot["body"], json!({ "n": 1 }));
        assert_eq!(snapshot["remoteAddress"], "10.0.0.7");
    }

    #[test]
    fn test_canned_response_body_forms() {
        let structured = settings(json!({ "path": "/a", "responseBody": "{\"ok\":true}", "responseCode": 202 })).unwrap();
        let response = structured.canned_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let raw = settings(json!({ "path": "/a", "responseBody": "thanks" })).unwrap();
        let response = raw.canned_response();
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
