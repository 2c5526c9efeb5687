use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::handlers::{self, HandlerState};
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            allowed_origins: vec!["*".into()],
            request_timeout_secs: 30,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.trim().parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins))
}

/// Bind and start serving. Returns a handle that keeps the server task alive.
pub async fn start(
    config: ServerConfig,
    handler_state: Arc<HandlerState>,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState { handler_state }, &config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "Quill server started");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server: server_handle,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn shutdown(self) {
        self.server.abort();
    }
}

/// `POST /rpc`: one request, one response.
async fn rpc_handler(State(state): State<AppState>, body: String) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => return Json(RpcResponse::parse_error()),
    };

    let params = request.params.unwrap_or(serde_json::json!({}));
    let span = tracing::debug_span!("rpc", method = %request.method);
    let response = handlers::dispatch(&state.handler_state, &request.method, &params, request.id)
        .instrument(span)
        .await;
    Json(response)
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp =
        handlers::dispatch(&state.handler_state, "health", &serde_json::json!({}), None).await;

    let status = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let http_status = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(resp.result.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Roster, Student};
    use quill_engine::{EngineConfig, ExerciseEngine};
    use quill_store::{Database, InMemoryChatLog, InMemorySessionStore, StaticRoster};

    fn handler_state() -> Arc<HandlerState> {
        let engine = ExerciseEngine::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryChatLog::new()),
            Arc::new(StaticRoster::new(Roster {
                students: vec![Student::new("A1", "Alice")],
                pairings: vec![],
            })),
            EngineConfig::default(),
        );
        let db = Database::in_memory().unwrap();
        Arc::new(HandlerState::new(Arc::new(engine)).with_database(db))
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_serves_health_and_rpc() {
        let handle = start(test_config(), handler_state()).await.unwrap();
        assert!(handle.port > 0);

        let base = format!("http://127.0.0.1:{}", handle.port);
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .post(format!("{base}/rpc"))
            .json(&serde_json::json!({
                "method": "session.start",
                "params": {"group": "B", "studentId": "A1", "studentName": "Alice"},
                "id": 7,
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["id"], 7);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["session"]["group"], "B");

        let body: serde_json::Value = client
            .post(format!("{base}/rpc"))
            .body("{not json")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["error"]["code"], "PARSE_ERROR");

        handle.shutdown();
    }

    #[test]
    fn build_router_with_restricted_origins() {
        let config = ServerConfig {
            allowed_origins: vec!["http://localhost:3000".into(), "bad\norigin".into()],
            ..test_config()
        };
        let _router = build_router(
            AppState {
                handler_state: handler_state(),
            },
            &config,
        );
    }
}
