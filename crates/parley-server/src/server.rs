use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, HandlerState};
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve. Returns a handle to shut the server down.
pub async fn start(
    config: ServerConfig,
    handler_state: Arc<HandlerState>,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState { handler_state });
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "Parley server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task did not shut down cleanly");
        }
    }
}

/// JSON-RPC over HTTP. Malformed bodies get a parse error rather than a 4xx.
async fn rpc_handler(State(state): State<AppState>, body: String) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => return Json(RpcResponse::parse_error()),
    };

    let params = request.params.unwrap_or(serde_json::json!({}));
    Json(handlers::dispatch(&state.handler_state, &request.method, &params, request.id).await)
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = handlers::dispatch(&state.handler_state, "health", &serde_json::json!({}), None).await;

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
    use parley_engine::{LocalEngine, NoopAssigner};
    use parley_store::InMemoryStore;
    use tokio::sync::broadcast;

    use crate::config::AnonymousDefaults;
    use crate::service::ConversationService;

    fn handler_state() -> Arc<HandlerState> {
        let store = Arc::new(InMemoryStore::new());
        let (tx, _rx) = broadcast::channel(64);
        let service = ConversationService::new(
            store.clone(),
            store,
            Arc::new(NoopAssigner),
            Arc::new(LocalEngine::new(tx)),
            AnonymousDefaults::default(),
        );
        Arc::new(HandlerState::new(Arc::new(service)))
    }

    async fn start_test_server() -> ServerHandle {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        start(config, handler_state()).await.unwrap()
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start_test_server().await;
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rpc_creates_conversation() {
        let handle = start_test_server().await;
        let url = format!("http://127.0.0.1:{}/rpc", handle.port);

        let body: serde_json::Value = reqwest::Client::new()
            .post(&url)
            .json(&serde_json::json!({
                "method": "conversation.create",
                "params": {"initialUserMsg": "hello"},
                "id": "req-1",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["id"], "req-1");
        assert_eq!(body["result"]["conversation_id"].as_str().unwrap().len(), 32);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rpc_malformed_body_is_parse_error() {
        let handle = start_test_server().await;
        let url = format!("http://127.0.0.1:{}/rpc", handle.port);

        let body: serde_json::Value = reqwest::Client::new()
            .post(&url)
            .body("{not json")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "PARSE_ERROR");

        handle.shutdown().await;
    }

    #[test]
    fn build_router_creates_routes() {
        let _router = build_router(AppState {
            handler_state: handler_state(),
        });
    }
}
