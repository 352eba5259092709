//! RPC method handlers.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use parley_core::{ConversationId, Settings, UserId};
use parley_store::Database;

use crate::error::ConversationError;
use crate::rpc::{self, normalize_params, RpcResponse};
use crate::service::{ConversationService, CreateConversationRequest};

const DEFAULT_LIST_LIMIT: u32 = 20;

#[derive(Deserialize)]
struct StatusParams {
    conversation_id: ConversationId,
}

#[derive(Deserialize)]
struct ListParams {
    user_id: UserId,
    #[serde(default = "default_list_limit")]
    limit: u32,
}

fn default_list_limit() -> u32 {
    DEFAULT_LIST_LIMIT
}

#[derive(Deserialize)]
struct SaveSettingsParams {
    user_id: UserId,
    settings: Settings,
}

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub service: Arc<ConversationService>,
    /// Checked by the health endpoint when the service runs on SQLite.
    pub db: Option<Database>,
}

impl HandlerState {
    pub fn new(service: Arc<ConversationService>) -> Self {
        Self { service, db: None }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }
}

/// Dispatch an RPC method to the appropriate handler.
///
/// Normalizes camelCase params to snake_case before routing.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params = normalize_params(params);

    match method {
        "conversation.create" => conversation_create(state, params, id).await,
        "conversation.status" => conversation_status(state, params, id).await,
        "conversation.list" => conversation_list(state, params, id).await,
        "settings.save" => settings_save(state, params, id).await,
        "system.ping" | "health" => health(state, id).await,
        _ => RpcResponse::method_not_found(id, method),
    }
}

async fn conversation_create(
    state: &Arc<HandlerState>,
    params: serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let request: CreateConversationRequest = match serde_json::from_value(params) {
        Ok(request) => request,
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid parameters: {e}")),
    };

    let result = state.service.create_conversation(request).await;
    respond("conversation.create", id, result)
}

async fn conversation_status(
    state: &Arc<HandlerState>,
    params: serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params: StatusParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid parameters: {e}")),
    };

    match state
        .service
        .conversation_status(&params.conversation_id)
        .await
        .transpose()
    {
        Some(result) => respond("conversation.status", id, result),
        None => RpcResponse::error(
            id,
            rpc::NOT_FOUND,
            format!("Conversation not found: {}", params.conversation_id),
        ),
    }
}

async fn conversation_list(
    state: &Arc<HandlerState>,
    params: serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params: ListParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid parameters: {e}")),
    };

    let result = state
        .service
        .list_conversations(&params.user_id, params.limit)
        .await
        .map(|conversations| serde_json::json!({ "conversations": conversations }));
    respond("conversation.list", id, result)
}

async fn settings_save(
    state: &Arc<HandlerState>,
    params: serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params: SaveSettingsParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid parameters: {e}")),
    };

    let result = state
        .service
        .save_settings(&params.user_id, params.settings)
        .await
        .map(|()| serde_json::json!({ "saved": true }));
    respond("settings.save", id, result)
}

fn respond<T: serde::Serialize>(
    method: &str,
    id: Option<serde_json::Value>,
    result: Result<T, ConversationError>,
) -> RpcResponse {
    match result {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => RpcResponse::internal_error(id, e.to_string()),
        },
        Err(e) => {
            warn!(method, kind = e.error_kind(), error = %e, "rpc call failed");
            RpcResponse::error(id, e.rpc_code(), e.to_string())
        }
    }
}

async fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let db_path = state.db.as_ref().map(|db| db.path().display().to_string());
    let db_ok = match state.db.clone() {
        Some(db) => tokio::task::spawn_blocking(move || {
            db.with_conn(|conn| {
                conn.execute_batch("SELECT 1")?;
                Ok(())
            })
            .is_ok()
        })
        .await
        .unwrap_or(false),
        None => true,
    };

    RpcResponse::success(
        id,
        serde_json::json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "components": {
                "database": if db_ok { "ok" } else { "error" },
            },
            "database_path": db_path,
        }),
    )
}
