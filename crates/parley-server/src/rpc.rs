use serde::{Deserialize, Serialize};

/// JSON-RPC request envelope.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Response envelope: `{ id, success, result?, error?: { code, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const AUTHENTICATION_ERROR: &str = "AUTHENTICATION_ERROR";
pub const MISSING_SETTINGS: &str = "MISSING_SETTINGS";
pub const STORE_ERROR: &str = "STORE_ERROR";
pub const LAUNCH_ERROR: &str = "LAUNCH_ERROR";

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// camelCase param keys accepted from clients, with their snake_case form.
const CAMEL_TO_SNAKE: &[(&str, &str)] = &[
    ("userId", "user_id"),
    ("conversationId", "conversation_id"),
    ("gitProviderTokens", "git_provider_tokens"),
    ("customSecrets", "custom_secrets"),
    ("selectedRepository", "selected_repository"),
    ("selectedBranch", "selected_branch"),
    ("initialUserMsg", "initial_user_msg"),
    ("imageUrls", "image_urls"),
    ("replayJson", "replay_json"),
    ("conversationInstructions", "conversation_instructions"),
    ("conversationTrigger", "conversation_trigger"),
    ("attachConvoId", "attach_convo_id"),
    ("gitProvider", "git_provider"),
];

/// Normalize camelCase params to snake_case.
/// If the snake_case key already exists, the existing value takes precedence.
pub fn normalize_params(params: &serde_json::Value) -> serde_json::Value {
    let Some(obj) = params.as_object() else {
        return params.clone();
    };
    let mut result = obj.clone();
    for &(camel, snake) in CAMEL_TO_SNAKE {
        if !result.contains_key(snake) {
            if let Some(val) = result.remove(camel) {
                let _ = result.insert(snake.to_string(), val);
            }
        } else {
            let _ = result.remove(camel);
        }
    }
    serde_json::Value::Object(result)
}
