// Request handlers for the chat and completion endpoints

use crate::api::responses::{ApiError, HealthResponse};
use crate::api::AppState;
use crate::core::errors::GatewayError;
use crate::core::models::Provider;
use crate::llm::types::ChatCompletionRequest;
use crate::proxy::pipeline;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

pub const CHAT_ID_HEADER: &str = "x-archestra-chat-id";

/// POST /api/chats
pub async fn create_chat_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let chat = state.chats.create().await?;
    info!(chat_id = %chat.id, "Chat created");
    Ok(Json(json!({"chatId": chat.id})))
}

/// GET /api/chats/:id
pub async fn get_chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_chat_id(&id)?;
    let chat = state
        .chats
        .find_by_id(id)
        .await?
        .ok_or(GatewayError::NotFound("Chat".to_string()))?;
    Ok(Json(serde_json::to_value(chat).map_err(|e| {
        GatewayError::Internal(format!("Serialization failed: {}", e))
    })?))
}

/// GET /api/chats
pub async fn list_chats_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let chats = state.chats.list_all().await?;
    Ok(Json(serde_json::to_value(chats).map_err(|e| {
        GatewayError::Internal(format!("Serialization failed: {}", e))
    })?))
}

/// POST /v1/:provider/chat/completions
///
/// The guarded completion endpoint. Requires the `x-archestra-chat-id`
/// header; the body mirrors the upstream chat-completions schema.
pub async fn chat_completions_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let provider = parse_forward_provider(&provider)?;
    let chat_id = chat_id_from_headers(&headers)?;

    if !state.chats.exists(chat_id).await? {
        return Err(GatewayError::NotFound("Chat".to_string()).into());
    }

    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Malformed request body: {}", e)))?;

    let response = pipeline::handle_completion(&state, provider, chat_id, request).await?;
    Ok(response)
}

/// GET /v1/:provider/models
pub async fn list_models_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    parse_forward_provider(&provider)?;
    let body = state.llm.list_models().await?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {}", e)).into())
}

/// GET /health
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let probe = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        sqlx::query("SELECT 1").execute(&state.pool),
    )
    .await;
    let database = match probe {
        Ok(Ok(_)) => "connected".to_string(),
        Ok(Err(e)) => format!("disconnected: {}", e),
        Err(_) => "disconnected: timeout".to_string(),
    };
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database,
    }))
}

/// GET /openapi.json
///
/// Hand-maintained description of the public surface.
pub async fn openapi_handler() -> impl IntoResponse {
    Json(json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Archestra Gateway",
            "description": "Security-enforcing reverse proxy for OpenAI-compatible chat completions",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/api/chats": {
                "post": {"summary": "Create an empty chat"},
                "get": {"summary": "List all chats with interactions"},
            },
            "/api/chats/{id}": {
                "get": {"summary": "Fetch a chat with its interactions"},
            },
            "/v1/{provider}/chat/completions": {
                "post": {
                    "summary": "Guarded chat completion",
                    "parameters": [{
                        "name": "x-archestra-chat-id",
                        "in": "header",
                        "required": true,
                        "schema": {"type": "string", "format": "uuid"},
                    }],
                },
            },
            "/v1/{provider}/models": {
                "get": {"summary": "Passthrough model list"},
            },
            "/api/agents": {
                "post": {"summary": "Create an agent"},
                "get": {"summary": "List agents"},
            },
            "/api/agents/{id}": {
                "get": {"summary": "Fetch an agent"},
                "put": {"summary": "Rename an agent"},
                "delete": {"summary": "Delete an agent and its tools and policies"},
            },
            "/api/tool-invocation-policies": {
                "post": {"summary": "Create a tool-invocation policy"},
                "get": {"summary": "List tool-invocation policies"},
            },
            "/api/trusted-data-policies": {
                "post": {"summary": "Create a trusted-data policy"},
                "get": {"summary": "List trusted-data policies"},
            },
            "/api/dual-llm-config": {
                "get": {"summary": "Fetch the dual-LLM prompt configuration"},
                "put": {"summary": "Replace the dual-LLM prompt configuration"},
            },
            "/health": {"get": {"summary": "Service health"}},
        },
    }))
}

fn parse_forward_provider(raw: &str) -> Result<Provider, ApiError> {
    match Provider::parse(raw) {
        Some(Provider::OpenAi) => Ok(Provider::OpenAi),
        Some(Provider::Anthropic) => Err(GatewayError::InvalidRequest(
            "Provider 'anthropic' is not supported on the forward path".to_string(),
        )
        .into()),
        None => {
            Err(GatewayError::InvalidRequest(format!("Unknown provider '{}'", raw)).into())
        }
    }
}

fn chat_id_from_headers(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(CHAT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            GatewayError::InvalidRequest(format!("Missing {} header", CHAT_ID_HEADER))
        })?;
    parse_chat_id(raw)
}

fn parse_chat_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| GatewayError::InvalidRequest(format!("Invalid chat id '{}'", raw)).into())
}
