// Per-turn orchestration: inbound tool-result scan, upstream forward,
// outbound tool-call gate, interaction persistence.

use crate::api::AppState;
use crate::core::errors::GatewayError;
use crate::core::models::{InvocationDecision, Provider};
use crate::engine::{tool_invocation, trusted_data};
use crate::llm::types::{ChatCompletionRequest, ToolCall};
use crate::proxy::stream;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

const UNKNOWN_TOOL_REASON: &str = "unknown tool for result";

/// Handle one guarded chat-completion request end to end.
pub async fn handle_completion(
    state: &AppState,
    provider: Provider,
    chat_id: Uuid,
    mut request: ChatCompletionRequest,
) -> Result<Response, GatewayError> {
    scan_inbound_tool_results(state, chat_id, &mut request).await?;
    persist_user_message(state, chat_id, &request.messages).await?;

    if request.stream == Some(true) {
        stream::relay(state.clone(), chat_id, request).await
    } else {
        forward_unary(state, chat_id, request).await
    }
}

/// Ingress phase: classify every inbound tool result, persist it with its
/// taint, and rewrite untrusted contents before they reach the upstream LLM.
async fn scan_inbound_tool_results(
    state: &AppState,
    chat_id: Uuid,
    request: &mut ChatCompletionRequest,
) -> Result<(), GatewayError> {
    let tool_names = tool_names_by_call_id(&request.messages);
    // Extraction sees the conversation as the client sent it, regardless of
    // substitutions applied to earlier tool results in this same pass.
    let original_messages = request.messages.clone();

    for index in 0..request.messages.len() {
        if message_role(&request.messages[index]) != Some("tool") {
            continue;
        }
        let original = request.messages[index].clone();
        let tool_call_id = original
            .get("tool_call_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        // Resolve provenance: the assistant turn that emitted this call id.
        let resolved_tool = match tool_call_id.as_deref().and_then(|id| tool_names.get(id)) {
            Some(name) => state.agents.find_tool_by_name(name).await?.map(|t| (name.clone(), t)),
            None => None,
        };

        let Some((tool_name, tool)) = resolved_tool else {
            // Provenance cannot be established: tainted, passed through
            // unsanitised.
            warn!(chat_id = %chat_id, "Tool result with unknown provenance");
            state
                .chats
                .append_interaction(chat_id, &original, true, Some(UNKNOWN_TOOL_REASON))
                .await?;
            continue;
        };

        let policies = state
            .policy_cache
            .trusted_data_policies(tool.agent_id, &tool_name)
            .await?;
        let content = tool_result_value(original.get("content").unwrap_or(&Value::Null));
        let decision = trusted_data::evaluate(&policies, &content);

        state
            .chats
            .append_interaction(
                chat_id,
                &original,
                !decision.is_trusted,
                (!decision.is_trusted).then_some(decision.reason.as_str()),
            )
            .await?;

        if decision.is_trusted {
            continue;
        }

        if decision.is_blocked {
            info!(tool = %tool_name, chat_id = %chat_id, "Tool result blocked by policy");
            request.messages[index]["content"] =
                json!(format!("[Content blocked by policy: {}]", decision.reason));
        } else if decision.should_sanitize_with_dual_llm {
            // tool_call_id is present: provenance was resolved through it.
            let anchor = tool_call_id.as_deref().unwrap_or_default();
            let summary = state
                .sanitizer
                .sanitize(
                    Provider::OpenAi,
                    &original_messages,
                    anchor,
                    tool.agent_id,
                    &request.model,
                )
                .await?;
            info!(tool = %tool_name, chat_id = %chat_id, "Tool result replaced with dual-LLM summary");
            request.messages[index]["content"] = json!(summary);
        }
    }

    Ok(())
}

async fn persist_user_message(
    state: &AppState,
    chat_id: Uuid,
    messages: &[Value],
) -> Result<(), GatewayError> {
    if let Some(user_message) = messages
        .iter()
        .rev()
        .find(|m| message_role(m) == Some("user"))
    {
        state
            .chats
            .append_interaction(chat_id, user_message, false, None)
            .await?;
    }
    Ok(())
}

async fn forward_unary(
    state: &AppState,
    chat_id: Uuid,
    request: ChatCompletionRequest,
) -> Result<Response, GatewayError> {
    let mut upstream_request = request;
    upstream_request.stream = None;

    let completion = state.llm.chat_completion(&upstream_request).await?;

    if let Some(choice) = completion.parsed.choices.first() {
        if let Some(tool_calls) = &choice.message.tool_calls {
            gate_tool_calls(state, tool_calls).await?;
        }
    }

    if let Some(message) = completion.first_message_raw() {
        state
            .chats
            .append_interaction(chat_id, message, false, None)
            .await?;
    }

    // Pass-through: the upstream body is returned verbatim.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(completion.body))
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {}", e)))
}

/// Egress gate: evaluate every proposed function call; the first denial
/// aborts the turn.
pub(crate) async fn gate_tool_calls(
    state: &AppState,
    tool_calls: &[ToolCall],
) -> Result<(), GatewayError> {
    for call in tool_calls {
        if call.kind != "function" {
            continue;
        }
        let arguments: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                // Fail closed on arguments we cannot inspect.
                warn!(tool = %call.function.name, error = %e, "Unparseable tool arguments");
                return Err(GatewayError::ToolInvocationBlocked(
                    "unparseable tool arguments".to_string(),
                ));
            }
        };

        let Some(tool) = state.agents.find_tool_by_name(&call.function.name).await? else {
            // No registered tool means no applicable policies.
            continue;
        };

        let policies = state
            .policy_cache
            .tool_invocation_policies(tool.agent_id, &call.function.name)
            .await?;
        match tool_invocation::evaluate(&policies, &arguments) {
            InvocationDecision::Allowed => {}
            InvocationDecision::Denied { reason } => {
                warn!(tool = %call.function.name, reason = %reason, "Tool invocation blocked");
                return Err(GatewayError::ToolInvocationBlocked(reason));
            }
        }
    }
    Ok(())
}

pub(crate) fn message_role(message: &Value) -> Option<&str> {
    message.get("role").and_then(|v| v.as_str())
}

/// Map provider-issued call ids to tool names by walking the assistant turns.
fn tool_names_by_call_id(messages: &[Value]) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for message in messages {
        if message_role(message) != Some("assistant") {
            continue;
        }
        let Some(tool_calls) = message.get("tool_calls").and_then(|v| v.as_array()) else {
            continue;
        };
        for call in tool_calls {
            let id = call.get("id").and_then(|v| v.as_str());
            let name = call
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str());
            if let (Some(id), Some(name)) = (id, name) {
                names.insert(id.to_string(), name.to_string());
            }
        }
    }
    names
}

/// Tool-result contents arrive as JSON-encoded strings more often than not;
/// decode when possible so attribute paths see the structure.
fn tool_result_value(content: &Value) -> Value {
    match content {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| content.clone()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_names_by_call_id() {
        let messages = vec![
            json!({"role": "user", "content": "go"}),
            json!({"role": "assistant", "tool_calls": [
                {"id": "tc1", "type": "function", "function": {"name": "getEmails", "arguments": "{}"}},
                {"id": "tc2", "type": "function", "function": {"name": "readFile", "arguments": "{}"}},
            ]}),
            json!({"role": "tool", "tool_call_id": "tc1", "content": "{}"}),
        ];
        let names = tool_names_by_call_id(&messages);
        assert_eq!(names.get("tc1").map(String::as_str), Some("getEmails"));
        assert_eq!(names.get("tc2").map(String::as_str), Some("readFile"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_tool_result_value_decodes_embedded_json() {
        assert_eq!(
            tool_result_value(&json!("{\"a\": 1}")),
            json!({"a": 1})
        );
        assert_eq!(tool_result_value(&json!("plain")), json!("plain"));
        assert_eq!(tool_result_value(&json!({"b": 2})), json!({"b": 2}));
    }
}
