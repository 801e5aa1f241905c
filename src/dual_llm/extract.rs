// Extraction of (original user request, tool result) from the two supported
// message shapes.

use crate::core::errors::GatewayError;
use crate::core::models::Provider;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Extraction {
    pub original_user_request: String,
    pub tool_result: Value,
}

pub fn extract(
    provider: Provider,
    messages: &[Value],
    anchor: &str,
) -> Result<Extraction, GatewayError> {
    match provider {
        Provider::OpenAi => extract_openai(messages, anchor),
        Provider::Anthropic => extract_anthropic(messages, anchor),
    }
}

/// OpenAI shape: user request is the last `role=user` message's content; the
/// tool result is the `role=tool` message whose `tool_call_id` is `anchor`.
fn extract_openai(messages: &[Value], anchor: &str) -> Result<Extraction, GatewayError> {
    let original_user_request = messages
        .iter()
        .rev()
        .find(|m| role(m) == Some("user"))
        .map(|m| content_to_text(m.get("content").unwrap_or(&Value::Null)))
        .unwrap_or_default();

    let tool_message = messages
        .iter()
        .find(|m| {
            role(m) == Some("tool")
                && m.get("tool_call_id").and_then(|v| v.as_str()) == Some(anchor)
        })
        .ok_or_else(|| {
            GatewayError::Internal(format!(
                "No tool message with tool_call_id {} to sanitise",
                anchor
            ))
        })?;

    Ok(Extraction {
        original_user_request,
        tool_result: parse_result_content(tool_message.get("content").unwrap_or(&Value::Null)),
    })
}

/// Anthropic shape: user request is the last `role=user` message carrying a
/// text block that is not a tool result; the tool result is the
/// `tool_result` block whose `tool_use_id` is `anchor`.
fn extract_anthropic(messages: &[Value], anchor: &str) -> Result<Extraction, GatewayError> {
    let original_user_request = messages
        .iter()
        .rev()
        .filter(|m| role(m) == Some("user"))
        .find_map(|m| {
            let text = anthropic_text(m.get("content").unwrap_or(&Value::Null));
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        })
        .unwrap_or_default();

    let block = messages
        .iter()
        .filter_map(|m| m.get("content")?.as_array())
        .flatten()
        .find(|block| {
            block.get("type").and_then(|v| v.as_str()) == Some("tool_result")
                && block.get("tool_use_id").and_then(|v| v.as_str()) == Some(anchor)
        })
        .ok_or_else(|| {
            GatewayError::Internal(format!(
                "No tool_result block with tool_use_id {} to sanitise",
                anchor
            ))
        })?;

    Ok(Extraction {
        original_user_request,
        tool_result: parse_result_content(block.get("content").unwrap_or(&Value::Null)),
    })
}

fn role(message: &Value) -> Option<&str> {
    message.get("role").and_then(|v| v.as_str())
}

/// Collapse a message content value into plain text: strings pass through,
/// multimodal arrays contribute their text parts, anything else is
/// stringified.
fn content_to_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.is_empty() {
                content.to_string()
            } else {
                texts.join("\n")
            }
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Text blocks of an Anthropic-shape content value, tool results excluded.
fn anthropic_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Tool-result contents are JSON-parsed when they hold encoded JSON, and
/// passed through otherwise.
fn parse_result_content(content: &Value) -> Value {
    match content {
        Value::String(s) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Value::Array(blocks) => {
            // Anthropic block lists: concatenate text blocks, then try JSON.
            let text = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n");
            if text.is_empty() {
                content.clone()
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
        }
        other => other.clone(),
    }
}
