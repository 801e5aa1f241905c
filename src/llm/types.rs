// Wire types for the OpenAI-compatible chat-completions surface.
//
// Messages stay as raw JSON values: the proxy must forward unknown fields
// untouched and rewrite individual tool-result contents in place.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    /// Fields we do not interpret but must forward upstream unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Value>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            stream: None,
            response_format: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Typed view over the parts of an upstream response the gate inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as emitted by the provider.
    pub arguments: String,
}

/// A non-streaming completion: the raw upstream body (returned verbatim on
/// pass-through) plus parsed views for the gate and persistence.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub body: Bytes,
    pub raw: Value,
    pub parsed: ChatCompletionResponse,
}

impl ChatCompletion {
    pub fn from_body(body: Bytes) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_slice(&body)?;
        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())?;
        Ok(Self { body, raw, parsed })
    }

    /// The first choice's message as raw JSON, for interaction persistence.
    pub fn first_message_raw(&self) -> Option<&Value> {
        self.raw.get("choices")?.get(0)?.get("message")
    }
}
