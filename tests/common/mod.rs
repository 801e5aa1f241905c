// Shared fixtures: a scripted upstream client and state builders.
#![allow(dead_code)]

use archestra_gateway::api::AppState;
use archestra_gateway::config::Config;
use archestra_gateway::core::errors::GatewayError;
use archestra_gateway::core::models::{Operator, PolicyAction};
use archestra_gateway::llm::types::{ChatCompletion, ChatCompletionRequest};
use archestra_gateway::llm::{ChunkStream, CompletionClient};
use archestra_gateway::store;
use archestra_gateway::store::policies::{NewToolInvocationPolicy, NewTrustedDataPolicy};
use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Upstream double that replays queued response bodies and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Value>>,
    stream_frames: Mutex<VecDeque<Vec<String>>>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
    pub completion_calls: AtomicUsize,
    pub schema_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a plain assistant text reply.
    pub fn push_text(&self, text: &str) {
        self.push_raw(assistant_text_body(text));
    }

    /// Queue a raw response body.
    pub fn push_raw(&self, body: Value) {
        self.replies.lock().unwrap().push_back(body);
    }

    /// Queue the `data:` payloads of one streamed completion.
    pub fn push_stream(&self, frames: Vec<String>) {
        self.stream_frames.lock().unwrap().push_back(frames);
    }

    pub fn calls(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }

    pub fn schema_call_count(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    /// The messages the Nth recorded request carried.
    pub fn request_messages(&self, index: usize) -> Vec<Value> {
        self.requests.lock().unwrap()[index].messages.clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, GatewayError> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        if request.response_format.is_some() {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.requests.lock().unwrap().push(request.clone());

        let body = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Upstream {
                status: Some(500),
                message: "scripted upstream exhausted".to_string(),
            })?;
        let bytes = Bytes::from(serde_json::to_vec(&body).expect("scripted body serializes"));
        ChatCompletion::from_body(bytes).map_err(|e| GatewayError::Upstream {
            status: None,
            message: format!("scripted body invalid: {}", e),
        })
    }

    async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let frames = self
            .stream_frames
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Upstream {
                status: Some(500),
                message: "scripted stream exhausted".to_string(),
            })?;
        Ok(Box::pin(futures::stream::iter(
            frames
                .into_iter()
                .map(Ok::<_, GatewayError>)
                .collect::<Vec<_>>(),
        )))
    }

    async fn list_models(&self) -> Result<Bytes, GatewayError> {
        Ok(Bytes::from_static(b"{\"object\":\"list\",\"data\":[]}"))
    }
}

/// Fresh state over an in-memory database and the given upstream double.
pub async fn test_state(llm: Arc<dyn CompletionClient>) -> AppState {
    let pool = store::connect_in_memory().await.expect("in-memory database");
    AppState::new(Arc::new(Config::test_config()), pool, llm)
}

/// A response body carrying one assistant text message.
pub fn assistant_text_body(text: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

/// A response body carrying one assistant tool call.
pub fn assistant_tool_call_body(call_id: &str, tool_name: &str, arguments: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {
                        "name": tool_name,
                        "arguments": arguments.to_string(),
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

/// Seed an agent owning one tool, returning `(agent_id, tool_id)`.
pub async fn seed_agent_with_tool(state: &AppState, agent: &str, tool: &str) -> (Uuid, Uuid) {
    let agent = state.agents.create(agent).await.expect("create agent");
    let tool = state
        .agents
        .create_tool(agent.id, tool, None, &json!({"type": "object"}))
        .await
        .expect("create tool");
    (agent.id, tool.id)
}

/// Seed and join a tool-invocation policy.
pub async fn seed_invocation_policy(
    state: &AppState,
    agent_id: Uuid,
    tool_id: Uuid,
    argument: &str,
    operator: Operator,
    value: &str,
    action: PolicyAction,
    block_prompt: Option<&str>,
) -> Uuid {
    let policy = state
        .policies
        .create_tool_invocation_policy(NewToolInvocationPolicy {
            tool_id,
            description: format!("{} {} {}", argument, operator.as_str(), value),
            argument_name: argument.to_string(),
            operator,
            value: value.to_string(),
            action,
            block_prompt: block_prompt.map(|s| s.to_string()),
        })
        .await
        .expect("create policy");
    state
        .policies
        .assign_tool_invocation_policy(agent_id, policy.id)
        .await
        .expect("assign policy");
    policy.id
}

/// Seed and join a trusted-data policy.
pub async fn seed_trusted_data_policy(
    state: &AppState,
    agent_id: Uuid,
    tool_id: Uuid,
    path: &str,
    operator: Operator,
    value: &str,
) -> Uuid {
    let policy = state
        .policies
        .create_trusted_data_policy(NewTrustedDataPolicy {
            tool_id,
            description: format!("{} {} {}", path, operator.as_str(), value),
            attribute_path: path.to_string(),
            operator,
            value: value.to_string(),
        })
        .await
        .expect("create policy");
    state
        .policies
        .assign_trusted_data_policy(agent_id, policy.id)
        .await
        .expect("assign policy");
    policy.id
}
