// SSE relay for streamed completions.
//
// Upstream frames are forwarded verbatim while tool-call deltas are buffered;
// the tool-invocation gate runs once the stream completes. A blocked call is
// reported as one final error event before the [DONE] terminator, since the
// HTTP status is already on the wire.

use crate::api::AppState;
use crate::core::errors::GatewayError;
use crate::llm::types::{ChatCompletionRequest, FunctionCall, ToolCall};
use crate::llm::ChunkStream;
use crate::proxy::pipeline;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};
use uuid::Uuid;

const DONE_FRAME: &str = "[DONE]";

pub async fn relay(
    state: AppState,
    chat_id: Uuid,
    request: ChatCompletionRequest,
) -> Result<Response, GatewayError> {
    let mut upstream_request = request;
    upstream_request.stream = Some(true);

    // Failures before the first byte still surface as plain HTTP errors.
    let upstream = state.llm.chat_completion_stream(&upstream_request).await?;

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);
    tokio::spawn(relay_task(state, chat_id, upstream, tx));

    let mut response = Sse::new(ReceiverStream::new(rx)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));
    Ok(response)
}

async fn relay_task(
    state: AppState,
    chat_id: Uuid,
    mut upstream: ChunkStream,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let mut assembler = StreamAssembler::default();

    while let Some(item) = upstream.next().await {
        match item {
            Ok(payload) => {
                assembler.ingest(&payload);
                if tx.send(Ok(Event::default().data(&payload))).await.is_err() {
                    debug!(chat_id = %chat_id, "Client disconnected mid-stream");
                    return;
                }
            }
            Err(e) => {
                error!(chat_id = %chat_id, error = %e, "Upstream stream failed");
                send_error_and_done(&tx, &e).await;
                return;
            }
        }
    }

    // Stream complete: run the buffered tool-call gate.
    let tool_calls = assembler.tool_calls();
    match pipeline::gate_tool_calls(&state, &tool_calls).await {
        Ok(()) => {
            if let Err(e) = state
                .chats
                .append_interaction(chat_id, &assembler.assistant_message(), false, None)
                .await
            {
                error!(chat_id = %chat_id, error = %e, "Failed to persist streamed assistant message");
            }
            let _ = tx.send(Ok(Event::default().data(DONE_FRAME))).await;
        }
        Err(e) => {
            send_error_and_done(&tx, &e).await;
        }
    }
}

async fn send_error_and_done(tx: &mpsc::Sender<Result<Event, Infallible>>, e: &GatewayError) {
    let frame = json!({
        "error": {"message": e.user_message(), "type": e.error_type()}
    });
    let _ = tx.send(Ok(Event::default().data(frame.to_string()))).await;
    let _ = tx.send(Ok(Event::default().data(DONE_FRAME))).await;
}

/// Reassembles the final assistant message from stream deltas.
#[derive(Debug, Default)]
pub(crate) struct StreamAssembler {
    content: String,
    saw_content: bool,
    calls: Vec<PartialToolCall>,
}

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl StreamAssembler {
    pub(crate) fn ingest(&mut self, payload: &str) {
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            warn!("Unparseable stream frame, skipping for reassembly");
            return;
        };
        let Some(delta) = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
        else {
            return;
        };

        if let Some(fragment) = delta.get("content").and_then(|v| v.as_str()) {
            self.saw_content = true;
            self.content.push_str(fragment);
        }

        let Some(deltas) = delta.get("tool_calls").and_then(|v| v.as_array()) else {
            return;
        };
        for (position, call_delta) in deltas.iter().enumerate() {
            let index = call_delta
                .get("index")
                .and_then(|v| v.as_u64())
                .map(|i| i as usize)
                .unwrap_or(position);
            if self.calls.len() <= index {
                self.calls.resize(index + 1, PartialToolCall::default());
            }
            let partial = &mut self.calls[index];
            if let Some(id) = call_delta.get("id").and_then(|v| v.as_str()) {
                partial.id.push_str(id);
            }
            if let Some(kind) = call_delta.get("type").and_then(|v| v.as_str()) {
                partial.kind = kind.to_string();
            }
            if let Some(function) = call_delta.get("function") {
                if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                    partial.name.push_str(name);
                }
                if let Some(args) = function.get("arguments").and_then(|v| v.as_str()) {
                    partial.arguments.push_str(args);
                }
            }
        }
    }

    pub(crate) fn tool_calls(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .map(|p| ToolCall {
                id: p.id.clone(),
                kind: if p.kind.is_empty() {
                    "function".to_string()
                } else {
                    p.kind.clone()
                },
                function: FunctionCall {
                    name: p.name.clone(),
                    arguments: p.arguments.clone(),
                },
            })
            .collect()
    }

    pub(crate) fn assistant_message(&self) -> Value {
        let mut message = json!({"role": "assistant"});
        message["content"] = if self.saw_content {
            json!(self.content)
        } else {
            Value::Null
        };
        if !self.calls.is_empty() {
            message["tool_calls"] = Value::Array(
                self.tool_calls()
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": c.kind,
                            "function": {"name": c.function.name, "arguments": c.function.arguments},
                        })
                    })
                    .collect(),
            );
        }
        message
    }
}
