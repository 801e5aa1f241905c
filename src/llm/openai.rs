// OpenAI-compatible chat-completions client

use crate::core::errors::GatewayError;
use crate::llm::types::{ChatCompletion, ChatCompletionRequest};
use crate::llm::{ChunkStream, CompletionClient};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

pub struct OpenAiClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                GatewayError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn require_key(&self) -> Result<&str, GatewayError> {
        self.api_key.as_deref().ok_or_else(|| {
            GatewayError::Configuration("OPENAI_API_KEY is not set".to_string())
        })
    }

    fn transport_error(e: reqwest::Error) -> GatewayError {
        GatewayError::Upstream {
            status: None,
            message: format!("Upstream request failed: {}", e),
        }
    }

    /// Map a non-2xx upstream body to an error, surfacing the provider's own
    /// error message when the body carries one.
    fn upstream_error(status: u16, body: &[u8]) -> GatewayError {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        GatewayError::Upstream {
            status: Some(status),
            message,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, GatewayError> {
        let key = self.require_key()?;
        debug!(model = %request.model, "Forwarding chat completion upstream");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(request)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(Self::transport_error)?;
        if !status.is_success() {
            return Err(Self::upstream_error(status.as_u16(), &body));
        }

        ChatCompletion::from_body(body).map_err(|e| GatewayError::Upstream {
            status: None,
            message: format!("Unparseable upstream response: {}", e),
        })
    }

    async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, GatewayError> {
        let key = self.require_key()?;
        let mut request = request.clone();
        request.stream = Some(true);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(Self::upstream_error(status.as_u16(), &body));
        }

        // Decode the SSE byte stream into per-event payloads on a relay task;
        // a dropped receiver (client disconnect) ends the task and the
        // upstream connection with it.
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, GatewayError>>(16);
        tokio::spawn(async move {
            let mut upstream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = upstream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(Self::transport_error(e))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer.drain(..=line_end);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim_start();
                    if data == "[DONE]" {
                        return;
                    }
                    if data.is_empty() {
                        continue;
                    }
                    if tx.send(Ok(data.to_string())).await.is_err() {
                        debug!("Stream consumer dropped, cancelling upstream relay");
                        return;
                    }
                }
            }
            if !buffer.trim().is_empty() {
                warn!("Upstream stream ended with an incomplete SSE frame");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn list_models(&self) -> Result<Bytes, GatewayError> {
        let key = self.require_key()?;
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(key)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(Self::transport_error)?;
        if !status.is_success() {
            return Err(Self::upstream_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}
