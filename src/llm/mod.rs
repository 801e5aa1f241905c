// Upstream LLM client seam

use crate::core::errors::GatewayError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

pub mod openai;
pub mod types;

pub use openai::OpenAiClient;
pub use types::{ChatCompletion, ChatCompletionRequest};

/// Payloads of upstream SSE `data:` frames, terminator excluded.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// Typed upstream completion client. One implementation speaks the real
/// OpenAI-compatible API; tests substitute scripted doubles.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, GatewayError>;

    async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, GatewayError>;

    async fn list_models(&self) -> Result<Bytes, GatewayError>;
}
