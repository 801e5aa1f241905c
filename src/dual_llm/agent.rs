// Privileged/quarantined Q&A loop and summarisation.
//
// The privileged LLM never sees the tool result; the quarantined LLM sees it
// but can only emit an option index. Only the summarised Q&A transcript
// reaches the main conversation.

use crate::core::errors::GatewayError;
use crate::core::models::Provider;
use crate::dual_llm::extract;
use crate::dual_llm::prompts;
use crate::llm::types::ChatCompletionRequest;
use crate::llm::CompletionClient;
use crate::store::dual_llm::DualLlmStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DONE_SENTINEL: &str = "DONE";

/// A parsed privileged question block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuestionBlock {
    pub question: String,
    pub options: Vec<String>,
}

pub struct Sanitizer {
    client: Arc<dyn CompletionClient>,
    store: DualLlmStore,
}

impl Sanitizer {
    pub fn new(client: Arc<dyn CompletionClient>, store: DualLlmStore) -> Self {
        Self { client, store }
    }

    /// Sanitise the tool result anchored at `anchor` within `messages`.
    ///
    /// Idempotent per anchor: a cached result short-circuits before any LLM
    /// call is made.
    pub async fn sanitize(
        &self,
        provider: Provider,
        messages: &[Value],
        anchor: &str,
        agent_id: Uuid,
        model: &str,
    ) -> Result<String, GatewayError> {
        if let Some(cached) = self.store.find_result_by_tool_call_id(anchor).await? {
            debug!(tool_call_id = %anchor, "Dual-LLM cache hit");
            return Ok(cached.result);
        }

        let config = self.store.get_config().await?;
        prompts::validate_config(&config)?;
        let extraction = extract::extract(provider, messages, anchor)?;
        let tool_result_text = value_to_text(&extraction.tool_result);

        let seed = prompts::substitute(
            &config.main_agent_prompt,
            &[("{{originalUserRequest}}", &extraction.original_user_request)],
        );
        let mut conversation = vec![json!({"role": "system", "content": seed})];

        for round in 0..config.max_rounds.max(1) {
            let reply = self.privileged_turn(&conversation, model).await?;
            conversation.push(json!({"role": "assistant", "content": reply}));

            if reply.contains(DONE_SENTINEL) {
                debug!(round, tool_call_id = %anchor, "Privileged agent done");
                break;
            }

            let Some(block) = parse_question_block(&reply) else {
                warn!(round, tool_call_id = %anchor, "Unparseable privileged reply, ending loop");
                break;
            };

            let answer_index = self
                .quarantined_turn(&config, &tool_result_text, &block, model)
                .await?;
            let answer_text = &block.options[answer_index];
            conversation.push(json!({
                "role": "user",
                "content": format!("Answer: {} ({})", answer_index, answer_text),
            }));
        }

        let qa_text = flatten_conversation(&conversation);
        let summary_prompt =
            prompts::substitute(&config.summary_prompt, &[("{{qaText}}", &qa_text)]);
        let summary = self
            .privileged_turn(&[json!({"role": "user", "content": summary_prompt})], model)
            .await?;

        self.store
            .upsert_result(agent_id, anchor, &Value::Array(conversation), &summary)
            .await?;
        info!(tool_call_id = %anchor, "Tool result sanitised");
        Ok(summary)
    }

    async fn privileged_turn(
        &self,
        conversation: &[Value],
        model: &str,
    ) -> Result<String, GatewayError> {
        let mut request = ChatCompletionRequest::new(model, conversation.to_vec());
        request.temperature = Some(0.0);
        let completion = self.client.chat_completion(&request).await?;
        Ok(completion
            .parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(value_to_text)
            .unwrap_or_default())
    }

    async fn quarantined_turn(
        &self,
        config: &crate::core::models::DualLlmConfig,
        tool_result_text: &str,
        block: &QuestionBlock,
        model: &str,
    ) -> Result<usize, GatewayError> {
        let max_index = block.options.len() - 1;
        let options_text = block
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}: {}", i, o))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompts::substitute(
            &config.quarantined_agent_prompt,
            &[
                ("{{toolResultData}}", tool_result_text),
                ("{{question}}", &block.question),
                ("{{options}}", &options_text),
                ("{{maxIndex}}", &max_index.to_string()),
            ],
        );

        let mut request =
            ChatCompletionRequest::new(model, vec![json!({"role": "user", "content": prompt})]);
        request.temperature = Some(0.0);
        request.response_format = Some(json!({
            "type": "json_schema",
            "json_schema": {
                "name": "quarantined_answer",
                "strict": true,
                "schema": {
                    "type": "object",
                    "properties": {"answer": {"type": "integer"}},
                    "required": ["answer"],
                    "additionalProperties": false
                }
            }
        }));

        let completion = self.client.chat_completion(&request).await?;
        let reply = completion
            .parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(value_to_text)
            .unwrap_or_default();

        Ok(clamp_answer(&reply, block.options.len()))
    }
}

/// Parse the quarantined reply into an option index, falling back to the
/// last option on anything absent, non-integral, or out of range.
pub(crate) fn clamp_answer(reply: &str, option_count: usize) -> usize {
    let last = option_count - 1;
    let answer = serde_json::from_str::<Value>(reply)
        .ok()
        .and_then(|v| v.get("answer").and_then(|a| a.as_i64()));
    match answer {
        Some(i) if i >= 0 && (i as usize) < option_count => i as usize,
        _ => last,
    }
}

/// Parse a privileged reply of the form:
///
/// ```text
/// QUESTION: <one line>
/// OPTIONS:
/// 0: <text>
/// 1: <text>
/// ```
pub(crate) fn parse_question_block(reply: &str) -> Option<QuestionBlock> {
    let mut lines = reply.lines();
    let question = lines
        .by_ref()
        .find_map(|l| l.trim().strip_prefix("QUESTION:"))?
        .trim()
        .to_string();
    if question.is_empty() {
        return None;
    }

    lines.by_ref().find(|l| l.trim().starts_with("OPTIONS:"))?;

    let mut options = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((index, text)) = line.split_once(':') else {
            break;
        };
        if index.trim().parse::<usize>() != Ok(options.len()) {
            break;
        }
        options.push(text.trim().to_string());
    }

    if options.is_empty() {
        return None;
    }
    Some(QuestionBlock { question, options })
}

/// Join the post-seed turns into the `{{qaText}}` transcript.
fn flatten_conversation(conversation: &[Value]) -> String {
    conversation
        .iter()
        .skip(1)
        .filter_map(|m| m.get("content").and_then(|c| c.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
