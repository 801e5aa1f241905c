// Domain models shared across the engine, stores and proxy pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A named security scope; every policy and every tool is bound to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A tool owned by an agent. `name` is globally unique so that the wire-level
/// tool name alone identifies the tool (and through it, the owning agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: Uuid,
    #[serde(rename = "agentId")]
    pub agent_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Closed operator set shared by both policy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "equal")]
    Equal,
    #[serde(rename = "notEqual")]
    NotEqual,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "notContains")]
    NotContains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "regex")]
    Regex,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "equal",
            Operator::NotEqual => "notEqual",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Regex => "regex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "equal" => Some(Operator::Equal),
            "notEqual" => Some(Operator::NotEqual),
            "contains" => Some(Operator::Contains),
            "notContains" => Some(Operator::NotContains),
            "startsWith" => Some(Operator::StartsWith),
            "endsWith" => Some(Operator::EndsWith),
            "regex" => Some(Operator::Regex),
            _ => None,
        }
    }
}

/// Action carried by a tool-invocation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyAction {
    #[serde(rename = "allow")]
    Allow,
    #[serde(rename = "block")]
    Block,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Allow => "allow",
            PolicyAction::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(PolicyAction::Allow),
            "block" => Some(PolicyAction::Block),
            _ => None,
        }
    }
}

/// Gate rule on an assistant-proposed tool call's arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationPolicy {
    pub id: Uuid,
    #[serde(rename = "toolId")]
    pub tool_id: Uuid,
    pub description: String,
    #[serde(rename = "argumentName")]
    pub argument_name: String,
    pub operator: Operator,
    pub value: String,
    pub action: PolicyAction,
    #[serde(rename = "blockPrompt", skip_serializing_if = "Option::is_none")]
    pub block_prompt: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Trust rule on a tool result. A matching policy marks the result trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDataPolicy {
    pub id: Uuid,
    #[serde(rename = "toolId")]
    pub tool_id: Uuid,
    pub description: String,
    #[serde(rename = "attributePath")]
    pub attribute_path: String,
    pub operator: Operator,
    pub value: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Opaque conversation handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// One appended conversation turn. `tainted = true` implies a non-empty reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    #[serde(rename = "chatId")]
    pub chat_id: Uuid,
    pub content: Value,
    pub tainted: bool,
    #[serde(rename = "taintReason", skip_serializing_if = "Option::is_none")]
    pub taint_reason: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatWithInteractions {
    #[serde(flatten)]
    pub chat: Chat,
    pub interactions: Vec<Interaction>,
}

/// Prompt templates and bounds for the dual-LLM quarantine loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualLlmConfig {
    #[serde(rename = "mainAgentPrompt")]
    pub main_agent_prompt: String,
    #[serde(rename = "quarantinedAgentPrompt")]
    pub quarantined_agent_prompt: String,
    #[serde(rename = "summaryPrompt")]
    pub summary_prompt: String,
    #[serde(rename = "maxRounds")]
    pub max_rounds: i64,
}

/// Cached sanitisation output, keyed by the provider-issued tool-call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualLlmResult {
    #[serde(rename = "agentId")]
    pub agent_id: Uuid,
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    pub conversations: Value,
    pub result: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Outcome of the tool-invocation gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationDecision {
    Allowed,
    Denied { reason: String },
}

/// Outcome of trusted-data evaluation for one tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    pub is_trusted: bool,
    pub is_blocked: bool,
    pub should_sanitize_with_dual_llm: bool,
    pub reason: String,
}

impl TrustDecision {
    pub fn trusted(reason: String) -> Self {
        Self {
            is_trusted: true,
            is_blocked: false,
            should_sanitize_with_dual_llm: false,
            reason,
        }
    }

    pub fn untrusted(reason: String) -> Self {
        Self {
            is_trusted: false,
            is_blocked: false,
            should_sanitize_with_dual_llm: true,
            reason,
        }
    }
}

/// Message-shape adapter selector for the dual-LLM sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}
