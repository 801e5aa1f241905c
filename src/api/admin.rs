// Agent, tool and policy management endpoints

use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::core::errors::GatewayError;
use crate::core::models::{DualLlmConfig, Operator, PolicyAction};
use crate::store::policies::{NewToolInvocationPolicy, NewTrustedDataPolicy};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationPolicyRequest {
    pub tool_id: Uuid,
    pub description: String,
    pub argument_name: String,
    pub operator: String,
    pub value: String,
    pub action: String,
    #[serde(default)]
    pub block_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedDataPolicyRequest {
    pub tool_id: Uuid,
    pub description: String,
    pub attribute_path: String,
    pub operator: String,
    pub value: String,
}

impl ToolInvocationPolicyRequest {
    fn into_new(self) -> Result<NewToolInvocationPolicy, ApiError> {
        Ok(NewToolInvocationPolicy {
            tool_id: self.tool_id,
            description: self.description,
            argument_name: self.argument_name,
            operator: parse_operator(&self.operator)?,
            value: self.value,
            action: PolicyAction::parse(&self.action).ok_or_else(|| {
                ApiError::from(GatewayError::InvalidRequest(format!(
                    "Unknown action '{}'",
                    self.action
                )))
            })?,
            block_prompt: self.block_prompt,
        })
    }
}

impl TrustedDataPolicyRequest {
    fn into_new(self) -> Result<NewTrustedDataPolicy, ApiError> {
        Ok(NewTrustedDataPolicy {
            tool_id: self.tool_id,
            description: self.description,
            attribute_path: self.attribute_path,
            operator: parse_operator(&self.operator)?,
            value: self.value,
        })
    }
}

fn parse_operator(raw: &str) -> Result<Operator, ApiError> {
    Operator::parse(raw).ok_or_else(|| {
        ApiError::from(GatewayError::InvalidRequest(format!(
            "Unknown operator '{}'",
            raw
        )))
    })
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::from(GatewayError::InvalidRequest(format!(
            "Invalid {} id '{}'",
            what, raw
        )))
    })
}

fn not_found(what: &str) -> ApiError {
    ApiError::from(GatewayError::NotFound(what.to_string()))
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Json<Value>, ApiError> {
    Ok(Json(serde_json::to_value(value).map_err(|e| {
        GatewayError::Internal(format!("Serialization failed: {}", e))
    })?))
}

// -- agents --

pub async fn create_agent_handler(
    State(state): State<AppState>,
    Json(body): Json<AgentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let agent = state.agents.create(&body.name).await?;
    info!(agent_id = %agent.id, name = %agent.name, "Agent created");
    Ok((StatusCode::CREATED, to_json(agent)?))
}

pub async fn list_agents_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    to_json(state.agents.list().await?)
}

pub async fn get_agent_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "agent")?;
    let agent = state.agents.get(id).await?.ok_or_else(|| not_found("Agent"))?;
    to_json(agent)
}

pub async fn update_agent_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AgentRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "agent")?;
    let agent = state
        .agents
        .rename(id, &body.name)
        .await?
        .ok_or_else(|| not_found("Agent"))?;
    to_json(agent)
}

pub async fn delete_agent_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "agent")?;
    if !state.agents.delete(id).await? {
        return Err(not_found("Agent"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// -- tools --

pub async fn create_tool_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ToolRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let agent_id = parse_id(&id, "agent")?;
    if state.agents.get(agent_id).await?.is_none() {
        return Err(not_found("Agent"));
    }
    let tool = state
        .agents
        .create_tool(agent_id, &body.name, body.description.as_deref(), &body.parameters)
        .await?;
    info!(tool_id = %tool.id, name = %tool.name, "Tool created");
    Ok((StatusCode::CREATED, to_json(tool)?))
}

pub async fn list_tools_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agent_id = parse_id(&id, "agent")?;
    to_json(state.agents.list_tools_for_agent(agent_id).await?)
}

pub async fn get_tool_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "tool")?;
    let tool = state.agents.get_tool(id).await?.ok_or_else(|| not_found("Tool"))?;
    to_json(tool)
}

pub async fn delete_tool_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "tool")?;
    if !state.agents.delete_tool(id).await? {
        return Err(not_found("Tool"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// -- tool-invocation policies --

pub async fn create_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Json(body): Json<ToolInvocationPolicyRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let policy = state
        .policies
        .create_tool_invocation_policy(body.into_new()?)
        .await?;
    Ok((StatusCode::CREATED, to_json(policy)?))
}

pub async fn list_tool_invocation_policies_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    to_json(state.policies.list_tool_invocation_policies().await?)
}

pub async fn get_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "policy")?;
    let policy = state
        .policies
        .get_tool_invocation_policy(id)
        .await?
        .ok_or_else(|| not_found("Policy"))?;
    to_json(policy)
}

pub async fn update_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ToolInvocationPolicyRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "policy")?;
    let policy = state
        .policies
        .update_tool_invocation_policy(id, body.into_new()?)
        .await?
        .ok_or_else(|| not_found("Policy"))?;
    to_json(policy)
}

pub async fn delete_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "policy")?;
    if !state.policies.delete_tool_invocation_policy(id).await? {
        return Err(not_found("Policy"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tool_invocation_policies_by_tool_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tool_id = parse_id(&id, "tool")?;
    to_json(
        state
            .policies
            .list_tool_invocation_policies_by_tool(tool_id)
            .await?,
    )
}

pub async fn list_agents_for_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let policy_id = parse_id(&id, "policy")?;
    to_json(
        state
            .policies
            .list_agents_for_tool_invocation_policy(policy_id)
            .await?,
    )
}

// -- trusted-data policies --

pub async fn create_trusted_data_policy_handler(
    State(state): State<AppState>,
    Json(body): Json<TrustedDataPolicyRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let policy = state
        .policies
        .create_trusted_data_policy(body.into_new()?)
        .await?;
    Ok((StatusCode::CREATED, to_json(policy)?))
}

pub async fn list_trusted_data_policies_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    to_json(state.policies.list_trusted_data_policies().await?)
}

pub async fn get_trusted_data_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "policy")?;
    let policy = state
        .policies
        .get_trusted_data_policy(id)
        .await?
        .ok_or_else(|| not_found("Policy"))?;
    to_json(policy)
}

pub async fn update_trusted_data_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TrustedDataPolicyRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "policy")?;
    let policy = state
        .policies
        .update_trusted_data_policy(id, body.into_new()?)
        .await?
        .ok_or_else(|| not_found("Policy"))?;
    to_json(policy)
}

pub async fn delete_trusted_data_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "policy")?;
    if !state.policies.delete_trusted_data_policy(id).await? {
        return Err(not_found("Policy"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_trusted_data_policies_by_tool_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tool_id = parse_id(&id, "tool")?;
    to_json(
        state
            .policies
            .list_trusted_data_policies_by_tool(tool_id)
            .await?,
    )
}

pub async fn list_agents_for_trusted_data_policy_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let policy_id = parse_id(&id, "policy")?;
    to_json(
        state
            .policies
            .list_agents_for_trusted_data_policy(policy_id)
            .await?,
    )
}

// -- agent <-> policy joins --

pub async fn assign_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Path((agent_id, policy_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let policy_id = parse_id(&policy_id, "policy")?;
    if state.agents.get(agent_id).await?.is_none() {
        return Err(not_found("Agent"));
    }
    if state
        .policies
        .get_tool_invocation_policy(policy_id)
        .await?
        .is_none()
    {
        return Err(not_found("Policy"));
    }
    state
        .policies
        .assign_tool_invocation_policy(agent_id, policy_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unassign_tool_invocation_policy_handler(
    State(state): State<AppState>,
    Path((agent_id, policy_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let policy_id = parse_id(&policy_id, "policy")?;
    if !state
        .policies
        .unassign_tool_invocation_policy(agent_id, policy_id)
        .await?
    {
        return Err(not_found("Assignment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tool_invocation_policies_for_agent_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agent_id = parse_id(&id, "agent")?;
    to_json(
        state
            .policies
            .list_tool_invocation_policies_for_agent(agent_id)
            .await?,
    )
}

pub async fn assign_trusted_data_policy_handler(
    State(state): State<AppState>,
    Path((agent_id, policy_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let policy_id = parse_id(&policy_id, "policy")?;
    if state.agents.get(agent_id).await?.is_none() {
        return Err(not_found("Agent"));
    }
    if state
        .policies
        .get_trusted_data_policy(policy_id)
        .await?
        .is_none()
    {
        return Err(not_found("Policy"));
    }
    state
        .policies
        .assign_trusted_data_policy(agent_id, policy_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unassign_trusted_data_policy_handler(
    State(state): State<AppState>,
    Path((agent_id, policy_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let policy_id = parse_id(&policy_id, "policy")?;
    if !state
        .policies
        .unassign_trusted_data_policy(agent_id, policy_id)
        .await?
    {
        return Err(not_found("Assignment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_trusted_data_policies_for_agent_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agent_id = parse_id(&id, "agent")?;
    to_json(
        state
            .policies
            .list_trusted_data_policies_for_agent(agent_id)
            .await?,
    )
}

// -- dual-LLM configuration --

pub async fn get_dual_llm_config_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    to_json(state.dual_llm.get_config().await?)
}

pub async fn put_dual_llm_config_handler(
    State(state): State<AppState>,
    Json(body): Json<DualLlmConfig>,
) -> Result<Json<Value>, ApiError> {
    state.dual_llm.put_config(&body).await?;
    Ok(Json(json!({"status": "updated"})))
}
