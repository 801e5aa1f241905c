// Policy repositories: CRUD for both policy kinds plus the agent junctions

use crate::core::errors::GatewayError;
use crate::core::models::{
    Operator, PolicyAction, ToolInvocationPolicy, TrustedDataPolicy,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

#[derive(FromRow)]
struct ToolInvocationPolicyRow {
    id: String,
    tool_id: String,
    description: String,
    argument_name: String,
    operator: String,
    value: String,
    action: String,
    block_prompt: Option<String>,
    created_at: DateTime<Utc>,
}

impl ToolInvocationPolicyRow {
    fn into_domain(self) -> Result<ToolInvocationPolicy, GatewayError> {
        Ok(ToolInvocationPolicy {
            id: parse_uuid(&self.id)?,
            tool_id: parse_uuid(&self.tool_id)?,
            description: self.description,
            argument_name: self.argument_name,
            operator: parse_operator(&self.operator)?,
            value: self.value,
            action: PolicyAction::parse(&self.action).ok_or_else(|| {
                GatewayError::Internal(format!("Corrupt policy action '{}'", self.action))
            })?,
            block_prompt: self.block_prompt,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct TrustedDataPolicyRow {
    id: String,
    tool_id: String,
    description: String,
    attribute_path: String,
    operator: String,
    value: String,
    created_at: DateTime<Utc>,
}

impl TrustedDataPolicyRow {
    fn into_domain(self) -> Result<TrustedDataPolicy, GatewayError> {
        Ok(TrustedDataPolicy {
            id: parse_uuid(&self.id)?,
            tool_id: parse_uuid(&self.tool_id)?,
            description: self.description,
            attribute_path: self.attribute_path,
            operator: parse_operator(&self.operator)?,
            value: self.value,
            created_at: self.created_at,
        })
    }
}

fn parse_operator(raw: &str) -> Result<Operator, GatewayError> {
    Operator::parse(raw)
        .ok_or_else(|| GatewayError::Internal(format!("Corrupt policy operator '{}'", raw)))
}

/// Fields accepted on create/update of a tool-invocation policy.
#[derive(Debug, Clone)]
pub struct NewToolInvocationPolicy {
    pub tool_id: Uuid,
    pub description: String,
    pub argument_name: String,
    pub operator: Operator,
    pub value: String,
    pub action: PolicyAction,
    pub block_prompt: Option<String>,
}

/// Fields accepted on create/update of a trusted-data policy.
#[derive(Debug, Clone)]
pub struct NewTrustedDataPolicy {
    pub tool_id: Uuid,
    pub description: String,
    pub attribute_path: String,
    pub operator: Operator,
    pub value: String,
}

#[derive(Clone)]
pub struct PolicyStore {
    pool: SqlitePool,
}

impl PolicyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -- tool-invocation policies --

    pub async fn create_tool_invocation_policy(
        &self,
        new: NewToolInvocationPolicy,
    ) -> Result<ToolInvocationPolicy, GatewayError> {
        let policy = ToolInvocationPolicy {
            id: Uuid::new_v4(),
            tool_id: new.tool_id,
            description: new.description,
            argument_name: new.argument_name,
            operator: new.operator,
            value: new.value,
            action: new.action,
            block_prompt: new.block_prompt,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO tool_invocation_policies
             (id, tool_id, description, argument_name, operator, value, action, block_prompt, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(policy.id.to_string())
        .bind(policy.tool_id.to_string())
        .bind(&policy.description)
        .bind(&policy.argument_name)
        .bind(policy.operator.as_str())
        .bind(&policy.value)
        .bind(policy.action.as_str())
        .bind(policy.block_prompt.as_deref())
        .bind(policy.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::from(e).refine_database())?;
        Ok(policy)
    }

    pub async fn get_tool_invocation_policy(
        &self,
        id: Uuid,
    ) -> Result<Option<ToolInvocationPolicy>, GatewayError> {
        let row = sqlx::query_as::<_, ToolInvocationPolicyRow>(
            "SELECT id, tool_id, description, argument_name, operator, value, action, block_prompt, created_at
             FROM tool_invocation_policies WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ToolInvocationPolicyRow::into_domain).transpose()
    }

    pub async fn list_tool_invocation_policies(
        &self,
    ) -> Result<Vec<ToolInvocationPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, ToolInvocationPolicyRow>(
            "SELECT id, tool_id, description, argument_name, operator, value, action, block_prompt, created_at
             FROM tool_invocation_policies ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(ToolInvocationPolicyRow::into_domain)
            .collect()
    }

    pub async fn list_tool_invocation_policies_by_tool(
        &self,
        tool_id: Uuid,
    ) -> Result<Vec<ToolInvocationPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, ToolInvocationPolicyRow>(
            "SELECT id, tool_id, description, argument_name, operator, value, action, block_prompt, created_at
             FROM tool_invocation_policies WHERE tool_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(tool_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(ToolInvocationPolicyRow::into_domain)
            .collect()
    }

    pub async fn update_tool_invocation_policy(
        &self,
        id: Uuid,
        new: NewToolInvocationPolicy,
    ) -> Result<Option<ToolInvocationPolicy>, GatewayError> {
        let updated = sqlx::query(
            "UPDATE tool_invocation_policies
             SET tool_id = ?, description = ?, argument_name = ?, operator = ?, value = ?, action = ?, block_prompt = ?
             WHERE id = ?",
        )
        .bind(new.tool_id.to_string())
        .bind(&new.description)
        .bind(&new.argument_name)
        .bind(new.operator.as_str())
        .bind(&new.value)
        .bind(new.action.as_str())
        .bind(new.block_prompt.as_deref())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_tool_invocation_policy(id).await
    }

    pub async fn delete_tool_invocation_policy(&self, id: Uuid) -> Result<bool, GatewayError> {
        let deleted = sqlx::query("DELETE FROM tool_invocation_policies WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    // -- trusted-data policies --

    pub async fn create_trusted_data_policy(
        &self,
        new: NewTrustedDataPolicy,
    ) -> Result<TrustedDataPolicy, GatewayError> {
        let policy = TrustedDataPolicy {
            id: Uuid::new_v4(),
            tool_id: new.tool_id,
            description: new.description,
            attribute_path: new.attribute_path,
            operator: new.operator,
            value: new.value,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO trusted_data_policies
             (id, tool_id, description, attribute_path, operator, value, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(policy.id.to_string())
        .bind(policy.tool_id.to_string())
        .bind(&policy.description)
        .bind(&policy.attribute_path)
        .bind(policy.operator.as_str())
        .bind(&policy.value)
        .bind(policy.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::from(e).refine_database())?;
        Ok(policy)
    }

    pub async fn get_trusted_data_policy(
        &self,
        id: Uuid,
    ) -> Result<Option<TrustedDataPolicy>, GatewayError> {
        let row = sqlx::query_as::<_, TrustedDataPolicyRow>(
            "SELECT id, tool_id, description, attribute_path, operator, value, created_at
             FROM trusted_data_policies WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TrustedDataPolicyRow::into_domain).transpose()
    }

    pub async fn list_trusted_data_policies(
        &self,
    ) -> Result<Vec<TrustedDataPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, TrustedDataPolicyRow>(
            "SELECT id, tool_id, description, attribute_path, operator, value, created_at
             FROM trusted_data_policies ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(TrustedDataPolicyRow::into_domain)
            .collect()
    }

    pub async fn list_trusted_data_policies_by_tool(
        &self,
        tool_id: Uuid,
    ) -> Result<Vec<TrustedDataPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, TrustedDataPolicyRow>(
            "SELECT id, tool_id, description, attribute_path, operator, value, created_at
             FROM trusted_data_policies WHERE tool_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(tool_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(TrustedDataPolicyRow::into_domain)
            .collect()
    }

    pub async fn update_trusted_data_policy(
        &self,
        id: Uuid,
        new: NewTrustedDataPolicy,
    ) -> Result<Option<TrustedDataPolicy>, GatewayError> {
        let updated = sqlx::query(
            "UPDATE trusted_data_policies
             SET tool_id = ?, description = ?, attribute_path = ?, operator = ?, value = ?
             WHERE id = ?",
        )
        .bind(new.tool_id.to_string())
        .bind(&new.description)
        .bind(&new.attribute_path)
        .bind(new.operator.as_str())
        .bind(&new.value)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_trusted_data_policy(id).await
    }

    pub async fn delete_trusted_data_policy(&self, id: Uuid) -> Result<bool, GatewayError> {
        let deleted = sqlx::query("DELETE FROM trusted_data_policies WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    // -- agent junctions --

    pub async fn assign_tool_invocation_policy(
        &self,
        agent_id: Uuid,
        policy_id: Uuid,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT OR IGNORE INTO agent_tool_invocation_policies (agent_id, policy_id) VALUES (?, ?)",
        )
        .bind(agent_id.to_string())
        .bind(policy_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unassign_tool_invocation_policy(
        &self,
        agent_id: Uuid,
        policy_id: Uuid,
    ) -> Result<bool, GatewayError> {
        let deleted = sqlx::query(
            "DELETE FROM agent_tool_invocation_policies WHERE agent_id = ? AND policy_id = ?",
        )
        .bind(agent_id.to_string())
        .bind(policy_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(deleted.rows_affected() > 0)
    }

    pub async fn assign_trusted_data_policy(
        &self,
        agent_id: Uuid,
        policy_id: Uuid,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT OR IGNORE INTO agent_trusted_data_policies (agent_id, policy_id) VALUES (?, ?)",
        )
        .bind(agent_id.to_string())
        .bind(policy_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unassign_trusted_data_policy(
        &self,
        agent_id: Uuid,
        policy_id: Uuid,
    ) -> Result<bool, GatewayError> {
        let deleted = sqlx::query(
            "DELETE FROM agent_trusted_data_policies WHERE agent_id = ? AND policy_id = ?",
        )
        .bind(agent_id.to_string())
        .bind(policy_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(deleted.rows_affected() > 0)
    }

    pub async fn list_tool_invocation_policies_for_agent(
        &self,
        agent_id: Uuid,
    ) -> Result<Vec<ToolInvocationPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, ToolInvocationPolicyRow>(
            "SELECT p.id, p.tool_id, p.description, p.argument_name, p.operator, p.value, p.action, p.block_prompt, p.created_at
             FROM tool_invocation_policies p
             JOIN agent_tool_invocation_policies j ON j.policy_id = p.id
             WHERE j.agent_id = ?
             ORDER BY p.created_at ASC, p.id ASC",
        )
        .bind(agent_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(ToolInvocationPolicyRow::into_domain)
            .collect()
    }

    pub async fn list_trusted_data_policies_for_agent(
        &self,
        agent_id: Uuid,
    ) -> Result<Vec<TrustedDataPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, TrustedDataPolicyRow>(
            "SELECT p.id, p.tool_id, p.description, p.attribute_path, p.operator, p.value, p.created_at
             FROM trusted_data_policies p
             JOIN agent_trusted_data_policies j ON j.policy_id = p.id
             WHERE j.agent_id = ?
             ORDER BY p.created_at ASC, p.id ASC",
        )
        .bind(agent_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(TrustedDataPolicyRow::into_domain)
            .collect()
    }

    pub async fn list_agents_for_tool_invocation_policy(
        &self,
        policy_id: Uuid,
    ) -> Result<Vec<Uuid>, GatewayError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT agent_id FROM agent_tool_invocation_policies WHERE policy_id = ? ORDER BY agent_id ASC",
        )
        .bind(policy_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    pub async fn list_agents_for_trusted_data_policy(
        &self,
        policy_id: Uuid,
    ) -> Result<Vec<Uuid>, GatewayError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT agent_id FROM agent_trusted_data_policies WHERE policy_id = ? ORDER BY agent_id ASC",
        )
        .bind(policy_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    // -- hot per-turn reads: one join query each --

    /// Tool-invocation policies joined to `agent_id` whose tool carries the
    /// wire name `tool_name`, in deterministic evaluation order.
    pub async fn list_tool_invocation_policies_for_agent_and_tool(
        &self,
        agent_id: Uuid,
        tool_name: &str,
    ) -> Result<Vec<ToolInvocationPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, ToolInvocationPolicyRow>(
            "SELECT p.id, p.tool_id, p.description, p.argument_name, p.operator, p.value, p.action, p.block_prompt, p.created_at
             FROM tool_invocation_policies p
             JOIN agent_tool_invocation_policies j ON j.policy_id = p.id
             JOIN tools t ON t.id = p.tool_id
             WHERE j.agent_id = ? AND t.name = ?
             ORDER BY p.created_at ASC, p.id ASC",
        )
        .bind(agent_id.to_string())
        .bind(tool_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(ToolInvocationPolicyRow::into_domain)
            .collect()
    }

    /// Trusted-data policies joined to `agent_id` whose tool carries the wire
    /// name `tool_name`, in deterministic evaluation order.
    pub async fn list_trusted_data_policies_for_agent_and_tool(
        &self,
        agent_id: Uuid,
        tool_name: &str,
    ) -> Result<Vec<TrustedDataPolicy>, GatewayError> {
        let rows = sqlx::query_as::<_, TrustedDataPolicyRow>(
            "SELECT p.id, p.tool_id, p.description, p.attribute_path, p.operator, p.value, p.created_at
             FROM trusted_data_policies p
             JOIN agent_trusted_data_policies j ON j.policy_id = p.id
             JOIN tools t ON t.id = p.tool_id
             WHERE j.agent_id = ? AND t.name = ?
             ORDER BY p.created_at ASC, p.id ASC",
        )
        .bind(agent_id.to_string())
        .bind(tool_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(TrustedDataPolicyRow::into_domain)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::agents::AgentStore;
    use crate::store::connect_in_memory;
    use serde_json::json;

    async fn seed() -> (PolicyStore, AgentStore, Uuid, Uuid) {
        let pool = connect_in_memory().await.unwrap();
        let agents = AgentStore::new(pool.clone());
        let policies = PolicyStore::new(pool);
        let agent = agents.create("assistant").await.unwrap();
        let tool = agents
            .create_tool(agent.id, "sendEmail", None, &json!({"type": "object"}))
            .await
            .unwrap();
        (policies, agents, agent.id, tool.id)
    }

    fn invocation_policy(tool_id: Uuid, argument: &str) -> NewToolInvocationPolicy {
        NewToolInvocationPolicy {
            tool_id,
            description: format!("gate on {}", argument),
            argument_name: argument.to_string(),
            operator: Operator::EndsWith,
            value: "@grafana.com".to_string(),
            action: PolicyAction::Block,
            block_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_hot_query_requires_join_and_tool_name() {
        let (policies, _agents, agent_id, tool_id) = seed().await;
        let policy = policies
            .create_tool_invocation_policy(invocation_policy(tool_id, "to"))
            .await
            .unwrap();

        // Not yet joined to the agent.
        let applicable = policies
            .list_tool_invocation_policies_for_agent_and_tool(agent_id, "sendEmail")
            .await
            .unwrap();
        assert!(applicable.is_empty());

        policies
            .assign_tool_invocation_policy(agent_id, policy.id)
            .await
            .unwrap();

        let applicable = policies
            .list_tool_invocation_policies_for_agent_and_tool(agent_id, "sendEmail")
            .await
            .unwrap();
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].id, policy.id);

        // Different wire name never applies.
        let applicable = policies
            .list_tool_invocation_policies_for_agent_and_tool(agent_id, "readFile")
            .await
            .unwrap();
        assert!(applicable.is_empty());
    }

    #[tokio::test]
    async fn test_hot_query_order_is_stable() {
        let (policies, _agents, agent_id, tool_id) = seed().await;
        for arg in ["a", "b", "c"] {
            let p = policies
                .create_tool_invocation_policy(invocation_policy(tool_id, arg))
                .await
                .unwrap();
            policies
                .assign_tool_invocation_policy(agent_id, p.id)
                .await
                .unwrap();
        }
        let first: Vec<Uuid> = policies
            .list_tool_invocation_policies_for_agent_and_tool(agent_id, "sendEmail")
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(first.len(), 3);
        for _ in 0..3 {
            let listed: Vec<Uuid> = policies
                .list_tool_invocation_policies_for_agent_and_tool(agent_id, "sendEmail")
                .await
                .unwrap()
                .iter()
                .map(|p| p.id)
                .collect();
            assert_eq!(listed, first);
        }
    }

    #[tokio::test]
    async fn test_unassign_and_cascade_on_policy_delete() {
        let (policies, _agents, agent_id, tool_id) = seed().await;
        let p = policies
            .create_tool_invocation_policy(invocation_policy(tool_id, "to"))
            .await
            .unwrap();
        policies
            .assign_tool_invocation_policy(agent_id, p.id)
            .await
            .unwrap();

        assert!(policies
            .unassign_tool_invocation_policy(agent_id, p.id)
            .await
            .unwrap());
        assert!(policies
            .list_tool_invocation_policies_for_agent(agent_id)
            .await
            .unwrap()
            .is_empty());

        policies
            .assign_tool_invocation_policy(agent_id, p.id)
            .await
            .unwrap();
        policies.delete_tool_invocation_policy(p.id).await.unwrap();
        assert!(policies
            .list_tool_invocation_policies_for_agent(agent_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_trusted_data_policy_crud_and_join() {
        let (policies, _agents, agent_id, tool_id) = seed().await;
        let p = policies
            .create_trusted_data_policy(NewTrustedDataPolicy {
                tool_id,
                description: "internal senders".to_string(),
                attribute_path: "emails[*].from".to_string(),
                operator: Operator::EndsWith,
                value: "@archestra.ai".to_string(),
            })
            .await
            .unwrap();
        policies
            .assign_trusted_data_policy(agent_id, p.id)
            .await
            .unwrap();

        let applicable = policies
            .list_trusted_data_policies_for_agent_and_tool(agent_id, "sendEmail")
            .await
            .unwrap();
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].attribute_path, "emails[*].from");

        let agents_for = policies
            .list_agents_for_trusted_data_policy(p.id)
            .await
            .unwrap();
        assert_eq!(agents_for, vec![agent_id]);
    }
}
