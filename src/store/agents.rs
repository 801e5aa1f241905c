// Agent and tool repositories

use crate::core::errors::GatewayError;
use crate::core::models::{Agent, Tool};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_uuid};

#[derive(FromRow)]
struct AgentRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AgentRow {
    fn into_domain(self) -> Result<Agent, GatewayError> {
        Ok(Agent {
            id: parse_uuid(&self.id)?,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ToolRow {
    id: String,
    agent_id: String,
    name: String,
    description: Option<String>,
    parameters: String,
    created_at: DateTime<Utc>,
}

impl ToolRow {
    fn into_domain(self) -> Result<Tool, GatewayError> {
        Ok(Tool {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            name: self.name,
            description: self.description,
            parameters: parse_json(&self.parameters)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct AgentStore {
    pool: SqlitePool,
}

impl AgentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<Agent, GatewayError> {
        let now = Utc::now();
        let agent = Agent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO agents (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::from(e).refine_database())?;
        Ok(agent)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Agent>, GatewayError> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT id, name, created_at, updated_at FROM agents WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AgentRow::into_domain).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Agent>, GatewayError> {
        let rows = sqlx::query_as::<_, AgentRow>(
            "SELECT id, name, created_at, updated_at FROM agents ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AgentRow::into_domain).collect()
    }

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Option<Agent>, GatewayError> {
        let updated = sqlx::query(
            "UPDATE agents SET name = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::from(e).refine_database())?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Deletes the agent; owned tools, their policies and junction rows
    /// follow via cascade.
    pub async fn delete(&self, id: Uuid) -> Result<bool, GatewayError> {
        let deleted = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    pub async fn create_tool(
        &self,
        agent_id: Uuid,
        name: &str,
        description: Option<&str>,
        parameters: &Value,
    ) -> Result<Tool, GatewayError> {
        let tool = Tool {
            id: Uuid::new_v4(),
            agent_id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            parameters: parameters.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO tools (id, agent_id, name, description, parameters, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tool.id.to_string())
        .bind(tool.agent_id.to_string())
        .bind(&tool.name)
        .bind(tool.description.as_deref())
        .bind(tool.parameters.to_string())
        .bind(tool.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::from(e).refine_database())?;
        Ok(tool)
    }

    pub async fn get_tool(&self, id: Uuid) -> Result<Option<Tool>, GatewayError> {
        let row = sqlx::query_as::<_, ToolRow>(
            "SELECT id, agent_id, name, description, parameters, created_at
             FROM tools WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ToolRow::into_domain).transpose()
    }

    /// Wire-level tool names identify tools globally (`tools.name` is UNIQUE).
    pub async fn find_tool_by_name(&self, name: &str) -> Result<Option<Tool>, GatewayError> {
        let row = sqlx::query_as::<_, ToolRow>(
            "SELECT id, agent_id, name, description, parameters, created_at
             FROM tools WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ToolRow::into_domain).transpose()
    }

    pub async fn list_tools_for_agent(&self, agent_id: Uuid) -> Result<Vec<Tool>, GatewayError> {
        let rows = sqlx::query_as::<_, ToolRow>(
            "SELECT id, agent_id, name, description, parameters, created_at
             FROM tools WHERE agent_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(agent_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ToolRow::into_domain).collect()
    }

    pub async fn delete_tool(&self, id: Uuid) -> Result<bool, GatewayError> {
        let deleted = sqlx::query("DELETE FROM tools WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}
