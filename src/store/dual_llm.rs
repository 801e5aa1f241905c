// Dual-LLM configuration and sanitisation-result cache

use crate::core::errors::GatewayError;
use crate::core::models::{DualLlmConfig, DualLlmResult};
use crate::dual_llm::prompts;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_uuid};

const CONFIG_ID: &str = "default";

#[derive(FromRow)]
struct ConfigRow {
    main_agent_prompt: String,
    quarantined_agent_prompt: String,
    summary_prompt: String,
    max_rounds: i64,
}

#[derive(FromRow)]
struct ResultRow {
    tool_call_id: String,
    agent_id: String,
    conversations: String,
    result: String,
    created_at: DateTime<Utc>,
}

impl ResultRow {
    fn into_domain(self) -> Result<DualLlmResult, GatewayError> {
        Ok(DualLlmResult {
            agent_id: parse_uuid(&self.agent_id)?,
            tool_call_id: self.tool_call_id,
            conversations: parse_json(&self.conversations)?,
            result: self.result,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct DualLlmStore {
    pool: SqlitePool,
}

impl DualLlmStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The single config row, or the built-in defaults when none was saved.
    pub async fn get_config(&self) -> Result<DualLlmConfig, GatewayError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT main_agent_prompt, quarantined_agent_prompt, summary_prompt, max_rounds
             FROM dual_llm_config WHERE id = ?",
        )
        .bind(CONFIG_ID)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(r) => DualLlmConfig {
                main_agent_prompt: r.main_agent_prompt,
                quarantined_agent_prompt: r.quarantined_agent_prompt,
                summary_prompt: r.summary_prompt,
                max_rounds: r.max_rounds,
            },
            None => prompts::default_config(),
        })
    }

    pub async fn put_config(&self, config: &DualLlmConfig) -> Result<(), GatewayError> {
        prompts::validate_config(config)?;
        sqlx::query(
            "INSERT INTO dual_llm_config
             (id, main_agent_prompt, quarantined_agent_prompt, summary_prompt, max_rounds)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               main_agent_prompt = excluded.main_agent_prompt,
               quarantined_agent_prompt = excluded.quarantined_agent_prompt,
               summary_prompt = excluded.summary_prompt,
               max_rounds = excluded.max_rounds",
        )
        .bind(CONFIG_ID)
        .bind(&config.main_agent_prompt)
        .bind(&config.quarantined_agent_prompt)
        .bind(&config.summary_prompt)
        .bind(config.max_rounds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_result_by_tool_call_id(
        &self,
        tool_call_id: &str,
    ) -> Result<Option<DualLlmResult>, GatewayError> {
        let row = sqlx::query_as::<_, ResultRow>(
            "SELECT tool_call_id, agent_id, conversations, result, created_at
             FROM dual_llm_results WHERE tool_call_id = ?",
        )
        .bind(tool_call_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ResultRow::into_domain).transpose()
    }

    /// Upsert keyed on `tool_call_id`; concurrent sanitisations of the same
    /// id may race, last writer wins on identical inputs.
    pub async fn upsert_result(
        &self,
        agent_id: Uuid,
        tool_call_id: &str,
        conversations: &Value,
        result: &str,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO dual_llm_results
             (tool_call_id, agent_id, conversations, result, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(tool_call_id) DO UPDATE SET
               agent_id = excluded.agent_id,
               conversations = excluded.conversations,
               result = excluded.result",
        )
        .bind(tool_call_id)
        .bind(agent_id.to_string())
        .bind(conversations.to_string())
        .bind(result)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::connect_in_memory;
    use serde_json::json;

    #[tokio::test]
    async fn test_config_defaults_then_override() {
        let pool = connect_in_memory().await.unwrap();
        let store = DualLlmStore::new(pool);

        let defaults = store.get_config().await.unwrap();
        assert!(defaults.main_agent_prompt.contains("{{originalUserRequest}}"));
        assert!(defaults.max_rounds >= 1);

        let mut custom = defaults.clone();
        custom.max_rounds = 3;
        custom.summary_prompt = "Summarize: {{qaText}}".to_string();
        store.put_config(&custom).await.unwrap();

        let loaded = store.get_config().await.unwrap();
        assert_eq!(loaded.max_rounds, 3);
        assert_eq!(loaded.summary_prompt, "Summarize: {{qaText}}");
    }

    #[tokio::test]
    async fn test_result_upsert_is_idempotent_per_tool_call() {
        let pool = connect_in_memory().await.unwrap();
        let store = DualLlmStore::new(pool.clone());
        let agent_id = Uuid::new_v4();

        store
            .upsert_result(agent_id, "tc1", &json!([]), "SAFE")
            .await
            .unwrap();
        store
            .upsert_result(agent_id, "tc1", &json!([]), "SAFE")
            .await
            .unwrap();

        let found = store.find_result_by_tool_call_id("tc1").await.unwrap().unwrap();
        assert_eq!(found.result, "SAFE");

        let count = sqlx::query_as::<_, (i64,)>("SELECT COUNT(1) FROM dual_llm_results")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_oversized_prompt_rejected() {
        let pool = connect_in_memory().await.unwrap();
        let store = DualLlmStore::new(pool);
        let mut config = prompts::default_config();
        config.main_agent_prompt = "x".repeat(64 * 1024);
        let err = store.put_config(&config).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }
}
