// Chat and interaction repository. Interactions are append-only.

use crate::core::errors::GatewayError;
use crate::core::models::{Chat, ChatWithInteractions, Interaction};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_uuid};

#[derive(FromRow)]
struct ChatRow {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChatRow {
    fn into_domain(self) -> Result<Chat, GatewayError> {
        Ok(Chat {
            id: parse_uuid(&self.id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InteractionRow {
    id: String,
    chat_id: String,
    content: String,
    tainted: bool,
    taint_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl InteractionRow {
    fn into_domain(self) -> Result<Interaction, GatewayError> {
        Ok(Interaction {
            id: parse_uuid(&self.id)?,
            chat_id: parse_uuid(&self.chat_id)?,
            content: parse_json(&self.content)?,
            tainted: self.tainted,
            taint_reason: self.taint_reason,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self) -> Result<Chat, GatewayError> {
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        sqlx::query("INSERT INTO chats (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(chat.id.to_string())
            .bind(chat.created_at)
            .bind(chat.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(chat)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, GatewayError> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(1) FROM chats WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 > 0)
    }

    /// Chat joined with its interactions, oldest first.
    pub async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<ChatWithInteractions>, GatewayError> {
        let chat = sqlx::query_as::<_, ChatRow>(
            "SELECT id, created_at, updated_at FROM chats WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        let Some(chat) = chat else {
            return Ok(None);
        };
        Ok(Some(ChatWithInteractions {
            chat: chat.into_domain()?,
            interactions: self.find_interactions_by_chat_id(id).await?,
        }))
    }

    pub async fn list_all(&self) -> Result<Vec<ChatWithInteractions>, GatewayError> {
        let chats = sqlx::query_as::<_, ChatRow>(
            "SELECT id, created_at, updated_at FROM chats ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(chats.len());
        for row in chats {
            let chat = row.into_domain()?;
            let interactions = self.find_interactions_by_chat_id(chat.id).await?;
            out.push(ChatWithInteractions { chat, interactions });
        }
        Ok(out)
    }

    pub async fn find_interactions_by_chat_id(
        &self,
        chat_id: Uuid,
    ) -> Result<Vec<Interaction>, GatewayError> {
        let rows = sqlx::query_as::<_, InteractionRow>(
            "SELECT id, chat_id, content, tainted, taint_reason, created_at
             FROM interactions WHERE chat_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(chat_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(InteractionRow::into_domain).collect()
    }

    /// Append one turn. Tainted turns must carry a reason.
    pub async fn append_interaction(
        &self,
        chat_id: Uuid,
        content: &Value,
        tainted: bool,
        taint_reason: Option<&str>,
    ) -> Result<Interaction, GatewayError> {
        if tainted && taint_reason.map_or(true, |r| r.is_empty()) {
            return Err(GatewayError::Internal(
                "Tainted interaction requires a non-empty taint reason".to_string(),
            ));
        }
        let interaction = Interaction {
            id: Uuid::new_v4(),
            chat_id,
            content: content.clone(),
            tainted,
            taint_reason: if tainted {
                taint_reason.map(|s| s.to_string())
            } else {
                None
            },
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO interactions (id, chat_id, content, tainted, taint_reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(interaction.id.to_string())
        .bind(interaction.chat_id.to_string())
        .bind(interaction.content.to_string())
        .bind(interaction.tainted)
        .bind(interaction.taint_reason.as_deref())
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(interaction.created_at)
            .bind(chat_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(interaction)
    }
}
