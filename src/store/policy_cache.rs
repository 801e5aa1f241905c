// TTL cache in front of the per-turn policy lookups

use crate::core::errors::GatewayError;
use crate::core::models::{ToolInvocationPolicy, TrustedDataPolicy};
use crate::store::policies::PolicyStore;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

type Key = (Uuid, String);

/// Caches the two hot `(agent, tool-name)` policy reads with a short TTL so
/// per-turn evaluation stays off the database on busy conversations. Stale
/// reads are bounded by the TTL; admin writes do not invalidate.
pub struct PolicyCache {
    store: PolicyStore,
    invocation: Cache<Key, Arc<Vec<ToolInvocationPolicy>>>,
    trusted: Cache<Key, Arc<Vec<TrustedDataPolicy>>>,
}

impl PolicyCache {
    pub fn new(store: PolicyStore, ttl_secs: u64, max_capacity: u64) -> Self {
        Self {
            store,
            invocation: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(max_capacity)
                .build(),
            trusted: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(max_capacity)
                .build(),
        }
    }

    pub async fn tool_invocation_policies(
        &self,
        agent_id: Uuid,
        tool_name: &str,
    ) -> Result<Arc<Vec<ToolInvocationPolicy>>, GatewayError> {
        let key = (agent_id, tool_name.to_string());
        if let Some(cached) = self.invocation.get(&key).await {
            return Ok(cached);
        }
        let policies = Arc::new(
            self.store
                .list_tool_invocation_policies_for_agent_and_tool(agent_id, tool_name)
                .await?,
        );
        self.invocation.insert(key, policies.clone()).await;
        Ok(policies)
    }

    pub async fn trusted_data_policies(
        &self,
        agent_id: Uuid,
        tool_name: &str,
    ) -> Result<Arc<Vec<TrustedDataPolicy>>, GatewayError> {
        let key = (agent_id, tool_name.to_string());
        if let Some(cached) = self.trusted.get(&key).await {
            return Ok(cached);
        }
        let policies = Arc::new(
            self.store
                .list_trusted_data_policies_for_agent_and_tool(agent_id, tool_name)
                .await?,
        );
        self.trusted.insert(key, policies.clone()).await;
        Ok(policies)
    }
}
