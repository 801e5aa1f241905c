// Axum web server layer

use crate::config::Config;
use crate::dual_llm::Sanitizer;
use crate::llm::CompletionClient;
use crate::store::{AgentStore, ChatStore, DualLlmStore, PolicyCache, PolicyStore};
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod handlers;
pub mod responses;

/// Shared dependencies, cloned per request task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub agents: AgentStore,
    pub policies: PolicyStore,
    pub chats: ChatStore,
    pub dual_llm: DualLlmStore,
    pub policy_cache: Arc<PolicyCache>,
    pub llm: Arc<dyn CompletionClient>,
    pub sanitizer: Arc<Sanitizer>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pool: SqlitePool, llm: Arc<dyn CompletionClient>) -> Self {
        let policies = PolicyStore::new(pool.clone());
        let dual_llm = DualLlmStore::new(pool.clone());
        let policy_cache = Arc::new(PolicyCache::new(
            policies.clone(),
            config.policy_cache_ttl_secs,
            1000,
        ));
        let sanitizer = Arc::new(Sanitizer::new(llm.clone(), dual_llm.clone()));
        Self {
            config,
            agents: AgentStore::new(pool.clone()),
            chats: ChatStore::new(pool.clone()),
            pool,
            policies,
            dual_llm,
            policy_cache,
            llm,
            sanitizer,
        }
    }
}

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.body_size_limit_bytes;

    Router::new()
        // Guarded completion surface
        .route(
            "/v1/:provider/chat/completions",
            post(handlers::chat_completions_handler),
        )
        .route("/v1/:provider/models", get(handlers::list_models_handler))
        // Chats
        .route(
            "/api/chats",
            post(handlers::create_chat_handler).get(handlers::list_chats_handler),
        )
        .route("/api/chats/:id", get(handlers::get_chat_handler))
        // Agents and tools
        .route(
            "/api/agents",
            post(admin::create_agent_handler).get(admin::list_agents_handler),
        )
        .route(
            "/api/agents/:id",
            get(admin::get_agent_handler)
                .put(admin::update_agent_handler)
                .delete(admin::delete_agent_handler),
        )
        .route(
            "/api/agents/:id/tools",
            post(admin::create_tool_handler).get(admin::list_tools_handler),
        )
        .route(
            "/api/tools/:id",
            get(admin::get_tool_handler).delete(admin::delete_tool_handler),
        )
        // Tool-invocation policies
        .route(
            "/api/tool-invocation-policies",
            post(admin::create_tool_invocation_policy_handler)
                .get(admin::list_tool_invocation_policies_handler),
        )
        .route(
            "/api/tool-invocation-policies/:id",
            get(admin::get_tool_invocation_policy_handler)
                .put(admin::update_tool_invocation_policy_handler)
                .delete(admin::delete_tool_invocation_policy_handler),
        )
        .route(
            "/api/tools/:id/tool-invocation-policies",
            get(admin::list_tool_invocation_policies_by_tool_handler),
        )
        .route(
            "/api/tool-invocation-policies/:id/agents",
            get(admin::list_agents_for_tool_invocation_policy_handler),
        )
        // Trusted-data policies
        .route(
            "/api/trusted-data-policies",
            post(admin::create_trusted_data_policy_handler)
                .get(admin::list_trusted_data_policies_handler),
        )
        .route(
            "/api/trusted-data-policies/:id",
            get(admin::get_trusted_data_policy_handler)
                .put(admin::update_trusted_data_policy_handler)
                .delete(admin::delete_trusted_data_policy_handler),
        )
        .route(
            "/api/tools/:id/trusted-data-policies",
            get(admin::list_trusted_data_policies_by_tool_handler),
        )
        .route(
            "/api/trusted-data-policies/:id/agents",
            get(admin::list_agents_for_trusted_data_policy_handler),
        )
        // Agent <-> policy joins
        .route(
            "/api/agents/:id/tool-invocation-policies",
            get(admin::list_tool_invocation_policies_for_agent_handler),
        )
        .route(
            "/api/agents/:id/tool-invocation-policies/:policy_id",
            post(admin::assign_tool_invocation_policy_handler)
                .delete(admin::unassign_tool_invocation_policy_handler),
        )
        .route(
            "/api/agents/:id/trusted-data-policies",
            get(admin::list_trusted_data_policies_for_agent_handler),
        )
        .route(
            "/api/agents/:id/trusted-data-policies/:policy_id",
            post(admin::assign_trusted_data_policy_handler)
                .delete(admin::unassign_trusted_data_policy_handler),
        )
        // Dual-LLM configuration
        .route(
            "/api/dual-llm-config",
            get(admin::get_dual_llm_config_handler).put(admin::put_dual_llm_config_handler),
        )
        // Service meta
        .route("/health", get(handlers::health_handler))
        .route("/openapi.json", get(handlers::openapi_handler))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
