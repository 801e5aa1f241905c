// Domain error types - mapped to the wire {error: {message, type}} envelope

use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request: unknown provider, bad chat id, bad body (HTTP 400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Chat or agent absent (HTTP 404)
    #[error("{0} not found")]
    NotFound(String),

    /// An assistant-proposed tool call was denied by policy (HTTP 403)
    #[error("{0}")]
    ToolInvocationBlocked(String),

    /// Missing api key / db url (HTTP 500)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Upstream LLM provider failure; carries the upstream status when known
    #[error("Upstream error: {message}")]
    Upstream { status: Option<u16>, message: String },

    /// Database failure (HTTP 500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unexpected internal failure (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::NotFound(_) => 404,
            GatewayError::ToolInvocationBlocked(_) => 403,
            GatewayError::Configuration(_) => 500,
            GatewayError::Upstream { status, .. } => status.unwrap_or(500),
            GatewayError::Database(_) => 500,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Wire-level error type discriminator
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::ToolInvocationBlocked(_) => "tool_invocation_blocked",
            GatewayError::Configuration(_) => "configuration_error",
            GatewayError::Upstream { .. } => "api_error",
            GatewayError::Database(_) => "api_error",
            GatewayError::Internal(_) => "api_error",
        }
    }

    /// User-facing message (no internal details for 5xx database/internal kinds)
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::InvalidRequest(msg) => msg.clone(),
            GatewayError::NotFound(what) => format!("{} not found", what),
            GatewayError::ToolInvocationBlocked(reason) => reason.clone(),
            GatewayError::Configuration(msg) => msg.clone(),
            GatewayError::Upstream { message, .. } => message.clone(),
            GatewayError::Database(_) => "Internal error".to_string(),
            GatewayError::Internal(_) => "Internal error".to_string(),
        }
    }

    /// Duplicate-key writes surface as client errors rather than 500s
    pub fn refine_database(self) -> Self {
        if let GatewayError::Database(sqlx::Error::Database(ref db_err)) = self {
            if db_err.is_unique_violation() {
                return GatewayError::InvalidRequest(format!(
                    "Conflict: {}",
                    db_err.message()
                ));
            }
        }
        self
    }
}
