// Main entry point for the Archestra Gateway

use archestra_gateway::api::{create_router, AppState};
use archestra_gateway::config::Config;
use archestra_gateway::llm::OpenAiClient;
use archestra_gateway::store;

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and validate configuration first (before any logging)
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    };

    // 2. Initialize tracing subscriber with config values
    init_tracing(&config)?;

    info!("Starting Archestra Gateway");
    info!(
        bind_address = %config.bind_address,
        port = config.port,
        "Configuration loaded"
    );

    // 3. Connect to the database and run migrations
    let pool = store::connect(&config.database_url).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database");
        e
    })?;

    // 4. Build the upstream client
    let llm = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.upstream_timeout_secs,
    )?);

    // 5. Assemble shared state and router
    let state = AppState::new(Arc::new(config.clone()), pool, llm);
    let app = create_router(state);

    // 6. Serve with graceful shutdown
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind to address");
        e
    })?;

    info!(addr = %addr, "Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber based on configuration
fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
