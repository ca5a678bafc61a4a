use std::sync::Arc;

use canned_tools_mcp::{
    build_app, config::Config, domain::registry::ToolRegistry, logging, session::SessionManager,
    AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let sessions = Arc::new(SessionManager::in_memory(config.session_idle_timeout));
    let sweeper = sessions.spawn_sweeper();
    let state = AppState::new(
        Arc::new(ToolRegistry::with_builtin_tools()),
        Arc::clone(&sessions),
    );
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        idle_timeout_secs = sessions.idle_timeout().map(|timeout| timeout.as_secs()),
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    let closed = sessions.close_all().await;
    info!(closed_sessions = closed, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
