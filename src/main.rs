#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem_mcpserver::McpServer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ssh_session_mcp::mcp::config::EngineConfig;
use ssh_session_mcp::mcp::{SessionManager, SshTools};

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Logs go to stderr; stdout carries the line-delimited JSON protocol.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env();
    let manager = match SessionManager::new(config) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("startup failed: {}", e);
            std::process::exit(1);
        }
    };

    // SIGINT/SIGTERM close every session and transport before exiting.
    let shutdown_manager = manager.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, closing sessions");
        shutdown_manager.close_all().await;
        std::process::exit(0);
    });

    info!("SSH session MCP server ready on stdio");
    if let Err(e) = poem_mcpserver::stdio::stdio(McpServer::new().tools(SshTools::new(manager)))
        .await
    {
        error!("server failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
