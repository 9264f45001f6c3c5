use log::{error, info, warn};
use std::net::SocketAddr;

use gym_tracker::config::ServerConfig;
use gym_tracker::handlers;
use gym_tracker::AppState;

#[tokio::main]
async fn main() {
    // Initialize env before logging so RUST_LOG can come from .env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, environment={}, provider={}",
        config.host,
        config.port,
        config.environment,
        config.provider_url.host_str().unwrap_or("?")
    );
    if config.development_mode {
        warn!("Development mode is enabled; do not run this configuration in production");
    }

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::init(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    let routes = handlers::routes(state.clone());

    let server = match warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown_signal()) {
        Ok((bound, server)) => {
            info!("Gym Tracker API listening on http://{}/api", bound);
            server
        }
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            state.close();
            std::process::exit(1);
        }
    };

    server.await;

    state.close();
    info!("Server shut down");
}

/// Resolve on Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
