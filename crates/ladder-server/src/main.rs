use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ladder_server::build_app;
use ladder_server::config::ServerConfig;
use ladder_server::store::{LobbyStore, MemoryStore};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LADDER_LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig::load();
    config.validate();

    let store: Arc<dyn LobbyStore> = match config.seed_path {
        Some(ref path) => match load_seed(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to load seed file");
                std::process::exit(1);
            },
        },
        None => {
            tracing::warn!("No seed file configured, starting with an empty store");
            Arc::new(MemoryStore::new())
        },
    };

    let listen_addr = config.listen_addr.clone();
    let (app, _state) = build_app(config, store);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        },
    };
    tracing::info!(addr = %listen_addr, "Word ladder server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }
    tracing::info!("Server stopped");
}

fn load_seed(path: &str) -> Result<MemoryStore, String> {
    MemoryStore::from_seed_file(Path::new(path)).map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
