//! Server setup and initialization
//!
//! Wires together the credential store, cipher, execution gate, credential cache and
//! memory manager, mounts the HTTP routes and runs the server until a shutdown signal.

use crate::{
    api::{create_credential_routes, create_execution_routes, create_memory_routes, AppState},
    config::Config,
    credentials::{AesGcmCipher, CredentialProvider, SqliteCredentialStore},
    memory::MemoryManager,
    runtime::{ExecutionCoordinator, ExecutionQueue, SecretResolver},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Initialize every component from configuration
///
/// Opens the credential database, loads the encryption key and starts the memory
/// sweeper thread.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let key = config.credentials.encryption_key.as_deref().ok_or_else(|| {
        anyhow::anyhow!(
            "FLOWCORE_CREDENTIAL_KEY is not set (expected a base64-encoded 32-byte key; \
             run `flowcore generate-key` to create one)"
        )
    })?;

    tracing::info!("🔐 Loading credential encryption key");
    let cipher = Arc::new(AesGcmCipher::from_base64_key(key)?);

    let db_path = config.database.credentials_db_path();
    let store = Arc::new(
        SqliteCredentialStore::open(&db_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open credential database: {}", e))?,
    );

    tracing::info!(
        "🗝️ Initializing credential cache (ttl {:?})",
        config.credentials.cache_ttl
    );
    let credentials = Arc::new(CredentialProvider::new(store, cipher, &config.credentials));

    tracing::info!(
        "🚦 Initializing execution queue (stale after {:?})",
        config.queue.stale_after
    );
    let queue = Arc::new(ExecutionQueue::new(&config.queue));

    tracing::info!("🧠 Initializing memory manager");
    let memory = Arc::new(MemoryManager::new(&config.memory));
    memory.start_sweeper()?;

    Ok(AppState {
        coordinator: ExecutionCoordinator::new(queue, Arc::clone(&credentials)),
        secrets: SecretResolver::new(credentials),
        memory,
    })
}

/// Main router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_execution_routes())
        .merge(create_memory_routes())
        .merge(create_credential_routes())
        .with_state(state)
}

/// Create the application router from configuration
pub async fn create_app(config: &Config) -> Result<Router> {
    let state = build_state(config).await?;
    Ok(create_router(state))
}

/// Start the HTTP server with the given configuration
///
/// Serves until Ctrl+C or SIGTERM, then stops the memory sweeper and evicts all
/// sessions.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Flowcore server...");

    let state = build_state(&config).await?;
    let memory = Arc::clone(&state.memory);
    let app = create_router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tokio::task::spawn_blocking(move || memory.shutdown()).await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("⚠️ Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("🛑 Shutdown signal received, draining connections");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use crate::config::{CredentialConfig, DatabaseConfig};
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz_and_merged_routes() {
        let app = create_router(test_support::state().await);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");

        let response = app
            .oneshot(Request::builder().uri("/api/memory/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_build_state_requires_encryption_key() {
        let config = Config {
            credentials: CredentialConfig { encryption_key: None, ..CredentialConfig::default() },
            ..Config::default()
        };

        let err = build_state(&config).await.err().unwrap();
        assert!(err.to_string().contains("FLOWCORE_CREDENTIAL_KEY"));
    }

    #[tokio::test]
    async fn test_build_state_opens_database() {
        let data_dir = std::env::temp_dir().join(format!("flowcore-test-{}", uuid::Uuid::new_v4()));
        let config = Config {
            database: DatabaseConfig { data_dir: data_dir.to_string_lossy().to_string() },
            credentials: CredentialConfig {
                encryption_key: Some(AesGcmCipher::generate_key().unwrap()),
                ..CredentialConfig::default()
            },
            ..Config::default()
        };

        let state = build_state(&config).await.unwrap();
        assert!(state.memory.is_running());
        assert!(config.database.credentials_db_path().exists());

        state.memory.shutdown();
        let _ = std::fs::remove_dir_all(&data_dir);
    }
}
