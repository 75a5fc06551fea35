//! Flowcore: concurrency core for a workflow automation backend
//!
//! Main entry point. Loads configuration from the environment and starts the HTTP
//! server. `flowcore generate-key` prints a fresh credential encryption key instead.

use flowcore::{config::Config, credentials::AesGcmCipher, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Execution slot inspection at /api/executions
/// - Memory session statistics and eviction at /api/memory/*
/// - Credential cache flushing at /api/credentials/cache
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().nth(1).as_deref() == Some("generate-key") {
        println!("{}", AesGcmCipher::generate_key()?);
        return Ok(());
    }

    // Defaults to 0.0.0.0:3004 with databases under ./data
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
