//! Configuration management for the flowcore runtime
//!
//! Handles server settings, credential storage location and the tuning knobs of the
//! execution queue, credential cache and memory manager. Every value can be overridden
//! through an environment variable for container deployments.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Execution queue configuration
    pub queue: QueueConfig,
    /// Credential cache configuration
    pub credentials: CredentialConfig,
    /// Conversational memory policy
    pub memory: MemoryPolicyConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base directory for runtime databases (default: "data")
    /// Creates: {data_dir}/credentials.db
    pub data_dir: String,
}

impl DatabaseConfig {
    /// Path of the SQLite credential database
    pub fn credentials_db_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("credentials.db")
    }
}

/// Execution queue tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Age after which an unreleased execution slot is considered abandoned
    pub stale_after: Duration,
    /// Upper bound between two acquisition attempts in `wait_for_slot`
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Credential cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Maximum age of a cached, decrypted credential
    pub cache_ttl: Duration,
    /// Base64 encoded 32 byte AES key used to decrypt stored credentials
    #[serde(skip_serializing)]
    pub encryption_key: Option<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            encryption_key: None,
        }
    }
}

/// Bounding policies for conversational memory sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPolicyConfig {
    /// Sessions older than this are evicted regardless of activity
    pub max_session_age: Duration,
    /// Sessions untouched for this long are evicted
    pub max_inactive: Duration,
    /// Message count ceiling per session
    pub max_messages_per_session: usize,
    /// Estimated byte size ceiling per session
    pub max_bytes_per_session: usize,
    /// Background sweep period
    pub sweep_interval: Duration,
    /// Live session ceiling; exceeding it force-evicts the oldest quartile
    pub max_total_sessions: usize,
}

impl Default for MemoryPolicyConfig {
    fn default() -> Self {
        Self {
            max_session_age: Duration::from_secs(24 * 60 * 60),
            max_inactive: Duration::from_secs(2 * 60 * 60),
            max_messages_per_session: 1000,
            max_bytes_per_session: 50 * 1024 * 1024,
            sweep_interval: Duration::from_secs(15 * 60),
            max_total_sessions: 500,
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let queue_defaults = QueueConfig::default();
        let credential_defaults = CredentialConfig::default();
        let memory_defaults = MemoryPolicyConfig::default();

        Self {
            server: ServerConfig {
                host: std::env::var("FLOWCORE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("FLOWCORE_PORT").unwrap_or(3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("FLOWCORE_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            queue: QueueConfig {
                stale_after: env_secs("FLOWCORE_STALE_EXECUTION_SECS")
                    .unwrap_or(queue_defaults.stale_after),
                poll_interval: env_parse("FLOWCORE_SLOT_POLL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(queue_defaults.poll_interval),
            },
            credentials: CredentialConfig {
                cache_ttl: env_secs("FLOWCORE_CREDENTIAL_TTL_SECS")
                    .unwrap_or(credential_defaults.cache_ttl),
                encryption_key: std::env::var("FLOWCORE_CREDENTIAL_KEY").ok(),
            },
            memory: MemoryPolicyConfig {
                max_session_age: env_secs("FLOWCORE_MEMORY_MAX_SESSION_AGE_SECS")
                    .unwrap_or(memory_defaults.max_session_age),
                max_inactive: env_secs("FLOWCORE_MEMORY_MAX_INACTIVE_SECS")
                    .unwrap_or(memory_defaults.max_inactive),
                max_messages_per_session: env_parse("FLOWCORE_MEMORY_MAX_MESSAGES")
                    .unwrap_or(memory_defaults.max_messages_per_session),
                max_bytes_per_session: env_parse("FLOWCORE_MEMORY_MAX_BYTES")
                    .unwrap_or(memory_defaults.max_bytes_per_session),
                sweep_interval: env_secs("FLOWCORE_MEMORY_SWEEP_INTERVAL_SECS")
                    .unwrap_or(memory_defaults.sweep_interval),
                max_total_sessions: env_parse("FLOWCORE_MEMORY_MAX_SESSIONS")
                    .unwrap_or(memory_defaults.max_total_sessions),
            },
        }
    }
}

/// Parse an environment variable, ignoring missing or malformed values
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
